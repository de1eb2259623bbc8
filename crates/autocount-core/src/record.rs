//! # Records
//!
//! The two shapes a synchronized entity takes.
//!
//! ```text
//! ┌──────────────────────────────┐          ┌──────────────────────────────┐
//! │ RemoteRecord (ERP JSON)      │  mapper  │ LocalRecord (field map)      │
//! │ {"ItemCode": "ITM-001",      │ ───────► │ key:    "ITM-001"            │
//! │  "Description": "Bolt M6",   │          │ fields: name = Text("Bolt")  │
//! │  "StandardCost": 1.2, ...}   │ ◄─────── │         cost_cents = Money   │
//! └──────────────────────────────┘          └──────────────────────────────┘
//! ```
//!
//! Both sides are matched on the natural key only; internal ids never
//! cross the boundary.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Field Values
// =============================================================================

/// A typed field value in the common (local) shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Money(Money),
    Flag(bool),
    Date(NaiveDate),
    Lines(Vec<DocumentLine>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text optionally wrapped: `None` becomes `Null`.
    pub fn text(value: Option<impl Into<String>>) -> Self {
        value.map(|v| FieldValue::Text(v.into())).unwrap_or(FieldValue::Null)
    }
}

/// One line of a document (purchase order detail).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLine {
    pub item_code: String,
    pub description: Option<String>,
    pub quantity: i64,
    pub unit_cost: Money,
}

/// Field name → value, ordered so change sets and payloads are deterministic.
pub type FieldMap = BTreeMap<String, FieldValue>;

// =============================================================================
// Local Record
// =============================================================================

/// A local row in the common shape.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRecord {
    /// Internal database id (never sent to the ERP).
    pub id: String,
    /// Natural key (item code, supplier code, document number).
    pub key: String,
    /// Syncable fields, keyed by local column name.
    pub fields: FieldMap,
}

// =============================================================================
// Remote Record
// =============================================================================

/// The ERP's JSON object for one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteRecord(Map<String, Value>);

impl RemoteRecord {
    pub fn new() -> Self {
        RemoteRecord(Map::new())
    }

    /// Wraps a JSON value; only objects are records.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(RemoteRecord(map)),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for RemoteRecord {
    fn from(map: Map<String, Value>) -> Self {
        RemoteRecord(map)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
