//! # Domain Types
//!
//! Entity classes, sync log entries and ledger rows shared by every layer.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   EntityKind    │   │    SyncType     │   │   SyncStatus    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  InventoryItem  │   │  Pull(kind)     │   │  Pending        │       │
//! │  │  Supplier       │   │  Push(kind)     │   │  Success        │       │
//! │  │  PurchaseOrder  │   │  PushRecord(k)  │   │  Failed/Partial │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────────────────┐   ┌─────────────────────────────┐     │
//! │  │        SyncLogEntry         │   │        StockMovement        │     │
//! │  │  append-only audit record   │   │  append-only ledger row     │     │
//! │  │  mutated only by retries    │   │  never rewritten            │     │
//! │  └─────────────────────────────┘   └─────────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::CoreError;
use crate::money::Money;

// =============================================================================
// Entity Kind
// =============================================================================

/// The entity classes mirrored between the local store and the ERP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Stock items (`components` locally, items in the ERP).
    InventoryItem,
    /// Suppliers (creditors in the ERP).
    Supplier,
    /// Purchase orders with their lines.
    PurchaseOrder,
}

impl EntityKind {
    /// Every entity class, in a stable order.
    pub const ALL: [EntityKind; 3] = [
        EntityKind::InventoryItem,
        EntityKind::Supplier,
        EntityKind::PurchaseOrder,
    ];

    /// The name stored in `autocount_sync_log.reference_type`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityKind::InventoryItem => "inventory_item",
            EntityKind::Supplier => "supplier",
            EntityKind::PurchaseOrder => "purchase_order",
        }
    }

    /// Plural form, used in run-level sync types and log references.
    pub const fn plural(&self) -> &'static str {
        match self {
            EntityKind::InventoryItem => "inventory_items",
            EntityKind::Supplier => "suppliers",
            EntityKind::PurchaseOrder => "purchase_orders",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inventory_item" | "inventory_items" | "item" | "items" | "inventory" => {
                Ok(EntityKind::InventoryItem)
            }
            "supplier" | "suppliers" | "creditor" | "creditors" => Ok(EntityKind::Supplier),
            "purchase_order" | "purchase_orders" | "po" | "pos" => Ok(EntityKind::PurchaseOrder),
            other => Err(CoreError::UnknownEntity(other.to_string())),
        }
    }
}

// =============================================================================
// Sync Status
// =============================================================================

/// Status of one synchronization attempt.
///
/// ## Lifecycle
/// ```text
///   run finished ──► Success | Partial | Failed      (terminal)
///
///   retry claimed ──► Pending ──► Success | Partial | Failed
///                       ▲
///                       └── only while an ERP call is outstanding
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Success,
    Failed,
    Partial,
}

impl SyncStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
            SyncStatus::Partial => "partial",
        }
    }

    /// True for the three end states of an attempt.
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, SyncStatus::Pending)
    }

    /// True if a retry may be dispatched from this status.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, SyncStatus::Failed | SyncStatus::Partial)
    }

    /// Aggregate status for a finished run in which `failed` records failed.
    ///
    /// `Failed` is reserved for run-level failures, so a run in which every
    /// record failed is still `Partial`.
    pub const fn for_run(failed: usize) -> Self {
        if failed == 0 {
            SyncStatus::Success
        } else {
            SyncStatus::Partial
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "success" => Ok(SyncStatus::Success),
            "failed" => Ok(SyncStatus::Failed),
            "partial" => Ok(SyncStatus::Partial),
            other => Err(CoreError::UnknownSyncStatus(other.to_string())),
        }
    }
}

// =============================================================================
// Sync Type
// =============================================================================

/// The operation a sync log entry records.
///
/// Closed set: each variant maps to exactly one retry handler, so adding
/// an operation is a compile-time change to every `match` on this type.
///
/// ## Stored Names
/// ```text
/// Pull(InventoryItem)        "pull_inventory_items"   whole-class run
/// Push(Supplier)             "push_suppliers"         whole-class run
/// PushRecord(PurchaseOrder)  "push_purchase_order"    one local record
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncType {
    /// ERP → local run for one entity class.
    Pull(EntityKind),
    /// Local → ERP run for one entity class.
    Push(EntityKind),
    /// Local → ERP for a single record (reference id = local record id).
    PushRecord(EntityKind),
}

impl SyncType {
    /// Every sync type the dispatcher knows about.
    pub fn all() -> impl Iterator<Item = SyncType> {
        EntityKind::ALL.into_iter().flat_map(|kind| {
            [
                SyncType::Pull(kind),
                SyncType::Push(kind),
                SyncType::PushRecord(kind),
            ]
        })
    }

    pub const fn entity(&self) -> EntityKind {
        match self {
            SyncType::Pull(kind) | SyncType::Push(kind) | SyncType::PushRecord(kind) => *kind,
        }
    }

    /// True if this type covers a whole entity class rather than one record.
    pub const fn is_run(&self) -> bool {
        matches!(self, SyncType::Pull(_) | SyncType::Push(_))
    }

    pub fn as_string(&self) -> String {
        match self {
            SyncType::Pull(kind) => format!("pull_{}", kind.plural()),
            SyncType::Push(kind) => format!("push_{}", kind.plural()),
            SyncType::PushRecord(kind) => format!("push_{}", kind.as_str()),
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl FromStr for SyncType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncType::all()
            .find(|t| t.as_string() == s)
            .ok_or_else(|| CoreError::UnknownSyncType(s.to_string()))
    }
}

// =============================================================================
// Sync Log Entry
// =============================================================================

/// One row of the `autocount_sync_log` audit trail.
///
/// Never deleted. Retries update `sync_status`, `error_message`,
/// `autocount_doc_no`, `retry_count` and `last_sync_at` in place.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    pub id: String,
    /// Local record id, or the entity class plural for run-level entries.
    pub reference_id: String,
    /// Entity class (`EntityKind::as_str`).
    pub reference_type: String,
    /// Operation name (`SyncType` string form).
    pub sync_type: String,
    pub sync_status: SyncStatus,
    /// Document number / code assigned by the ERP, when known.
    pub autocount_doc_no: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl SyncLogEntry {
    /// Parses the stored sync type.
    ///
    /// ## Errors
    /// `CoreError::UnknownSyncType` when the row was written by a build that
    /// knew an operation this one does not.
    pub fn parsed_sync_type(&self) -> Result<SyncType, CoreError> {
        self.sync_type.parse()
    }
}

// =============================================================================
// Stock Movements
// =============================================================================

/// Kind of stock movement in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    /// Goods received against a purchase order.
    Receipt,
    /// Manual stock count correction.
    Adjustment,
    /// Output of an assembly / kitting job.
    Assembly,
    /// Customer return back into stock.
    Return,
    /// Stock issued out (sales fulfilment, consumption).
    Issue,
}

impl MovementType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MovementType::Receipt => "receipt",
            MovementType::Adjustment => "adjustment",
            MovementType::Assembly => "assembly",
            MovementType::Return => "return",
            MovementType::Issue => "issue",
        }
    }
}

impl FromStr for MovementType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "receipt" => Ok(MovementType::Receipt),
            "adjustment" => Ok(MovementType::Adjustment),
            "assembly" => Ok(MovementType::Assembly),
            "return" => Ok(MovementType::Return),
            "issue" => Ok(MovementType::Issue),
            other => Err(CoreError::UnknownMovementType(other.to_string())),
        }
    }
}

/// An append-only ledger entry for one item.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: String,
    /// Local component id.
    pub component_id: String,
    pub movement_type: MovementType,
    /// Signed quantity: positive in, negative out.
    pub quantity: i64,
    pub unit_cost_cents: Option<i64>,
    pub batch_number: Option<String>,
    /// Free-form source reference (GRN number, adjustment note).
    pub reference: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    pub fn unit_cost(&self) -> Option<Money> {
        self.unit_cost_cents.map(Money::from_cents)
    }

    /// True if this row forms a FIFO cost layer: stock coming in, with a cost.
    pub fn is_costed_inbound(&self) -> bool {
        self.quantity > 0 && self.unit_cost_cents.is_some()
    }
}

/// Input for appending a movement to the ledger.
#[derive(Debug, Clone)]
pub struct NewStockMovement {
    pub component_id: String,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub unit_cost: Option<Money>,
    pub batch_number: Option<String>,
    pub reference: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_type_names_round_trip_through_parse() {
        for sync_type in SyncType::all() {
            let parsed: SyncType = sync_type.as_string().parse().unwrap();
            assert_eq!(parsed, sync_type);
        }
        assert_eq!(SyncType::all().count(), 9);
    }

    #[test]
    fn test_sync_type_stored_names() {
        assert_eq!(
            SyncType::Pull(EntityKind::InventoryItem).as_string(),
            "pull_inventory_items"
        );
        assert_eq!(
            SyncType::PushRecord(EntityKind::PurchaseOrder).as_string(),
            "push_purchase_order"
        );
    }

    #[test]
    fn test_unknown_sync_type_is_error() {
        let err = "sync_everything".parse::<SyncType>().unwrap_err();
        assert!(matches!(err, CoreError::UnknownSyncType(ref s) if s == "sync_everything"));
    }

    #[test]
    fn test_run_status_never_failed() {
        assert_eq!(SyncStatus::for_run(0), SyncStatus::Success);
        assert_eq!(SyncStatus::for_run(3), SyncStatus::Partial);
        assert!(SyncStatus::Failed.is_retryable());
        assert!(SyncStatus::Partial.is_retryable());
        assert!(!SyncStatus::Success.is_retryable());
        assert!(!SyncStatus::Pending.is_terminal());
    }

    #[test]
    fn test_entity_kind_aliases() {
        assert_eq!("items".parse::<EntityKind>().unwrap(), EntityKind::InventoryItem);
        assert_eq!("creditors".parse::<EntityKind>().unwrap(), EntityKind::Supplier);
        assert_eq!("PO".parse::<EntityKind>().unwrap(), EntityKind::PurchaseOrder);
        assert!("customers".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_costed_inbound() {
        let mut movement = StockMovement {
            id: "m1".into(),
            component_id: "c1".into(),
            movement_type: MovementType::Receipt,
            quantity: 10,
            unit_cost_cents: Some(200),
            batch_number: None,
            reference: None,
            created_at: Utc::now(),
        };
        assert!(movement.is_costed_inbound());

        movement.unit_cost_cents = None;
        assert!(!movement.is_costed_inbound());

        movement.unit_cost_cents = Some(200);
        movement.quantity = -4;
        assert!(!movement.is_costed_inbound());
    }
}
