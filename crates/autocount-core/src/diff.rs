//! # Diff Engine
//!
//! Field-level comparison of a current record against an incoming one.
//!
//! ```text
//!   current: None ─────────────────────────────────────► Create (all fields)
//!
//!   current: Some(fields) ──► normalize both sides ──► compare declared fields
//!                                                        │
//!                                         no differences ├──► None
//!                                                        └──► Update (changed)
//! ```
//!
//! Direction-agnostic: for a pull `current` is the local row and `incoming`
//! the mapped remote record; for a push the roles are reversed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::mapper::normalize_fields;
use crate::record::{FieldMap, FieldValue};
use crate::schema::EntitySchema;

/// What a sync would do with one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Create,
    Update,
    None,
}

/// Old and new value of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FieldChange {
    pub old: FieldValue,
    pub new: FieldValue,
}

/// Field name → change. Ordered for stable reports.
pub type ChangeSet = BTreeMap<String, FieldChange>;

/// Result of classifying one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub action: SyncAction,
    pub changes: ChangeSet,
}

impl Classification {
    /// The fields to write: every field for a create, changed fields for an
    /// update, nothing otherwise.
    pub fn fields_to_write(&self) -> FieldMap {
        self.changes
            .iter()
            .map(|(name, change)| (name.clone(), change.new.clone()))
            .collect()
    }
}

/// Classifies `incoming` against `current`.
///
/// Only the schema's declared fields are considered; anything else in
/// either map is ignored. Pure and deterministic.
///
/// ## Example
/// ```rust
/// use autocount_core::diff::{classify, SyncAction};
/// use autocount_core::record::{FieldMap, FieldValue};
/// use autocount_core::schema::SUPPLIER;
///
/// let mut incoming = FieldMap::new();
/// incoming.insert("name".into(), FieldValue::Text("Acme".into()));
///
/// assert_eq!(classify(&SUPPLIER, None, &incoming).action, SyncAction::Create);
/// assert_eq!(classify(&SUPPLIER, Some(&incoming), &incoming).action, SyncAction::None);
/// ```
pub fn classify(schema: &EntitySchema, current: Option<&FieldMap>, incoming: &FieldMap) -> Classification {
    let incoming = normalize_fields(schema, incoming);

    let Some(current) = current else {
        let changes = incoming
            .into_iter()
            .map(|(name, new)| {
                (
                    name,
                    FieldChange {
                        old: FieldValue::Null,
                        new,
                    },
                )
            })
            .collect();
        return Classification {
            action: SyncAction::Create,
            changes,
        };
    };

    let mut current = normalize_fields(schema, current);
    let changes: ChangeSet = incoming
        .into_iter()
        .filter_map(|(name, new)| {
            let old = current.remove(&name).unwrap_or(FieldValue::Null);
            (old != new).then_some((name, FieldChange { old, new }))
        })
        .collect();

    let action = if changes.is_empty() {
        SyncAction::None
    } else {
        SyncAction::Update
    };

    Classification { action, changes }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::schema::{INVENTORY_ITEM, PURCHASE_ORDER};

    fn item(name: &str, cost: i64) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), FieldValue::Text(name.into()));
        fields.insert("cost_cents".into(), FieldValue::Money(Money::from_cents(cost)));
        fields
    }

    #[test]
    fn test_identical_fields_classify_as_none() {
        let fields = item("Hex Bolt", 120);
        let result = classify(&INVENTORY_ITEM, Some(&fields), &fields);
        assert_eq!(result.action, SyncAction::None);
        assert!(result.changes.is_empty());
    }

    #[test]
    fn test_missing_current_classifies_as_create_with_all_fields() {
        let result = classify(&INVENTORY_ITEM, None, &item("Hex Bolt", 120));
        assert_eq!(result.action, SyncAction::Create);
        assert_eq!(result.changes.len(), INVENTORY_ITEM.fields.len());
        assert_eq!(
            result.changes["name"].new,
            FieldValue::Text("Hex Bolt".into())
        );
    }

    #[test]
    fn test_changed_field_is_reported_with_old_and_new() {
        let result = classify(&INVENTORY_ITEM, Some(&item("Hex Bolt", 120)), &item("Hex Bolt", 150));
        assert_eq!(result.action, SyncAction::Update);
        assert_eq!(result.changes.len(), 1);
        let change = &result.changes["cost_cents"];
        assert_eq!(change.old, FieldValue::Money(Money::from_cents(120)));
        assert_eq!(change.new, FieldValue::Money(Money::from_cents(150)));
        assert_eq!(result.fields_to_write().len(), 1);
    }

    #[test]
    fn test_no_value_representations_are_equivalent() {
        let mut current = item("Hex Bolt", 0);
        current.insert("barcode".into(), FieldValue::Text(String::new()));
        current.insert("is_active".into(), FieldValue::Flag(true));

        let mut incoming = FieldMap::new();
        incoming.insert("name".into(), FieldValue::Text(" Hex Bolt ".into()));
        incoming.insert("cost_cents".into(), FieldValue::Null);
        incoming.insert("barcode".into(), FieldValue::Null);

        let result = classify(&INVENTORY_ITEM, Some(&current), &incoming);
        assert_eq!(result.action, SyncAction::None, "{:?}", result.changes);
    }

    #[test]
    fn test_undeclared_fields_are_ignored() {
        let mut current = item("Hex Bolt", 120);
        current.insert("current_stock".into(), FieldValue::Integer(40));
        current.insert("autocount_synced_at".into(), FieldValue::Text("2024-01-01".into()));

        let result = classify(&INVENTORY_ITEM, Some(&current), &item("Hex Bolt", 120));
        assert_eq!(result.action, SyncAction::None);
    }

    #[test]
    fn test_line_order_matters() {
        use crate::record::DocumentLine;
        let line = |code: &str| DocumentLine {
            item_code: code.into(),
            description: None,
            quantity: 1,
            unit_cost: Money::from_cents(100),
        };

        let mut a = FieldMap::new();
        a.insert("lines".into(), FieldValue::Lines(vec![line("A"), line("B")]));
        let mut b = FieldMap::new();
        b.insert("lines".into(), FieldValue::Lines(vec![line("B"), line("A")]));

        assert_eq!(classify(&PURCHASE_ORDER, Some(&a), &b).action, SyncAction::Update);
    }
}
