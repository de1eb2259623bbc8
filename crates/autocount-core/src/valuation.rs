//! # FIFO Valuation
//!
//! Allocates an item's on-hand quantity to its inbound cost layers,
//! oldest first.
//!
//! ## Example: on-hand 12
//! ```text
//!   layer  qty  cost    take   value
//!   ─────  ───  ─────   ────   ─────
//!   #1      10  2.00     10    20.00    remaining 12 → 2
//!   #2       5  3.00      2     6.00    remaining  2 → 0  (stop)
//!                              ─────
//!                              26.00    avg = 26 / 12 ≈ 2.1667
//! ```
//!
//! Quantity beyond the sum of all layers is left uncosted; nothing is
//! fabricated for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::StockMovement;

/// One inbound movement that carries a unit cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostLayer {
    pub batch_number: Option<String>,
    pub date: DateTime<Utc>,
    pub quantity: i64,
    pub unit_cost: Money,
}

impl CostLayer {
    /// Builds a layer from a ledger row, if the row is a costed receipt.
    pub fn from_movement(movement: &StockMovement) -> Option<Self> {
        if !movement.is_costed_inbound() {
            return None;
        }
        Some(CostLayer {
            batch_number: movement.batch_number.clone(),
            date: movement.created_at,
            quantity: movement.quantity,
            unit_cost: movement.unit_cost()?,
        })
    }
}

/// The part of one layer that is still on hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ValuationBatch {
    pub batch_number: Option<String>,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
    pub quantity: i64,
    pub unit_cost: Money,
    pub value: Money,
}

/// FIFO result for a valued item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Valuation {
    pub on_hand: i64,
    /// Average cost in major units, for display.
    pub avg_cost: f64,
    pub total_value: Money,
    pub batches: Vec<ValuationBatch>,
}

/// Valuation outcome for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemValuation {
    Valued(Valuation),
    /// Stock on hand but no costed receipts: cannot be valued.
    Unvalued { on_hand: i64 },
}

impl ItemValuation {
    pub fn is_valued(&self) -> bool {
        matches!(self, ItemValuation::Valued(_))
    }

    pub fn total_value(&self) -> Money {
        match self {
            ItemValuation::Valued(v) => v.total_value,
            ItemValuation::Unvalued { .. } => Money::zero(),
        }
    }
}

/// Runs FIFO allocation over an item's ledger rows.
///
/// `movements` may contain any movement type in any order; only costed
/// inbound rows are used, sorted by creation time (ties keep input order).
/// Negative on-hand is treated as zero.
pub fn valuate_fifo(movements: &[StockMovement], on_hand: i64) -> ItemValuation {
    let mut layers: Vec<CostLayer> = movements.iter().filter_map(CostLayer::from_movement).collect();
    layers.sort_by_key(|layer| layer.date);
    allocate(&layers, on_hand)
}

/// FIFO allocation over layers already in chronological order.
pub fn allocate(layers: &[CostLayer], on_hand: i64) -> ItemValuation {
    let on_hand = on_hand.max(0);

    if layers.is_empty() && on_hand > 0 {
        return ItemValuation::Unvalued { on_hand };
    }

    let mut remaining = on_hand;
    let mut total = Money::zero();
    let mut batches = Vec::new();

    for layer in layers {
        if remaining == 0 {
            break;
        }
        let take = layer.quantity.min(remaining);
        let value = layer.unit_cost.multiply_quantity(take);

        batches.push(ValuationBatch {
            batch_number: layer.batch_number.clone(),
            date: layer.date,
            quantity: take,
            unit_cost: layer.unit_cost,
            value,
        });
        remaining -= take;
        total += value;
    }

    let avg_cost = if on_hand == 0 {
        0.0
    } else {
        total.as_major_f64() / on_hand as f64
    };

    ItemValuation::Valued(Valuation {
        on_hand,
        avg_cost,
        total_value: total,
        batches,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MovementType;
    use chrono::{Duration, TimeZone};

    fn movement(day: i64, movement_type: MovementType, qty: i64, cost: Option<i64>) -> StockMovement {
        StockMovement {
            id: format!("m{day}"),
            component_id: "c1".into(),
            movement_type,
            quantity: qty,
            unit_cost_cents: cost,
            batch_number: Some(format!("B{day}")),
            reference: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day),
        }
    }

    fn valued(result: ItemValuation) -> Valuation {
        match result {
            ItemValuation::Valued(v) => v,
            other => panic!("expected valued, got {other:?}"),
        }
    }

    #[test]
    fn test_fifo_allocates_oldest_layers_first() {
        let movements = vec![
            movement(1, MovementType::Receipt, 10, Some(200)),
            movement(2, MovementType::Receipt, 5, Some(300)),
        ];

        let v = valued(valuate_fifo(&movements, 12));
        assert_eq!(v.total_value, Money::from_cents(2600));
        assert_eq!(v.batches.len(), 2);
        assert_eq!(v.batches[0].quantity, 10);
        assert_eq!(v.batches[0].value, Money::from_cents(2000));
        assert_eq!(v.batches[1].quantity, 2);
        assert_eq!(v.batches[1].value, Money::from_cents(600));
        assert!((v.avg_cost - 26.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_on_hand_beyond_layers_stops_at_last_layer() {
        let movements = vec![
            movement(1, MovementType::Receipt, 10, Some(200)),
            movement(2, MovementType::Receipt, 5, Some(300)),
        ];

        let v = valued(valuate_fifo(&movements, 20));
        assert_eq!(v.batches.len(), 2);
        assert_eq!(v.batches.iter().map(|b| b.quantity).sum::<i64>(), 15);
        assert_eq!(v.total_value, Money::from_cents(3500));
        assert!((v.avg_cost - 35.0 / 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_outbound_and_uncosted_rows_are_not_layers() {
        let movements = vec![
            movement(3, MovementType::Receipt, 4, Some(500)),
            movement(1, MovementType::Issue, -6, None),
            movement(2, MovementType::Adjustment, 2, None),
            movement(0, MovementType::Receipt, 3, Some(100)),
        ];

        let v = valued(valuate_fifo(&movements, 5));
        assert_eq!(v.batches[0].batch_number.as_deref(), Some("B0"));
        assert_eq!(v.batches[0].quantity, 3);
        assert_eq!(v.batches[1].batch_number.as_deref(), Some("B3"));
        assert_eq!(v.batches[1].quantity, 2);
        assert_eq!(v.total_value, Money::from_cents(1300));
    }

    #[test]
    fn test_stock_without_costed_layers_is_unvalued() {
        let movements = vec![movement(1, MovementType::Adjustment, 7, None)];
        let result = valuate_fifo(&movements, 7);
        assert_eq!(result, ItemValuation::Unvalued { on_hand: 7 });
        assert!(!result.is_valued());
    }

    #[test]
    fn test_zero_on_hand_is_valued_at_zero() {
        let movements = vec![movement(1, MovementType::Receipt, 10, Some(200))];
        let v = valued(valuate_fifo(&movements, 0));
        assert!(v.batches.is_empty());
        assert_eq!(v.total_value, Money::zero());
        assert_eq!(v.avg_cost, 0.0);

        let v = valued(valuate_fifo(&[], -3));
        assert_eq!(v.on_hand, 0);
    }
}
