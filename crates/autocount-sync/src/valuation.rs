//! # Valuation Service
//!
//! FIFO valuation over the local stock ledger.
//!
//! The allocation itself is pure ([`autocount_core::valuation`]); this
//! module loads the layers and the on-hand quantity and assembles reports.

use autocount_core::report::{UnvaluedItem, ValuationReport, ValuedItem};
use autocount_core::valuation::{valuate_fifo, ItemValuation};
use autocount_db::{Database, LedgerRepository, StockItem};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, info, instrument};

use crate::error::{SyncError, SyncResult};

/// Where the on-hand quantity comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnHandSource {
    /// The running total cached on the item.
    #[default]
    Cached,
    /// A full replay of the movement ledger.
    Ledger,
}

impl FromStr for OnHandSource {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cached" | "cache" => Ok(OnHandSource::Cached),
            "ledger" => Ok(OnHandSource::Ledger),
            other => Err(SyncError::InvalidConfig(format!(
                "unknown on-hand source '{other}' (expected cached or ledger)"
            ))),
        }
    }
}

/// FIFO valuation over one local store.
#[derive(Debug, Clone)]
pub struct ValuationService {
    ledger: LedgerRepository,
}

impl ValuationService {
    pub fn new(db: &Database) -> Self {
        ValuationService { ledger: db.ledger() }
    }

    /// Values one item, looked up by id or item code.
    #[instrument(skip(self))]
    pub async fn valuate(&self, id_or_code: &str, source: OnHandSource) -> SyncResult<ItemValuation> {
        let item = self.ledger.item(id_or_code).await?;
        self.valuate_item(&item, source).await
    }

    async fn valuate_item(&self, item: &StockItem, source: OnHandSource) -> SyncResult<ItemValuation> {
        let on_hand = match source {
            OnHandSource::Cached => item.current_stock,
            OnHandSource::Ledger => self.ledger.ledger_on_hand(&item.id).await?,
        };
        let layers = self.ledger.costed_inbound(&item.id).await?;
        let valuation = valuate_fifo(&layers, on_hand);

        debug!(
            item_code = %item.item_code,
            on_hand,
            layers = layers.len(),
            valued = valuation.is_valued(),
            "Valued item"
        );
        Ok(valuation)
    }

    /// Values every item with stock on hand.
    ///
    /// Items that hold stock but have no costed receipts are listed under
    /// `unvalued` and add nothing to the total.
    #[instrument(skip(self))]
    pub async fn report(&self, source: OnHandSource) -> SyncResult<ValuationReport> {
        let mut report = ValuationReport::default();

        for item in self.ledger.items().await? {
            match self.valuate_item(&item, source).await? {
                ItemValuation::Valued(valuation) if valuation.on_hand > 0 => {
                    report.total_value += valuation.total_value;
                    report.items.push(ValuedItem {
                        item_id: item.id,
                        item_code: item.item_code,
                        name: item.name,
                        valuation,
                    });
                }
                ItemValuation::Valued(_) => {}
                ItemValuation::Unvalued { on_hand } => report.unvalued.push(UnvaluedItem {
                    item_id: item.id,
                    item_code: item.item_code,
                    name: item.name,
                    on_hand,
                }),
            }
        }

        info!(
            valued = report.items.len(),
            unvalued = report.unvalued.len(),
            total = %report.total_value,
            "Valuation report built"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autocount_core::{EntityKind, FieldMap, FieldValue, Money, MovementType, NewStockMovement};
    use autocount_db::DbConfig;

    async fn setup() -> (Database, ValuationService) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let service = ValuationService::new(&db);
        (db, service)
    }

    async fn add_item(db: &Database, code: &str) -> String {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), FieldValue::Text(format!("Item {code}")));
        db.records()
            .insert(EntityKind::InventoryItem, code, &fields, None)
            .await
            .unwrap()
    }

    async fn receive(db: &Database, id: &str, quantity: i64, cost_cents: Option<i64>, batch: &str) {
        db.ledger()
            .append(&NewStockMovement {
                component_id: id.to_string(),
                movement_type: if cost_cents.is_some() {
                    MovementType::Receipt
                } else {
                    MovementType::Adjustment
                },
                quantity,
                unit_cost: cost_cents.map(Money::from_cents),
                batch_number: Some(batch.to_string()),
                reference: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fifo_allocates_oldest_layers_first() {
        let (db, service) = setup().await;
        let id = add_item(&db, "ITM-001").await;
        receive(&db, &id, 10, Some(200), "GRN-1").await;
        receive(&db, &id, 5, Some(300), "GRN-2").await;
        receive(&db, &id, -3, None, "ISS-1").await;

        let ItemValuation::Valued(valuation) = service.valuate("ITM-001", OnHandSource::Cached).await.unwrap() else {
            panic!("expected a valued item");
        };
        assert_eq!(valuation.on_hand, 12);
        assert_eq!(valuation.total_value, Money::from_cents(2600));
        assert!((valuation.avg_cost - 26.0 / 12.0).abs() < 1e-9);
        assert_eq!(valuation.batches.len(), 2);
        assert_eq!(valuation.batches[0].quantity, 10);
        assert_eq!(valuation.batches[1].quantity, 2);
        assert_eq!(valuation.batches[1].batch_number.as_deref(), Some("GRN-2"));
    }

    #[tokio::test]
    async fn test_report_separates_unvalued_items() {
        let (db, service) = setup().await;
        let costed = add_item(&db, "ITM-001").await;
        let uncosted = add_item(&db, "ITM-002").await;
        add_item(&db, "ITM-003").await;

        receive(&db, &costed, 4, Some(150), "GRN-1").await;
        receive(&db, &uncosted, 7, None, "ADJ-1").await;

        let report = service.report(OnHandSource::Cached).await.unwrap();
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].item_code, "ITM-001");
        assert_eq!(report.unvalued.len(), 1);
        assert_eq!(report.unvalued[0].item_code, "ITM-002");
        assert_eq!(report.unvalued[0].on_hand, 7);
        assert_eq!(report.total_value, Money::from_cents(600));
    }

    #[tokio::test]
    async fn test_ledger_source_ignores_drifted_cache() {
        let (db, service) = setup().await;
        let id = add_item(&db, "ITM-001").await;
        receive(&db, &id, 10, Some(100), "GRN-1").await;

        sqlx::query("UPDATE components SET current_stock = 99 WHERE id = ?1")
            .bind(&id)
            .execute(db.pool())
            .await
            .unwrap();

        let cached = service.valuate(&id, OnHandSource::Cached).await.unwrap();
        let ledger = service.valuate(&id, OnHandSource::Ledger).await.unwrap();
        assert_eq!(cached.total_value(), Money::from_cents(1000));
        assert_eq!(ledger.total_value(), Money::from_cents(1000));

        let ItemValuation::Valued(cached) = cached else { panic!("expected a valued item") };
        let ItemValuation::Valued(ledger) = ledger else { panic!("expected a valued item") };
        assert_eq!(cached.on_hand, 99);
        assert_eq!(ledger.on_hand, 10);
    }

    #[tokio::test]
    async fn test_unknown_item() {
        let (_db, service) = setup().await;
        let err = service.valuate("NOPE", OnHandSource::Cached).await.unwrap_err();
        assert!(matches!(err, SyncError::Database(ref e) if e.is_not_found()));
    }

    #[test]
    fn test_on_hand_source_parse() {
        assert_eq!("ledger".parse::<OnHandSource>().unwrap(), OnHandSource::Ledger);
        assert_eq!("Cached".parse::<OnHandSource>().unwrap(), OnHandSource::Cached);
        assert!("guess".parse::<OnHandSource>().is_err());
    }
}
