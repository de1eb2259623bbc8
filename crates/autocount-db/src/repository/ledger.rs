//! # Ledger Repository
//!
//! The append-only stock movement ledger and the cached on-hand total.
//!
//! ```text
//! append(movement)
//!   ┌──────────────── one transaction ────────────────┐
//!   │ INSERT INTO stock_movements (...)                │
//!   │ UPDATE components SET current_stock += quantity  │
//!   └──────────────────────────────────────────────────┘
//!
//! reconcile(component)
//!   cached  = components.current_stock
//!   ledger  = SUM(stock_movements.quantity)
//!   drift   = cached - ledger     (0 when consistent)
//! ```

use autocount_core::validation::validate_movement;
use autocount_core::{NewStockMovement, StockMovement};
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// An inventory item as seen by valuation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StockItem {
    pub id: String,
    pub item_code: String,
    pub name: String,
    pub current_stock: i64,
}

/// Cached total compared with a ledger replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockReconciliation {
    pub cached: i64,
    pub ledger: i64,
}

impl StockReconciliation {
    pub fn drift(&self) -> i64 {
        self.cached - self.ledger
    }

    pub fn is_consistent(&self) -> bool {
        self.drift() == 0
    }
}

/// Repository for stock movements.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Appends a movement and moves the cached on-hand total with it.
    pub async fn append(&self, movement: &NewStockMovement) -> DbResult<StockMovement> {
        validate_movement(movement.quantity, movement.unit_cost)?;

        let row = StockMovement {
            id: Uuid::new_v4().to_string(),
            component_id: movement.component_id.clone(),
            movement_type: movement.movement_type,
            quantity: movement.quantity,
            unit_cost_cents: movement.unit_cost.map(|c| c.cents()),
            batch_number: movement.batch_number.clone(),
            reference: movement.reference.clone(),
            created_at: Utc::now(),
        };

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE components SET current_stock = current_stock + ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(row.quantity)
        .bind(row.created_at)
        .bind(&row.component_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DbError::not_found("component", &row.component_id));
        }

        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, component_id, movement_type, quantity,
                unit_cost_cents, batch_number, reference, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&row.id)
        .bind(&row.component_id)
        .bind(row.movement_type)
        .bind(row.quantity)
        .bind(row.unit_cost_cents)
        .bind(&row.batch_number)
        .bind(&row.reference)
        .bind(row.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            component_id = %row.component_id,
            movement_type = row.movement_type.as_str(),
            quantity = row.quantity,
            "Appended stock movement"
        );
        Ok(row)
    }

    /// All movements for an item, oldest first.
    pub async fn movements_for(&self, component_id: &str) -> DbResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, component_id, movement_type, quantity,
                   unit_cost_cents, batch_number, reference, created_at
            FROM stock_movements
            WHERE component_id = ?1
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(component_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Inbound movements carrying a unit cost, oldest first (FIFO layers).
    pub async fn costed_inbound(&self, component_id: &str) -> DbResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, component_id, movement_type, quantity,
                   unit_cost_cents, batch_number, reference, created_at
            FROM stock_movements
            WHERE component_id = ?1
              AND quantity > 0
              AND unit_cost_cents IS NOT NULL
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(component_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Looks up an item by internal id or item code.
    pub async fn item(&self, id_or_code: &str) -> DbResult<StockItem> {
        sqlx::query_as::<_, StockItem>(
            "SELECT id, item_code, name, current_stock FROM components WHERE id = ?1 OR item_code = ?1",
        )
        .bind(id_or_code)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("component", id_or_code))
    }

    /// Every inventory item, ordered by item code.
    pub async fn items(&self) -> DbResult<Vec<StockItem>> {
        let rows = sqlx::query_as::<_, StockItem>(
            "SELECT id, item_code, name, current_stock FROM components ORDER BY item_code",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// On-hand quantity computed by replaying the ledger.
    pub async fn ledger_on_hand(&self, component_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM stock_movements WHERE component_id = ?1",
        )
        .bind(component_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    /// Compares the cached total with the ledger; with `repair`, resets the
    /// cache to the ledger value.
    pub async fn reconcile(&self, component_id: &str, repair: bool) -> DbResult<StockReconciliation> {
        let item = self.item(component_id).await?;
        let ledger = self.ledger_on_hand(&item.id).await?;
        let result = StockReconciliation {
            cached: item.current_stock,
            ledger,
        };

        if !result.is_consistent() {
            warn!(
                item_code = %item.item_code,
                cached = result.cached,
                ledger = result.ledger,
                "Cached on-hand differs from ledger"
            );
            if repair {
                sqlx::query("UPDATE components SET current_stock = ?1, updated_at = ?2 WHERE id = ?3")
                    .bind(ledger)
                    .bind(Utc::now())
                    .bind(&item.id)
                    .execute(&self.pool)
                    .await?;
            }
        }

        Ok(result)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
