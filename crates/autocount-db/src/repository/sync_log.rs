//! # Sync Log Repository
//!
//! The `autocount_sync_log` audit trail. Rows are never deleted.
//!
//! ## Status Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  insert()            ──► success | partial | failed                     │
//! │                                                                         │
//! │  claim_for_retry()   failed | partial ──► pending  (retry_count += 1)   │
//! │                      pending, lease expired ──► pending (reclaimed)     │
//! │                      success | live pending ──► no change, false        │
//! │                                                                         │
//! │  complete()          pending ──► success | partial | failed             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The claim is a single conditional UPDATE, so two processes racing to
//! retry the same entry cannot both win. A claim stamps `last_sync_at`; a
//! `pending` entry whose stamp is older than the caller's lease cutoff was
//! abandoned (cancelled or crashed retry) and can be claimed again.

use autocount_core::{SyncLogEntry, SyncStatus, SyncType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

const SELECT_ENTRY: &str = r#"
    SELECT id, reference_id, reference_type, sync_type, sync_status,
           autocount_doc_no, error_message, retry_count, created_at, last_sync_at
    FROM autocount_sync_log
"#;

/// Input for a new log entry.
#[derive(Debug, Clone)]
pub struct NewSyncLogEntry {
    pub reference_id: String,
    pub sync_type: SyncType,
    pub status: SyncStatus,
    pub doc_no: Option<String>,
    pub error: Option<String>,
}

/// Entry counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub success: i64,
    pub failed: i64,
    pub partial: i64,
}

/// Repository for the sync audit log.
#[derive(Debug, Clone)]
pub struct SyncLogRepository {
    pool: SqlitePool,
}

impl SyncLogRepository {
    /// Creates a new SyncLogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncLogRepository { pool }
    }

    /// Appends an entry.
    pub async fn insert(&self, entry: NewSyncLogEntry) -> DbResult<SyncLogEntry> {
        let now = Utc::now();
        let row = SyncLogEntry {
            id: Uuid::new_v4().to_string(),
            reference_id: entry.reference_id,
            reference_type: entry.sync_type.entity().as_str().to_string(),
            sync_type: entry.sync_type.as_string(),
            sync_status: entry.status,
            autocount_doc_no: entry.doc_no,
            error_message: entry.error,
            retry_count: 0,
            created_at: now,
            last_sync_at: Some(now),
        };

        sqlx::query(
            r#"
            INSERT INTO autocount_sync_log (
                id, reference_id, reference_type, sync_type, sync_status,
                autocount_doc_no, error_message, retry_count, created_at, last_sync_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&row.id)
        .bind(&row.reference_id)
        .bind(&row.reference_type)
        .bind(&row.sync_type)
        .bind(row.sync_status)
        .bind(&row.autocount_doc_no)
        .bind(&row.error_message)
        .bind(row.retry_count)
        .bind(row.created_at)
        .bind(row.last_sync_at)
        .execute(&self.pool)
        .await?;

        debug!(
            id = %row.id,
            sync_type = %row.sync_type,
            status = row.sync_status.as_str(),
            "Wrote sync log entry"
        );
        Ok(row)
    }

    /// Gets an entry by id.
    pub async fn get(&self, id: &str) -> DbResult<Option<SyncLogEntry>> {
        let sql = format!("{SELECT_ENTRY} WHERE id = ?1");
        let entry = sqlx::query_as::<_, SyncLogEntry>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entry)
    }

    /// Gets the most recent entry for a reference id.
    pub async fn latest_for_reference(&self, reference_id: &str) -> DbResult<Option<SyncLogEntry>> {
        let sql = format!(
            "{SELECT_ENTRY} WHERE reference_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1"
        );
        let entry = sqlx::query_as::<_, SyncLogEntry>(&sql)
            .bind(reference_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entry)
    }

    /// Moves a failed or partial entry to `pending` and bumps its retry
    /// count. A `pending` entry last stamped before `stale_before` is
    /// claimed the same way.
    ///
    /// ## Returns
    /// `true` if this caller won the claim.
    pub async fn claim_for_retry(&self, id: &str, stale_before: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE autocount_sync_log SET
                sync_status = 'pending',
                retry_count = retry_count + 1,
                last_sync_at = ?2
            WHERE id = ?1
              AND (sync_status IN ('failed', 'partial')
                   OR (sync_status = 'pending' AND last_sync_at < ?3))
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .bind(stale_before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Records the outcome of a replay. The error column is overwritten;
    /// a missing doc number keeps the previous one.
    pub async fn complete(
        &self,
        id: &str,
        status: SyncStatus,
        doc_no: Option<&str>,
        error: Option<&str>,
    ) -> DbResult<SyncLogEntry> {
        let result = sqlx::query(
            r#"
            UPDATE autocount_sync_log SET
                sync_status = ?2,
                autocount_doc_no = COALESCE(?3, autocount_doc_no),
                error_message = ?4,
                last_sync_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(doc_no)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("sync log entry", id));
        }

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("sync log entry", id))
    }

    /// Most recent entries first.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<SyncLogEntry>> {
        let sql = format!("{SELECT_ENTRY} ORDER BY created_at DESC, rowid DESC LIMIT ?1");
        let entries = sqlx::query_as::<_, SyncLogEntry>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    /// Most recent entries with the given status first.
    pub async fn list_by_status(&self, status: SyncStatus, limit: u32) -> DbResult<Vec<SyncLogEntry>> {
        let sql = format!(
            "{SELECT_ENTRY} WHERE sync_status = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        );
        let entries = sqlx::query_as::<_, SyncLogEntry>(&sql)
            .bind(status)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    /// Failed and partial entries, plus `pending` entries last stamped
    /// before `stale_before`, oldest first.
    pub async fn list_retryable(
        &self,
        limit: u32,
        stale_before: DateTime<Utc>,
    ) -> DbResult<Vec<SyncLogEntry>> {
        let sql = format!(
            "{SELECT_ENTRY} WHERE sync_status IN ('failed', 'partial') \
             OR (sync_status = 'pending' AND last_sync_at < ?2) \
             ORDER BY created_at ASC, rowid ASC LIMIT ?1"
        );
        let entries = sqlx::query_as::<_, SyncLogEntry>(&sql)
            .bind(limit)
            .bind(stale_before)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    /// Entry counts per status.
    pub async fn count_by_status(&self) -> DbResult<StatusCounts> {
        let rows: Vec<(SyncStatus, i64)> = sqlx::query_as(
            "SELECT sync_status, COUNT(*) FROM autocount_sync_log GROUP BY sync_status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match status {
                SyncStatus::Pending => counts.pending = count,
                SyncStatus::Success => counts.success = count,
                SyncStatus::Failed => counts.failed = count,
                SyncStatus::Partial => counts.partial = count,
            }
        }
        Ok(counts)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
