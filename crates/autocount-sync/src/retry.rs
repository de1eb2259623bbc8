//! # Retry Dispatcher
//!
//! Replays one sync log entry.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  retry(ref) ── ref is a log id, or a reference id (latest entry wins)   │
//! │     │                                                                   │
//! │     ├── status success ──► NothingToRetry   (ERP never called)          │
//! │     ├── sync type unknown ──► UnknownSyncType                           │
//! │     ├── entry lock held ──► RetryInProgress                             │
//! │     ├── claim lost ──► RetryInProgress                                  │
//! │     │     (claimable: failed | partial | pending past its lease)        │
//! │     │                                                                   │
//! │     ▼ claimed, retry_count += 1                                         │
//! │  dispatch on SyncType                                                   │
//! │     Pull(kind)        ──► pull run         (run guard held)            │
//! │     Push(kind)        ──► push run         (run guard held)            │
//! │     PushRecord(kind)  ──► re-read the local record by id, push it       │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  complete(): same entry overwritten with the new status and error       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Replays always read the current local data; nothing is taken from the
//! log row except what to replay.
//!
//! A retry that never reaches `complete()` (dropped future, crash) leaves
//! its entry `pending`. Once the entry is older than
//! `EngineSettings::retry_lease` it is claimable again.

use autocount_core::report::RetryOutcome;
use autocount_core::{SyncLogEntry, SyncStatus, SyncType};
use autocount_db::DbError;
use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

use crate::engine::{describe, SyncEngine};
use crate::error::{SyncError, SyncResult};

/// What a replay produced before it is written back.
struct Replay {
    status: SyncStatus,
    doc_no: Option<String>,
    error: Option<String>,
}

impl Replay {
    fn failed(err: &SyncError) -> Self {
        Replay {
            status: SyncStatus::Failed,
            doc_no: None,
            error: Some(err.to_string()),
        }
    }
}

impl SyncEngine {
    /// Replays the entry with this log id, or the latest entry for this
    /// reference id.
    ///
    /// ## Returns
    /// - `Ok(outcome)` once the replay ran, successful or not
    /// - `Err(NothingToRetry)` if the entry already succeeded
    /// - `Err(RetryInProgress)` if another retry holds the entry
    #[instrument(skip(self))]
    pub async fn retry(&self, reference: &str) -> SyncResult<RetryOutcome> {
        let entry = self.find_entry(reference).await?;

        if entry.sync_status == SyncStatus::Success {
            return Err(SyncError::NothingToRetry(entry.id));
        }

        let sync_type: SyncType = entry
            .sync_type
            .parse()
            .map_err(|_| SyncError::UnknownSyncType(entry.sync_type.clone()))?;

        let Some(_entry_lock) = self.entry_locks.try_acquire(&entry.id).await else {
            return Err(SyncError::RetryInProgress(entry.id));
        };

        if !self.db.sync_log().claim_for_retry(&entry.id, self.lease_cutoff()).await? {
            return Err(SyncError::RetryInProgress(entry.id));
        }

        if entry.sync_status == SyncStatus::Pending {
            warn!(log_id = %entry.id, last_sync_at = ?entry.last_sync_at, "Taking over abandoned retry");
        }

        info!(
            log_id = %entry.id,
            sync_type = %sync_type,
            attempt = entry.retry_count + 1,
            "Retrying sync log entry"
        );

        let replay = self.replay(sync_type, &entry).await;

        let completed = match self
            .db
            .sync_log()
            .complete(
                &entry.id,
                replay.status,
                replay.doc_no.as_deref(),
                replay.error.as_deref(),
            )
            .await
        {
            Ok(completed) => completed,
            Err(err) => {
                error!(log_id = %entry.id, error = %err, "Could not record retry outcome");
                self.release_claim(&entry.id, &err).await;
                return Err(err.into());
            }
        };

        match &replay.error {
            Some(error) => warn!(log_id = %entry.id, status = %replay.status, %error, "Retry did not succeed"),
            None => info!(log_id = %entry.id, "Retry succeeded"),
        }

        Ok(RetryOutcome {
            log_id: completed.id,
            success: completed.sync_status == SyncStatus::Success,
            remote_doc_no: completed.autocount_doc_no,
            error: completed.error_message,
            retry_count: completed.retry_count,
        })
    }

    /// Retries failed and partial entries, oldest first.
    ///
    /// Entries that can't be retried right now are reported as unsuccessful
    /// outcomes; the pass goes on.
    #[instrument(skip(self))]
    pub async fn retry_failed(&self, limit: u32) -> SyncResult<Vec<RetryOutcome>> {
        let entries = self
            .db
            .sync_log()
            .list_retryable(limit, self.lease_cutoff())
            .await?;
        info!(count = entries.len(), "Retrying failed sync log entries");

        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            let outcome = match self.retry(&entry.id).await {
                Ok(outcome) => outcome,
                Err(err @ SyncError::Database(_)) => return Err(err),
                Err(err) => RetryOutcome {
                    log_id: entry.id,
                    success: false,
                    remote_doc_no: entry.autocount_doc_no,
                    error: Some(err.to_string()),
                    retry_count: entry.retry_count,
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// `pending` entries last stamped before this are abandoned.
    fn lease_cutoff(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.settings.retry_lease)
            .ok()
            .and_then(|lease| Utc::now().checked_sub_signed(lease))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Puts a claimed entry back to `failed` after its outcome could not be
    /// written. If that fails too, the lease frees the entry later.
    async fn release_claim(&self, log_id: &str, cause: &DbError) {
        let message = format!("retry outcome was not recorded: {cause}");
        if let Err(err) = self
            .db
            .sync_log()
            .complete(log_id, SyncStatus::Failed, None, Some(&message))
            .await
        {
            error!(
                log_id = %log_id,
                error = %err,
                "Could not release retry claim; entry stays pending until its lease expires"
            );
        }
    }

    async fn find_entry(&self, reference: &str) -> SyncResult<SyncLogEntry> {
        let log = self.db.sync_log();
        if let Some(entry) = log.get(reference).await? {
            return Ok(entry);
        }
        log.latest_for_reference(reference)
            .await?
            .ok_or_else(|| SyncError::LogEntryNotFound(reference.to_string()))
    }

    async fn replay(&self, sync_type: SyncType, entry: &SyncLogEntry) -> Replay {
        let run = match sync_type {
            SyncType::Pull(kind) => {
                let _guard = self.guards.acquire(kind).await;
                self.pull_run(kind).await
            }
            SyncType::Push(kind) => {
                let _guard = self.guards.acquire(kind).await;
                self.push_run(kind).await
            }
            SyncType::PushRecord(kind) => return self.replay_record(kind, &entry.reference_id).await,
        };

        match run {
            Ok(report) => Replay {
                status: SyncStatus::for_run(report.failed),
                doc_no: None,
                error: report.error_message(),
            },
            Err(err) => Replay::failed(&err),
        }
    }

    async fn replay_record(&self, kind: autocount_core::EntityKind, local_id: &str) -> Replay {
        let _guard = self.guards.acquire(kind).await;

        let local = match self.db.records().find_by_id(kind, local_id).await {
            Ok(Some(local)) => local,
            Ok(None) => return Replay::failed(&DbError::not_found(kind.as_str(), local_id).into()),
            Err(err) => return Replay::failed(&err.into()),
        };

        let session = match self.open_session().await {
            Ok(session) => session,
            Err(err) => return Replay::failed(&err),
        };

        match self.push_single(&session, kind, &local).await {
            Ok(pushed) => Replay {
                status: SyncStatus::Success,
                doc_no: Some(pushed.doc_no),
                error: None,
            },
            Err(err) => Replay {
                status: SyncStatus::Failed,
                doc_no: match &err {
                    SyncError::Persistence { doc_no, .. } => doc_no.clone(),
                    _ => None,
                },
                error: Some(describe(&local.key, &err)),
            },
        }
    }
}
