//! # Sync Orchestrator
//!
//! Preview and execute runs for one entity class, pull direction
//! (ERP → local). The push direction lives in [`crate::push`].
//!
//! ## Run State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Authenticate ──fail──► log `failed` ──► Err (run-level)                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Fetch remote + local ──fail──► log `failed` ──► Err (run-level)        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Classify every remote record (Diff Engine)                             │
//! │       │                                                                 │
//! │       ├── preview ──► PreviewReport (no writes, no log entry)           │
//! │       │                                                                 │
//! │       ▼ execute                                                         │
//! │  Fan out over create/update records (max_concurrency at a time)         │
//! │    each record succeeds or fails on its own                             │
//! │       │                                                                 │
//! │       ▼  all records done                                               │
//! │  One aggregate log entry: `success` (0 failed) | `partial`              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ExecuteReport {created, updated, failed, errors}                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Execute runs take the entity class's run guard; previews do not.

use autocount_core::{
    classify, mapper, schema_for, Classification, EntityKind, FieldMap, LocalRecord, SyncAction,
    SyncLogEntry, SyncStatus, SyncType,
};
use autocount_core::report::{ExecuteReport, PreviewReport, RecordChange};
use autocount_db::{Database, NewSyncLogEntry, SyncStamp};
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::client::{ErpClient, Session};
use crate::config::BridgeConfig;
use crate::error::{SyncError, SyncResult};
use crate::guard::{EntryLocks, RunGuards};

// =============================================================================
// Settings
// =============================================================================

/// Engine tuning taken from [`BridgeConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Bound on every ERP call.
    pub request_timeout: Duration,
    /// Records applied concurrently within one run.
    pub max_concurrency: usize,
    /// Age after which a `pending` log entry counts as abandoned.
    pub retry_lease: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        let request_timeout = config.erp.request_timeout();
        EngineSettings {
            request_timeout,
            max_concurrency: config.sync.max_concurrency.max(1),
            retry_lease: config.sync.retry_lease().max(request_timeout * 2),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

// =============================================================================
// Plan
// =============================================================================

/// One record a run will write.
pub(crate) struct PlannedRecord {
    pub key: String,
    pub local_id: Option<String>,
    pub classification: Classification,
    /// Pull: the fields to write locally. Push: the full local record.
    pub fields: FieldMap,
}

/// Classified run, before any writes.
pub(crate) struct Plan {
    pub preview: PreviewReport,
    pub records: Vec<PlannedRecord>,
}

// =============================================================================
// Engine
// =============================================================================

/// Sync Orchestrator and Retry Dispatcher over one local store and one
/// ERP client.
pub struct SyncEngine {
    pub(crate) db: Database,
    pub(crate) client: Arc<dyn ErpClient>,
    pub(crate) settings: EngineSettings,
    pub(crate) guards: RunGuards,
    pub(crate) entry_locks: EntryLocks,
}

impl SyncEngine {
    pub fn new(db: Database, client: Arc<dyn ErpClient>, settings: EngineSettings) -> Self {
        SyncEngine {
            db,
            client,
            settings,
            guards: RunGuards::new(),
            entry_locks: EntryLocks::new(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Logs in for one run.
    pub(crate) async fn open_session(&self) -> SyncResult<Session> {
        Session::open(self.client.clone(), self.settings.request_timeout).await
    }

    pub(crate) async fn local_records(&self, kind: EntityKind) -> SyncResult<Vec<LocalRecord>> {
        self.db
            .records()
            .list(kind)
            .await
            .map_err(|e| SyncError::FetchFailed {
                entity: kind.plural().to_string(),
                reason: format!("local store: {e}"),
            })
    }

    // =========================================================================
    // Pull: Preview / Execute
    // =========================================================================

    /// Classifies the remote set against the local store. Read-only.
    #[instrument(skip(self), fields(entity = %kind, mode = "preview"))]
    pub async fn preview(&self, kind: EntityKind) -> SyncResult<PreviewReport> {
        let session = self.open_session().await?;
        let plan = self.plan_pull(&session, kind).await?;

        info!(
            to_create = plan.preview.summary.to_create,
            to_update = plan.preview.summary.to_update,
            no_change = plan.preview.summary.no_change,
            errors = plan.preview.errors.len(),
            "Preview complete"
        );
        Ok(plan.preview)
    }

    /// Applies the remote set to the local store and writes one log entry.
    ///
    /// ## Returns
    /// - `Ok(report)` once every record was attempted, even if some failed
    /// - `Err` only for run-level failures (login, fetch)
    #[instrument(skip(self), fields(entity = %kind, mode = "execute"))]
    pub async fn execute(&self, kind: EntityKind) -> SyncResult<ExecuteReport> {
        let _guard = self.guards.acquire(kind).await;
        let sync_type = SyncType::Pull(kind);

        match self.pull_run(kind).await {
            Ok(report) => {
                self.log_run(sync_type, &report).await?;
                Ok(report)
            }
            Err(err) => {
                self.log_run_failure(sync_type, &err).await?;
                Err(err)
            }
        }
    }

    /// One pull run without the log write. Caller holds the run guard.
    pub(crate) async fn pull_run(&self, kind: EntityKind) -> SyncResult<ExecuteReport> {
        info!(entity = %kind, "Pull run started");

        let session = self.open_session().await?;
        let plan = self.plan_pull(&session, kind).await?;
        drop(session);

        let mapping_errors = plan.preview.errors;
        let outcomes: Vec<Result<SyncAction, String>> = stream::iter(plan.records)
            .map(|record| self.apply_pulled(kind, record))
            .buffered(self.settings.max_concurrency)
            .collect()
            .await;

        let report = tally(outcomes, mapping_errors);
        info!(
            entity = %kind,
            created = report.created,
            updated = report.updated,
            failed = report.failed,
            "Pull run finished"
        );
        Ok(report)
    }

    async fn plan_pull(&self, session: &Session, kind: EntityKind) -> SyncResult<Plan> {
        let schema = schema_for(kind);
        let remote = session.list(kind).await?;
        let local: HashMap<String, LocalRecord> = self
            .local_records(kind)
            .await?
            .into_iter()
            .map(|record| (record.key.clone(), record))
            .collect();

        let mut preview = PreviewReport::new(kind);
        let mut records = Vec::new();

        for remote_record in &remote {
            let (key, incoming) = match mapper::to_local_shape(schema, remote_record) {
                Ok(mapped) => mapped,
                Err(err) => {
                    warn!(entity = %kind, error = %err, "Skipping unmappable remote record");
                    preview.errors.push(err.to_string());
                    continue;
                }
            };

            let current = local.get(&key);
            let classification = classify(schema, current.map(|r| &r.fields), &incoming);

            preview.record(RecordChange {
                key: key.clone(),
                action: classification.action,
                changes: classification.changes.clone(),
            });

            if classification.action != SyncAction::None {
                records.push(PlannedRecord {
                    fields: classification.fields_to_write(),
                    key,
                    local_id: current.map(|r| r.id.clone()),
                    classification,
                });
            }
        }

        Ok(Plan { preview, records })
    }

    async fn apply_pulled(&self, kind: EntityKind, record: PlannedRecord) -> Result<SyncAction, String> {
        let action = record.classification.action;
        let stamp = SyncStamp::now(Some(record.key.clone()));
        let records = self.db.records();

        let written = match (action, record.local_id.as_deref()) {
            (SyncAction::Create, _) => records
                .insert(kind, &record.key, &record.fields, Some(&stamp))
                .await
                .map(|_| ()),
            (SyncAction::Update, Some(id)) => {
                records.update_fields(kind, id, &record.fields, Some(&stamp)).await
            }
            _ => return Ok(SyncAction::None),
        };

        written.map(|_| action).map_err(|err| {
            warn!(entity = %kind, key = %record.key, error = %err, "Local write failed");
            format!("{}: local write failed: {}", record.key, err)
        })
    }

    // =========================================================================
    // Sync Log
    // =========================================================================

    /// Writes the aggregate entry for a finished run.
    pub(crate) async fn log_run(
        &self,
        sync_type: SyncType,
        report: &ExecuteReport,
    ) -> SyncResult<SyncLogEntry> {
        let entry = self
            .db
            .sync_log()
            .insert(NewSyncLogEntry {
                reference_id: sync_type.entity().plural().to_string(),
                sync_type,
                status: SyncStatus::for_run(report.failed),
                doc_no: None,
                error: report.error_message(),
            })
            .await?;
        Ok(entry)
    }

    /// Writes the terminal entry for a run that never got to its records.
    pub(crate) async fn log_run_failure(
        &self,
        sync_type: SyncType,
        err: &SyncError,
    ) -> SyncResult<SyncLogEntry> {
        error!(sync_type = %sync_type, error = %err, "Sync run failed");
        let entry = self
            .db
            .sync_log()
            .insert(NewSyncLogEntry {
                reference_id: sync_type.entity().plural().to_string(),
                sync_type,
                status: SyncStatus::Failed,
                doc_no: None,
                error: Some(err.to_string()),
            })
            .await?;
        Ok(entry)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Folds per-record outcomes into a report. Errors keep record order.
pub(crate) fn tally(outcomes: Vec<Result<SyncAction, String>>, mut errors: Vec<String>) -> ExecuteReport {
    let mut report = ExecuteReport {
        failed: errors.len(),
        ..Default::default()
    };

    for outcome in outcomes {
        match outcome {
            Ok(SyncAction::Create) => report.created += 1,
            Ok(SyncAction::Update) => report.updated += 1,
            Ok(SyncAction::None) => {}
            Err(message) => {
                report.failed += 1;
                errors.push(message);
            }
        }
    }

    report.errors = errors;
    report
}

/// Per-record error text, always naming the record's key.
pub(crate) fn describe(key: &str, err: &SyncError) -> String {
    match err {
        SyncError::Mapping(_)
        | SyncError::RemoteNotFound { .. }
        | SyncError::RemoteAlreadyExists { .. }
        | SyncError::RemoteRejected { .. }
        | SyncError::PushFailed { .. }
        | SyncError::Persistence { .. } => err.to_string(),
        _ => format!("{key}: {err}"),
    }
}
