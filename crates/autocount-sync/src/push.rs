//! # Push Direction
//!
//! Local → ERP. Same run shape as a pull with the roles reversed: local
//! records are classified against the remote set, and every record that is
//! not unchanged is sent with create-then-update.
//!
//! ```text
//!   create(record) ──ok──► Created (doc no from ERP, else the key)
//!        │
//!        └─err (already exists, rejected, timeout)──► update(key, record)
//!                                                      │
//!                                           ok ────────┼──► Updated
//!                                           err ───────┴──► PushFailed
//!
//!   after the ERP accepted: stamp autocount_synced_at / autocount_doc_no
//!        └─ local write fails ──► Persistence + an extra `failed`
//!                                 push_<entity> log entry for the record
//! ```

use autocount_core::report::{ExecuteReport, PreviewReport, PushRecordReport, RecordChange};
use autocount_core::{
    classify, mapper, schema_for, EntityKind, FieldMap, LocalRecord, SyncAction, SyncStatus,
    SyncType,
};
use autocount_db::{DbError, NewSyncLogEntry, SyncStamp};
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use tracing::{debug, error, info, instrument, warn};

use crate::client::Session;
use crate::engine::{describe, tally, Plan, PlannedRecord, SyncEngine};
use crate::error::{SyncError, SyncResult};

/// What the ERP accepted for one pushed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushedRecord {
    /// `Create`, or `Update` after a fallback.
    pub action: SyncAction,
    pub doc_no: String,
}

impl SyncEngine {
    // =========================================================================
    // Preview / Execute
    // =========================================================================

    /// Classifies the local store against the remote set. Read-only.
    #[instrument(skip(self), fields(entity = %kind, mode = "preview_push"))]
    pub async fn preview_push(&self, kind: EntityKind) -> SyncResult<PreviewReport> {
        let session = self.open_session().await?;
        let plan = self.plan_push(&session, kind).await?;

        info!(
            to_create = plan.preview.summary.to_create,
            to_update = plan.preview.summary.to_update,
            no_change = plan.preview.summary.no_change,
            "Push preview complete"
        );
        Ok(plan.preview)
    }

    /// Pushes every changed local record and writes one log entry.
    #[instrument(skip(self), fields(entity = %kind, mode = "execute_push"))]
    pub async fn execute_push(&self, kind: EntityKind) -> SyncResult<ExecuteReport> {
        let _guard = self.guards.acquire(kind).await;
        let sync_type = SyncType::Push(kind);

        match self.push_run(kind).await {
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

    /// One push run without the aggregate log write. Caller holds the run
    /// guard.
    pub(crate) async fn push_run(&self, kind: EntityKind) -> SyncResult<ExecuteReport> {
        info!(entity = %kind, "Push run started");

        let session = self.open_session().await?;
        let plan = self.plan_push(&session, kind).await?;

        let outcomes: Vec<Result<SyncAction, String>> = stream::iter(plan.records)
            .map(|record| self.apply_pushed(&session, kind, record))
            .buffered(self.settings.max_concurrency)
            .collect()
            .await;

        let report = tally(outcomes, Vec::new());
        info!(
            entity = %kind,
            created = report.created,
            updated = report.updated,
            failed = report.failed,
            "Push run finished"
        );
        Ok(report)
    }

    async fn plan_push(&self, session: &Session, kind: EntityKind) -> SyncResult<Plan> {
        let schema = schema_for(kind);
        let mut preview = PreviewReport::new(kind);

        let mut remote: HashMap<String, FieldMap> = HashMap::new();
        for remote_record in session.list(kind).await? {
            match mapper::to_local_shape(schema, &remote_record) {
                Ok((key, fields)) => {
                    remote.insert(key, fields);
                }
                Err(err) => {
                    warn!(entity = %kind, error = %err, "Unmappable remote record ignored for push");
                    preview.errors.push(err.to_string());
                }
            }
        }

        let mut records = Vec::new();
        for local in self.local_records(kind).await? {
            let classification = classify(schema, remote.get(&local.key), &local.fields);

            preview.record(RecordChange {
                key: local.key.clone(),
                action: classification.action,
                changes: classification.changes.clone(),
            });

            if classification.action != SyncAction::None {
                records.push(PlannedRecord {
                    key: local.key,
                    local_id: Some(local.id),
                    classification,
                    fields: local.fields,
                });
            }
        }

        Ok(Plan { preview, records })
    }

    async fn apply_pushed(
        &self,
        session: &Session,
        kind: EntityKind,
        record: PlannedRecord,
    ) -> Result<SyncAction, String> {
        let local = LocalRecord {
            id: record.local_id.unwrap_or_default(),
            key: record.key,
            fields: record.fields,
        };

        match self.push_single(session, kind, &local).await {
            Ok(pushed) => Ok(pushed.action),
            Err(err) => {
                let message = describe(&local.key, &err);
                warn!(entity = %kind, key = %local.key, error = %message, "Push failed for record");

                if let SyncError::Persistence { doc_no, .. } = &err {
                    self.log_persistence_failure(kind, &local.id, doc_no.clone(), &message)
                        .await;
                }
                Err(message)
            }
        }
    }

    /// Extra entry so a half-applied push can be found and retried.
    async fn log_persistence_failure(
        &self,
        kind: EntityKind,
        local_id: &str,
        doc_no: Option<String>,
        message: &str,
    ) {
        let written = self
            .db
            .sync_log()
            .insert(NewSyncLogEntry {
                reference_id: local_id.to_string(),
                sync_type: SyncType::PushRecord(kind),
                status: SyncStatus::Failed,
                doc_no,
                error: Some(message.to_string()),
            })
            .await;

        if let Err(err) = written {
            error!(
                entity = %kind,
                local_id = %local_id,
                error = %err,
                record_error = %message,
                "Could not log persistence failure; reconcile this record by hand"
            );
        }
    }

    // =========================================================================
    // Single Record
    // =========================================================================

    /// Pushes one local record and writes one log entry for it.
    ///
    /// ## Returns
    /// - `Ok(report)` whether or not the ERP accepted the record
    /// - `Err` if the record doesn't exist locally or the log can't be
    ///   written
    #[instrument(skip(self), fields(entity = %kind, mode = "push_record"))]
    pub async fn push_record(&self, kind: EntityKind, id: &str) -> SyncResult<PushRecordReport> {
        let _guard = self.guards.acquire(kind).await;

        let local = self
            .db
            .records()
            .find_by_id(kind, id)
            .await?
            .ok_or_else(|| DbError::not_found(kind.as_str(), id))?;

        let result = match self.open_session().await {
            Ok(session) => self.push_single(&session, kind, &local).await,
            Err(err) => Err(err),
        };

        let (status, action, doc_no, error) = match &result {
            Ok(pushed) => (
                SyncStatus::Success,
                Some(pushed.action),
                Some(pushed.doc_no.clone()),
                None,
            ),
            Err(err) => {
                let doc_no = match err {
                    SyncError::Persistence { doc_no, .. } => doc_no.clone(),
                    _ => None,
                };
                (SyncStatus::Failed, None, doc_no, Some(describe(&local.key, err)))
            }
        };

        let entry = self
            .db
            .sync_log()
            .insert(NewSyncLogEntry {
                reference_id: local.id.clone(),
                sync_type: SyncType::PushRecord(kind),
                status,
                doc_no: doc_no.clone(),
                error: error.clone(),
            })
            .await?;

        match &error {
            Some(message) => warn!(key = %local.key, error = %message, "Record push failed"),
            None => info!(key = %local.key, doc_no = ?doc_no, "Record pushed"),
        }

        Ok(PushRecordReport {
            log_id: entry.id,
            key: local.key,
            success: status == SyncStatus::Success,
            action,
            remote_doc_no: doc_no,
            error,
        })
    }

    /// Sends one record and stamps it locally. No log write.
    pub(crate) async fn push_single(
        &self,
        session: &Session,
        kind: EntityKind,
        local: &LocalRecord,
    ) -> SyncResult<PushedRecord> {
        let payload = mapper::to_remote_shape(schema_for(kind), &local.key, &local.fields);
        let pushed = send(session, kind, &local.key, &payload).await?;

        self.db
            .records()
            .mark_synced(kind, &local.id, &SyncStamp::now(Some(pushed.doc_no.clone())))
            .await
            .map_err(|err| SyncError::Persistence {
                entity: kind.as_str().to_string(),
                key: local.key.clone(),
                doc_no: Some(pushed.doc_no.clone()),
                reason: err.to_string(),
            })?;

        Ok(pushed)
    }
}

/// Create, falling back to update on any create failure.
async fn send(
    session: &Session,
    kind: EntityKind,
    key: &str,
    payload: &autocount_core::RemoteRecord,
) -> SyncResult<PushedRecord> {
    let create_err = match session.create(kind, payload).await {
        Ok(outcome) => {
            return Ok(PushedRecord {
                action: SyncAction::Create,
                doc_no: outcome.doc_no.unwrap_or_else(|| key.to_string()),
            })
        }
        Err(err) => err,
    };

    debug!(entity = %kind, key = %key, error = %create_err, "Create failed, falling back to update");

    match session.update(kind, key, payload).await {
        Ok(()) => Ok(PushedRecord {
            action: SyncAction::Update,
            doc_no: key.to_string(),
        }),
        Err(update_err) => Err(SyncError::PushFailed {
            entity: kind.as_str().to_string(),
            key: key.to_string(),
            create: create_err.to_string(),
            update: update_err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{remote_supplier, setup};
    use autocount_core::FieldValue;
    use serde_json::json;

    async fn insert_supplier(engine: &SyncEngine, code: &str, name: &str) -> String {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), FieldValue::Text(name.into()));
        fields.insert("currency_code".into(), FieldValue::Text("MYR".into()));
        engine
            .db
            .records()
            .insert(EntityKind::Supplier, code, &fields, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_second_create_failing_gives_partial_run() {
        let (engine, fake) = setup().await;
        insert_supplier(&engine, "400-A001", "Acme Fasteners").await;
        insert_supplier(&engine, "400-B002", "Borneo Electrical").await;
        insert_supplier(&engine, "400-C003", "Cahaya Hardware").await;
        fake.fail_create("400-B002", "CreditorType is required");

        let report = engine.execute_push(EntityKind::Supplier).await.unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.updated, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("400-B002"));
        assert!(!report.errors[0].contains("400-A001"));

        let remote_keys: Vec<String> = fake
            .records(EntityKind::Supplier)
            .iter()
            .map(|r| r.get("AccNo").unwrap().as_str().unwrap().to_string())
            .collect();
        assert_eq!(remote_keys, vec!["400-A001", "400-C003"]);

        let log = engine.db.sync_log().list_recent(10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].sync_type, "push_suppliers");
        assert_eq!(log[0].sync_status, SyncStatus::Partial);
        let message = log[0].error_message.as_deref().unwrap();
        assert!(message.contains("400-B002"));
        assert!(!message.contains("400-A001"));
        assert!(!message.contains("400-C003"));
    }

    #[tokio::test]
    async fn test_already_exists_falls_back_to_update() {
        let (engine, fake) = setup().await;
        fake.seed(EntityKind::Supplier, vec![remote_supplier("400-A001", "Acme")]);
        insert_supplier(&engine, "400-A001", "Acme Fasteners Sdn Bhd").await;

        let preview = engine.preview_push(EntityKind::Supplier).await.unwrap();
        assert_eq!(preview.summary.to_update, 1);

        let report = engine.execute_push(EntityKind::Supplier).await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.created, 0);
        assert_eq!(report.failed, 0);

        let calls = fake.calls();
        assert_eq!((calls.create, calls.update), (1, 1));
        let remote = &fake.records(EntityKind::Supplier)[0];
        assert_eq!(remote.get("CompanyName"), Some(&json!("Acme Fasteners Sdn Bhd")));

        let entry = engine.db.sync_log().latest_for_reference("suppliers").await.unwrap().unwrap();
        assert_eq!(entry.sync_status, SyncStatus::Success);
    }

    #[tokio::test]
    async fn test_unchanged_records_are_not_pushed() {
        let (engine, fake) = setup().await;
        fake.seed(EntityKind::Supplier, vec![remote_supplier("400-A001", "Acme")]);
        insert_supplier(&engine, "400-A001", "Acme").await;

        let report = engine.execute_push(EntityKind::Supplier).await.unwrap();
        assert_eq!((report.created, report.updated, report.failed), (0, 0, 0));
        assert_eq!(fake.calls().writes(), 0);
    }

    #[tokio::test]
    async fn test_push_record_logs_one_entry_and_stamps_doc_no() {
        let (engine, fake) = setup().await;
        fake.omit_doc_no(EntityKind::Supplier);
        let id = insert_supplier(&engine, "400-A001", "Acme").await;

        let report = engine.push_record(EntityKind::Supplier, &id).await.unwrap();
        assert!(report.success);
        assert_eq!(report.action, Some(SyncAction::Create));
        assert_eq!(report.remote_doc_no.as_deref(), Some("400-A001"));

        let entry = engine.db.sync_log().get(&report.log_id).await.unwrap().unwrap();
        assert_eq!(entry.sync_type, "push_supplier");
        assert_eq!(entry.reference_id, id);
        assert_eq!(entry.sync_status, SyncStatus::Success);

        let state = engine.db.records().sync_state(EntityKind::Supplier, &id).await.unwrap();
        assert_eq!(state.autocount_doc_no.as_deref(), Some("400-A001"));
    }

    #[tokio::test]
    async fn test_push_record_failure_is_logged_not_raised() {
        let (engine, fake) = setup().await;
        let id = insert_supplier(&engine, "400-A001", "Acme").await;
        fake.fail_create("400-A001", "locked");

        let report = engine.push_record(EntityKind::Supplier, &id).await.unwrap();
        assert!(!report.success);
        assert!(report.error.as_deref().unwrap().contains("400-A001"));

        let entry = engine.db.sync_log().get(&report.log_id).await.unwrap().unwrap();
        assert_eq!(entry.sync_status, SyncStatus::Failed);
    }

    #[tokio::test]
    async fn test_push_record_unknown_id() {
        let (engine, _fake) = setup().await;
        let err = engine.push_record(EntityKind::Supplier, "missing").await.unwrap_err();
        assert!(matches!(err, SyncError::Database(ref e) if e.is_not_found()));
    }

    #[tokio::test]
    async fn test_persistence_failure_writes_extra_entry() {
        let (engine, fake) = setup().await;
        let session = engine.open_session().await.unwrap();

        let mut fields = FieldMap::new();
        fields.insert("name".into(), FieldValue::Text("Ghost Supplier".into()));
        let planned = PlannedRecord {
            key: "400-G404".into(),
            local_id: Some("deleted-locally".into()),
            classification: classify(schema_for(EntityKind::Supplier), None, &fields),
            fields,
        };

        let outcome = engine.apply_pushed(&session, EntityKind::Supplier, planned).await;
        let message = outcome.unwrap_err();
        assert!(message.contains("400-G404"));
        assert!(message.contains("local update failed"));
        assert_eq!(fake.records(EntityKind::Supplier).len(), 1);

        let entry = engine
            .db
            .sync_log()
            .latest_for_reference("deleted-locally")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.sync_type, "push_supplier");
        assert_eq!(entry.sync_status, SyncStatus::Failed);
        assert_eq!(entry.autocount_doc_no.as_deref(), Some("400-G404"));
    }
}
