//! # Reports
//!
//! What sync, retry and valuation operations hand back to their caller.
//! All serialize as camelCase JSON for the CLI's `--json` output.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::diff::{ChangeSet, SyncAction};
use crate::money::Money;
use crate::types::EntityKind;
use crate::valuation::Valuation;

// =============================================================================
// Preview / Execute
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSummary {
    pub to_create: usize,
    pub to_update: usize,
    pub no_change: usize,
}

/// One classified record in a preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RecordChange {
    pub key: String,
    pub action: SyncAction,
    pub changes: ChangeSet,
}

/// Read-only classification of an entity class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PreviewReport {
    pub entity: EntityKind,
    pub summary: PreviewSummary,
    /// Records whose action is create or update.
    pub changes: Vec<RecordChange>,
    /// Records that could not be mapped.
    pub errors: Vec<String>,
}

impl PreviewReport {
    pub fn new(entity: EntityKind) -> Self {
        PreviewReport {
            entity,
            summary: PreviewSummary::default(),
            changes: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Counts a classified record; `none` records are counted but not listed.
    pub fn record(&mut self, change: RecordChange) {
        match change.action {
            SyncAction::Create => self.summary.to_create += 1,
            SyncAction::Update => self.summary.to_update += 1,
            SyncAction::None => {
                self.summary.no_change += 1;
                return;
            }
        }
        self.changes.push(change);
    }
}

/// Aggregate result of an execute or push run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteReport {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl ExecuteReport {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// All per-record errors joined for the log's error column.
    pub fn error_message(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join("; "))
        }
    }
}

/// Outcome of pushing one local record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PushRecordReport {
    pub log_id: String,
    pub key: String,
    pub success: bool,
    /// `create`, or `update` when the create fell back.
    pub action: Option<SyncAction>,
    pub remote_doc_no: Option<String>,
    pub error: Option<String>,
}

// =============================================================================
// Retry
// =============================================================================

/// Outcome of replaying one log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RetryOutcome {
    pub log_id: String,
    pub success: bool,
    pub remote_doc_no: Option<String>,
    pub error: Option<String>,
    pub retry_count: i64,
}

// =============================================================================
// Valuation
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ValuedItem {
    pub item_id: String,
    pub item_code: String,
    pub name: String,
    #[serde(flatten)]
    #[ts(flatten)]
    pub valuation: Valuation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UnvaluedItem {
    pub item_id: String,
    pub item_code: String,
    pub name: String,
    pub on_hand: i64,
}

/// Inventory valuation across all items.
///
/// Unvalued items are listed apart and contribute nothing to the total.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ValuationReport {
    pub items: Vec<ValuedItem>,
    pub unvalued: Vec<UnvaluedItem>,
    pub total_value: Money,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_preview_counts_but_does_not_list_unchanged() {
        let mut report = PreviewReport::new(EntityKind::Supplier);
        for (key, action) in [("A", SyncAction::Create), ("B", SyncAction::None), ("C", SyncAction::Update)] {
            report.record(RecordChange {
                key: key.into(),
                action,
                changes: ChangeSet::new(),
            });
        }
        assert_eq!(
            report.summary,
            PreviewSummary {
                to_create: 1,
                to_update: 1,
                no_change: 1
            }
        );
        assert_eq!(report.changes.len(), 2);
    }

    #[test]
    fn test_execute_report_json_shape() {
        let report = ExecuteReport {
            created: 2,
            updated: 0,
            failed: 1,
            errors: vec!["ITM-002: rejected".into()],
        };
        assert_eq!(report.error_message().as_deref(), Some("ITM-002: rejected"));
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"created": 2, "updated": 0, "failed": 1, "errors": ["ITM-002: rejected"]})
        );
        assert_eq!(ExecuteReport::default().error_message(), None);
    }
}
