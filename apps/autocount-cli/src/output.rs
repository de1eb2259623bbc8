//! Report rendering: plain text for people, pretty JSON with `--json`.

use anyhow::Result;
use autocount_core::report::{
    ExecuteReport, PreviewReport, PushRecordReport, RetryOutcome, ValuationReport,
};
use autocount_core::valuation::ItemValuation;
use autocount_core::{EntityKind, SyncAction, SyncLogEntry};
use autocount_db::{StatusCounts, StockReconciliation};
use serde::Serialize;

pub struct Printer {
    json: bool,
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Printer { json }
    }

    pub fn line(&self, text: &str) {
        if !self.json {
            println!("{text}");
        }
    }

    fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    pub fn preview(&self, report: &PreviewReport) -> Result<()> {
        if self.json {
            return self.json(report);
        }

        let s = &report.summary;
        println!(
            "{}: {} to create, {} to update, {} unchanged",
            report.entity, s.to_create, s.to_update, s.no_change
        );
        for change in &report.changes {
            let marker = match change.action {
                SyncAction::Create => "+",
                SyncAction::Update => "~",
                SyncAction::None => continue,
            };
            println!("  {marker} {}", change.key);
            for (field, diff) in &change.changes {
                println!(
                    "      {field}: {} -> {}",
                    serde_json::to_string(&diff.old)?,
                    serde_json::to_string(&diff.new)?
                );
            }
        }
        for error in &report.errors {
            println!("  ! {error}");
        }
        Ok(())
    }

    pub fn execute(&self, entity: EntityKind, report: &ExecuteReport) -> Result<()> {
        if self.json {
            return self.json(report);
        }

        println!(
            "{entity}: {} created, {} updated, {} failed",
            report.created, report.updated, report.failed
        );
        for error in &report.errors {
            println!("  ! {error}");
        }
        Ok(())
    }

    pub fn push_record(&self, report: &PushRecordReport) -> Result<()> {
        if self.json {
            return self.json(report);
        }

        match (&report.error, &report.remote_doc_no) {
            (Some(error), _) => println!("{}: failed: {error}", report.key),
            (None, Some(doc_no)) => println!("{}: pushed as {doc_no}", report.key),
            (None, None) => println!("{}: pushed", report.key),
        }
        println!("  log entry {}", report.log_id);
        Ok(())
    }

    pub fn retry(&self, outcomes: &[RetryOutcome]) -> Result<()> {
        if self.json {
            return self.json(outcomes);
        }

        if outcomes.is_empty() {
            println!("Nothing to retry");
        }
        for outcome in outcomes {
            let status = if outcome.success { "ok" } else { "failed" };
            print!("{} [{status}, retry #{}]", outcome.log_id, outcome.retry_count);
            if let Some(doc_no) = &outcome.remote_doc_no {
                print!(" {doc_no}");
            }
            if let Some(error) = &outcome.error {
                print!(": {error}");
            }
            println!();
        }
        Ok(())
    }

    pub fn valuation(&self, item: &str, valuation: &ItemValuation) -> Result<()> {
        if self.json {
            return self.json(valuation);
        }

        match valuation {
            ItemValuation::Valued(v) => {
                println!(
                    "{item}: {} on hand, value {}, avg cost {:.4}",
                    v.on_hand, v.total_value, v.avg_cost
                );
                for batch in &v.batches {
                    println!(
                        "  {:<12} {:>6} @ {} = {}",
                        batch.batch_number.as_deref().unwrap_or("-"),
                        batch.quantity,
                        batch.unit_cost,
                        batch.value
                    );
                }
            }
            ItemValuation::Unvalued { on_hand } => {
                println!("{item}: {on_hand} on hand, no costed receipts (unvalued)");
            }
        }
        Ok(())
    }

    pub fn valuation_report(&self, report: &ValuationReport) -> Result<()> {
        if self.json {
            return self.json(report);
        }

        for item in &report.items {
            println!(
                "{:<14} {:>8} {:>14}  {}",
                item.item_code, item.valuation.on_hand, item.valuation.total_value, item.name
            );
        }
        if !report.unvalued.is_empty() {
            println!();
            println!("Unvalued (stock without costed receipts):");
            for item in &report.unvalued {
                println!("{:<14} {:>8}  {}", item.item_code, item.on_hand, item.name);
            }
        }
        println!();
        println!("Total value: {}", report.total_value);
        Ok(())
    }

    pub fn log(&self, entries: &[SyncLogEntry], counts: &StatusCounts) -> Result<()> {
        if self.json {
            #[derive(Serialize)]
            struct LogView<'a> {
                counts: &'a StatusCounts,
                entries: &'a [SyncLogEntry],
            }
            return self.json(&LogView { counts, entries });
        }

        println!(
            "pending {}, success {}, failed {}, partial {}",
            counts.pending, counts.success, counts.failed, counts.partial
        );
        for entry in entries {
            println!(
                "{} {} {:<24} {:<8} {}",
                entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                entry.id,
                entry.sync_type,
                entry.sync_status,
                entry.reference_id
            );
            if let Some(error) = &entry.error_message {
                println!("    {error}");
            }
        }
        Ok(())
    }

    pub fn reconciliation(&self, item: &str, result: &StockReconciliation, repair: bool) -> Result<()> {
        if self.json {
            return self.json(result);
        }

        if result.is_consistent() {
            println!("{item}: consistent ({} on hand)", result.ledger);
        } else if repair {
            println!("{item}: cache reset from {} to {}", result.cached, result.ledger);
        } else {
            println!(
                "{item}: cached {} but ledger says {} (drift {})",
                result.cached,
                result.ledger,
                result.drift()
            );
        }
        Ok(())
    }
}
