//! # Repository Module
//!
//! Database repository implementations for the bridge's local store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories and their tables                        │
//! │                                                                         │
//! │  Sync Orchestrator                                                     │
//! │       │                                                                 │
//! │       │  db.records().list(EntityKind::Supplier)                       │
//! │       ▼                                                                 │
//! │  RecordRepository ──► components / suppliers / purchase_orders (+lines) │
//! │  ├── list, find_by_key, find_by_id                                     │
//! │  ├── insert (full field set)                                           │
//! │  └── update_fields (changed fields only)                               │
//! │                                                                         │
//! │  LedgerRepository ──► stock_movements (+ components.current_stock)     │
//! │  ├── append (movement + cached total, one transaction)                 │
//! │  └── costed_inbound, reconcile                                         │
//! │                                                                         │
//! │  SyncLogRepository ──► autocount_sync_log                              │
//! │  ├── insert, get, latest_for_reference                                 │
//! │  └── claim_for_retry, complete, list/count                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`RecordRepository`](record::RecordRepository) - Synchronized entity rows
//! - [`LedgerRepository`](ledger::LedgerRepository) - Stock movement ledger
//! - [`SyncLogRepository`](sync_log::SyncLogRepository) - Sync audit trail

pub mod ledger;
pub mod record;
pub mod sync_log;
