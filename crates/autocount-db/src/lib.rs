//! # autocount-db: Local Store for AutoCount Bridge
//!
//! SQLite persistence for the records the bridge mirrors, the stock
//! ledger, and the sync audit log.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        AutoCount Bridge Data Flow                       │
//! │                                                                         │
//! │  Sync Orchestrator / Retry Dispatcher / Valuation service              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   autocount-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ RecordRepo    │    │ 001_initial  │  │   │
//! │  │   │ SqlitePool    │◄───│ LedgerRepo    │    │   _schema    │  │   │
//! │  │   │               │    │ SyncLogRepo   │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <data dir>/autocount-bridge/bridge.db                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Record, ledger and sync log repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use autocount_db::{Database, DbConfig};
//! use autocount_core::EntityKind;
//!
//! let db = Database::new(DbConfig::new("bridge.db")).await?;
//! let suppliers = db.records().list(EntityKind::Supplier).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::ledger::{LedgerRepository, StockItem, StockReconciliation};
pub use repository::record::{RecordRepository, SyncStamp, SyncState};
pub use repository::sync_log::{NewSyncLogEntry, StatusCounts, SyncLogRepository};
