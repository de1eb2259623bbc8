//! # autocount-sync: ERP Sync Engine for AutoCount Bridge
//!
//! This crate reconciles the local store with an AutoCount ERP instance.
//! It pulls master data and documents, pushes local edits back, retries
//! failed runs from the sync log and values inventory with FIFO layers.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    SyncEngine (Orchestrator)                     │  │
//! │  │                                                                  │  │
//! │  │  preview / execute      pull: ERP ──► local store                │  │
//! │  │  preview_push / push    push: local store ──► ERP                │  │
//! │  │  push_record            one record, one log entry                │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Session        │  │ RunGuards      │  │ Retry Dispatcher       │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Login once per │  │ One run per    │  │ Replays a failed log   │    │
//! │  │ run, bounded   │  │ entity kind;   │  │ entry by sync type and │    │
//! │  │ create/update  │  │ one retry per  │  │ records the outcome on │    │
//! │  │ calls          │  │ log entry      │  │ the same entry         │    │
//! │  └───────┬────────┘  └────────────────┘  └────────────────────────┘    │
//! │          │                                                              │
//! │          ▼                                                              │
//! │  ┌────────────────┐              ┌──────────────────────────────────┐  │
//! │  │ ErpClient      │              │ ValuationService                 │  │
//! │  │ (trait)        │              │                                  │  │
//! │  │                │              │ FIFO layers from the stock       │  │
//! │  │ AutoCountClient│              │ ledger, cached or replayed       │  │
//! │  │ over reqwest   │              │ on-hand                          │  │
//! │  └────────────────┘              └──────────────────────────────────┘  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`autocount`] - REST client for the AutoCount API
//! - [`client`] - `ErpClient` trait and the per-run `Session`
//! - [`config`] - Bridge configuration (TOML file + environment)
//! - [`engine`] - Pull preview/execute and run bookkeeping
//! - [`error`] - Sync error types
//! - [`guard`] - Run and retry exclusion
//! - [`push`] - Push preview/execute and single-record push
//! - [`retry`] - Retry dispatcher over the sync log
//! - [`valuation`] - FIFO valuation service
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use autocount_core::EntityKind;
//! use autocount_db::{Database, DbConfig};
//! use autocount_sync::{AutoCountClient, BridgeConfig, EngineSettings, SyncEngine};
//!
//! let config = BridgeConfig::load(None)?;
//! config.require_erp()?;
//!
//! let db = Database::new(DbConfig::new(config.database_path())).await?;
//! let client = Arc::new(AutoCountClient::new(&config.erp)?);
//! let engine = SyncEngine::new(db, client, EngineSettings::from_config(&config));
//!
//! let preview = engine.preview(EntityKind::InventoryItem).await?;
//! println!("{} to create", preview.summary.to_create);
//!
//! let report = engine.execute(EntityKind::InventoryItem).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod autocount;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod push;
pub mod retry;
pub mod valuation;

#[cfg(test)]
mod fake;

// =============================================================================
// Re-exports
// =============================================================================

pub use autocount::AutoCountClient;
pub use client::{CreateOutcome, Credential, ErpClient, Session};
pub use config::{BridgeConfig, DatabaseSettings, ErpSettings, SyncSettings};
pub use engine::{EngineSettings, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use push::PushedRecord;
pub use valuation::{OnHandSource, ValuationService};
