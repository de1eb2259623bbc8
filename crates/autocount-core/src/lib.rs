//! # autocount-core: Pure Reconciliation Logic for AutoCount Bridge
//!
//! Everything the bridge decides, with no I/O: how ERP records map onto
//! local rows, whether two versions of a record differ, and what the
//! stock on hand is worth.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      AutoCount Bridge Architecture                      │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    autocount-cli                                │   │
//! │  │    preview ──► execute ──► retry ──► valuate                   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    autocount-sync                               │   │
//! │  │    Remote Client, Sync Orchestrator, Retry Dispatcher          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ autocount-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────────┐  │   │
//! │  │   │  schema  │  │  mapper  │  │   diff   │  │  valuation   │  │   │
//! │  │   │  fields  │  │ to_local │  │ classify │  │  FIFO layers │  │   │
//! │  │   │  keys    │  │ to_remote│  │ changes  │  │  avg cost    │  │   │
//! │  │   └──────────┘  └──────────┘  └──────────┘  └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    autocount-db (Local Store)                   │   │
//! │  │       SQLite records, stock ledger, sync log, migrations        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Entity kinds, sync types/statuses, log and ledger rows
//! - [`record`] - Field values, local and remote record shapes
//! - [`schema`] - Per-entity field mapping declarations
//! - [`mapper`] - Remote ↔ local translation and normalization
//! - [`diff`] - Create / update / none classification
//! - [`valuation`] - FIFO cost allocation
//! - [`report`] - Results handed back to callers
//! - [`money`] - Integer money
//! - [`validation`] - Key and ledger input rules
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use autocount_core::diff::{classify, SyncAction};
//! use autocount_core::mapper::to_local_shape;
//! use autocount_core::record::RemoteRecord;
//! use autocount_core::schema::INVENTORY_ITEM;
//! use serde_json::json;
//!
//! let remote = RemoteRecord::from_value(json!({
//!     "ItemCode": "ITM-001",
//!     "Description": "Hex Bolt M6",
//!     "StandardCost": 1.2
//! }))
//! .unwrap();
//!
//! let (key, fields) = to_local_shape(&INVENTORY_ITEM, &remote).unwrap();
//! assert_eq!(key, "ITM-001");
//!
//! // Nothing stored locally yet
//! assert_eq!(classify(&INVENTORY_ITEM, None, &fields).action, SyncAction::Create);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod diff;
pub mod error;
pub mod mapper;
pub mod money;
pub mod record;
pub mod report;
pub mod schema;
pub mod types;
pub mod validation;
pub mod valuation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use diff::{classify, ChangeSet, Classification, FieldChange, SyncAction};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use record::{DocumentLine, FieldMap, FieldValue, LocalRecord, RemoteRecord};
pub use schema::{schema_for, EntitySchema};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Longest natural key accepted (ERP document numbers and codes).
pub const MAX_NATURAL_KEY_LEN: usize = 50;
