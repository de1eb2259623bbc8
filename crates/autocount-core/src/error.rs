//! # Error Types
//!
//! Domain-specific error types for autocount-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  autocount-core errors (this file)                                     │
//! │  ├── CoreError        - Mapping / domain failures                      │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  autocount-db errors (separate crate)                                  │
//! │  └── DbError          - Local store failures                           │
//! │                                                                         │
//! │  autocount-sync errors (separate crate)                                │
//! │  └── SyncError        - Run-level and per-record sync failures         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError::Mapping → report       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A remote record cannot be translated into the local shape.
    ///
    /// ## When This Occurs
    /// - Natural key missing or blank
    /// - A required field is absent
    /// - A field has a value of the wrong type (text where a number belongs)
    ///
    /// The record is skipped; the rest of the run continues.
    #[error("Cannot map {entity} record '{key}': {reason}")]
    Mapping {
        entity: String,
        key: String,
        reason: String,
    },

    /// A stored sync type string has no handler.
    #[error("Unknown sync type: {0}")]
    UnknownSyncType(String),

    /// A stored sync status string is not one of the four known states.
    #[error("Unknown sync status: {0}")]
    UnknownSyncStatus(String),

    /// A stored entity class name is not recognised.
    #[error("Unknown entity type: {0}")]
    UnknownEntity(String),

    /// A stored movement type string is not recognised.
    #[error("Unknown movement type: {0}")]
    UnknownMovementType(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a Mapping error.
    pub fn mapping(
        entity: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CoreError::Mapping {
            entity: entity.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must not be zero.
    #[error("{field} must not be zero")]
    MustBeNonZero { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g. non-numeric price, malformed date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
