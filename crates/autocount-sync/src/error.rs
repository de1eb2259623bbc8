//! # Sync Error Types
//!
//! Error types for sync, retry and valuation operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Run-level     │  │     Per-record          │ │
//! │  │                 │  │  (abort run)    │  │  (collected, run goes   │ │
//! │  │  InvalidConfig  │  │                 │  │   on)                   │ │
//! │  │  InvalidUrl     │  │  Authentication │  │  Mapping                │ │
//! │  │  ConfigLoad...  │  │  FetchFailed    │  │  RemoteNotFound         │ │
//! │  └─────────────────┘  │  Timeout*       │  │  RemoteAlreadyExists    │ │
//! │                       └─────────────────┘  │  RemoteRejected         │ │
//! │                                            │  PushFailed             │ │
//! │  ┌─────────────────┐  ┌─────────────────┐  │  Persistence            │ │
//! │  │    Database     │  │     Retry       │  │  Timeout*               │ │
//! │  │                 │  │                 │  └─────────────────────────┘ │
//! │  │  Database       │  │  NothingToRetry │                              │
//! │  │                 │  │  RetryInProgress│  * Timeout is run-level while │
//! │  └─────────────────┘  │  UnknownSyncType│    fetching, per-record while │
//! │                       │  LogEntryNotFnd │    applying                   │
//! │                       └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use autocount_core::CoreError;
use autocount_db::DbError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid bridge configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid ERP URL.
    #[error("Invalid ERP URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Run-level Errors
    // =========================================================================
    /// Login rejected, host unreachable, or non-2xx login response.
    #[error("ERP authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The remote record set could not be fetched.
    #[error("Failed to fetch {entity} from ERP: {reason}")]
    FetchFailed { entity: String, reason: String },

    /// An ERP call exceeded the configured timeout.
    #[error("ERP call timed out after {0} seconds")]
    Timeout(u64),

    // =========================================================================
    // Per-record Errors
    // =========================================================================
    /// A record could not be translated between shapes.
    #[error("{0}")]
    Mapping(#[from] CoreError),

    /// The ERP has no record with this key.
    #[error("{entity} '{key}' not found in AutoCount")]
    RemoteNotFound { entity: String, key: String },

    /// The ERP already has a record with this key.
    #[error("{entity} '{key}' already exists in AutoCount")]
    RemoteAlreadyExists { entity: String, key: String },

    /// Any other create/update rejection.
    #[error("AutoCount rejected {entity} '{key}' (HTTP {status}): {message}")]
    RemoteRejected {
        entity: String,
        key: String,
        status: u16,
        message: String,
    },

    /// Both the create and the fallback update of a push were rejected.
    #[error("{entity} '{key}' could not be pushed: create failed ({create}); update failed ({update})")]
    PushFailed {
        entity: String,
        key: String,
        create: String,
        update: String,
    },

    /// Local write failed after the ERP call succeeded; local and remote
    /// now disagree.
    #[error("{entity} '{key}' was written to AutoCount{} but the local update failed: {reason}",
        .doc_no.as_deref().map(|d| format!(" as {d}")).unwrap_or_default())]
    Persistence {
        entity: String,
        key: String,
        doc_no: Option<String>,
        reason: String,
    },

    /// Transport failure not tied to a status code.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Response body wasn't what the ERP contract promises.
    #[error("Unexpected ERP response: {0}")]
    InvalidResponse(String),

    // =========================================================================
    // Retry Errors
    // =========================================================================
    /// The entry already succeeded.
    #[error("Nothing to retry: sync log entry {0} already succeeded")]
    NothingToRetry(String),

    /// Another retry of this entry is outstanding.
    #[error("Sync log entry {0} is already being retried")]
    RetryInProgress(String),

    /// The entry's sync type has no handler.
    #[error("Unknown sync type: {0}")]
    UnknownSyncType(String),

    /// No entry with this id or reference.
    #[error("Sync log entry not found: {0}")]
    LogEntryNotFound(String),

    // =========================================================================
    // Local Store Errors
    // =========================================================================
    /// Local store failure outside the per-record persistence path.
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::InvalidResponse(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::InvalidResponse(err.to_string())
        } else {
            SyncError::Http(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if this error aborts a whole run rather than one record.
    pub fn is_run_level(&self) -> bool {
        matches!(
            self,
            SyncError::AuthenticationFailed(_)
                | SyncError::FetchFailed { .. }
                | SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
        )
    }

    /// Returns true if replaying the operation later may succeed.
    ///
    /// ## Retryable Errors
    /// - Network failures and timeouts
    /// - Fetch failures (ERP temporarily down)
    /// - Persistence failures (remote write done, local write pending)
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - Mapping failures (data must be fixed first)
    /// - Retry bookkeeping errors
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Http(_)
                | SyncError::Timeout(_)
                | SyncError::FetchFailed { .. }
                | SyncError::Persistence { .. }
                | SyncError::RemoteRejected { status: 500..=599, .. }
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Http("connection reset".into()).is_retryable());
        assert!(SyncError::Timeout(30).is_retryable());
        assert!(SyncError::RemoteRejected {
            entity: "supplier".into(),
            key: "400-A001".into(),
            status: 503,
            message: "busy".into(),
        }
        .is_retryable());

        assert!(!SyncError::InvalidConfig("bad config".into()).is_retryable());
        assert!(!SyncError::RemoteRejected {
            entity: "supplier".into(),
            key: "400-A001".into(),
            status: 422,
            message: "bad field".into(),
        }
        .is_retryable());
        assert!(!SyncError::NothingToRetry("x".into()).is_retryable());
    }

    #[test]
    fn test_run_level_errors() {
        assert!(SyncError::AuthenticationFailed("401".into()).is_run_level());
        assert!(SyncError::FetchFailed {
            entity: "items".into(),
            reason: "502".into()
        }
        .is_run_level());
        assert!(!SyncError::Timeout(30).is_run_level());
        assert!(!SyncError::RemoteNotFound {
            entity: "inventory_item".into(),
            key: "ITM-001".into()
        }
        .is_run_level());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::RemoteNotFound {
            entity: "inventory_item".into(),
            key: "ITM-404".into(),
        };
        assert_eq!(err.to_string(), "inventory_item 'ITM-404' not found in AutoCount");

        let err = SyncError::Persistence {
            entity: "purchase_order".into(),
            key: "PO-0001".into(),
            doc_no: Some("PO-0001".into()),
            reason: "disk full".into(),
        };
        assert!(err.to_string().contains("as PO-0001"));
        assert!(err.to_string().contains("disk full"));
    }
}
