//! # Remote Client
//!
//! The seam between the sync engine and the ERP.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   SyncEngine ──► Session (one per run) ──► dyn ErpClient                │
//! │                    │                         │                          │
//! │                    │ holds the credential    ├── AutoCountClient (HTTP) │
//! │                    │ bounds every call       └── FakeErpClient (tests)  │
//! │                    │ with a timeout                                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A session logs in once when it opens and is dropped at the end of the
//! run; credentials never outlive one run.

use async_trait::async_trait;
use autocount_core::{EntityKind, RemoteRecord};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Contract
// =============================================================================

/// Bearer token returned by a successful login.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Credential {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// What the ERP hands back for a created record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOutcome {
    /// Document number or code assigned by the ERP, if it returned one.
    pub doc_no: Option<String>,
}

/// Operations the ERP exposes to the bridge.
///
/// ## Error Contract
/// - `authenticate`: `AuthenticationFailed` for bad credentials, an
///   unreachable host or any non-2xx login response
/// - `list`: `FetchFailed`
/// - `create`: `RemoteAlreadyExists`, `RemoteRejected`, `Http`
/// - `update`: `RemoteNotFound`, `RemoteRejected`, `Http`
#[async_trait]
pub trait ErpClient: Send + Sync {
    async fn authenticate(&self) -> SyncResult<Credential>;

    async fn list(&self, credential: &Credential, kind: EntityKind) -> SyncResult<Vec<RemoteRecord>>;

    async fn create(
        &self,
        credential: &Credential,
        kind: EntityKind,
        record: &RemoteRecord,
    ) -> SyncResult<CreateOutcome>;

    async fn update(
        &self,
        credential: &Credential,
        kind: EntityKind,
        key: &str,
        record: &RemoteRecord,
    ) -> SyncResult<()>;
}

// =============================================================================
// Session
// =============================================================================

/// One authenticated run against the ERP.
pub struct Session {
    client: Arc<dyn ErpClient>,
    credential: Credential,
    timeout: Duration,
}

impl Session {
    /// Logs in. A timeout here is an authentication failure.
    pub async fn open(client: Arc<dyn ErpClient>, timeout: Duration) -> SyncResult<Self> {
        let credential = match tokio::time::timeout(timeout, client.authenticate()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(SyncError::AuthenticationFailed(format!(
                    "login timed out after {} seconds",
                    timeout.as_secs()
                )))
            }
        };

        debug!("ERP session opened");
        Ok(Session {
            client,
            credential,
            timeout,
        })
    }

    /// Fetches the remote set. Every failure here is run-level.
    pub async fn list(&self, kind: EntityKind) -> SyncResult<Vec<RemoteRecord>> {
        let fetched = self
            .bounded(self.client.list(&self.credential, kind))
            .await;

        match fetched {
            Ok(records) => {
                debug!(entity = %kind, count = records.len(), "Fetched remote records");
                Ok(records)
            }
            Err(err @ SyncError::FetchFailed { .. }) => Err(err),
            Err(err) => Err(SyncError::FetchFailed {
                entity: kind.plural().to_string(),
                reason: err.to_string(),
            }),
        }
    }

    pub async fn create(&self, kind: EntityKind, record: &RemoteRecord) -> SyncResult<CreateOutcome> {
        self.bounded(self.client.create(&self.credential, kind, record))
            .await
    }

    pub async fn update(&self, kind: EntityKind, key: &str, record: &RemoteRecord) -> SyncResult<()> {
        self.bounded(self.client.update(&self.credential, kind, key, record))
            .await
    }

    async fn bounded<T>(&self, call: impl Future<Output = SyncResult<T>>) -> SyncResult<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| SyncError::Timeout(self.timeout.as_secs()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeErpClient;

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("secret-token");
        assert_eq!(format!("{:?}", credential), "Credential(<redacted>)");
        assert_eq!(credential.token(), "secret-token");
    }

    #[tokio::test]
    async fn test_session_logs_in_once() {
        let fake = Arc::new(FakeErpClient::new());
        let session = Session::open(fake.clone(), Duration::from_secs(5)).await.unwrap();

        session.list(EntityKind::Supplier).await.unwrap();
        session.list(EntityKind::InventoryItem).await.unwrap();

        assert_eq!(fake.calls().authenticate, 1);
        assert_eq!(fake.calls().list, 2);
    }

    #[tokio::test]
    async fn test_login_failure_is_authentication_error() {
        let fake = Arc::new(FakeErpClient::new());
        fake.fail_login("invalid credentials");

        let err = Session::open(fake, Duration::from_secs(5)).await.err().unwrap();
        assert!(matches!(err, SyncError::AuthenticationFailed(_)));
        assert!(err.is_run_level());
    }

    #[tokio::test]
    async fn test_list_failure_becomes_fetch_failure() {
        let fake = Arc::new(FakeErpClient::new());
        fake.fail_list("HTTP 502");

        let session = Session::open(fake, Duration::from_secs(5)).await.unwrap();
        let err = session.list(EntityKind::Supplier).await.unwrap_err();
        assert!(matches!(err, SyncError::FetchFailed { ref entity, .. } if entity == "suppliers"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_call_times_out() {
        let fake = Arc::new(FakeErpClient::new());
        fake.hang_writes(Duration::from_secs(60));

        let session = Session::open(fake, Duration::from_secs(2)).await.unwrap();
        let err = session
            .create(EntityKind::Supplier, &RemoteRecord::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Timeout(2)));
    }
}
