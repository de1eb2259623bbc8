//! Scriptable in-memory ERP for tests.
//!
//! Keeps one ordered record list per entity class, counts every call, and
//! lets a test inject failures per natural key.

use async_trait::async_trait;
use autocount_core::{mapper, schema_for, EntityKind, RemoteRecord};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::client::{CreateOutcome, Credential, ErpClient};
use crate::error::{SyncError, SyncResult};

/// Calls received so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub authenticate: usize,
    pub list: usize,
    pub create: usize,
    pub update: usize,
}

impl CallCounts {
    pub fn writes(&self) -> usize {
        self.create + self.update
    }
}

#[derive(Default)]
struct FakeState {
    records: HashMap<EntityKind, Vec<RemoteRecord>>,
    login_error: Option<String>,
    list_error: Option<String>,
    create_failures: HashMap<String, String>,
    update_failures: HashMap<String, String>,
    no_doc_no: HashSet<EntityKind>,
    write_delay: Option<Duration>,
    calls: CallCounts,
}

pub struct FakeErpClient {
    state: Mutex<FakeState>,
}

impl FakeErpClient {
    pub fn new() -> Self {
        FakeErpClient {
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn seed(&self, kind: EntityKind, records: Vec<RemoteRecord>) {
        self.state.lock().unwrap().records.insert(kind, records);
    }

    pub fn records(&self, kind: EntityKind) -> Vec<RemoteRecord> {
        self.state
            .lock()
            .unwrap()
            .records
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls
    }

    pub fn fail_login(&self, message: &str) {
        self.state.lock().unwrap().login_error = Some(message.to_string());
    }

    pub fn fail_list(&self, message: &str) {
        self.state.lock().unwrap().list_error = Some(message.to_string());
    }

    /// Rejects creates of this key with HTTP 500.
    pub fn fail_create(&self, key: &str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .create_failures
            .insert(key.to_string(), message.to_string());
    }

    /// Rejects updates of this key with HTTP 422.
    pub fn fail_update(&self, key: &str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .update_failures
            .insert(key.to_string(), message.to_string());
    }

    /// Creates of this class succeed without returning a doc number.
    pub fn omit_doc_no(&self, kind: EntityKind) {
        self.state.lock().unwrap().no_doc_no.insert(kind);
    }

    pub fn hang_writes(&self, delay: Duration) {
        self.state.lock().unwrap().write_delay = Some(delay);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.login_error = None;
        state.list_error = None;
        state.create_failures.clear();
        state.update_failures.clear();
        state.write_delay = None;
    }

    async fn delay_write(&self) {
        let delay = self.state.lock().unwrap().write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn key_of(kind: EntityKind, record: &RemoteRecord) -> String {
    mapper::remote_key(schema_for(kind), record).unwrap_or_default()
}

#[async_trait]
impl ErpClient for FakeErpClient {
    async fn authenticate(&self) -> SyncResult<Credential> {
        let mut state = self.state.lock().unwrap();
        state.calls.authenticate += 1;
        match &state.login_error {
            Some(message) => Err(SyncError::AuthenticationFailed(message.clone())),
            None => Ok(Credential::new("fake-token")),
        }
    }

    async fn list(&self, _credential: &Credential, kind: EntityKind) -> SyncResult<Vec<RemoteRecord>> {
        let mut state = self.state.lock().unwrap();
        state.calls.list += 1;
        if let Some(message) = &state.list_error {
            return Err(SyncError::FetchFailed {
                entity: kind.plural().to_string(),
                reason: message.clone(),
            });
        }
        Ok(state.records.get(&kind).cloned().unwrap_or_default())
    }

    async fn create(
        &self,
        _credential: &Credential,
        kind: EntityKind,
        record: &RemoteRecord,
    ) -> SyncResult<CreateOutcome> {
        self.state.lock().unwrap().calls.create += 1;
        self.delay_write().await;

        let key = key_of(kind, record);
        let mut state = self.state.lock().unwrap();

        if let Some(message) = state.create_failures.get(&key) {
            return Err(SyncError::RemoteRejected {
                entity: kind.as_str().to_string(),
                key,
                status: 500,
                message: message.clone(),
            });
        }

        let records = state.records.entry(kind).or_default();
        if records.iter().any(|r| key_of(kind, r) == key) {
            return Err(SyncError::RemoteAlreadyExists {
                entity: kind.as_str().to_string(),
                key,
            });
        }
        records.push(record.clone());

        let doc_no = (!state.no_doc_no.contains(&kind)).then_some(key);
        Ok(CreateOutcome { doc_no })
    }

    async fn update(
        &self,
        _credential: &Credential,
        kind: EntityKind,
        key: &str,
        record: &RemoteRecord,
    ) -> SyncResult<()> {
        self.state.lock().unwrap().calls.update += 1;
        self.delay_write().await;

        let mut state = self.state.lock().unwrap();

        if let Some(message) = state.update_failures.get(key) {
            return Err(SyncError::RemoteRejected {
                entity: kind.as_str().to_string(),
                key: key.to_string(),
                status: 422,
                message: message.clone(),
            });
        }

        let existing = state
            .records
            .entry(kind)
            .or_default()
            .iter_mut()
            .find(|r| key_of(kind, r) == key);

        match existing {
            Some(existing) => {
                for (field, value) in record.as_map() {
                    existing.insert(field.clone(), value.clone());
                }
                Ok(())
            }
            None => Err(SyncError::RemoteNotFound {
                entity: kind.as_str().to_string(),
                key: key.to_string(),
            }),
        }
    }
}
