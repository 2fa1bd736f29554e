use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by key/value storage implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Requested key does not exist.
    #[error("entry not found for key: {key}")]
    NotFound { key: String },
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// Byte-blob store the local persistence collaborator is built on.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Persist a value under a key, overwriting any existing entry.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Retrieve the value for a key.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Remove a key and its value (idempotent).
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local store for tests and dry runs. Can be switched into a
/// failing mode to exercise error paths of its callers.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<String, Vec<u8>>,
    failing: Option<String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `reason`; `None` heals the store.
    pub fn set_failing(&self, reason: Option<&str>) {
        if let Ok(mut state) = self.inner.lock() {
            state.failing = reason.map(str::to_string);
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|state| state.entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut MemoryState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut state = self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        f(&mut state)
    }
}

fn check_writable(state: &MemoryState) -> Result<(), StoreError> {
    match &state.failing {
        Some(reason) => Err(StoreError::Storage {
            reason: reason.clone(),
        }),
        None => Ok(()),
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.with_state(|state| {
            check_writable(state)?;
            state.entries.insert(key.to_string(), value.to_vec());
            Ok(())
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.with_state(|state| {
            state
                .entries
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::NotFound {
                    key: key.to_string(),
                })
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.with_state(|state| {
            check_writable(state)?;
            state.entries.remove(key);
            Ok(())
        })
    }
}
