//! Shared fixtures for unit tests.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{HttpClient, SettingsStore, SettingsTransaction};
use core_runtime::config::CoreConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// In-memory settings store with staged transactions and an optional
/// failure on the n-th transactional write.
#[derive(Default)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
    fail_on_write: Option<usize>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn with_pair(access: &str, refresh: &str) -> Self {
        let store = Self::default();
        {
            let mut values = store.values.lock();
            values.insert("access_token".to_string(), access.to_string());
            values.insert("refresh_token".to_string(), refresh.to_string());
        }
        store
    }

    /// Counting from 1 across all transactions, staged sets and deletes alike.
    pub fn failing_on_write(n: usize) -> Self {
        Self {
            fail_on_write: Some(n),
            ..Default::default()
        }
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.values.lock().clone()
    }
}

struct MemoryTransaction {
    values: Arc<Mutex<HashMap<String, String>>>,
    staged: Vec<(String, Option<String>)>,
    fail_on_write: Option<usize>,
    writes: Arc<AtomicUsize>,
}

impl MemoryTransaction {
    fn stage(&mut self, key: &str, value: Option<&str>) -> BridgeResult<()> {
        let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_write == Some(n) {
            return Err(BridgeError::Storage("disk full".to_string()));
        }
        self.staged.push((key.to_string(), value.map(str::to_string)));
        Ok(())
    }
}

#[async_trait]
impl SettingsTransaction for MemoryTransaction {
    async fn set_string(&mut self, key: &str, value: &str) -> BridgeResult<()> {
        self.stage(key, Some(value))
    }

    async fn delete(&mut self, key: &str) -> BridgeResult<()> {
        self.stage(key, None)
    }

    async fn commit(self: Box<Self>) -> BridgeResult<()> {
        let this = *self;
        let mut values = this.values.lock();
        for (key, value) in this.staged {
            match value {
                Some(value) => values.insert(key, value),
                None => values.remove(&key),
            };
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> BridgeResult<()> {
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.value(key))
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.values.lock().remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        Ok(self.values.lock().keys().cloned().collect())
    }

    async fn clear_all(&self) -> BridgeResult<()> {
        self.values.lock().clear();
        Ok(())
    }

    async fn begin_transaction(&self) -> BridgeResult<Box<dyn SettingsTransaction + Send>> {
        Ok(Box::new(MemoryTransaction {
            values: Arc::clone(&self.values),
            staged: Vec::new(),
            fail_on_write: self.fail_on_write,
            writes: Arc::clone(&self.writes),
        }))
    }
}

pub fn config_with(http: Arc<dyn HttpClient>, store: Arc<dyn SettingsStore>) -> CoreConfig {
    CoreConfig::builder()
        .api_base_url("https://api.test")
        .http_client(http)
        .settings_store(store)
        .build()
        .unwrap()
}
