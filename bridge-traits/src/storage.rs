//! Key-Value Storage Abstractions
//!
//! Provides the platform-agnostic persistent key-value store used to keep
//! session credentials across restarts.

use async_trait::async_trait;

use crate::error::Result;

/// Persistent key-value settings storage trait
///
/// Abstracts platform-specific persistent storage:
/// - Desktop: SQLite file
/// - Web: localStorage / IndexedDB
/// - Mobile: UserDefaults / DataStore
///
/// Values written by a committed [`SettingsTransaction`] become visible
/// together; a transaction that is rolled back, or dropped without commit,
/// leaves no trace.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save_pair(store: &dyn SettingsStore) -> Result<()> {
///     let mut tx = store.begin_transaction().await?;
///     tx.set_string("access_token", "a").await?;
///     tx.set_string("refresh_token", "r").await?;
///     tx.commit().await
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Clear all settings
    async fn clear_all(&self) -> Result<()>;

    /// Begin a transaction for atomic updates
    ///
    /// Changes are only visible once [`SettingsTransaction::commit`] succeeds.
    async fn begin_transaction(&self) -> Result<Box<dyn SettingsTransaction + Send>>;
}

/// Transaction for atomic settings updates
#[async_trait]
pub trait SettingsTransaction: Send {
    /// Set a value within the transaction
    async fn set_string(&mut self, key: &str, value: &str) -> Result<()>;

    /// Delete a value within the transaction
    async fn delete(&mut self, key: &str) -> Result<()>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}
