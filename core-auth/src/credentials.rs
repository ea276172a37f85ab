//! Credential Store
//!
//! Persists the access/refresh pair under two well-known keys of a
//! [`SettingsStore`] and mirrors it in memory so the request path can read it
//! without awaiting.
//!
//! ## Invariants
//!
//! - Both keys are written in one storage transaction. A failure between the
//!   two writes leaves the previous pair (or nothing) in place.
//! - The in-memory copy changes only after the transaction commits.
//! - A store holding only one of the two keys is treated as empty and wiped.
//! - Storage writes are serialized. Every sign-in and sign-out starts a new
//!   session epoch, and a rotated pair is only accepted for the epoch its
//!   refresh started in.
//!
//! Token values are never logged.

use crate::error::{AuthError, Result};
use crate::types::CredentialPair;
use bridge_traits::SettingsStore;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Storage key of the access credential.
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key of the refresh credential.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

#[derive(Default)]
struct Cached {
    pair: Option<CredentialPair>,
    epoch: u64,
}

/// Persistent holder of the credential pair.
///
/// Cloning is cheap; clones share the same cache and backing store.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn SettingsStore>,
    cached: Arc<RwLock<Cached>>,
    writes: Arc<tokio::sync::Mutex<()>>,
}

impl CredentialStore {
    /// Create an empty store. Call [`load`](Self::load) to pick up a pair
    /// persisted by a previous run.
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            cached: Arc::new(RwLock::new(Cached::default())),
            writes: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Read the persisted pair into memory.
    pub async fn load(&self) -> Result<Option<CredentialPair>> {
        let access = self
            .store
            .get_string(ACCESS_TOKEN_KEY)
            .await
            .map_err(AuthError::storage)?;
        let refresh = self
            .store
            .get_string(REFRESH_TOKEN_KEY)
            .await
            .map_err(AuthError::storage)?;

        let pair = match (access, refresh) {
            (Some(access), Some(refresh)) => CredentialPair::new(access, refresh),
            (None, None) => {
                debug!("No stored credentials");
                self.cached.write().pair = None;
                return Ok(None);
            }
            (access, refresh) => {
                warn!(
                    has_access = access.is_some(),
                    has_refresh = refresh.is_some(),
                    "Found half a credential pair, discarding"
                );
                self.clear().await?;
                return Ok(None);
            }
        };

        self.cached.write().pair = Some(pair.clone());
        info!("Loaded stored credentials");
        Ok(Some(pair))
    }

    /// Current session epoch. Changes on every [`store_pair`](Self::store_pair)
    /// and [`clear`](Self::clear).
    pub fn epoch(&self) -> u64 {
        self.cached.read().epoch
    }

    /// The refresh credential together with the epoch it belongs to, read
    /// under one lock.
    pub fn refresh_token_with_epoch(&self) -> (u64, Option<String>) {
        let cached = self.cached.read();
        (
            cached.epoch,
            cached.pair.as_ref().map(|p| p.refresh_token.clone()),
        )
    }

    /// Persist a new pair for a new session, replacing the old one entirely.
    ///
    /// Any rotation still in flight for the previous session is rejected.
    pub async fn store_pair(&self, pair: CredentialPair) -> Result<()> {
        let epoch = {
            let mut cached = self.cached.write();
            cached.epoch += 1;
            cached.epoch
        };
        self.write_pair(pair, epoch).await
    }

    /// Persist a pair obtained by rotating the credentials of session `epoch`.
    ///
    /// # Errors
    ///
    /// [`AuthError::Unauthenticated`] without touching storage if the session
    /// was cleared or replaced since `epoch` was read.
    pub async fn store_rotated(&self, pair: CredentialPair, epoch: u64) -> Result<()> {
        self.write_pair(pair, epoch).await
    }

    async fn write_pair(&self, pair: CredentialPair, epoch: u64) -> Result<()> {
        let _writing = self.writes.lock().await;
        if self.epoch() != epoch {
            debug!("Session changed before the credential pair was written");
            return Err(AuthError::Unauthenticated);
        }

        let mut tx = self
            .store
            .begin_transaction()
            .await
            .map_err(AuthError::storage)?;

        let written = match tx.set_string(ACCESS_TOKEN_KEY, &pair.access_token).await {
            Ok(()) => tx.set_string(REFRESH_TOKEN_KEY, &pair.refresh_token).await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            warn!(error = %e, "Failed to write credential pair, rolling back");
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback of credential pair failed");
            }
            return Err(AuthError::storage(e));
        }

        tx.commit().await.map_err(|e| {
            warn!(error = %e, "Failed to commit credential pair");
            AuthError::storage(e)
        })?;

        let mut cached = self.cached.write();
        if cached.epoch != epoch {
            // Whoever moved the epoch is queued on the write gate and will
            // overwrite or delete what was just committed.
            debug!("Session changed while the credential pair was written");
            return Err(AuthError::Unauthenticated);
        }
        cached.pair = Some(pair);
        debug!("Credential pair stored");
        Ok(())
    }

    /// Remove both credentials. Idempotent.
    ///
    /// The in-memory copy is dropped first, so even when storage fails no
    /// request leaves this process with the old credential.
    pub async fn clear(&self) -> Result<()> {
        {
            let mut cached = self.cached.write();
            cached.pair = None;
            cached.epoch += 1;
        }
        self.delete_pair().await
    }

    /// Like [`clear`](Self::clear), but only if the session is still the one
    /// of `epoch`. Returns `false` and leaves everything alone otherwise.
    pub async fn clear_if_current(&self, epoch: u64) -> Result<bool> {
        {
            let mut cached = self.cached.write();
            if cached.epoch != epoch {
                return Ok(false);
            }
            cached.pair = None;
            cached.epoch += 1;
        }
        self.delete_pair().await?;
        Ok(true)
    }

    async fn delete_pair(&self) -> Result<()> {
        let _writing = self.writes.lock().await;

        let mut tx = self
            .store
            .begin_transaction()
            .await
            .map_err(AuthError::storage)?;

        let deleted = match tx.delete(ACCESS_TOKEN_KEY).await {
            Ok(()) => tx.delete(REFRESH_TOKEN_KEY).await,
            Err(e) => Err(e),
        };

        if let Err(e) = deleted {
            warn!(error = %e, "Failed to delete credentials, rolling back");
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback of credential removal failed");
            }
            return Err(AuthError::storage(e));
        }

        tx.commit().await.map_err(AuthError::storage)?;
        debug!("Credentials cleared");
        Ok(())
    }

    pub fn access_token(&self) -> Option<String> {
        self.cached
            .read()
            .pair
            .as_ref()
            .map(|p| p.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.cached
            .read()
            .pair
            .as_ref()
            .map(|p| p.refresh_token.clone())
    }

    pub fn current(&self) -> Option<CredentialPair> {
        self.cached.read().pair.clone()
    }

    pub fn has_credentials(&self) -> bool {
        self.cached.read().pair.is_some()
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("has_credentials", &self.has_credentials())
            .field("epoch", &self.epoch())
            .finish()
    }
}
