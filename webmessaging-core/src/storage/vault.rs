// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Encrypted Vault
//!
//! Key/value store for session secrets. Values are sealed with a master key
//! held in a [`KeyStore`] and persisted through a [`ValueStore`].
//!
//! A missing or unusable master key is regenerated on the fly. Any value
//! sealed under the old key is lost; callers see `None` and must treat the
//! secret as gone (re-authenticate). A single value that fails to open is
//! dropped on its own and the key is kept.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, warn};
use uuid::Uuid;

use super::error::VaultError;
use super::secure::{KeyStore, MemoryKeyStore};
use super::values::{FileValueStore, MemoryValueStore, ValueStore};
use crate::crypto::{self, VaultKey};

/// Fixed vault keys.
pub mod keys {
    /// Anonymous session token.
    pub const TOKEN: &str = "token";
    /// OAuth refresh token.
    pub const AUTH_REFRESH_TOKEN: &str = "auth_refresh_token";
    /// Set once an authorized session has been established on this device.
    pub const WAS_AUTHENTICATED: &str = "was_authenticated";
    /// Last push registration sent to the backend.
    pub const PUSH_CONFIG: &str = "push_config";
}

/// Alias of the master key inside the key store.
pub const DEFAULT_KEY_ALIAS: &str = "webmessaging_vault_key";

/// Encrypted key/value vault.
///
/// All operations are serialized through one lock, so auth refresh, push
/// sync and logout may call in concurrently.
pub struct Vault {
    key_store: Arc<dyn KeyStore>,
    values: Arc<dyn ValueStore>,
    key_alias: String,
    lock: Mutex<()>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("key_alias", &self.key_alias)
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Creates a vault over the given key store and value backend.
    pub fn new(key_store: Arc<dyn KeyStore>, values: Arc<dyn ValueStore>) -> Self {
        Vault {
            key_store,
            values,
            key_alias: DEFAULT_KEY_ALIAS.to_string(),
            lock: Mutex::new(()),
        }
    }

    /// Creates a vault persisting sealed values under `path`.
    pub fn with_directory(key_store: Arc<dyn KeyStore>, path: PathBuf) -> Self {
        Self::new(key_store, Arc::new(FileValueStore::new(path)))
    }

    /// Creates a fully in-memory vault (for testing).
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryKeyStore::new()),
            Arc::new(MemoryValueStore::new()),
        )
    }

    /// Overrides the master key alias.
    pub fn with_key_alias(mut self, alias: impl Into<String>) -> Self {
        self.key_alias = alias.into();
        self
    }

    /// Seals and persists `value` under `key`.
    pub fn store(&self, key: &str, value: &str) -> Result<(), VaultError> {
        let _guard = self.lock.lock();
        self.store_locked(key, value)
    }

    /// Fetches and opens the value under `key`.
    ///
    /// Never fails: a missing key, a lost master key or a corrupted value
    /// all yield `None`.
    pub fn fetch(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock();
        self.fetch_locked(key)
    }

    /// Removes the value under `key`.
    pub fn remove(&self, key: &str) -> Result<(), VaultError> {
        let _guard = self.lock.lock();
        self.values.delete(key)
    }

    /// Returns the session token, generating and persisting one on first use.
    pub fn token(&self) -> Result<String, VaultError> {
        let _guard = self.lock.lock();
        if let Some(token) = self.fetch_locked(keys::TOKEN) {
            return Ok(token);
        }
        let token = Uuid::new_v4().to_string();
        self.store_locked(keys::TOKEN, &token)?;
        Ok(token)
    }

    /// Returns the stored refresh token, if any.
    pub fn auth_refresh_token(&self) -> Option<String> {
        self.fetch(keys::AUTH_REFRESH_TOKEN)
    }

    /// Returns true if this installation has completed an authorized session.
    pub fn was_authenticated(&self) -> bool {
        self.fetch(keys::WAS_AUTHENTICATED).as_deref() == Some("true")
    }

    /// Records whether an authorized session was established.
    pub fn set_was_authenticated(&self, value: bool) -> Result<(), VaultError> {
        if value {
            self.store(keys::WAS_AUTHENTICATED, "true")
        } else {
            self.remove(keys::WAS_AUTHENTICATED)
        }
    }

    fn store_locked(&self, key: &str, value: &str) -> Result<(), VaultError> {
        let master = self.master_key()?;
        let sealed = crypto::seal(&master, value.as_bytes())?;
        self.values.write(key, &sealed)
    }

    fn fetch_locked(&self, key: &str) -> Option<String> {
        let sealed = match self.values.read(key) {
            Ok(Some(sealed)) => sealed,
            Ok(None) => return None,
            Err(e) => {
                error!(key, error = %e, "vault read failed");
                return None;
            }
        };

        let master = match self.key_store.load_key(&self.key_alias) {
            Ok(Some(bytes)) => VaultKey::from_slice(&bytes).ok(),
            Ok(None) => None,
            Err(e) => {
                error!(key, error = %e, "vault key store unavailable");
                return None;
            }
        };

        let Some(master) = master else {
            warn!(key, "vault master key missing, regenerating; stored secret lost");
            if let Err(e) = self.regenerate_key() {
                error!(error = %e, "vault key regeneration failed");
            }
            self.discard(key);
            return None;
        };

        match crypto::open(&master, &sealed) {
            Ok(plaintext) => match String::from_utf8(plaintext) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(key, "vault value is not valid UTF-8, discarding");
                    self.discard(key);
                    None
                }
            },
            Err(e) => {
                warn!(key, error = %e, "vault value does not open, discarding");
                self.discard(key);
                None
            }
        }
    }

    /// Loads the master key, generating one if absent or unusable.
    fn master_key(&self) -> Result<VaultKey, VaultError> {
        if let Some(bytes) = self.key_store.load_key(&self.key_alias)? {
            if let Ok(key) = VaultKey::from_slice(&bytes) {
                return Ok(key);
            }
            warn!("vault master key has an invalid length, regenerating");
        }
        self.regenerate_key()
    }

    fn regenerate_key(&self) -> Result<VaultKey, VaultError> {
        let key = VaultKey::generate()?;
        self.key_store.save_key(&self.key_alias, key.as_bytes())?;
        Ok(key)
    }

    fn discard(&self, key: &str) {
        if let Err(e) = self.values.delete(key) {
            error!(key, error = %e, "failed to discard unreadable vault value");
        }
    }
}
