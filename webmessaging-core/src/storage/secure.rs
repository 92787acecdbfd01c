// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Secure Key Storage
//!
//! The vault master key never leaves platform secure storage: the Android
//! Keystore, the iOS Keychain, or a desktop secret service. Each platform is
//! one implementation of [`KeyStore`]; the vault itself is written once
//! against the trait.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::error::VaultError;

/// Trait for platform-backed storage of key material.
///
/// Implementations should use platform-native secure storage when available:
/// - iOS / macOS: Keychain
/// - Android: Keystore (through the host's JNI shim)
/// - Linux: Secret Service
pub trait KeyStore: Send + Sync {
    /// Saves key material under `alias`.
    fn save_key(&self, alias: &str, key: &[u8]) -> Result<(), VaultError>;

    /// Loads key material.
    /// Returns None if the alias doesn't exist.
    fn load_key(&self, alias: &str) -> Result<Option<Vec<u8>>, VaultError>;

    /// Deletes key material. Deleting a missing alias is not an error.
    fn delete_key(&self, alias: &str) -> Result<(), VaultError>;

    /// Checks if an alias exists.
    fn has_key(&self, alias: &str) -> Result<bool, VaultError> {
        Ok(self.load_key(alias)?.is_some())
    }
}

/// Platform keyring implementation using the `keyring` crate.
/// Available when the `secure-storage` feature is enabled.
#[cfg(feature = "secure-storage")]
pub struct PlatformKeyring {
    service: String,
}

#[cfg(feature = "secure-storage")]
impl PlatformKeyring {
    /// Creates a new platform keyring accessor.
    ///
    /// # Arguments
    /// * `service` - The service name to use for keychain entries (e.g., "webmessaging")
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, alias: &str) -> Result<keyring::Entry, VaultError> {
        keyring::Entry::new(&self.service, alias)
            .map_err(|e| VaultError::KeyStore(format!("Keyring error: {}", e)))
    }
}

#[cfg(feature = "secure-storage")]
impl KeyStore for PlatformKeyring {
    fn save_key(&self, alias: &str, key: &[u8]) -> Result<(), VaultError> {
        self.entry(alias)?
            .set_secret(key)
            .map_err(|e| VaultError::KeyStore(format!("Failed to save to keychain: {}", e)))
    }

    fn load_key(&self, alias: &str) -> Result<Option<Vec<u8>>, VaultError> {
        match self.entry(alias)?.get_secret() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(VaultError::KeyStore(format!(
                "Failed to load from keychain: {}",
                e
            ))),
        }
    }

    fn delete_key(&self, alias: &str) -> Result<(), VaultError> {
        match self.entry(alias)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already deleted
            Err(e) => Err(VaultError::KeyStore(format!(
                "Failed to delete from keychain: {}",
                e
            ))),
        }
    }
}

/// In-memory key store.
///
/// Used by tests and by hosts that hand the SDK a process-lifetime key.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn save_key(&self, alias: &str, key: &[u8]) -> Result<(), VaultError> {
        self.keys.lock().insert(alias.to_string(), key.to_vec());
        Ok(())
    }

    fn load_key(&self, alias: &str) -> Result<Option<Vec<u8>>, VaultError> {
        Ok(self.keys.lock().get(alias).cloned())
    }

    fn delete_key(&self, alias: &str) -> Result<(), VaultError> {
        self.keys.lock().remove(alias);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_save_load() {
        let store = MemoryKeyStore::new();
        store.save_key("master", &[1, 2, 3]).unwrap();
        assert_eq!(store.load_key("master").unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_memory_store_missing_alias() {
        let store = MemoryKeyStore::new();
        assert_eq!(store.load_key("nonexistent").unwrap(), None);
        assert!(!store.has_key("nonexistent").unwrap());
    }

    #[test]
    fn test_memory_store_delete_is_idempotent() {
        let store = MemoryKeyStore::new();
        store.save_key("master", &[9]).unwrap();
        store.delete_key("master").unwrap();
        store.delete_key("master").unwrap();
        assert!(!store.has_key("master").unwrap());
    }

    #[cfg(feature = "secure-storage")]
    mod keyring_tests {
        use super::*;

        #[test]
        #[ignore = "Requires system keychain (desktop session)"]
        fn test_platform_keyring_save_load() {
            let store = PlatformKeyring::new("webmessaging-test-unit");
            let _ = store.delete_key("vault_key_test");

            store.save_key("vault_key_test", &[0x42; 32]).unwrap();
            assert_eq!(
                store.load_key("vault_key_test").unwrap(),
                Some(vec![0x42; 32])
            );

            store.delete_key("vault_key_test").unwrap();
        }
    }
}
