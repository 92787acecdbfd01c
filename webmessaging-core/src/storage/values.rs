// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Persistent value backends for the vault.
//!
//! Backends only ever see sealed (already encrypted) strings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use parking_lot::Mutex;

use super::error::VaultError;

/// Storage for sealed vault values.
pub trait ValueStore: Send + Sync {
    /// Reads a sealed value. Returns None if the key doesn't exist.
    fn read(&self, key: &str) -> Result<Option<String>, VaultError>;

    /// Writes a sealed value, replacing any previous one.
    fn write(&self, key: &str, value: &str) -> Result<(), VaultError>;

    /// Deletes a value. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), VaultError>;
}

/// File-based value storage, one file per key.
///
/// File names are the base64url encoding of the key, so distinct keys never
/// share a file and no key can escape the directory.
pub struct FileValueStore {
    path: PathBuf,
}

impl FileValueStore {
    /// Creates a new file-based value store rooted at `path`.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn value_file_path(&self, key: &str) -> PathBuf {
        self.path
            .join(format!("{}.vault", URL_SAFE_NO_PAD.encode(key.as_bytes())))
    }
}

/// Atomic file write (write to temp, then rename)
///
/// Either the old value remains or the new one is fully written.
fn atomic_write(path: &Path, data: &str) -> std::io::Result<()> {
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, data)?;
    std::fs::rename(&temp_path, path)
}

impl ValueStore for FileValueStore {
    fn read(&self, key: &str) -> Result<Option<String>, VaultError> {
        let file_path = self.value_file_path(key);
        if !file_path.exists() {
            return Ok(None);
        }

        std::fs::read_to_string(&file_path)
            .map(Some)
            .map_err(|e| VaultError::Persistence(format!("Failed to read value file: {}", e)))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), VaultError> {
        std::fs::create_dir_all(&self.path)
            .map_err(|e| VaultError::Persistence(format!("Failed to create directory: {}", e)))?;

        atomic_write(&self.value_file_path(key), value)
            .map_err(|e| VaultError::Persistence(format!("Failed to write value file: {}", e)))
    }

    fn delete(&self, key: &str) -> Result<(), VaultError> {
        let file_path = self.value_file_path(key);
        if file_path.exists() {
            std::fs::remove_file(&file_path).map_err(|e| {
                VaultError::Persistence(format!("Failed to delete value file: {}", e))
            })?;
        }
        Ok(())
    }
}

/// In-memory value storage.
#[derive(Default)]
pub struct MemoryValueStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a raw sealed value, bypassing the vault.
    pub fn put_raw(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }

    /// Returns the raw sealed value as persisted.
    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }
}

impl ValueStore for MemoryValueStore {
    fn read(&self, key: &str) -> Result<Option<String>, VaultError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), VaultError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), VaultError> {
        self.values.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_write_read_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileValueStore::new(temp_dir.path().to_path_buf());

        store.write("token", "c2VhbGVk").unwrap();
        assert_eq!(store.read("token").unwrap(), Some("c2VhbGVk".to_string()));

        store.delete("token").unwrap();
        assert_eq!(store.read("token").unwrap(), None);
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_file_store_path_traversal_prevented() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("vault");
        let store = FileValueStore::new(root.clone());

        store.write("../../etc/passwd", "x").unwrap();

        assert_eq!(file_names(temp_dir.path()), vec!["vault".to_string()]);
        assert_eq!(file_names(&root).len(), 1);
        assert_eq!(store.read("../../etc/passwd").unwrap(), Some("x".to_string()));
    }

    #[test]
    fn test_file_store_keys_do_not_collide() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileValueStore::new(temp_dir.path().to_path_buf());

        store.write("a.b", "dot").unwrap();
        store.write("a_b", "underscore").unwrap();
        store.write("", "empty").unwrap();

        assert_eq!(store.read("a.b").unwrap(), Some("dot".to_string()));
        assert_eq!(store.read("a_b").unwrap(), Some("underscore".to_string()));
        assert_eq!(store.read("").unwrap(), Some("empty".to_string()));
    }

    #[test]
    fn test_file_store_write_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileValueStore::new(temp_dir.path().to_path_buf());

        store.write("token", "first").unwrap();
        store.write("token", "second").unwrap();

        assert_eq!(store.read("token").unwrap(), Some("second".to_string()));
        let names = file_names(temp_dir.path());
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".vault"));
    }

    #[test]
    fn test_file_store_missing_directory_reads_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileValueStore::new(temp_dir.path().join("not-created-yet"));
        assert_eq!(store.read("token").unwrap(), None);
        store.delete("token").unwrap();
    }
}
