// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Vault storage: sealed values, platform key storage and the vault itself.

pub mod error;
pub mod secure;
pub mod values;
pub mod vault;

pub use error::VaultError;
#[cfg(feature = "secure-storage")]
pub use secure::PlatformKeyring;
pub use secure::{KeyStore, MemoryKeyStore};
pub use values::{FileValueStore, MemoryValueStore, ValueStore};
pub use vault::{keys, Vault, DEFAULT_KEY_ALIAS};
