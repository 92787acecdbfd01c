// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod encryption;

pub use encryption::{open, seal, EncryptionError, VaultKey, IV_SEPARATOR, IV_SIZE};
