// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Push registration config and change detection.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Stored registrations older than this are refreshed.
pub const PUSH_CONFIG_EXPIRATION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Push notification provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushProvider {
    Apns,
    Fcm,
}

impl PushProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushProvider::Apns => "Apns",
            PushProvider::Fcm => "Fcm",
        }
    }
}

/// Registration last sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushConfig {
    /// Session token the device is registered under.
    pub token: String,
    pub device_token: String,
    pub preferred_language: String,
    /// Epoch milliseconds of the last successful sync.
    pub last_sync_timestamp: u64,
    pub device_type: String,
    pub push_provider: Option<PushProvider>,
}

impl PushConfig {
    /// The "never registered" config.
    pub fn empty() -> Self {
        PushConfig {
            token: String::new(),
            device_token: String::new(),
            preferred_language: String::new(),
            last_sync_timestamp: 0,
            device_type: String::new(),
            push_provider: None,
        }
    }

    pub fn is_registered(&self) -> bool {
        !self.token.is_empty()
    }
}

/// What changed between the stored and the fresh registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diff {
    None,
    /// Never registered.
    NoToken,
    /// The session token changed.
    Token,
    DeviceToken,
    Language,
    /// The stored registration is older than [`PUSH_CONFIG_EXPIRATION`].
    Expired,
}

/// Compares a fresh registration against the stored one.
pub struct PushConfigComparator {
    expiration: Duration,
}

impl Default for PushConfigComparator {
    fn default() -> Self {
        PushConfigComparator {
            expiration: PUSH_CONFIG_EXPIRATION,
        }
    }
}

impl PushConfigComparator {
    pub fn with_expiration(expiration: Duration) -> Self {
        PushConfigComparator { expiration }
    }

    pub fn compare(&self, fresh: &PushConfig, stored: &PushConfig) -> Diff {
        if !stored.is_registered() {
            Diff::NoToken
        } else if fresh.token != stored.token {
            Diff::Token
        } else if fresh.device_token != stored.device_token {
            Diff::DeviceToken
        } else if fresh.preferred_language != stored.preferred_language {
            Diff::Language
        } else if self.is_expired(stored.last_sync_timestamp, fresh.last_sync_timestamp) {
            Diff::Expired
        } else {
            Diff::None
        }
    }

    fn is_expired(&self, last_sync_millis: u64, now_millis: u64) -> bool {
        now_millis.saturating_sub(last_sync_millis) > self.expiration.as_millis() as u64
    }
}
