// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Push Service
//!
//! Keeps the backend push device registration in sync with the device
//! token and language, touching the backend only when something changed.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::config::{Diff, PushConfig, PushConfigComparator, PushProvider};
use crate::api::error::{MessagingError, MessagingResult};
use crate::network::{ApiError, PushDeviceRequest, WebMessagingApi};
use crate::session::Clock;
use crate::storage::{keys, Vault};

pub struct PushService {
    api: Arc<dyn WebMessagingApi>,
    vault: Arc<Vault>,
    clock: Arc<dyn Clock>,
    device_type: String,
    comparator: PushConfigComparator,
}

impl PushService {
    pub fn new(
        api: Arc<dyn WebMessagingApi>,
        vault: Arc<Vault>,
        clock: Arc<dyn Clock>,
        device_type: impl Into<String>,
    ) -> Self {
        PushService {
            api,
            vault,
            clock,
            device_type: device_type.into(),
            comparator: PushConfigComparator::default(),
        }
    }

    /// Registration last synced with the backend.
    pub fn stored_config(&self) -> PushConfig {
        self.vault
            .fetch(keys::PUSH_CONFIG)
            .and_then(|json| match serde_json::from_str(&json) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!(error = %e, "stored push config unreadable, treating as unregistered");
                    None
                }
            })
            .unwrap_or_else(PushConfig::empty)
    }

    /// Registers or updates the device if anything changed.
    pub async fn synchronize(
        &self,
        device_token: &str,
        provider: PushProvider,
        preferred_language: &str,
    ) -> MessagingResult<Diff> {
        let fresh = PushConfig {
            token: self.vault.token()?,
            device_token: device_token.to_string(),
            preferred_language: preferred_language.to_string(),
            last_sync_timestamp: self.clock.now_millis(),
            device_type: self.device_type.clone(),
            push_provider: Some(provider),
        };
        let stored = self.stored_config();
        let diff = self.comparator.compare(&fresh, &stored);
        debug!(?diff, "push config compared");

        match diff {
            Diff::None => return Ok(diff),
            Diff::NoToken => self.register(&fresh).await?,
            Diff::Token => {
                self.delete_stale(&stored).await;
                self.register(&fresh).await?;
            }
            Diff::DeviceToken | Diff::Language | Diff::Expired => {
                let update = PushDeviceRequest {
                    device_token: Some(fresh.device_token.clone()),
                    notification_provider: None,
                    language: fresh.preferred_language.clone(),
                    device_type: None,
                };
                match self.api.update_device(&fresh.token, &update).await {
                    Ok(()) => {}
                    Err(ApiError::Status { code: 404, .. }) => {
                        info!("push device unknown to backend, registering again");
                        self.register(&fresh).await?;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        self.store(&fresh)?;
        Ok(diff)
    }

    /// Deletes the device registration.
    pub async fn unregister(&self) -> MessagingResult<()> {
        let stored = self.stored_config();
        if !stored.is_registered() {
            return Ok(());
        }
        match self.api.delete_device(&stored.token).await {
            Ok(()) | Err(ApiError::Status { code: 404, .. }) => {}
            Err(e) => return Err(e.into()),
        }
        self.vault.remove(keys::PUSH_CONFIG)?;
        Ok(())
    }

    /// Drops the registration held by a previous session token. A failure
    /// only leaves a stale entry behind until the backend expires it.
    async fn delete_stale(&self, stored: &PushConfig) {
        match self.api.delete_device(&stored.token).await {
            Ok(()) | Err(ApiError::Status { code: 404, .. }) => {}
            Err(e) => warn!(error = %e, "failed to delete stale push registration"),
        }
    }

    async fn register(&self, config: &PushConfig) -> Result<(), ApiError> {
        let request = PushDeviceRequest {
            device_token: Some(config.device_token.clone()),
            notification_provider: config.push_provider.map(|p| p.as_str().to_string()),
            language: config.preferred_language.clone(),
            device_type: Some(config.device_type.clone()),
        };
        self.api.register_device(&config.token, &request).await
    }

    fn store(&self, config: &PushConfig) -> MessagingResult<()> {
        let json = serde_json::to_string(config)
            .map_err(|e| MessagingError::InvalidState(format!("push config: {}", e)))?;
        self.vault.store(keys::PUSH_CONFIG, &json)?;
        Ok(())
    }
}
