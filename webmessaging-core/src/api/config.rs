// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! API Configuration
//!
//! Configuration for a messaging client and the endpoints derived from it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::network::{KeepAlive, SocketConfig};

/// Configuration rejected by [`Configuration::validate`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("deployment id must not be empty")]
    MissingDeploymentId,

    #[error("domain must not be empty")]
    MissingDomain,

    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    #[error("reconnection interval must be greater than zero")]
    ZeroReconnectionInterval,

    #[error("history page size must be greater than zero")]
    ZeroPageSize,
}

/// Configuration for a [`MessagingClient`](super::MessagingClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Web messaging deployment id.
    pub deployment_id: String,

    /// Region domain, e.g. `mypurecloud.com`.
    pub domain: String,

    /// Client identifier sent as `application` and user agent.
    #[serde(default = "default_application")]
    pub application: String,

    /// Log every frame and HTTP request at debug level.
    #[serde(default)]
    pub log_requests: bool,

    /// Total time budget for reconnecting a dropped socket, in seconds.
    #[serde(default = "default_reconnection_timeout")]
    pub reconnection_timeout_secs: u64,

    /// Delay between reconnect attempts, in seconds.
    #[serde(default = "default_reconnection_interval")]
    pub reconnection_interval_secs: u64,

    /// Silently refresh an expired jwt with the stored refresh token.
    #[serde(default = "default_true")]
    pub auto_refresh_token_when_expired: bool,

    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    #[serde(default = "default_pong_interval")]
    pub pong_interval_secs: u64,

    #[serde(default = "default_page_size")]
    pub history_page_size: u32,

    /// Maximum messages kept in memory.
    #[serde(default = "default_history_limit")]
    pub message_history_limit: usize,

    /// Seconds before expiration at which the notice fires.
    #[serde(default = "default_notice_interval")]
    pub expiration_notice_interval_secs: u64,

    /// How long before the notice the keepalive health check is sent.
    #[serde(default = "default_pre_notice")]
    pub health_check_pre_notice_millis: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_application() -> String {
    format!("webmessaging-core/{}", env!("CARGO_PKG_VERSION"))
}

fn default_true() -> bool {
    true
}

fn default_reconnection_timeout() -> u64 {
    300
}

fn default_reconnection_interval() -> u64 {
    5
}

fn default_ping_interval() -> u64 {
    30
}

fn default_pong_interval() -> u64 {
    10
}

fn default_page_size() -> u32 {
    25
}

fn default_history_limit() -> usize {
    500
}

fn default_notice_interval() -> u64 {
    60
}

fn default_pre_notice() -> u64 {
    10_000
}

fn default_connect_timeout() -> u64 {
    30
}

impl Configuration {
    /// Creates a configuration with default tuning for a deployment.
    pub fn new(deployment_id: impl Into<String>, domain: impl Into<String>) -> Self {
        Configuration {
            deployment_id: deployment_id.into(),
            domain: domain.into(),
            application: default_application(),
            log_requests: false,
            reconnection_timeout_secs: default_reconnection_timeout(),
            reconnection_interval_secs: default_reconnection_interval(),
            auto_refresh_token_when_expired: true,
            ping_interval_secs: default_ping_interval(),
            pong_interval_secs: default_pong_interval(),
            history_page_size: default_page_size(),
            message_history_limit: default_history_limit(),
            expiration_notice_interval_secs: default_notice_interval(),
            health_check_pre_notice_millis: default_pre_notice(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }

    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.application = application.into();
        self
    }

    /// Enables frame and request logging.
    pub fn with_log_requests(mut self, enabled: bool) -> Self {
        self.log_requests = enabled;
        self
    }

    /// Sets the total reconnection budget and the per-attempt interval.
    pub fn with_reconnection(mut self, timeout_secs: u64, interval_secs: u64) -> Self {
        self.reconnection_timeout_secs = timeout_secs;
        self.reconnection_interval_secs = interval_secs;
        self
    }

    pub fn with_auto_refresh_token(mut self, enabled: bool) -> Self {
        self.auto_refresh_token_when_expired = enabled;
        self
    }

    pub fn with_keep_alive(mut self, ping_secs: u64, pong_secs: u64) -> Self {
        self.ping_interval_secs = ping_secs;
        self.pong_interval_secs = pong_secs;
        self
    }

    pub fn with_history_page_size(mut self, page_size: u32) -> Self {
        self.history_page_size = page_size;
        self
    }

    pub fn with_message_history_limit(mut self, limit: usize) -> Self {
        self.message_history_limit = limit;
        self
    }

    /// Sets the expiration notice lead and the health check lead before it.
    pub fn with_expiration_notice(mut self, notice_secs: u64, health_check_millis: u64) -> Self {
        self.expiration_notice_interval_secs = notice_secs;
        self.health_check_pre_notice_millis = health_check_millis;
        self
    }

    /// Checks that the configuration can produce working endpoints.
    ///
    /// A keepalive with ping <= pong is allowed; it is disabled with a
    /// warning when the socket opens.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deployment_id.trim().is_empty() {
            return Err(ConfigError::MissingDeploymentId);
        }
        if self.domain.trim().is_empty() {
            return Err(ConfigError::MissingDomain);
        }
        Url::parse(&format!("https://api.{}", self.domain))
            .map_err(|e| ConfigError::InvalidDomain(format!("{}: {}", self.domain, e)))?;
        if self.reconnection_interval_secs == 0 {
            return Err(ConfigError::ZeroReconnectionInterval);
        }
        if self.history_page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        Ok(())
    }

    /// `wss://webmessaging.<domain>/v1?deploymentId=<id>&application=<client>`
    pub fn web_socket_url(&self) -> Result<String, ConfigError> {
        let mut url = Url::parse(&format!("wss://webmessaging.{}/v1", self.domain))
            .map_err(|e| ConfigError::InvalidDomain(format!("{}: {}", self.domain, e)))?;
        url.query_pairs_mut()
            .append_pair("deploymentId", &self.deployment_id)
            .append_pair("application", &self.application);
        Ok(url.into())
    }

    pub fn api_base_url(&self) -> String {
        format!("https://api.{}", self.domain)
    }

    pub fn deployment_config_url(&self) -> String {
        format!(
            "https://api-cdn.{}/webdeployments/v1/deployments/{}/config.json",
            self.domain, self.deployment_id
        )
    }

    /// Value of the socket `Origin` header.
    pub fn origin(&self) -> String {
        format!("https://webmessaging.{}", self.domain)
    }

    pub fn keep_alive(&self) -> KeepAlive {
        let keep_alive = KeepAlive {
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            pong_interval: Duration::from_secs(self.pong_interval_secs),
        };
        if !keep_alive.is_active() {
            warn!(
                ping_secs = self.ping_interval_secs,
                pong_secs = self.pong_interval_secs,
                "ping interval must exceed pong interval, keepalive disabled"
            );
        }
        keep_alive
    }

    /// Socket settings for one lifecycle.
    pub fn socket_config(&self) -> Result<SocketConfig, ConfigError> {
        Ok(SocketConfig {
            url: self.web_socket_url()?,
            origin: self.origin(),
            keep_alive: self.keep_alive(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            ..SocketConfig::default()
        })
    }

    pub fn reconnection_timeout(&self) -> Duration {
        Duration::from_secs(self.reconnection_timeout_secs)
    }

    pub fn reconnection_interval(&self) -> Duration {
        Duration::from_secs(self.reconnection_interval_secs)
    }

    pub fn expiration_notice_interval(&self) -> Duration {
        Duration::from_secs(self.expiration_notice_interval_secs)
    }

    pub fn health_check_pre_notice(&self) -> Duration {
        Duration::from_millis(self.health_check_pre_notice_millis)
    }

    /// Timeout for HTTP side-channel calls.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_urls() {
        let config = Configuration::new("dep-1", "example.com").with_application("app");

        assert_eq!(
            config.web_socket_url().unwrap(),
            "wss://webmessaging.example.com/v1?deploymentId=dep-1&application=app"
        );
        assert_eq!(config.api_base_url(), "https://api.example.com");
        assert_eq!(
            config.deployment_config_url(),
            "https://api-cdn.example.com/webdeployments/v1/deployments/dep-1/config.json"
        );
        assert_eq!(config.origin(), "https://webmessaging.example.com");
    }

    #[test]
    fn test_validate() {
        assert_eq!(Configuration::new("dep", "example.com").validate(), Ok(()));
        assert_eq!(
            Configuration::new(" ", "example.com").validate(),
            Err(ConfigError::MissingDeploymentId)
        );
        assert_eq!(
            Configuration::new("dep", "").validate(),
            Err(ConfigError::MissingDomain)
        );
        assert_eq!(
            Configuration::new("dep", "example.com")
                .with_reconnection(300, 0)
                .validate(),
            Err(ConfigError::ZeroReconnectionInterval)
        );
    }

    #[test]
    fn test_inverted_keep_alive_is_not_an_error() {
        let config = Configuration::new("dep", "example.com").with_keep_alive(10, 30);
        assert_eq!(config.validate(), Ok(()));
        assert!(!config.keep_alive().is_active());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: Configuration =
            serde_json::from_str(r#"{"deploymentId":"dep","domain":"example.com"}"#).unwrap();
        assert_eq!(config.reconnection_timeout_secs, 300);
        assert_eq!(config.reconnection_interval_secs, 5);
        assert!(config.auto_refresh_token_when_expired);
        assert_eq!(config.history_page_size, 25);
    }
}
