// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! HTTP Side Channels
//!
//! Auth token exchange, history paging, deployment config and push device
//! registration. All authenticated calls send `Authorization: bearer <jwt>`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ApiError;
use crate::protocol::{DeploymentConfig, MessageEntityList};

/// Credentials returned by the token endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthJwt {
    pub jwt: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Body of a push device registration or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushDeviceRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_provider: Option<String>,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OAuthParams<'a> {
    code: &'a str,
    redirect_uri: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code_verifier: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JwtExchangeRequest<'a> {
    deployment_id: &'a str,
    oauth: OAuthParams<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Backend HTTP API used by the client.
#[async_trait]
pub trait WebMessagingApi: Send + Sync {
    /// Exchanges an OAuth PKCE code for a jwt and refresh token.
    async fn authorize(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<AuthJwt, ApiError>;

    /// Obtains a fresh jwt for a refresh token.
    async fn refresh_auth_jwt(&self, refresh_token: &str) -> Result<AuthJwt, ApiError>;

    /// Revokes the authenticated session.
    async fn logout_from_authenticated_session(&self, jwt: &str) -> Result<(), ApiError>;

    /// Fetches one page of conversation history, newest first.
    async fn fetch_history(
        &self,
        jwt: &str,
        page_number: u32,
        page_size: u32,
    ) -> Result<MessageEntityList, ApiError>;

    async fn fetch_deployment_config(&self) -> Result<DeploymentConfig, ApiError>;

    async fn register_device(&self, token: &str, request: &PushDeviceRequest)
        -> Result<(), ApiError>;

    async fn update_device(&self, token: &str, request: &PushDeviceRequest)
        -> Result<(), ApiError>;

    async fn delete_device(&self, token: &str) -> Result<(), ApiError>;
}

/// reqwest implementation of [`WebMessagingApi`].
pub struct HttpApi {
    client: Client,
    api_base_url: String,
    deployment_config_url: String,
    deployment_id: String,
    log_requests: bool,
}

impl HttpApi {
    /// Creates a client against `api_base_url` (e.g. `https://api.example.com`).
    pub fn new(
        api_base_url: impl Into<String>,
        deployment_config_url: impl Into<String>,
        deployment_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!(
                "WebMessaging/{}",
                option_env!("CARGO_PKG_VERSION").unwrap_or("0.1.0")
            ))
            .build()?;

        Ok(HttpApi {
            client,
            api_base_url: api_base_url.into(),
            deployment_config_url: deployment_config_url.into(),
            deployment_id: deployment_id.into(),
            log_requests: false,
        })
    }

    /// Enables debug logging of request paths and statuses.
    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.log_requests = enabled;
        self
    }

    fn token_url(&self, path: &str) -> String {
        format!("{}/api/v2/webdeployments/token/{}", self.api_base_url, path)
    }

    fn push_device_url(&self, token: &str) -> String {
        format!(
            "{}/api/v2/webmessaging/deployments/{}/pushdevices/{}",
            self.api_base_url, self.deployment_id, token
        )
    }

    async fn execute(&self, label: &str, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if self.log_requests {
            debug!(request = label, status = status.as_u16(), "HTTP response");
        }
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            code: status.as_u16(),
            message,
        })
    }
}

fn bearer(jwt: &str) -> String {
    format!("bearer {}", jwt)
}

#[async_trait]
impl WebMessagingApi for HttpApi {
    async fn authorize(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<AuthJwt, ApiError> {
        let body = JwtExchangeRequest {
            deployment_id: &self.deployment_id,
            oauth: OAuthParams {
                code,
                redirect_uri,
                code_verifier,
            },
        };
        let request = self
            .client
            .post(self.token_url("oauthcodegrantjwtexchange"))
            .json(&body);
        Ok(self.execute("authorize", request).await?.json().await?)
    }

    async fn refresh_auth_jwt(&self, refresh_token: &str) -> Result<AuthJwt, ApiError> {
        let request = self
            .client
            .post(self.token_url("refresh"))
            .json(&RefreshRequest { refresh_token });
        Ok(self.execute("refresh", request).await?.json().await?)
    }

    async fn logout_from_authenticated_session(&self, jwt: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .delete(self.token_url("revoke"))
            .header(reqwest::header::AUTHORIZATION, bearer(jwt));
        self.execute("logout", request).await?;
        Ok(())
    }

    async fn fetch_history(
        &self,
        jwt: &str,
        page_number: u32,
        page_size: u32,
    ) -> Result<MessageEntityList, ApiError> {
        let request = self
            .client
            .get(format!("{}/api/v2/webmessaging/messages", self.api_base_url))
            .query(&[("pageNumber", page_number), ("pageSize", page_size)])
            .header(reqwest::header::AUTHORIZATION, bearer(jwt));
        Ok(self.execute("history", request).await?.json().await?)
    }

    async fn fetch_deployment_config(&self) -> Result<DeploymentConfig, ApiError> {
        let request = self.client.get(&self.deployment_config_url);
        Ok(self.execute("deployment_config", request).await?.json().await?)
    }

    async fn register_device(
        &self,
        token: &str,
        request: &PushDeviceRequest,
    ) -> Result<(), ApiError> {
        let http = self.client.post(self.push_device_url(token)).json(request);
        self.execute("register_device", http).await?;
        Ok(())
    }

    async fn update_device(&self, token: &str, request: &PushDeviceRequest) -> Result<(), ApiError> {
        let http = self.client.patch(self.push_device_url(token)).json(request);
        self.execute("update_device", http).await?;
        Ok(())
    }

    async fn delete_device(&self, token: &str) -> Result<(), ApiError> {
        let http = self.client.delete(self.push_device_url(token));
        self.execute("delete_device", http).await?;
        Ok(())
    }
}
