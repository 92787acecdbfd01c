// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Common Test Utilities
//!
//! Recording mocks for the HTTP side channels, an event log and frame
//! builders shared across integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use webmessaging_core::api::{ClientEvent, ClientState, Event, EventHandler};
use webmessaging_core::network::{
    ApiError, AttachmentUploader, AuthJwt, ProgressCallback, PushDeviceRequest, WebMessagingApi,
};
use webmessaging_core::protocol::{DeploymentConfig, MessageEntityList};

// ============================================================
// HTTP API mock
// ============================================================

/// One recorded side-channel call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Authorize { code: String },
    Refresh { refresh_token: String },
    Logout { jwt: String },
    History { jwt: String, page_number: u32, page_size: u32 },
    DeploymentConfig,
    RegisterDevice { token: String, request: PushDeviceRequest },
    UpdateDevice { token: String, request: PushDeviceRequest },
    DeleteDevice { token: String },
}

/// Scripted [`WebMessagingApi`]. Each endpoint answers from its queue and
/// falls back to a success response once the queue is empty.
#[derive(Default)]
pub struct MockApi {
    calls: Mutex<Vec<ApiCall>>,
    authorize: Mutex<VecDeque<Result<AuthJwt, ApiError>>>,
    refresh: Mutex<VecDeque<Result<AuthJwt, ApiError>>>,
    logout: Mutex<VecDeque<Result<(), ApiError>>>,
    history: Mutex<VecDeque<Result<MessageEntityList, ApiError>>>,
    deployment: Mutex<VecDeque<Result<DeploymentConfig, ApiError>>>,
    devices: Mutex<VecDeque<Result<(), ApiError>>>,
    delay: Mutex<Option<Duration>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(MockApi::default())
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn push_authorize(&self, response: Result<AuthJwt, ApiError>) {
        self.authorize.lock().push_back(response);
    }

    pub fn push_refresh(&self, response: Result<AuthJwt, ApiError>) {
        self.refresh.lock().push_back(response);
    }

    pub fn push_logout(&self, response: Result<(), ApiError>) {
        self.logout.lock().push_back(response);
    }

    pub fn push_history(&self, response: Result<MessageEntityList, ApiError>) {
        self.history.lock().push_back(response);
    }

    pub fn push_deployment(&self, response: Result<DeploymentConfig, ApiError>) {
        self.deployment.lock().push_back(response);
    }

    /// Shared by register, update and delete.
    pub fn push_device(&self, response: Result<(), ApiError>) {
        self.devices.lock().push_back(response);
    }

    /// Holds every auth response back for `delay`.
    pub fn set_auth_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().push(call);
    }

    async fn delayed(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl WebMessagingApi for MockApi {
    async fn authorize(
        &self,
        code: &str,
        _redirect_uri: &str,
        _code_verifier: Option<&str>,
    ) -> Result<AuthJwt, ApiError> {
        self.record(ApiCall::Authorize {
            code: code.to_string(),
        });
        self.delayed().await;
        self.authorize
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(auth_jwt("jwt-1", Some("refresh-1"))))
    }

    async fn refresh_auth_jwt(&self, refresh_token: &str) -> Result<AuthJwt, ApiError> {
        self.record(ApiCall::Refresh {
            refresh_token: refresh_token.to_string(),
        });
        self.delayed().await;
        self.refresh
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(auth_jwt("jwt-refreshed", None)))
    }

    async fn logout_from_authenticated_session(&self, jwt: &str) -> Result<(), ApiError> {
        self.record(ApiCall::Logout {
            jwt: jwt.to_string(),
        });
        self.delayed().await;
        self.logout.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn fetch_history(
        &self,
        jwt: &str,
        page_number: u32,
        page_size: u32,
    ) -> Result<MessageEntityList, ApiError> {
        self.record(ApiCall::History {
            jwt: jwt.to_string(),
            page_number,
            page_size,
        });
        self.history
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(MessageEntityList::default()))
    }

    async fn fetch_deployment_config(&self) -> Result<DeploymentConfig, ApiError> {
        self.record(ApiCall::DeploymentConfig);
        self.deployment
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(DeploymentConfig::default()))
    }

    async fn register_device(
        &self,
        token: &str,
        request: &PushDeviceRequest,
    ) -> Result<(), ApiError> {
        self.record(ApiCall::RegisterDevice {
            token: token.to_string(),
            request: request.clone(),
        });
        self.devices.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn update_device(&self, token: &str, request: &PushDeviceRequest) -> Result<(), ApiError> {
        self.record(ApiCall::UpdateDevice {
            token: token.to_string(),
            request: request.clone(),
        });
        self.devices.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn delete_device(&self, token: &str) -> Result<(), ApiError> {
        self.record(ApiCall::DeleteDevice {
            token: token.to_string(),
        });
        self.devices.lock().pop_front().unwrap_or(Ok(()))
    }
}

pub fn auth_jwt(jwt: &str, refresh_token: Option<&str>) -> AuthJwt {
    AuthJwt {
        jwt: jwt.to_string(),
        refresh_token: refresh_token.map(str::to_string),
    }
}

pub fn status(code: u16) -> ApiError {
    ApiError::Status {
        code,
        message: format!("status {}", code),
    }
}

// ============================================================
// Uploader mock
// ============================================================

/// Uploader that reports half and full progress, then succeeds. With
/// `hang` it never completes, so only cancellation ends the upload.
#[derive(Default)]
pub struct MockUploader {
    urls: Mutex<Vec<String>>,
    hang: bool,
}

impl MockUploader {
    pub fn new() -> Arc<Self> {
        Arc::new(MockUploader::default())
    }

    pub fn hanging() -> Arc<Self> {
        Arc::new(MockUploader {
            urls: Mutex::new(Vec::new()),
            hang: true,
        })
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl AttachmentUploader for MockUploader {
    async fn upload(
        &self,
        url: &str,
        _headers: &HashMap<String, String>,
        _bytes: Vec<u8>,
        progress: ProgressCallback,
    ) -> Result<(), ApiError> {
        self.urls.lock().push(url.to_string());
        if self.hang {
            std::future::pending::<()>().await;
        }
        progress(50);
        progress(100);
        Ok(())
    }
}

// ============================================================
// Event log
// ============================================================

/// Records every client event.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<ClientEvent>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(EventLog::default())
    }

    pub fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().clone()
    }

    /// New states, in order.
    pub fn states(&self) -> Vec<ClientState> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ClientEvent::StateChanged { new, .. } => Some(new.clone()),
                _ => None,
            })
            .collect()
    }

    /// Conversation events, in order.
    pub fn conversation_events(&self) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ClientEvent::Event(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventHandler for EventLog {
    fn on_event(&self, event: ClientEvent) {
        self.events.lock().push(event);
    }
}

/// Polls `condition` until it holds, yielding to the client actor.
pub async fn eventually(description: &str, condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", description);
}

// ============================================================
// Server frames
// ============================================================

pub fn session_response(read_only: bool) -> String {
    json!({
        "type": "response",
        "class": "SessionResponse",
        "code": 200,
        "body": {"connected": true, "newSession": true, "readOnly": read_only}
    })
    .to_string()
}

pub fn session_response_with_expiration(duration_seconds: u64, expiration_date: u64) -> String {
    json!({
        "type": "response",
        "class": "SessionResponse",
        "code": 200,
        "body": {
            "connected": true,
            "newSession": false,
            "durationSeconds": duration_seconds,
            "expirationDate": expiration_date
        }
    })
    .to_string()
}

pub fn string_response(code: u16, body: &str) -> String {
    json!({"type": "response", "class": "string", "code": code, "body": body}).to_string()
}

pub fn event_frame(class: &str) -> String {
    json!({"type": "message", "class": class, "code": 200, "body": {}}).to_string()
}

/// Server echo of a message this client sent.
pub fn echo_of(custom_message_id: &str, text: &str) -> String {
    json!({
        "type": "message",
        "class": "StructuredMessage",
        "code": 200,
        "body": {
            "id": "server-id",
            "type": "Text",
            "text": text,
            "direction": "Inbound",
            "channel": {"time": "2026-01-01T10:00:00.000Z"},
            "metadata": {"customMessageId": custom_message_id}
        }
    })
    .to_string()
}

/// An agent message.
pub fn agent_text(id: &str, text: &str) -> String {
    json!({
        "type": "message",
        "class": "StructuredMessage",
        "code": 200,
        "body": {
            "id": id,
            "type": "Text",
            "text": text,
            "direction": "Outbound",
            "channel": {"time": "2026-01-01T10:00:01.000Z"}
        }
    })
    .to_string()
}

pub fn agent_typing(duration_ms: u64) -> String {
    json!({
        "type": "message",
        "class": "StructuredMessage",
        "code": 200,
        "body": {
            "id": "typing-1",
            "type": "Event",
            "direction": "Outbound",
            "events": [{"eventType": "Typing", "typing": {"type": "On", "duration": duration_ms}}]
        }
    })
    .to_string()
}

pub fn presigned_url(attachment_id: &str) -> String {
    json!({
        "type": "response",
        "class": "PresignedUrlResponse",
        "code": 200,
        "body": {
            "attachmentId": attachment_id,
            "url": format!("https://uploads.example.com/{}", attachment_id),
            "headers": {"x-amz-tagging": "abc"}
        }
    })
    .to_string()
}

/// Answer to a `getAttachment` request.
pub fn download_url(attachment_id: &str, url: &str) -> String {
    json!({
        "type": "response",
        "class": "PresignedUrlResponse",
        "code": 200,
        "body": {"attachmentId": attachment_id, "url": url, "fileName": "photo.png"}
    })
    .to_string()
}

pub fn upload_success(attachment_id: &str) -> String {
    json!({
        "type": "message",
        "class": "UploadSuccessEvent",
        "code": 200,
        "body": {
            "attachmentId": attachment_id,
            "downloadUrl": format!("https://cdn.example.com/{}", attachment_id)
        }
    })
    .to_string()
}

pub fn jwt_response(jwt: &str, exp: u64) -> String {
    json!({
        "type": "response",
        "class": "JwtResponse",
        "code": 200,
        "body": {"jwt": jwt, "exp": exp}
    })
    .to_string()
}
