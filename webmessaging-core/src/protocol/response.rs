// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Inbound response/event envelopes.
//!
//! Every frame is `{type, class, code, body, tracingId?}`. `class` selects
//! the body schema; unknown classes decode to [`ServerMessage::Unknown`] so
//! new server events never break an old client.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ProtocolError;
use super::message::StructuredMessage;

/// Raw envelope before the body is interpreted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    #[serde(rename = "type", default)]
    kind: String,
    class: String,
    #[serde(default)]
    code: u16,
    #[serde(default)]
    body: Value,
    #[serde(default)]
    tracing_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub connected: bool,
    #[serde(default)]
    pub new_session: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub cleared_existing_session: bool,
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    /// Expiration time in epoch seconds.
    #[serde(default)]
    pub expiration_date: Option<u64>,
    #[serde(default)]
    pub allowed_media: Option<Value>,
    #[serde(default)]
    pub blocked_extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUrlResponse {
    pub attachment_id: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDeletedResponse {
    pub attachment_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSuccessEvent {
    pub attachment_id: String,
    pub download_url: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Body shared by `UploadFailureEvent` and `GenerateUrlError`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentFailure {
    pub attachment_id: String,
    pub error_code: u16,
    #[serde(default)]
    pub error_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtResponse {
    pub jwt: String,
    /// Expiration in epoch seconds.
    pub exp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TooManyRequestsErrorMessage {
    /// Seconds to wait before retrying.
    pub retry_after: u64,
    #[serde(default)]
    pub error_code: u16,
    #[serde(default)]
    pub error_message: String,
}

/// Decoded server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    SessionResponse(SessionResponse),
    StructuredMessage(StructuredMessage),
    PresignedUrl(PresignedUrlResponse),
    AttachmentDeleted(AttachmentDeletedResponse),
    UploadSuccess(UploadSuccessEvent),
    UploadFailure(AttachmentFailure),
    GenerateUrlError(AttachmentFailure),
    Jwt(JwtResponse),
    TooManyRequests(TooManyRequestsErrorMessage),
    ConnectionClosed,
    Logout,
    SessionExpired,
    SessionCleared,
    /// Plain string body with a success code.
    Text(String),
    /// Plain string body with an error code.
    Error { code: u16, message: String },
    /// A class this client does not understand.
    Unknown { class: String },
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// `response` or `message`.
    pub kind: String,
    pub code: u16,
    pub tracing_id: Option<String>,
    pub message: ServerMessage,
}

impl Envelope {
    /// Wire class of the decoded message, for logging.
    pub fn class(&self) -> &str {
        match &self.message {
            ServerMessage::SessionResponse(_) => "SessionResponse",
            ServerMessage::StructuredMessage(_) => "StructuredMessage",
            ServerMessage::PresignedUrl(_) => "PresignedUrlResponse",
            ServerMessage::AttachmentDeleted(_) => "AttachmentDeletedResponse",
            ServerMessage::UploadSuccess(_) => "UploadSuccessEvent",
            ServerMessage::UploadFailure(_) => "UploadFailureEvent",
            ServerMessage::GenerateUrlError(_) => "GenerateUrlError",
            ServerMessage::Jwt(_) => "JwtResponse",
            ServerMessage::TooManyRequests(_) => "TooManyRequestsErrorMessage",
            ServerMessage::ConnectionClosed => "ConnectionClosedEvent",
            ServerMessage::Logout => "LogoutEvent",
            ServerMessage::SessionExpired => "SessionExpiredEvent",
            ServerMessage::SessionCleared => "SessionClearedEvent",
            ServerMessage::Text(_) | ServerMessage::Error { .. } => "string",
            ServerMessage::Unknown { class } => class,
        }
    }
}

fn body<T: DeserializeOwned>(class: &str, body: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(body).map_err(|e| ProtocolError::InvalidBody {
        class: class.to_string(),
        reason: e.to_string(),
    })
}

/// Decodes one inbound text frame.
pub fn decode(text: &str) -> Result<Envelope, ProtocolError> {
    let raw: RawEnvelope =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let class = raw.class.as_str();
    let message = match class {
        "SessionResponse" => ServerMessage::SessionResponse(body(class, raw.body)?),
        "StructuredMessage" => ServerMessage::StructuredMessage(body(class, raw.body)?),
        "PresignedUrlResponse" => ServerMessage::PresignedUrl(body(class, raw.body)?),
        "AttachmentDeletedResponse" => ServerMessage::AttachmentDeleted(body(class, raw.body)?),
        "UploadSuccessEvent" => ServerMessage::UploadSuccess(body(class, raw.body)?),
        "UploadFailureEvent" => ServerMessage::UploadFailure(body(class, raw.body)?),
        "GenerateUrlError" => ServerMessage::GenerateUrlError(body(class, raw.body)?),
        "JwtResponse" => ServerMessage::Jwt(body(class, raw.body)?),
        "TooManyRequestsErrorMessage" => ServerMessage::TooManyRequests(body(class, raw.body)?),
        "ConnectionClosedEvent" => ServerMessage::ConnectionClosed,
        "LogoutEvent" => ServerMessage::Logout,
        "SessionExpiredEvent" => ServerMessage::SessionExpired,
        "SessionClearedEvent" => ServerMessage::SessionCleared,
        "string" => {
            let message = match raw.body {
                Value::String(text) => text,
                other => other.to_string(),
            };
            if raw.code >= 400 {
                ServerMessage::Error {
                    code: raw.code,
                    message,
                }
            } else {
                ServerMessage::Text(message)
            }
        }
        other => ServerMessage::Unknown {
            class: other.to_string(),
        },
    };

    Ok(Envelope {
        kind: raw.kind,
        code: raw.code,
        tracing_id: raw.tracing_id,
        message,
    })
}
