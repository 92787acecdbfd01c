// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network Error Types
//!
//! The closed [`ErrorCode`] taxonomy surfaced to hosts, the matching
//! [`CorrectiveAction`] hints, and the transport-level [`NetworkError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes surfaced to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    FeatureUnavailable,
    FileTypeInvalid,
    FileSizeInvalid,
    FileContentInvalid,
    FileNameInvalid,
    FileNameTooLong,
    SessionHasExpired,
    SessionNotFound,
    AttachmentHasExpired,
    AttachmentNotFound,
    AttachmentNotSuccessfullyUploaded,
    MessageTooLong,
    MissingParameter,
    RequestRateTooHigh,
    UnexpectedError,
    WebsocketError,
    WebsocketAccessDenied,
    WebsocketHandshakeFailure,
    NetworkDisabled,
    CancellationError,
    AuthFailed,
    AuthLogoutFailed,
    RefreshAuthTokenFailure,
    HistoryFetchFailure,
    ClearConversationFailure,
    DeploymentConfigFetchFailure,
    PushRegistrationFailure,
    RedirectResponseError(u16),
    ClientResponseError(u16),
    ServerResponseError(u16),
}

impl ErrorCode {
    /// Maps a server or HTTP status code onto the taxonomy.
    pub fn from_code(code: u16) -> Self {
        match code {
            4001 => ErrorCode::FeatureUnavailable,
            4002 => ErrorCode::FileTypeInvalid,
            4003 => ErrorCode::FileSizeInvalid,
            4004 => ErrorCode::FileContentInvalid,
            4005 => ErrorCode::FileNameInvalid,
            4006 => ErrorCode::FileNameTooLong,
            4007 => ErrorCode::SessionHasExpired,
            4008 => ErrorCode::SessionNotFound,
            4009 => ErrorCode::AttachmentHasExpired,
            4010 => ErrorCode::AttachmentNotFound,
            4011 => ErrorCode::AttachmentNotSuccessfullyUploaded,
            4013 => ErrorCode::MessageTooLong,
            4020 => ErrorCode::MissingParameter,
            4029 => ErrorCode::RequestRateTooHigh,
            5000 => ErrorCode::UnexpectedError,
            300..=399 => ErrorCode::RedirectResponseError(code),
            400..=499 => ErrorCode::ClientResponseError(code),
            500..=599 => ErrorCode::ServerResponseError(code),
            _ => ErrorCode::UnexpectedError,
        }
    }

    /// Numeric code carried by status-style variants.
    pub fn status(&self) -> Option<u16> {
        match self {
            ErrorCode::RedirectResponseError(code)
            | ErrorCode::ClientResponseError(code)
            | ErrorCode::ServerResponseError(code) => Some(*code),
            _ => None,
        }
    }

    /// True for errors caused by an expired or rejected credential.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ErrorCode::ClientResponseError(401))
    }
}

/// Hint telling the host how to recover from an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorrectiveAction {
    BadRequest,
    Forbidden,
    NotFound,
    RequestTimeOut,
    TooManyRequests,
    ReAuthenticate,
    Reconnect,
    Unknown,
}

impl CorrectiveAction {
    /// Picks the corrective action for an HTTP-style status code.
    pub fn from_code(code: u16) -> Self {
        match code {
            400 => CorrectiveAction::BadRequest,
            401 => CorrectiveAction::ReAuthenticate,
            403 => CorrectiveAction::Forbidden,
            404 => CorrectiveAction::NotFound,
            408 => CorrectiveAction::RequestTimeOut,
            429 | 4029 => CorrectiveAction::TooManyRequests,
            _ => CorrectiveAction::Unknown,
        }
    }
}

/// Error codes paired with a message and recovery hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: Option<String>,
    pub corrective_action: CorrectiveAction,
}

impl ErrorInfo {
    pub fn new(
        code: ErrorCode,
        message: impl Into<Option<String>>,
        corrective_action: CorrectiveAction,
    ) -> Self {
        ErrorInfo {
            code,
            message: message.into(),
            corrective_action,
        }
    }
}

/// Transport-level errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Handshake rejected with HTTP status {0}")]
    HandshakeRejected(u16),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection timeout")]
    Timeout,

    #[error("Transport not connected")]
    NotConnected,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl NetworkError {
    /// Maps the failure onto the host-facing taxonomy.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            NetworkError::HandshakeRejected(401 | 403) => ErrorCode::WebsocketAccessDenied,
            NetworkError::HandshakeRejected(_) => ErrorCode::WebsocketHandshakeFailure,
            _ => ErrorCode::WebsocketError,
        }
    }

    /// False for failures that another attempt cannot fix.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, NetworkError::HandshakeRejected(401 | 403))
    }
}

/// Outcome of a failed HTTP side-channel call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response: {0}")]
    Parse(String),
}

impl ApiError {
    /// HTTP status, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            ApiError::Status {
                code: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            ApiError::Parse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}
