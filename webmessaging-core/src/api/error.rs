// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! API Error Types
//!
//! Unified error type for the messaging API layer.

use thiserror::Error;

use super::config::ConfigError;
use crate::network::{ApiError, ErrorCode, NetworkError};
use crate::protocol::ProtocolError;
use crate::storage::VaultError;

/// Unified error type for messaging operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessagingError {
    /// Socket operation failed.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// HTTP side channel failed.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// Vault operation failed.
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    /// Frame encoding or decoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration rejected.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid operation in current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("attachment not found: {0}")]
    AttachmentNotFound(String),

    /// The message references an attachment that is not uploaded yet.
    #[error("attachment not uploaded: {0}")]
    AttachmentNotUploaded(String),

    #[error("file too large: {size} bytes exceeds {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    /// No refresh token is stored.
    #[error("NoRefreshToken")]
    NoRefreshToken,

    /// Silent token refresh is disabled by configuration.
    #[error("AutoRefreshTokenDisabled")]
    AutoRefreshTokenDisabled,

    /// The operation needs an authenticated session.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The operation was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// The client actor is gone.
    #[error("client is shut down")]
    ClientShutDown,
}

impl MessagingError {
    /// Host-facing error code for this failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            MessagingError::Network(e) => e.error_code(),
            MessagingError::Api(ApiError::Status { code, .. }) => ErrorCode::from_code(*code),
            MessagingError::Api(ApiError::Cancelled) | MessagingError::Cancelled => {
                ErrorCode::CancellationError
            }
            MessagingError::AttachmentNotFound(_) => ErrorCode::AttachmentNotFound,
            MessagingError::AttachmentNotUploaded(_) => ErrorCode::AttachmentNotSuccessfullyUploaded,
            MessagingError::FileTooLarge { .. } => ErrorCode::FileSizeInvalid,
            MessagingError::NoRefreshToken | MessagingError::AutoRefreshTokenDisabled => {
                ErrorCode::RefreshAuthTokenFailure
            }
            _ => ErrorCode::UnexpectedError,
        }
    }
}

/// Result type for messaging operations.
pub type MessagingResult<T> = Result<T, MessagingError>;
