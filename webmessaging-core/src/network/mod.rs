// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network + Transport Layer
//!
//! Everything that talks to the backend.
//!
//! # Architecture
//!
//! The network layer consists of:
//! - **Socket trait**: Platform-agnostic interface for the messaging WebSocket
//! - **WebSocket transport**: tokio-tungstenite implementation with keepalive
//! - **Reconnection controller**: Retry budget and delayed reconnect attempts
//! - **HTTP side channels**: Auth, history, deployment config, push devices
//! - **Uploader**: Presigned attachment uploads with progress
//! - **Error taxonomy**: Host-facing error codes and corrective actions
//!
//! # Example
//!
//! ```ignore
//! use webmessaging_core::network::{MockSocket, ReconnectionHandler};
//!
//! let (socket, server) = MockSocket::new();
//! let mut reconnection = ReconnectionHandler::new(timeout, interval);
//! if reconnection.should_reconnect() {
//!     reconnection.reconnect(move || reopen());
//! }
//! ```

pub mod error;
pub mod http;
pub mod mock;
pub mod reconnection;
pub mod transport;
pub mod upload;
pub mod websocket;

// Error types
pub use error::{ApiError, CorrectiveAction, ErrorCode, ErrorInfo, NetworkError};

// HTTP side channels
pub use http::{AuthJwt, HttpApi, PushDeviceRequest, WebMessagingApi};

// Mock socket for testing
pub use mock::{MockSocket, MockSocketHandle};

// Reconnection
pub use reconnection::ReconnectionHandler;

// Socket abstraction
pub use transport::{
    KeepAlive, SocketConfig, SocketEvent, SocketListener, SocketSignal, SocketTransport,
};

// Attachment uploads
pub use upload::{percent, AttachmentUploader, HttpUploader, ProgressCallback, UPLOAD_CHUNK_SIZE};

// WebSocket transport for production
pub use websocket::WebSocketTransport;
