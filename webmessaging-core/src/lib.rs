// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Web Messaging Core Library
//!
//! Client-side session transport for web messaging: a resumable,
//! optionally authenticated WebSocket session with history, attachments
//! and push registration. Vault encryption uses the audited `ring` crate.

pub mod api;
pub mod auth;
pub mod crypto;
pub mod messaging;
pub mod network;
pub mod protocol;
pub mod push;
pub mod session;
pub mod storage;

pub use api::{
    ClientEvent, ClientState, ConfigError, Configuration, Event, EventHandler, MessageEvent,
    MessagingClient, MessagingClientBuilder, MessagingError, MessagingResult,
};
pub use auth::{AuthCredentials, AuthOutcome};
pub use messaging::{Attachment, AttachmentState, Message, MessageState};
pub use network::{
    ApiError, CorrectiveAction, ErrorCode, ErrorInfo, MockSocket, MockSocketHandle, NetworkError,
    SocketTransport, WebMessagingApi, WebSocketTransport,
};
pub use protocol::DeploymentConfig;
pub use push::{PushProvider, PushService};
pub use session::{Clock, ManualClock, SystemClock};
pub use storage::{Vault, VaultError};
