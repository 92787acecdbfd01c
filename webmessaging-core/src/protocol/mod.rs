// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Wire Protocol
//!
//! JSON envelopes exchanged over the messaging WebSocket:
//! - **Requests**: `{token, action, ...}` built by [`Request`]
//! - **Responses/events**: `{type, class, code, body}` decoded by [`decode`]
//! - **Structured messages**: chat payloads shared with the history endpoint
//! - **Deployment config**: the CDN-hosted deployment document

pub mod deployment;
pub mod error;
pub mod message;
pub mod request;
pub mod response;

pub use deployment::{DeploymentConfig, FileUpload, FileUploadMode, Messenger};
pub use error::ProtocolError;
pub use message::{
    AttachmentContent, Channel, ChannelMetadata, Content, Direction, EventEntity,
    MessageEntityList, MessageMetadata, MessageType, OriginatingEntity, Participant, Presence,
    PresenceType, StructuredMessage, Typing,
};
pub use request::{OutboundMessage, Request, HEALTH_CHECK_ID, HEALTH_CHECK_TEXT};
pub use response::{
    decode, AttachmentDeletedResponse, AttachmentFailure, Envelope, JwtResponse,
    PresignedUrlResponse, ServerMessage, SessionResponse, TooManyRequestsErrorMessage,
    UploadSuccessEvent,
};
