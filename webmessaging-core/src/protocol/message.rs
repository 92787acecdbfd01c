// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Structured Message DTOs
//!
//! Chat messages and events as they appear on the wire. Shared by the
//! WebSocket `StructuredMessage` class and the history endpoint.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Message direction, in wire terms.
///
/// `Inbound` is inbound to the backend, i.e. sent by this client.
/// `Outbound` is sent by the agent or bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Kind of a structured message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Text,
    Event,
    Structured,
    #[serde(other)]
    Unknown,
}

/// Who produced an agent-side message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OriginatingEntity {
    Human,
    Bot,
    #[serde(other)]
    Unknown,
}

/// Sender details attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Channel block of a structured message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// ISO-8601 time assigned by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Participant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChannelMetadata>,
}

/// Custom attributes forwarded with a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMetadata {
    #[serde(default)]
    pub custom_attributes: HashMap<String, String>,
}

/// Attachment metadata inside message content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentContent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

/// One content item of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "contentType")]
pub enum Content {
    Attachment { attachment: AttachmentContent },
    #[serde(other)]
    Unsupported,
}

impl Content {
    /// References an uploaded attachment by id.
    pub fn attachment(id: impl Into<String>) -> Self {
        Content::Attachment {
            attachment: AttachmentContent {
                id: id.into(),
                ..Default::default()
            },
        }
    }
}

/// Typing indicator state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Typing {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

/// Presence event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenceType {
    Join,
    Disconnect,
    Clear,
    SignIn,
    SignOut,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    #[serde(rename = "type")]
    pub kind: PresenceType,
}

/// Event carried by an `Event` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum EventEntity {
    Typing { typing: Typing },
    Presence { presence: Presence },
    #[serde(other)]
    Unknown,
}

impl EventEntity {
    /// A typing "On" event.
    pub fn typing_on() -> Self {
        EventEntity::Typing {
            typing: Typing {
                kind: "On".to_string(),
                duration: None,
            },
        }
    }

    pub fn presence(kind: PresenceType) -> Self {
        EventEntity::Presence {
            presence: Presence { kind },
        }
    }
}

/// Metadata echoed back by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_message_id: Option<String>,
}

/// An inbound chat message or event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub text: Option<String>,
    pub direction: Direction,
    #[serde(default)]
    pub content: Vec<Content>,
    #[serde(default)]
    pub events: Vec<EventEntity>,
    #[serde(default)]
    pub metadata: Option<MessageMetadata>,
    #[serde(default)]
    pub originating_entity: Option<OriginatingEntity>,
}

impl StructuredMessage {
    /// Server time of the message, if present.
    pub fn time(&self) -> Option<&str> {
        self.channel.as_ref()?.time.as_deref()
    }

    pub fn custom_message_id(&self) -> Option<&str> {
        self.metadata.as_ref()?.custom_message_id.as_deref()
    }

    /// Attachment metadata carried in the content list.
    pub fn attachments(&self) -> impl Iterator<Item = &AttachmentContent> {
        self.content.iter().filter_map(|content| match content {
            Content::Attachment { attachment } => Some(attachment),
            Content::Unsupported => None,
        })
    }
}

/// One page of the history endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEntityList {
    #[serde(default)]
    pub entities: Vec<StructuredMessage>,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub page_number: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub page_count: u32,
}

impl MessageEntityList {
    /// True when no older page exists.
    pub fn is_last_page(&self, requested_size: u32) -> bool {
        (self.entities.len() as u32) < requested_size || self.page_number >= self.page_count
    }
}
