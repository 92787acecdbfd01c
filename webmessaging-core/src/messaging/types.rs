// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Message and attachment model.

use std::collections::HashMap;

use crate::network::ErrorCode;
use crate::protocol::{Direction, MessageType, Participant, StructuredMessage};

/// Delivery state of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageState {
    Idle,
    Sending,
    Sent,
    Delivered,
    Read,
    Error {
        code: ErrorCode,
        message: Option<String>,
    },
}

/// Lifecycle of one attachment.
///
/// `Presigning -> Uploading -> Uploaded -> Sent`, with `Detaching ->
/// Detached` reachable from `Uploaded`/`Sent`. `Detached` and `Error` are
/// terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentState {
    Presigning,
    /// Upload progress in percent.
    Uploading(u8),
    /// Uploaded, with the download URL.
    Uploaded(String),
    /// Referenced by a delivered message.
    Sent(String),
    Detaching,
    Detached,
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl AttachmentState {
    /// True once no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttachmentState::Detached | AttachmentState::Error { .. })
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: &AttachmentState) -> bool {
        use AttachmentState::*;
        match (self, next) {
            (_, Error { .. }) => !self.is_terminal(),
            (Presigning, Uploading(_)) => true,
            (Uploading(from), Uploading(to)) => to >= from,
            (Uploading(_), Uploaded(_)) => true,
            (Uploaded(_), Sent(_)) => true,
            (Uploaded(_) | Sent(_), Detaching) => true,
            (Detaching, Detached) => true,
            _ => false,
        }
    }

    /// Download URL once uploaded.
    pub fn url(&self) -> Option<&str> {
        match self {
            AttachmentState::Uploaded(url) | AttachmentState::Sent(url) => Some(url),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: Option<String>,
    pub state: AttachmentState,
}

impl Attachment {
    pub fn new(id: impl Into<String>, file_name: impl Into<String>, file_size: u64) -> Self {
        Attachment {
            id: id.into(),
            file_name: file_name.into(),
            file_size,
            mime_type: None,
            state: AttachmentState::Presigning,
        }
    }
}

/// A chat message as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub direction: Direction,
    pub state: MessageState,
    pub kind: MessageType,
    pub text: Option<String>,
    /// ISO-8601 server time, absent until the server has seen the message.
    pub timestamp: Option<String>,
    pub attachments: HashMap<String, Attachment>,
    pub from: Option<Participant>,
}

impl Message {
    /// An empty outgoing message.
    pub fn outgoing(id: impl Into<String>) -> Self {
        Message {
            id: id.into(),
            direction: Direction::Inbound,
            state: MessageState::Idle,
            kind: MessageType::Text,
            text: None,
            timestamp: None,
            attachments: HashMap::new(),
            from: None,
        }
    }

    /// Ids of attachments in the given predicate.
    pub fn attachment_ids_where(&self, predicate: impl Fn(&AttachmentState) -> bool) -> Vec<String> {
        let mut ids: Vec<String> = self
            .attachments
            .values()
            .filter(|attachment| predicate(&attachment.state))
            .map(|attachment| attachment.id.clone())
            .collect();
        ids.sort();
        ids
    }
}

impl From<&StructuredMessage> for Message {
    fn from(structured: &StructuredMessage) -> Self {
        let attachments = structured
            .attachments()
            .map(|content| {
                let url = content.url.clone().unwrap_or_default();
                let attachment = Attachment {
                    id: content.id.clone(),
                    file_name: content.filename.clone().unwrap_or_default(),
                    file_size: content.file_size.unwrap_or(0),
                    mime_type: content.mime.clone(),
                    state: AttachmentState::Sent(url),
                };
                (attachment.id.clone(), attachment)
            })
            .collect();

        Message {
            id: structured
                .custom_message_id()
                .map(str::to_string)
                .unwrap_or_else(|| structured.id.clone()),
            direction: structured.direction,
            state: MessageState::Sent,
            kind: structured.kind,
            text: structured.text.clone(),
            timestamp: structured.time().map(str::to_string),
            attachments,
            from: structured.channel.as_ref().and_then(|c| c.from.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            AttachmentState::Presigning,
            AttachmentState::Uploading(0),
            AttachmentState::Uploading(40),
            AttachmentState::Uploading(100),
            AttachmentState::Uploaded("u".into()),
            AttachmentState::Sent("u".into()),
            AttachmentState::Detaching,
            AttachmentState::Detached,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(&pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_illegal_transitions() {
        let error = AttachmentState::Error {
            code: ErrorCode::FileSizeInvalid,
            message: "too big".into(),
        };
        assert!(!AttachmentState::Presigning.can_transition_to(&AttachmentState::Uploaded("u".into())));
        assert!(!AttachmentState::Uploading(50).can_transition_to(&AttachmentState::Uploading(10)));
        assert!(!AttachmentState::Detached.can_transition_to(&AttachmentState::Presigning));
        assert!(!AttachmentState::Detached.can_transition_to(&error));
        assert!(!error.can_transition_to(&AttachmentState::Uploading(0)));
        assert!(!AttachmentState::Presigning.can_transition_to(&AttachmentState::Detaching));
        assert!(AttachmentState::Uploading(50).can_transition_to(&error));
    }

    #[test]
    fn test_message_from_echo_uses_custom_id() {
        let structured: StructuredMessage = serde_json::from_str(
            r#"{"id":"server-1","type":"Text","text":"hi","direction":"Inbound",
                "metadata":{"customMessageId":"local-1"},
                "channel":{"time":"2024-01-01T00:00:00Z"}}"#,
        )
        .unwrap();
        let message = Message::from(&structured);
        assert_eq!(message.id, "local-1");
        assert_eq!(message.state, MessageState::Sent);
        assert_eq!(message.timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));
    }
}
