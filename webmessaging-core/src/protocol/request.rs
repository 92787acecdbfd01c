// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Outbound request envelopes.
//!
//! Every request is a flat JSON object carrying the session `token` and a
//! fixed `action` discriminant.

use std::collections::HashMap;

use serde::Serialize;

use super::error::ProtocolError;
use super::message::{ChannelMetadata, Content, EventEntity, MessageMetadata, PresenceType};

/// `customMessageId` marking health-check echoes.
pub const HEALTH_CHECK_ID: &str = "SGVhbHRoQ2hlY2tNZXNzYWdlSWQ=";

/// Text of a health-check echo.
pub const HEALTH_CHECK_TEXT: &str = "ping";

/// Channel block of an outbound text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundChannel {
    pub metadata: ChannelMetadata,
}

/// Message payload of `onMessage` and `echo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        content: Vec<Content>,
        #[serde(skip_serializing_if = "Option::is_none")]
        channel: Option<OutboundChannel>,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<MessageMetadata>,
    },
    Event {
        events: Vec<EventEntity>,
    },
}

/// Credential block of `configureAuthenticatedSession`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthData {
    /// Auth jwt.
    pub code: String,
}

/// Outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    ConfigureSession {
        token: String,
        deployment_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_new: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    ConfigureAuthenticatedSession {
        token: String,
        deployment_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_new: Option<bool>,
        data: AuthData,
    },
    OnMessage {
        token: String,
        message: OutboundMessage,
    },
    Echo {
        token: String,
        message: OutboundMessage,
    },
    #[serde(rename_all = "camelCase")]
    OnAttachment {
        token: String,
        attachment_id: String,
        file_name: String,
        file_type: String,
        file_size: u64,
        errors_as_json: bool,
    },
    #[serde(rename_all = "camelCase")]
    GetAttachment {
        token: String,
        attachment_id: String,
    },
    #[serde(rename_all = "camelCase")]
    DeleteAttachment {
        token: String,
        attachment_id: String,
    },
    GetJwt {
        token: String,
    },
    #[serde(rename_all = "camelCase")]
    CloseSession {
        token: String,
        close_all_connections: bool,
    },
}

impl Request {
    /// Session configuration, anonymous or authenticated depending on `jwt`.
    pub fn configure(token: &str, deployment_id: &str, jwt: Option<&str>) -> Self {
        match jwt {
            Some(jwt) => Request::ConfigureAuthenticatedSession {
                token: token.to_string(),
                deployment_id: deployment_id.to_string(),
                start_new: None,
                data: AuthData {
                    code: jwt.to_string(),
                },
            },
            None => Request::ConfigureSession {
                token: token.to_string(),
                deployment_id: deployment_id.to_string(),
                start_new: None,
            },
        }
    }

    /// A text message, optionally referencing uploaded attachments.
    ///
    /// `message_id` travels as `customMessageId` so the server echo can be
    /// matched to the pending message.
    pub fn text_message(
        token: &str,
        message_id: &str,
        text: &str,
        attachment_ids: &[String],
        custom_attributes: HashMap<String, String>,
    ) -> Self {
        let channel = (!custom_attributes.is_empty()).then(|| OutboundChannel {
            metadata: ChannelMetadata { custom_attributes },
        });
        Request::OnMessage {
            token: token.to_string(),
            message: OutboundMessage::Text {
                text: text.to_string(),
                content: attachment_ids.iter().map(Content::attachment).collect(),
                channel,
                metadata: Some(MessageMetadata {
                    custom_message_id: Some(message_id.to_string()),
                }),
            },
        }
    }

    /// Health-check echo, recognizable by its `customMessageId`.
    pub fn health_check(token: &str) -> Self {
        Request::Echo {
            token: token.to_string(),
            message: OutboundMessage::Text {
                text: HEALTH_CHECK_TEXT.to_string(),
                content: Vec::new(),
                channel: None,
                metadata: Some(MessageMetadata {
                    custom_message_id: Some(HEALTH_CHECK_ID.to_string()),
                }),
            },
        }
    }

    pub fn typing(token: &str) -> Self {
        Request::OnMessage {
            token: token.to_string(),
            message: OutboundMessage::Event {
                events: vec![EventEntity::typing_on()],
            },
        }
    }

    /// Presence event, e.g. `Join` for autostart or `Clear`.
    pub fn presence(token: &str, kind: PresenceType) -> Self {
        Request::OnMessage {
            token: token.to_string(),
            message: OutboundMessage::Event {
                events: vec![EventEntity::presence(kind)],
            },
        }
    }

    pub fn on_attachment(
        token: &str,
        attachment_id: &str,
        file_name: &str,
        file_type: &str,
        file_size: u64,
    ) -> Self {
        Request::OnAttachment {
            token: token.to_string(),
            attachment_id: attachment_id.to_string(),
            file_name: file_name.to_string(),
            file_type: file_type.to_string(),
            file_size,
            errors_as_json: true,
        }
    }

    pub fn get_attachment(token: &str, attachment_id: &str) -> Self {
        Request::GetAttachment {
            token: token.to_string(),
            attachment_id: attachment_id.to_string(),
        }
    }

    pub fn delete_attachment(token: &str, attachment_id: &str) -> Self {
        Request::DeleteAttachment {
            token: token.to_string(),
            attachment_id: attachment_id.to_string(),
        }
    }

    pub fn get_jwt(token: &str) -> Self {
        Request::GetJwt {
            token: token.to_string(),
        }
    }

    pub fn close_session(token: &str) -> Self {
        Request::CloseSession {
            token: token.to_string(),
            close_all_connections: true,
        }
    }

    /// Wire name of the action, for logging without leaking the token.
    pub fn action(&self) -> &'static str {
        match self {
            Request::ConfigureSession { .. } => "configureSession",
            Request::ConfigureAuthenticatedSession { .. } => "configureAuthenticatedSession",
            Request::OnMessage { .. } => "onMessage",
            Request::Echo { .. } => "echo",
            Request::OnAttachment { .. } => "onAttachment",
            Request::GetAttachment { .. } => "getAttachment",
            Request::DeleteAttachment { .. } => "deleteAttachment",
            Request::GetJwt { .. } => "getJwt",
            Request::CloseSession { .. } => "closeSession",
        }
    }

    /// Serializes the envelope into a text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn encoded(request: &Request) -> Value {
        serde_json::from_str(&request.encode().unwrap()).unwrap()
    }

    #[test]
    fn test_configure_session_envelope() {
        let value = encoded(&Request::configure("tok", "dep", None));
        assert_eq!(
            value,
            json!({"action": "configureSession", "token": "tok", "deploymentId": "dep"})
        );
    }

    #[test]
    fn test_configure_authenticated_session_carries_jwt() {
        let value = encoded(&Request::configure("tok", "dep", Some("jwt-1")));
        assert_eq!(value["action"], "configureAuthenticatedSession");
        assert_eq!(value["data"]["code"], "jwt-1");
    }

    #[test]
    fn test_text_message_references_attachments() {
        let mut attributes = HashMap::new();
        attributes.insert("lang".to_string(), "en".to_string());
        let request = Request::text_message("tok", "m-1", "hello", &["att-1".to_string()], attributes);
        let value = encoded(&request);

        assert_eq!(value["action"], "onMessage");
        assert_eq!(value["message"]["type"], "Text");
        assert_eq!(value["message"]["text"], "hello");
        assert_eq!(value["message"]["metadata"]["customMessageId"], "m-1");
        assert_eq!(
            value["message"]["content"],
            json!([{"contentType": "Attachment", "attachment": {"id": "att-1"}}])
        );
        assert_eq!(
            value["message"]["channel"]["metadata"]["customAttributes"]["lang"],
            "en"
        );
    }

    #[test]
    fn test_health_check_echo() {
        let value = encoded(&Request::health_check("tok"));
        assert_eq!(value["action"], "echo");
        assert_eq!(value["message"]["metadata"]["customMessageId"], HEALTH_CHECK_ID);
    }

    #[test]
    fn test_event_messages() {
        let typing = encoded(&Request::typing("tok"));
        assert_eq!(
            typing["message"],
            json!({"type": "Event", "events": [{"eventType": "Typing", "typing": {"type": "On"}}]})
        );

        let clear = encoded(&Request::presence("tok", PresenceType::Clear));
        assert_eq!(clear["message"]["events"][0]["presence"]["type"], "Clear");
    }

    #[test]
    fn test_attachment_and_session_actions() {
        let upload = encoded(&Request::on_attachment("tok", "a1", "x.png", "image/png", 42));
        assert_eq!(upload["action"], "onAttachment");
        assert_eq!(upload["attachmentId"], "a1");
        assert_eq!(upload["fileSize"], 42);
        assert_eq!(upload["errorsAsJson"], true);

        assert_eq!(encoded(&Request::delete_attachment("tok", "a1"))["action"], "deleteAttachment");
        assert_eq!(encoded(&Request::get_attachment("tok", "a1"))["action"], "getAttachment");
        assert_eq!(encoded(&Request::get_jwt("tok"))["action"], "getJwt");

        let close = encoded(&Request::close_session("tok"));
        assert_eq!(close["action"], "closeSession");
        assert_eq!(close["closeAllConnections"], true);
    }

    #[test]
    fn test_action_matches_wire_name() {
        let requests = vec![
            Request::configure("t", "d", None),
            Request::typing("t"),
            Request::health_check("t"),
            Request::get_jwt("t"),
            Request::close_session("t"),
        ];
        for request in requests {
            assert_eq!(encoded(&request)["action"], request.action());
        }
    }
}
