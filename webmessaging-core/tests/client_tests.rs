// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Messaging Client Tests
//!
//! Drives the client state machine against a mock socket playing the
//! server and a scripted HTTP API.

mod common;

use std::sync::Arc;

use common::*;
use webmessaging_core::api::{
    ClientEvent, ClientState, Configuration, Event, MessageEvent, MessagingClient, MessagingError,
};
use webmessaging_core::messaging::{AttachmentState, MessageState};
use webmessaging_core::network::{
    CorrectiveAction, ErrorCode, MockSocket, MockSocketHandle, NetworkError,
};
use webmessaging_core::protocol::HEALTH_CHECK_ID;
use webmessaging_core::storage::Vault;

struct Harness {
    client: MessagingClient,
    server: MockSocketHandle,
    api: Arc<MockApi>,
    uploader: Arc<MockUploader>,
    events: Arc<EventLog>,
    vault: Arc<Vault>,
}

fn test_config() -> Configuration {
    Configuration::new("deployment-1", "example.com").with_reconnection(2, 1)
}

fn harness_with(config: Configuration, uploader: Arc<MockUploader>) -> Harness {
    let (socket, server) = MockSocket::new();
    let api = MockApi::new();
    let events = EventLog::new();
    let vault = Arc::new(Vault::in_memory());
    let client = MessagingClient::builder(config)
        .socket(socket)
        .api(api.clone())
        .uploader(uploader.clone())
        .vault(vault.clone())
        .event_handler(events.clone())
        .build()
        .unwrap();
    Harness {
        client,
        server,
        api,
        uploader,
        events,
        vault,
    }
}

fn harness() -> Harness {
    harness_with(test_config(), MockUploader::new())
}

fn is_configured(state: Option<&ClientState>) -> bool {
    matches!(state, Some(ClientState::Configured { connected: true, .. }))
}

/// Connects and answers the configure request.
async fn configured(h: &Harness) {
    h.client.connect(true).await.unwrap();
    eventually("configure request", || {
        h.server.sent_actions().iter().any(|a| a.starts_with("configure"))
    })
    .await;
    h.server.receive(session_response(false));
    eventually("configured state", || is_configured(h.events.states().last())).await;
    h.server.clear_sent();
}

fn last_state(h: &Harness) -> Option<ClientState> {
    h.events.states().last().cloned()
}

// ============================================================
// Connection lifecycle
// ============================================================

#[tokio::test]
async fn test_connect_configures_and_disconnect_closes() {
    let h = harness();

    h.client.connect(true).await.unwrap();
    eventually("configure request", || {
        h.server.sent_actions() == vec!["configureSession".to_string()]
    })
    .await;

    let socket_config = h.server.last_config().unwrap();
    assert!(socket_config.url.starts_with("wss://webmessaging.example.com/v1?"));
    assert!(socket_config.url.contains("deploymentId=deployment-1"));
    assert_eq!(socket_config.origin, "https://webmessaging.example.com");

    let configure = &h.server.sent_json()[0];
    assert_eq!(configure["deploymentId"], "deployment-1");
    assert_eq!(configure["token"], h.vault.token().unwrap().as_str());

    h.server.receive(session_response(false));
    eventually("configured state", || is_configured(h.events.states().last())).await;

    h.client.disconnect().await.unwrap();
    eventually("closed state", || {
        matches!(last_state(&h), Some(ClientState::Closed { code: 1000, .. }))
    })
    .await;

    let states = h.events.states();
    assert_eq!(states.len(), 4, "{:?}", states);
    assert_eq!(states[0], ClientState::Connecting);
    assert!(matches!(states[2], ClientState::Closing { code: 1000, .. }));
    assert_eq!(h.server.close_calls().len(), 1);
}

#[tokio::test]
async fn test_connect_without_configure_waits_for_host() {
    let h = harness();

    h.client.connect(false).await.unwrap();
    eventually("connected state", || {
        last_state(&h) == Some(ClientState::Connected)
    })
    .await;
    assert!(h.server.sent().is_empty());

    let err = h.client.send_message("too early", Default::default()).await;
    assert!(matches!(err, Err(MessagingError::InvalidState(_))));

    h.client.configure_session().await.unwrap();
    assert_eq!(h.server.sent_actions(), vec!["configureSession".to_string()]);
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let h = harness();
    h.client.connect(true).await.unwrap();

    let second = h.client.connect(true).await;
    assert!(matches!(second, Err(MessagingError::InvalidState(_))));
    assert_eq!(h.server.open_calls(), 1);
}

#[tokio::test]
async fn test_disconnect_when_idle_is_noop() {
    let h = harness();
    h.client.disconnect().await.unwrap();
    assert!(h.server.close_calls().is_empty());
    assert!(h.events.states().is_empty());
}

#[tokio::test]
async fn test_read_only_session_blocks_sending() {
    let h = harness();
    h.client.connect(true).await.unwrap();
    eventually("configure request", || !h.server.sent().is_empty()).await;
    h.server.receive(session_response(true));
    eventually("read only state", || last_state(&h) == Some(ClientState::ReadOnly)).await;

    let err = h.client.send_message("hello", Default::default()).await;
    assert!(matches!(err, Err(MessagingError::InvalidState(_))));
}

#[tokio::test]
async fn test_shutdown_stops_the_client() {
    let h = harness();
    configured(&h).await;

    h.client.shutdown().await.unwrap();
    assert_eq!(h.server.close_calls().len(), 1);
    assert_eq!(
        h.client.current_state().await,
        Err(MessagingError::ClientShutDown)
    );
}

// ============================================================
// Reconnection
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_connection_failure_reconnects_and_reconfigures() {
    let h = harness();
    configured(&h).await;

    h.server
        .fail(NetworkError::ConnectionFailed("connection reset".into()));
    eventually("reconnecting state", || {
        h.events.states().contains(&ClientState::Reconnecting)
    })
    .await;

    eventually("second open", || h.server.open_calls() == 2).await;
    eventually("configure after reconnect", || {
        h.server.sent_actions() == vec!["configureSession".to_string()]
    })
    .await;

    h.server.receive(session_response(false));
    eventually("configured again", || is_configured(h.events.states().last())).await;
}

#[tokio::test(start_paused = true)]
async fn test_successful_reconnect_restores_full_budget() {
    let h = harness();
    configured(&h).await;

    h.server
        .fail(NetworkError::ConnectionFailed("connection reset".into()));
    eventually("second open", || h.server.open_calls() == 2).await;
    eventually("configure after reconnect", || {
        h.server.sent_actions() == vec!["configureSession".to_string()]
    })
    .await;
    h.server.receive(session_response(false));
    eventually("configured again", || is_configured(h.events.states().last())).await;

    // Both attempts are available again for the next drop.
    h.server.set_auto_open(false);
    h.server
        .fail(NetworkError::ConnectionFailed("connection reset".into()));
    for open_calls in 3..=4 {
        eventually("socket open call", || h.server.open_calls() == open_calls).await;
        assert_eq!(last_state(&h), Some(ClientState::Reconnecting));
        h.server.fail(NetworkError::ConnectionFailed("unreachable".into()));
    }

    eventually("error state", || {
        matches!(last_state(&h), Some(ClientState::Error { .. }))
    })
    .await;
    assert_eq!(h.server.open_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_reconnection_budget_exhausted_ends_in_error() {
    let h = harness();
    configured(&h).await;
    h.server.set_auto_open(false);

    // Budget is 2 attempts: 2s timeout / 1s interval.
    for open_calls in 1..=3 {
        eventually("socket open call", || h.server.open_calls() == open_calls).await;
        h.server.fail(NetworkError::ConnectionFailed("unreachable".into()));
        if open_calls < 3 {
            eventually("reconnect scheduled", || {
                last_state(&h) == Some(ClientState::Reconnecting)
            })
            .await;
        }
    }

    eventually("error state", || {
        matches!(
            last_state(&h),
            Some(ClientState::Error {
                code: ErrorCode::WebsocketError,
                ..
            })
        )
    })
    .await;
    assert_eq!(h.server.open_calls(), 3);
}

#[tokio::test]
async fn test_forbidden_handshake_is_not_retried() {
    let h = harness();
    h.server.set_auto_open(false);
    h.client.connect(true).await.unwrap();

    h.server.fail(NetworkError::HandshakeRejected(403));
    eventually("error state", || {
        matches!(
            last_state(&h),
            Some(ClientState::Error {
                code: ErrorCode::WebsocketAccessDenied,
                ..
            })
        )
    })
    .await;
    assert!(!h.events.states().contains(&ClientState::Reconnecting));
    assert_eq!(h.server.open_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_while_reconnecting_closes_immediately() {
    let h = harness();
    configured(&h).await;
    h.server.set_auto_open(false);

    h.server.fail(NetworkError::Timeout);
    eventually("reconnecting state", || {
        last_state(&h) == Some(ClientState::Reconnecting)
    })
    .await;

    h.client.disconnect().await.unwrap();
    assert!(matches!(
        h.client.current_state().await.unwrap(),
        ClientState::Closed { code: 1000, .. }
    ));

    // The cancelled attempt never fires.
    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    assert_eq!(h.server.open_calls(), 1);
}

// ============================================================
// Messages
// ============================================================

#[tokio::test]
async fn test_message_echo_updates_pending_message() {
    let h = harness();
    configured(&h).await;

    h.client.send_message("hello", Default::default()).await.unwrap();
    let pending = h.client.pending_message().await.unwrap();
    assert_eq!(pending.state, MessageState::Sending);

    let frame = &h.server.sent_json()[0];
    assert_eq!(frame["action"], "onMessage");
    assert_eq!(frame["message"]["text"], "hello");

    h.server.receive(echo_of(&pending.id, "hello"));
    eventually("message sent", || {
        h.events.events().iter().any(|event| {
            matches!(
                event,
                ClientEvent::Message(MessageEvent::MessageUpdated(message))
                    if message.id == pending.id && message.state == MessageState::Sent
            )
        })
    })
    .await;

    let history = h.client.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].text.as_deref(), Some("hello"));
    assert_ne!(h.client.pending_message().await.unwrap().id, pending.id);
}

#[tokio::test]
async fn test_agent_message_and_typing_events() {
    let h = harness();
    configured(&h).await;

    h.server.receive(agent_text("agent-1", "How can I help?"));
    h.server.receive(agent_typing(5000));
    h.server.receive(agent_text("agent-1", "How can I help?"));

    eventually("typing event", || {
        h.events.conversation_events().contains(&Event::AgentTyping {
            duration_ms: Some(5000),
        })
    })
    .await;
    let inserted: Vec<_> = h
        .events
        .events()
        .into_iter()
        .filter(|event| matches!(event, ClientEvent::Message(MessageEvent::MessageInserted(_))))
        .collect();
    assert_eq!(inserted.len(), 1, "duplicates are dropped");
}

#[tokio::test]
async fn test_too_many_requests_fails_pending_message() {
    let h = harness();
    configured(&h).await;
    h.client.send_message("spam", Default::default()).await.unwrap();

    h.server.receive(
        serde_json::json!({
            "type": "response",
            "class": "TooManyRequestsErrorMessage",
            "code": 429,
            "body": {"retryAfter": 3, "errorCode": 4029, "errorMessage": "Message rate too high"}
        })
        .to_string(),
    );

    eventually("rate limit error", || {
        h.events.conversation_events().iter().any(|event| {
            matches!(event, Event::Error(info)
                if info.code == ErrorCode::RequestRateTooHigh
                    && info.corrective_action == CorrectiveAction::TooManyRequests)
        })
    })
    .await;
    let pending = h.client.pending_message().await.unwrap();
    assert_eq!(pending.state, MessageState::Idle, "failed send is retryable");
}

#[tokio::test]
async fn test_health_check_cooldown_and_echo() {
    let h = harness();
    configured(&h).await;

    h.client.send_health_check().await.unwrap();
    h.client.send_health_check().await.unwrap();
    assert_eq!(h.server.sent_actions(), vec!["echo".to_string()]);

    h.server.receive(echo_of(HEALTH_CHECK_ID, "ping"));
    eventually("health checked", || {
        h.events.conversation_events().contains(&Event::HealthChecked)
    })
    .await;
    assert!(h.client.history().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_send_does_not_start_cooldown() {
    let h = harness();
    configured(&h).await;

    h.server.set_reject_sends(true);
    assert!(h.client.send_health_check().await.is_err());
    assert!(h.client.indicate_typing().await.is_err());
    h.server.set_reject_sends(false);

    h.client.send_health_check().await.unwrap();
    h.client.indicate_typing().await.unwrap();
    assert_eq!(
        h.server.sent_actions(),
        vec!["echo".to_string(), "onMessage".to_string()]
    );
}

// ============================================================
// Server-driven session end
// ============================================================

#[tokio::test]
async fn test_session_expired_event_ends_session() {
    let h = harness();
    configured(&h).await;

    h.server.receive(event_frame("SessionExpiredEvent"));
    eventually("error state", || {
        matches!(
            last_state(&h),
            Some(ClientState::Error {
                code: ErrorCode::SessionHasExpired,
                ..
            })
        )
    })
    .await;
    assert_eq!(h.server.close_calls()[0].0, 1000);
}

#[tokio::test]
async fn test_clear_conversation_closes_session() {
    let h = harness();
    configured(&h).await;

    h.client.clear_conversation().await.unwrap();
    let frame = &h.server.sent_json()[0];
    assert_eq!(frame["action"], "onMessage");
    assert_eq!(frame["message"]["events"][0]["presence"]["type"], "Clear");

    h.server.receive(event_frame("SessionClearedEvent"));
    eventually("closed state", || {
        matches!(last_state(&h), Some(ClientState::Closed { .. }))
    })
    .await;
    assert!(h
        .events
        .conversation_events()
        .contains(&Event::ConversationCleared));
}

#[tokio::test]
async fn test_session_not_found_while_configuring_fails() {
    let h = harness();
    h.client.connect(true).await.unwrap();
    eventually("configure request", || !h.server.sent().is_empty()).await;

    h.server.receive(string_response(4008, "Session not found"));
    eventually("error state", || {
        matches!(
            last_state(&h),
            Some(ClientState::Error {
                code: ErrorCode::SessionNotFound,
                ..
            })
        )
    })
    .await;
}

// ============================================================
// Attachments
// ============================================================

fn attachment_states(h: &Harness, id: &str) -> Vec<AttachmentState> {
    h.events
        .events()
        .into_iter()
        .filter_map(|event| match event {
            ClientEvent::Message(MessageEvent::AttachmentUpdated(attachment))
                if attachment.id == id =>
            {
                Some(attachment.state)
            }
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_attachment_upload_and_send() {
    let h = harness();
    configured(&h).await;

    let id = h
        .client
        .attach(vec![7u8; 4096], "photo.png", None)
        .await
        .unwrap();
    let request = &h.server.sent_json()[0];
    assert_eq!(request["action"], "onAttachment");
    assert_eq!(request["fileType"], "image/png");
    assert_eq!(request["fileSize"], 4096);

    h.server.receive(presigned_url(&id));
    eventually("upload progress", || {
        attachment_states(&h, &id).contains(&AttachmentState::Uploading(100))
    })
    .await;
    assert_eq!(
        h.uploader.urls(),
        vec![format!("https://uploads.example.com/{}", id)]
    );

    h.server.receive(upload_success(&id));
    let download_url = format!("https://cdn.example.com/{}", id);
    eventually("uploaded", || {
        attachment_states(&h, &id).contains(&AttachmentState::Uploaded(download_url.clone()))
    })
    .await;

    let states = attachment_states(&h, &id);
    assert_eq!(states[0], AttachmentState::Presigning);
    assert_eq!(states[1], AttachmentState::Uploading(0));

    h.server.clear_sent();
    h.client.send_message("see file", Default::default()).await.unwrap();
    let message = &h.server.sent_json()[0];
    assert_eq!(message["message"]["content"][0]["attachment"]["id"], id.as_str());
}

#[tokio::test]
async fn test_refresh_attachment_url() {
    let h = harness();
    configured(&h).await;

    let id = h.client.attach(vec![7u8; 64], "photo.png", None).await.unwrap();
    h.server.receive(presigned_url(&id));
    eventually("upload progress", || {
        attachment_states(&h, &id).contains(&AttachmentState::Uploading(100))
    })
    .await;
    h.server.receive(upload_success(&id));
    let download_url = format!("https://cdn.example.com/{}", id);
    eventually("uploaded", || {
        attachment_states(&h, &id).contains(&AttachmentState::Uploaded(download_url.clone()))
    })
    .await;
    h.server.clear_sent();

    h.client.refresh_attachment_url(&id).await.unwrap();
    let request = &h.server.sent_json()[0];
    assert_eq!(request["action"], "getAttachment");
    assert_eq!(request["attachmentId"], id.as_str());

    h.server
        .receive(common::download_url(&id, "https://cdn.example.com/fresh"));
    eventually("fresh download URL", || {
        attachment_states(&h, &id).last()
            == Some(&AttachmentState::Uploaded("https://cdn.example.com/fresh".into()))
    })
    .await;
    assert_eq!(h.uploader.urls().len(), 1, "no second upload");

    let pending = h.client.pending_message().await.unwrap();
    assert_eq!(
        pending.attachments[&id].state,
        AttachmentState::Uploaded("https://cdn.example.com/fresh".into())
    );
}

#[tokio::test]
async fn test_refresh_attachment_url_requires_uploaded_attachment() {
    let h = harness_with(test_config(), MockUploader::hanging());
    configured(&h).await;

    assert_eq!(
        h.client.refresh_attachment_url("missing").await,
        Err(MessagingError::AttachmentNotFound("missing".into()))
    );

    let id = h.client.attach(vec![1u8; 10], "notes.txt", None).await.unwrap();
    h.server.clear_sent();
    assert!(matches!(
        h.client.refresh_attachment_url(&id).await,
        Err(MessagingError::InvalidState(_))
    ));
    assert!(h.server.sent().is_empty());
}

#[tokio::test]
async fn test_send_rejects_attachment_still_uploading() {
    let h = harness_with(test_config(), MockUploader::hanging());
    configured(&h).await;

    let id = h.client.attach(vec![1u8; 10], "notes.txt", None).await.unwrap();
    let err = h.client.send_message("too soon", Default::default()).await;
    assert_eq!(err, Err(MessagingError::AttachmentNotUploaded(id)));
}

#[tokio::test]
async fn test_disconnect_cancels_uploads_silently() {
    let h = harness_with(test_config(), MockUploader::hanging());
    configured(&h).await;

    let id = h.client.attach(vec![1u8; 10], "notes.txt", None).await.unwrap();
    h.server.receive(presigned_url(&id));
    eventually("upload started", || h.uploader.urls().len() == 1).await;

    h.client.disconnect().await.unwrap();
    eventually("upload cancelled", || {
        attachment_states(&h, &id).iter().any(|state| {
            matches!(
                state,
                AttachmentState::Error {
                    code: ErrorCode::CancellationError,
                    ..
                }
            )
        })
    })
    .await;
    assert!(!h
        .events
        .conversation_events()
        .iter()
        .any(|event| matches!(event, Event::Error(_))));
}

#[tokio::test]
async fn test_deployment_config_limits_upload_size() {
    let h = harness();
    let deployment = serde_json::from_value(serde_json::json!({
        "id": "deployment-1",
        "version": "7",
        "messenger": {
            "enabled": true,
            "fileUpload": {"modes": [{"fileTypes": ["image/png"], "maxFileSizeKB": 1}]}
        }
    }))
    .unwrap();
    h.api.push_deployment(Ok(deployment));
    configured(&h).await;

    let config = h.client.fetch_deployment_config().await.unwrap();
    assert_eq!(config.max_file_size_kb(), Some(1));

    let err = h.client.attach(vec![0u8; 2048], "big.png", None).await;
    assert_eq!(
        err,
        Err(MessagingError::FileTooLarge {
            size: 2048,
            max: 1024
        })
    );
    assert!(h.server.sent().is_empty());
}

// ============================================================
// History
// ============================================================

#[tokio::test]
async fn test_anonymous_history_uses_session_jwt() {
    let h = harness();
    configured(&h).await;

    let (fetched, ()) = tokio::join!(h.client.fetch_next_page(), async {
        eventually("jwt request", || {
            h.server.sent_actions() == vec!["getJwt".to_string()]
        })
        .await;
        h.server.receive(jwt_response("history-jwt", 4_102_444_800));
    });
    fetched.unwrap();

    assert_eq!(
        h.api.calls(),
        vec![ApiCall::History {
            jwt: "history-jwt".into(),
            page_number: 1,
            page_size: 25
        }]
    );
    assert!(h.events.events().contains(&ClientEvent::Message(
        MessageEvent::HistoryFetched {
            messages: Vec::new(),
            start_of_conversation: true
        }
    )));

    // Start of conversation reached: no further request.
    h.client.fetch_next_page().await.unwrap();
    assert_eq!(h.api.calls().len(), 1);
}

// ============================================================
// Authenticated sessions
// ============================================================

#[tokio::test]
async fn test_authorize_then_connect_configures_authenticated_session() {
    let h = harness();

    assert!(h.client.authorize("code-1", "app://callback", None).await.is_success());
    assert!(h.client.is_authorized());
    assert!(h.vault.was_authenticated());

    h.client.connect(true).await.unwrap();
    eventually("authenticated configure", || {
        h.server.sent_actions() == vec!["configureAuthenticatedSession".to_string()]
    })
    .await;
    assert_eq!(h.server.sent_json()[0]["data"]["code"], "jwt-1");
    eventually("authorized event", || {
        h.events.conversation_events().contains(&Event::Authorized)
    })
    .await;
}

#[tokio::test]
async fn test_unauthorized_session_refreshes_once() {
    let h = harness();
    assert!(h.client.authorize("code-1", "app://callback", None).await.is_success());
    h.client.connect(true).await.unwrap();
    eventually("configure request", || h.server.sent().len() == 1).await;

    h.server.receive(string_response(401, "jwt expired"));
    eventually("reconfigure with refreshed jwt", || h.server.sent().len() == 2).await;
    assert_eq!(h.server.sent_json()[1]["data"]["code"], "jwt-refreshed");
    assert!(h.api.calls().contains(&ApiCall::Refresh {
        refresh_token: "refresh-1".into()
    }));

    h.server.receive(string_response(401, "jwt expired"));
    eventually("error state", || {
        matches!(
            last_state(&h),
            Some(ClientState::Error {
                code: ErrorCode::ClientResponseError(401),
                ..
            })
        )
    })
    .await;
    assert!(h.events.conversation_events().iter().any(|event| {
        matches!(event, Event::Error(info) if info.corrective_action == CorrectiveAction::ReAuthenticate)
    }));
}

#[tokio::test]
async fn test_logout_event_clears_credentials() {
    let h = harness();
    assert!(h.client.authorize("code-1", "app://callback", None).await.is_success());
    configured(&h).await;

    assert!(h.client.logout().await.is_success());
    assert!(h.client.is_authorized(), "cleared only once the server confirms");

    h.server.receive(event_frame("LogoutEvent"));
    eventually("closed state", || {
        matches!(last_state(&h), Some(ClientState::Closed { .. }))
    })
    .await;
    assert!(!h.client.is_authorized());
    assert!(!h.vault.was_authenticated());
    assert!(h.events.conversation_events().contains(&Event::Logout));
}
