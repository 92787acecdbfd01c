// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Client Actor
//!
//! The single writer behind [`MessagingClient`](super::MessagingClient).
//! Host commands, socket events, upload progress, session timers and the
//! results of HTTP side-channel calls are all funnelled into one task, so
//! no two state transitions ever race. HTTP calls run on spawned tasks and
//! report back through the internal channel; the actor never awaits I/O.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::config::Configuration;
use super::error::{MessagingError, MessagingResult};
use super::events::{ClientEvent, Event, EventDispatcher, MessageEvent};
use super::state::ClientState;
use crate::auth::{AuthHandler, AuthOutcome};
use crate::messaging::{AttachmentHandler, AttachmentState, Message, MessageStore, UploadSignal};
use crate::network::{
    ApiError, AttachmentUploader, CorrectiveAction, ErrorCode, ErrorInfo, NetworkError,
    ProgressCallback, ReconnectionHandler, SocketConfig, SocketEvent, SocketListener,
    SocketSignal, SocketTransport, WebMessagingApi,
};
use crate::protocol::{
    decode, AttachmentFailure, DeploymentConfig, Direction, EventEntity, JwtResponse,
    MessageEntityList, MessageType, PresenceType, PresignedUrlResponse, Request,
    ServerMessage, SessionResponse, StructuredMessage, HEALTH_CHECK_ID,
};
use crate::session::{
    Clock, HealthCheckProvider, SessionDurationHandler, SessionTimerEvent, UserTypingProvider,
};
use crate::storage::Vault;

/// Normal closure code.
const CLOSE_NORMAL: u16 = 1000;
/// Closure code reported when a closing socket fails instead.
const CLOSE_ABNORMAL: u16 = 1006;

const USER_CLOSE_REASON: &str = "The user has closed the connection.";

pub(crate) type Reply<T> = oneshot::Sender<MessagingResult<T>>;

/// Host operations, each answered on its own reply channel.
pub(crate) enum Command {
    Connect {
        should_configure: bool,
        reply: Reply<()>,
    },
    ConfigureSession {
        reply: Reply<()>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    SendMessage {
        text: String,
        custom_attributes: HashMap<String, String>,
        reply: Reply<()>,
    },
    SendHealthCheck {
        reply: Reply<()>,
    },
    Attach {
        bytes: Vec<u8>,
        file_name: String,
        on_progress: Option<ProgressCallback>,
        reply: Reply<String>,
    },
    Detach {
        attachment_id: String,
        reply: Reply<()>,
    },
    RefreshAttachmentUrl {
        attachment_id: String,
        reply: Reply<()>,
    },
    FetchNextPage {
        reply: Reply<()>,
    },
    InvalidateConversationCache {
        reply: Reply<()>,
    },
    IndicateTyping {
        reply: Reply<()>,
    },
    ClearConversation {
        reply: Reply<()>,
    },
    CloseSession {
        reply: Reply<()>,
    },
    FetchDeploymentConfig {
        reply: Reply<DeploymentConfig>,
    },
    State {
        reply: oneshot::Sender<ClientState>,
    },
    PendingMessage {
        reply: oneshot::Sender<Message>,
    },
    History {
        reply: oneshot::Sender<Vec<Message>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Results re-entering the actor from its own spawned tasks.
enum Internal {
    Reconnect,
    AuthRefreshed(AuthOutcome),
    HistoryFetched(Result<MessageEntityList, ApiError>),
    DeploymentConfigFetched {
        result: Result<DeploymentConfig, ApiError>,
        reply: Reply<DeploymentConfig>,
    },
}

/// Everything the builder hands to the actor.
pub(crate) struct ActorParts {
    pub config: Configuration,
    pub socket_config: SocketConfig,
    pub token: String,
    pub socket: Box<dyn SocketTransport>,
    pub api: Arc<dyn WebMessagingApi>,
    pub uploader: Arc<dyn AttachmentUploader>,
    pub auth: Arc<AuthHandler>,
    pub auth_events: mpsc::UnboundedReceiver<Event>,
    pub vault: Arc<Vault>,
    pub clock: Arc<dyn Clock>,
    pub dispatcher: EventDispatcher,
}

struct Inbox {
    commands: mpsc::UnboundedReceiver<Command>,
    socket: mpsc::UnboundedReceiver<SocketSignal>,
    uploads: mpsc::UnboundedReceiver<UploadSignal>,
    timers: mpsc::UnboundedReceiver<SessionTimerEvent>,
    auth: mpsc::UnboundedReceiver<Event>,
    internal: mpsc::UnboundedReceiver<Internal>,
}

/// Spawns the actor and returns its command channel.
pub(crate) fn spawn(parts: ActorParts) -> mpsc::UnboundedSender<Command> {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (socket_tx, socket_rx) = mpsc::unbounded_channel();
    let (upload_tx, upload_rx) = mpsc::unbounded_channel();
    let (timer_tx, timer_rx) = mpsc::unbounded_channel();
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();

    let config = parts.config;
    let actor = ClientActor {
        reconnection: ReconnectionHandler::new(
            config.reconnection_timeout(),
            config.reconnection_interval(),
        ),
        store: MessageStore::new(config.message_history_limit, config.history_page_size),
        attachments: AttachmentHandler::new(parts.uploader, upload_tx),
        session_duration: SessionDurationHandler::new(
            parts.clock.clone(),
            config.expiration_notice_interval(),
            config.health_check_pre_notice(),
            timer_tx,
        ),
        health_check: HealthCheckProvider::new(parts.clock.clone()),
        typing: UserTypingProvider::new(parts.clock.clone()),
        socket_config: parts.socket_config,
        token: parts.token,
        state: ClientState::Idle,
        socket: parts.socket,
        socket_tx,
        generation: 0,
        should_configure: true,
        api: parts.api,
        auth: parts.auth,
        auth_retry_used: false,
        vault: parts.vault,
        clock: parts.clock,
        url_requests: HashSet::new(),
        history_jwt: None,
        pending_history: None,
        dispatcher: parts.dispatcher,
        internal_tx,
        config,
    };
    let inbox = Inbox {
        commands: command_rx,
        socket: socket_rx,
        uploads: upload_rx,
        timers: timer_rx,
        auth: parts.auth_events,
        internal: internal_rx,
    };

    tokio::spawn(actor.run(inbox));
    command_tx
}

struct ClientActor {
    config: Configuration,
    socket_config: SocketConfig,
    token: String,
    state: ClientState,

    socket: Box<dyn SocketTransport>,
    socket_tx: mpsc::UnboundedSender<SocketSignal>,
    /// Lifecycle of the current socket; events from older ones are dropped.
    generation: u64,
    should_configure: bool,
    reconnection: ReconnectionHandler,

    api: Arc<dyn WebMessagingApi>,
    auth: Arc<AuthHandler>,
    /// Set once a 401 has been answered with a refresh for this session.
    auth_retry_used: bool,
    vault: Arc<Vault>,
    clock: Arc<dyn Clock>,

    store: MessageStore,
    attachments: AttachmentHandler,
    session_duration: SessionDurationHandler,
    health_check: HealthCheckProvider,
    typing: UserTypingProvider,

    /// Attachments awaiting a fresh download URL.
    url_requests: HashSet<String>,
    history_jwt: Option<JwtResponse>,
    pending_history: Option<Reply<()>>,

    dispatcher: EventDispatcher,
    internal_tx: mpsc::UnboundedSender<Internal>,
}

impl ClientActor {
    async fn run(mut self, mut inbox: Inbox) {
        debug!("client actor started");
        let mut shutdown = None;
        loop {
            tokio::select! {
                command = inbox.commands.recv() => {
                    let Some(command) = command else { break };
                    shutdown = self.handle_command(command);
                    if shutdown.is_some() {
                        break;
                    }
                }
                Some(signal) = inbox.socket.recv() => self.handle_socket_signal(signal),
                Some(signal) = inbox.uploads.recv() => self.handle_upload_signal(signal),
                Some(event) = inbox.timers.recv() => self.handle_timer_event(event),
                Some(event) = inbox.auth.recv() => self.dispatch(ClientEvent::Event(event)),
                Some(message) = inbox.internal.recv() => self.handle_internal(message),
            }
        }
        self.teardown();
        if let Some(reply) = shutdown {
            let _ = reply.send(());
        }
        debug!("client actor stopped");
    }

    // === Host commands ===

    /// Returns the shutdown reply once the actor should stop.
    fn handle_command(&mut self, command: Command) -> Option<oneshot::Sender<()>> {
        match command {
            Command::Connect {
                should_configure,
                reply,
            } => {
                let _ = reply.send(self.connect(should_configure));
            }
            Command::ConfigureSession { reply } => {
                let _ = reply.send(self.configure_session());
            }
            Command::Disconnect { reply } => {
                let _ = reply.send(self.disconnect());
            }
            Command::SendMessage {
                text,
                custom_attributes,
                reply,
            } => {
                let _ = reply.send(self.send_message(&text, custom_attributes));
            }
            Command::SendHealthCheck { reply } => {
                let _ = reply.send(self.send_health_check());
            }
            Command::Attach {
                bytes,
                file_name,
                on_progress,
                reply,
            } => {
                let _ = reply.send(self.attach(bytes, &file_name, on_progress));
            }
            Command::Detach {
                attachment_id,
                reply,
            } => {
                let _ = reply.send(self.detach(&attachment_id));
            }
            Command::RefreshAttachmentUrl {
                attachment_id,
                reply,
            } => {
                let _ = reply.send(self.refresh_attachment_url(&attachment_id));
            }
            Command::FetchNextPage { reply } => self.fetch_next_page(reply),
            Command::InvalidateConversationCache { reply } => {
                self.store.invalidate_conversation_cache();
                let _ = reply.send(Ok(()));
            }
            Command::IndicateTyping { reply } => {
                let _ = reply.send(self.indicate_typing());
            }
            Command::ClearConversation { reply } => {
                let _ = reply.send(self.clear_conversation());
            }
            Command::CloseSession { reply } => {
                let _ = reply.send(self.close_session());
            }
            Command::FetchDeploymentConfig { reply } => self.fetch_deployment_config(reply),
            Command::State { reply } => {
                let _ = reply.send(self.state.clone());
            }
            Command::PendingMessage { reply } => {
                let _ = reply.send(self.store.pending_message().clone());
            }
            Command::History { reply } => {
                let _ = reply.send(self.store.history().cloned().collect());
            }
            Command::Shutdown { reply } => return Some(reply),
        }
        None
    }

    fn connect(&mut self, should_configure: bool) -> MessagingResult<()> {
        if !self.state.can_connect() {
            return Err(MessagingError::InvalidState(format!(
                "cannot connect while {}",
                self.state
            )));
        }
        self.should_configure = should_configure;
        self.auth_retry_used = false;
        self.reconnection.clear();
        self.transition(ClientState::Connecting);
        self.open_socket();
        Ok(())
    }

    fn configure_session(&mut self) -> MessagingResult<()> {
        match self.state {
            ClientState::Connected | ClientState::Configured { .. } | ClientState::ReadOnly => {
                self.send_configure()
            }
            _ => Err(self.invalid_state("configure the session")),
        }
    }

    fn disconnect(&mut self) -> MessagingResult<()> {
        if !self.state.is_active() {
            debug!(state = %self.state, "disconnect ignored, no active connection");
            return Ok(());
        }
        self.close_gracefully(CLOSE_NORMAL, USER_CLOSE_REASON);
        Ok(())
    }

    fn send_message(
        &mut self,
        text: &str,
        custom_attributes: HashMap<String, String>,
    ) -> MessagingResult<()> {
        self.require_configured("send a message")?;
        let message = self.store.prepare_message(text)?;
        let attachment_ids =
            message.attachment_ids_where(|state| matches!(state, AttachmentState::Uploaded(_)));
        let request = Request::text_message(
            &self.token,
            &message.id,
            text,
            &attachment_ids,
            custom_attributes,
        );

        if let Err(e) = self.send(&request) {
            if let Some(failed) = self.store.fail_pending(e.error_code(), Some(e.to_string())) {
                self.dispatch(ClientEvent::Message(MessageEvent::MessageUpdated(failed)));
            }
            return Err(e);
        }
        self.dispatch(ClientEvent::Message(MessageEvent::MessageUpdated(message)));
        Ok(())
    }

    fn send_health_check(&mut self) -> MessagingResult<()> {
        self.require_configured("send a health check")?;
        if let Some(frame) = self.health_check.encode_request(&self.token) {
            self.send_frame("echo", frame)?;
            self.health_check.mark_sent();
        }
        Ok(())
    }

    fn indicate_typing(&mut self) -> MessagingResult<()> {
        self.require_configured("indicate typing")?;
        if let Some(frame) = self.typing.encode_request(&self.token) {
            self.send_frame("onMessage", frame)?;
            self.typing.mark_sent();
        }
        Ok(())
    }

    fn clear_conversation(&mut self) -> MessagingResult<()> {
        if !matches!(
            self.state,
            ClientState::Configured { .. } | ClientState::ReadOnly
        ) {
            return Err(self.invalid_state("clear the conversation"));
        }
        self.send(&Request::presence(&self.token, PresenceType::Clear))
    }

    fn close_session(&mut self) -> MessagingResult<()> {
        if !matches!(
            self.state,
            ClientState::Configured { .. } | ClientState::ReadOnly
        ) {
            return Err(self.invalid_state("close the session"));
        }
        self.send(&Request::close_session(&self.token))
    }

    fn attach(
        &mut self,
        bytes: Vec<u8>,
        file_name: &str,
        on_progress: Option<ProgressCallback>,
    ) -> MessagingResult<String> {
        self.require_configured("attach a file")?;
        let attachment = self.attachments.prepare(bytes, file_name, on_progress)?;
        let request = Request::on_attachment(
            &self.token,
            &attachment.id,
            &attachment.file_name,
            attachment
                .mime_type
                .as_deref()
                .unwrap_or("application/octet-stream"),
            attachment.file_size,
        );
        if let Err(e) = self.send(&request) {
            self.attachments.discard(&attachment.id);
            return Err(e);
        }

        let id = attachment.id.clone();
        debug!(attachment_id = %id, "attachment presigning");
        self.store.add_attachment(attachment.clone());
        self.dispatch(ClientEvent::Message(MessageEvent::AttachmentUpdated(
            attachment,
        )));
        Ok(id)
    }

    fn detach(&mut self, attachment_id: &str) -> MessagingResult<()> {
        self.require_configured("detach a file")?;
        let attachment = self
            .store
            .attachment(attachment_id)
            .ok_or_else(|| MessagingError::AttachmentNotFound(attachment_id.to_string()))?;
        if !matches!(
            attachment.state,
            AttachmentState::Uploaded(_) | AttachmentState::Sent(_)
        ) {
            return Err(MessagingError::InvalidState(format!(
                "attachment {} cannot be detached while {:?}",
                attachment_id, attachment.state
            )));
        }

        self.send(&Request::delete_attachment(&self.token, attachment_id))?;
        let detaching = self
            .store
            .update_attachment_state(attachment_id, AttachmentState::Detaching)?;
        self.dispatch(ClientEvent::Message(MessageEvent::AttachmentUpdated(
            detaching,
        )));
        Ok(())
    }

    fn refresh_attachment_url(&mut self, attachment_id: &str) -> MessagingResult<()> {
        self.require_configured("refresh an attachment URL")?;
        let attachment = self
            .store
            .find_attachment(attachment_id)
            .ok_or_else(|| MessagingError::AttachmentNotFound(attachment_id.to_string()))?;
        if attachment.state.url().is_none() {
            return Err(MessagingError::InvalidState(format!(
                "attachment {} has no download URL while {:?}",
                attachment_id, attachment.state
            )));
        }

        self.send(&Request::get_attachment(&self.token, attachment_id))?;
        self.url_requests.insert(attachment_id.to_string());
        Ok(())
    }

    fn fetch_next_page(&mut self, reply: Reply<()>) {
        if self.pending_history.is_some() {
            let _ = reply.send(Err(MessagingError::InvalidState(
                "a history fetch is already in progress".into(),
            )));
            return;
        }
        if self.store.start_of_conversation() {
            self.dispatch(ClientEvent::Message(MessageEvent::HistoryFetched {
                messages: Vec::new(),
                start_of_conversation: true,
            }));
            let _ = reply.send(Ok(()));
            return;
        }

        if let Some(jwt) = self.auth.jwt() {
            self.pending_history = Some(reply);
            self.spawn_history_fetch(jwt, true);
            return;
        }
        let now = self.clock.now_secs();
        if let Some(jwt) = self.history_jwt.as_ref().filter(|jwt| jwt.exp > now) {
            let jwt = jwt.jwt.clone();
            self.pending_history = Some(reply);
            self.spawn_history_fetch(jwt, false);
            return;
        }

        if !matches!(
            self.state,
            ClientState::Configured { .. } | ClientState::ReadOnly
        ) {
            let _ = reply.send(Err(self.invalid_state("fetch history")));
            return;
        }
        match self.send(&Request::get_jwt(&self.token)) {
            Ok(()) => self.pending_history = Some(reply),
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    fn spawn_history_fetch(&self, jwt: String, authenticated: bool) {
        let api = self.api.clone();
        let auth = self.auth.clone();
        let internal = self.internal_tx.clone();
        let page_number = self.store.next_page();
        let page_size = self.store.page_size();
        debug!(page_number, page_size, "fetching history");

        tokio::spawn(async move {
            let mut result = api.fetch_history(&jwt, page_number, page_size).await;
            if authenticated && result.as_ref().is_err_and(ApiError::is_unauthorized) {
                debug!("history rejected with 401, refreshing jwt");
                if auth.refresh_token().await.is_success() {
                    if let Some(jwt) = auth.jwt() {
                        result = api.fetch_history(&jwt, page_number, page_size).await;
                    }
                }
            }
            let _ = internal.send(Internal::HistoryFetched(result));
        });
    }

    fn fetch_deployment_config(&self, reply: Reply<DeploymentConfig>) {
        let api = self.api.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = api.fetch_deployment_config().await;
            let _ = internal.send(Internal::DeploymentConfigFetched { result, reply });
        });
    }

    // === Socket lifecycle ===

    fn open_socket(&mut self) {
        self.generation += 1;
        let listener = SocketListener::new(self.generation, self.socket_tx.clone());
        debug!(generation = self.generation, "opening socket");
        self.socket.open(&self.socket_config, listener);
    }

    fn handle_socket_signal(&mut self, signal: SocketSignal) {
        if signal.generation != self.generation {
            debug!(
                generation = signal.generation,
                current = self.generation,
                "event from superseded socket ignored"
            );
            return;
        }
        match signal.event {
            SocketEvent::Open => self.on_open(),
            SocketEvent::Message(text) => self.on_frame(&text),
            SocketEvent::Closing { code, reason } => {
                debug!(code, reason = %reason, "socket closing");
            }
            SocketEvent::Closed { code, reason } => self.on_closed(code, reason),
            SocketEvent::Failure(error) => self.on_failure(error),
        }
    }

    fn on_open(&mut self) {
        info!(state = %self.state, "socket open");
        self.reconnection.clear();
        match self.state {
            ClientState::Connecting if !self.should_configure => {
                self.transition(ClientState::Connected)
            }
            ClientState::Connecting | ClientState::Reconnecting => {
                if let Err(e) = self.send_configure() {
                    error!(error = %e, "failed to send session configuration");
                }
            }
            _ => debug!(state = %self.state, "socket open in unexpected state"),
        }
    }

    fn on_closed(&mut self, code: u16, reason: String) {
        match self.state {
            ClientState::Closing { .. } => {
                info!(code, reason = %reason, "socket closed");
                self.transition(ClientState::Closed { code, reason });
            }
            ClientState::Idle | ClientState::Closed { .. } | ClientState::Error { .. } => {
                debug!(code, reason = %reason, "socket closed");
            }
            _ => {
                let error =
                    NetworkError::ConnectionFailed(format!("closed by server ({}): {}", code, reason));
                self.on_connection_lost(error);
            }
        }
    }

    fn on_failure(&mut self, error: NetworkError) {
        match self.state {
            ClientState::Closing { .. } => {
                self.transition(ClientState::Closed {
                    code: CLOSE_ABNORMAL,
                    reason: error.to_string(),
                });
            }
            ClientState::Idle | ClientState::Closed { .. } | ClientState::Error { .. } => {
                debug!(error = %error, "socket failure after close ignored");
            }
            _ => self.on_connection_lost(error),
        }
    }

    fn on_connection_lost(&mut self, error: NetworkError) {
        warn!(error = %error, state = %self.state, "connection lost");
        self.cancel_uploads();
        if let Some(failed) = self
            .store
            .fail_pending(error.error_code(), Some(error.to_string()))
        {
            self.dispatch(ClientEvent::Message(MessageEvent::MessageUpdated(failed)));
        }
        if let Some(reply) = self.pending_history.take() {
            let _ = reply.send(Err(MessagingError::Network(error.clone())));
        }

        if error.is_retryable() && self.reconnection.should_reconnect() {
            self.transition(ClientState::Reconnecting);
            let internal = self.internal_tx.clone();
            self.reconnection.reconnect(move || {
                let _ = internal.send(Internal::Reconnect);
            });
            return;
        }

        if error.is_retryable() {
            warn!(
                attempts = self.reconnection.attempts(),
                "reconnection budget exhausted"
            );
        }
        self.session_duration.clear();
        self.transition(ClientState::Error {
            code: error.error_code(),
            message: Some(error.to_string()),
        });
    }

    /// Closes the socket on the host's or server's request.
    fn close_gracefully(&mut self, code: u16, reason: &str) {
        self.reconnection.clear();
        self.session_duration.clear();
        self.health_check.clear();
        self.typing.clear();
        self.cancel_uploads();

        let closing = ClientState::Closing {
            code,
            reason: reason.to_string(),
        };
        if self.state == ClientState::Reconnecting {
            // No live lifecycle to wait for.
            self.generation += 1;
            self.socket.close(code, reason);
            self.transition(closing);
            self.transition(ClientState::Closed {
                code,
                reason: reason.to_string(),
            });
            return;
        }
        self.transition(closing);
        self.socket.close(code, reason);
    }

    /// Ends the session with an error and closes the socket.
    fn fail_session(&mut self, code: ErrorCode, message: Option<String>) {
        let was_active = self.state.is_active();
        self.reconnection.clear();
        self.session_duration.clear();
        self.cancel_uploads();
        if let Some(reply) = self.pending_history.take() {
            let _ = reply.send(Err(MessagingError::InvalidState(
                "session ended".into(),
            )));
        }
        self.transition(ClientState::Error { code, message });
        if was_active {
            self.socket.close(CLOSE_NORMAL, "session error");
        }
    }

    fn teardown(&mut self) {
        self.reconnection.clear();
        self.session_duration.clear();
        self.cancel_uploads();
        if let Some(reply) = self.pending_history.take() {
            let _ = reply.send(Err(MessagingError::ClientShutDown));
        }
        if self.state.is_active() {
            self.generation += 1;
            self.socket.close(CLOSE_NORMAL, USER_CLOSE_REASON);
        }
    }

    // === Inbound frames ===

    fn on_frame(&mut self, text: &str) {
        let envelope = match decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };
        if self.config.log_requests {
            debug!(
                class = envelope.class(),
                code = envelope.code,
                tracing_id = ?envelope.tracing_id,
                "frame received"
            );
        }

        match envelope.message {
            ServerMessage::SessionResponse(response) => self.on_session_response(response),
            ServerMessage::StructuredMessage(message) => self.on_structured_message(message),
            ServerMessage::PresignedUrl(presigned) => self.on_presigned_url(presigned),
            ServerMessage::UploadSuccess(success) => {
                self.update_attachment(
                    &success.attachment_id,
                    AttachmentState::Uploaded(success.download_url),
                );
            }
            ServerMessage::UploadFailure(failure) | ServerMessage::GenerateUrlError(failure) => {
                self.on_attachment_failure(failure)
            }
            ServerMessage::AttachmentDeleted(deleted) => {
                if self.update_attachment(&deleted.attachment_id, AttachmentState::Detached) {
                    self.store.remove_attachment(&deleted.attachment_id);
                }
            }
            ServerMessage::Jwt(jwt) => {
                let token = jwt.jwt.clone();
                self.history_jwt = Some(jwt);
                if self.pending_history.is_some() {
                    self.spawn_history_fetch(token, false);
                }
            }
            ServerMessage::TooManyRequests(limit) => {
                warn!(retry_after = limit.retry_after, "request rate too high");
                let message = Some(limit.error_message);
                if let Some(failed) = self
                    .store
                    .fail_pending(ErrorCode::RequestRateTooHigh, message.clone())
                {
                    self.dispatch(ClientEvent::Message(MessageEvent::MessageUpdated(failed)));
                }
                self.dispatch_error(
                    ErrorCode::RequestRateTooHigh,
                    message,
                    CorrectiveAction::TooManyRequests,
                );
            }
            ServerMessage::ConnectionClosed => {
                self.dispatch(ClientEvent::Event(Event::ConnectionClosed));
                self.close_gracefully(CLOSE_NORMAL, "The session was closed.");
            }
            ServerMessage::Logout => {
                self.auth.clear();
                self.dispatch(ClientEvent::Event(Event::Logout));
                self.close_gracefully(CLOSE_NORMAL, "The session was logged out.");
            }
            ServerMessage::SessionExpired => {
                self.fail_session(
                    ErrorCode::SessionHasExpired,
                    Some("the session has expired".into()),
                );
            }
            ServerMessage::SessionCleared => {
                self.store.invalidate_conversation_cache();
                self.dispatch(ClientEvent::Event(Event::ConversationCleared));
                self.close_gracefully(CLOSE_NORMAL, "The conversation was cleared.");
            }
            ServerMessage::Text(text) => debug!(text = %text, "server acknowledgement"),
            ServerMessage::Error { code, message } => self.on_server_error(code, message),
            ServerMessage::Unknown { class } => debug!(class = %class, "unknown frame ignored"),
        }
    }

    fn on_session_response(&mut self, response: SessionResponse) {
        if !self.state.is_active() {
            debug!(state = %self.state, "session response after close ignored");
            return;
        }
        self.auth_retry_used = false;
        self.reconnection.clear();
        if response.cleared_existing_session {
            self.store.invalidate_conversation_cache();
        }
        self.session_duration
            .update_session_duration(response.duration_seconds, response.expiration_date);

        if response.read_only {
            self.transition(ClientState::ReadOnly);
        } else {
            self.transition(ClientState::Configured {
                connected: response.connected,
                new_session: response.new_session,
            });
        }
    }

    fn on_structured_message(&mut self, message: StructuredMessage) {
        if message.custom_message_id() == Some(HEALTH_CHECK_ID) {
            self.dispatch(ClientEvent::Event(Event::HealthChecked));
            return;
        }

        if message.kind == MessageType::Event {
            for event in &message.events {
                self.on_conversation_event(event, message.direction);
            }
            return;
        }

        let is_echo = message.direction == Direction::Inbound
            && message.custom_message_id() == Some(self.store.pending_message().id.as_str());
        if let Some(inserted) = self.store.update(&message) {
            let event = if is_echo {
                MessageEvent::MessageUpdated(inserted)
            } else {
                MessageEvent::MessageInserted(inserted)
            };
            self.dispatch(ClientEvent::Message(event));
        }
    }

    fn on_conversation_event(&mut self, event: &EventEntity, direction: Direction) {
        let event = match event {
            EventEntity::Typing { typing } if direction == Direction::Outbound => {
                Event::AgentTyping {
                    duration_ms: typing.duration,
                }
            }
            EventEntity::Presence { presence } => match presence.kind {
                PresenceType::Join => Event::ConversationAutostart,
                PresenceType::Disconnect => Event::ConversationDisconnect,
                PresenceType::SignIn => Event::SignedIn,
                // Clearing is confirmed by SessionClearedEvent.
                PresenceType::Clear | PresenceType::SignOut | PresenceType::Unknown => {
                    debug!(kind = ?presence.kind, "presence event ignored");
                    return;
                }
            },
            _ => return,
        };
        self.dispatch(ClientEvent::Event(event));
    }

    fn on_presigned_url(&mut self, presigned: PresignedUrlResponse) {
        let id = presigned.attachment_id.clone();
        if self.url_requests.remove(&id) {
            match self.store.refresh_attachment_url(&id, &presigned.url) {
                Some(attachment) => {
                    debug!(attachment_id = %id, "download URL refreshed");
                    self.dispatch(ClientEvent::Message(MessageEvent::AttachmentUpdated(
                        attachment,
                    )));
                }
                None => debug!(attachment_id = %id, "download URL for removed attachment ignored"),
            }
            return;
        }
        if !self.attachments.is_staged(&id) {
            warn!(attachment_id = %id, "presigned URL for unknown attachment ignored");
            return;
        }
        if self.update_attachment(&id, AttachmentState::Uploading(0)) {
            self.attachments.upload(&presigned);
        } else {
            self.attachments.discard(&id);
        }
    }

    fn on_attachment_failure(&mut self, failure: AttachmentFailure) {
        let code = ErrorCode::from_code(failure.error_code);
        warn!(
            attachment_id = %failure.attachment_id,
            ?code,
            "attachment rejected by server"
        );
        self.attachments.discard(&failure.attachment_id);
        self.fail_attachment(
            &failure.attachment_id,
            code,
            failure.error_message,
            Some(CorrectiveAction::from_code(failure.error_code)),
        );
    }

    fn on_server_error(&mut self, code: u16, message: String) {
        let error_code = ErrorCode::from_code(code);
        warn!(code, message = %message, state = %self.state, "server error");

        let authenticated = self.auth.is_authorized() || self.auth.has_refresh_token();
        if error_code.is_unauthorized() && authenticated {
            if !self.auth_retry_used
                && self.config.auto_refresh_token_when_expired
                && self.auth.has_refresh_token()
            {
                info!("session rejected with 401, refreshing jwt");
                self.auth_retry_used = true;
                self.refresh_auth();
                return;
            }
            self.dispatch_error(
                error_code,
                Some(message.clone()),
                CorrectiveAction::ReAuthenticate,
            );
            self.fail_session(error_code, Some(message));
            return;
        }

        let configuring = matches!(
            self.state,
            ClientState::Connecting | ClientState::Reconnecting
        );
        match error_code {
            ErrorCode::SessionHasExpired | ErrorCode::SessionNotFound => {
                self.fail_session(error_code, Some(message));
            }
            _ if configuring => self.fail_session(error_code, Some(message)),
            _ => {
                if let Some(failed) = self.store.fail_pending(error_code, Some(message.clone())) {
                    self.dispatch(ClientEvent::Message(MessageEvent::MessageUpdated(failed)));
                }
                self.dispatch_error(error_code, Some(message), CorrectiveAction::from_code(code));
            }
        }
    }

    // === Uploads, timers, async results ===

    fn handle_upload_signal(&mut self, signal: UploadSignal) {
        match signal {
            UploadSignal::Progress {
                attachment_id,
                percent,
            } => {
                let unchanged = self.store.attachment(&attachment_id).map_or(true, |attachment| {
                    attachment.state == AttachmentState::Uploading(percent)
                });
                if !unchanged {
                    self.update_attachment(&attachment_id, AttachmentState::Uploading(percent));
                }
            }
            UploadSignal::Finished {
                attachment_id,
                result,
            } => {
                self.attachments.finish(&attachment_id);
                let settled = self
                    .store
                    .attachment(&attachment_id)
                    .map_or(true, |attachment| attachment.state.is_terminal());
                match result {
                    Ok(()) => debug!(attachment_id = %attachment_id, "upload finished"),
                    Err(_) if settled => {}
                    Err(ApiError::Cancelled) => self.fail_attachment(
                        &attachment_id,
                        ErrorCode::CancellationError,
                        "upload cancelled".into(),
                        None,
                    ),
                    Err(e) => {
                        let action = e
                            .status()
                            .map(CorrectiveAction::from_code)
                            .unwrap_or(CorrectiveAction::Unknown);
                        let code = MessagingError::Api(e.clone()).error_code();
                        self.fail_attachment(&attachment_id, code, e.to_string(), Some(action));
                    }
                }
            }
        }
    }

    fn handle_timer_event(&mut self, event: SessionTimerEvent) {
        match event {
            SessionTimerEvent::Duration(seconds) => {
                self.dispatch(ClientEvent::Event(Event::SessionDuration { seconds }));
            }
            SessionTimerEvent::ExpirationNotice(seconds_remaining) => {
                self.dispatch(ClientEvent::Event(Event::SessionExpirationNotice {
                    seconds_remaining,
                }));
            }
            SessionTimerEvent::HealthCheckDue => {
                if self.state.is_configured() {
                    if let Err(e) = self.send_health_check() {
                        warn!(error = %e, "scheduled health check failed");
                    }
                }
            }
        }
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Reconnect => {
                if self.state == ClientState::Reconnecting {
                    info!(attempt = self.reconnection.attempts(), "reconnecting");
                    self.open_socket();
                } else {
                    debug!(state = %self.state, "stale reconnect ignored");
                }
            }
            Internal::AuthRefreshed(outcome) => self.on_auth_refreshed(outcome),
            Internal::HistoryFetched(result) => self.on_history_fetched(result),
            Internal::DeploymentConfigFetched { result, reply } => match result {
                Ok(deployment) => {
                    self.attachments
                        .set_max_file_size_kb(deployment.max_file_size_kb());
                    info!(version = %deployment.version, "deployment config loaded");
                    let _ = reply.send(Ok(deployment));
                }
                Err(e) => {
                    let action = e
                        .status()
                        .map(CorrectiveAction::from_code)
                        .unwrap_or(CorrectiveAction::Unknown);
                    self.dispatch_error(
                        ErrorCode::DeploymentConfigFetchFailure,
                        Some(e.to_string()),
                        action,
                    );
                    let _ = reply.send(Err(e.into()));
                }
            },
        }
    }

    fn on_auth_refreshed(&mut self, outcome: AuthOutcome) {
        if !self.state.is_active() {
            debug!(state = %self.state, "auth refresh result after close ignored");
            return;
        }
        match outcome {
            AuthOutcome::Success => {
                if let Err(e) = self.send_configure() {
                    error!(error = %e, "failed to reconfigure after refresh");
                }
            }
            AuthOutcome::Cancelled => warn!("auth refresh cancelled"),
            AuthOutcome::Failure { code, message } => {
                self.dispatch_error(code, Some(message.clone()), CorrectiveAction::ReAuthenticate);
                self.fail_session(code, Some(message));
            }
        }
    }

    fn on_history_fetched(&mut self, result: Result<MessageEntityList, ApiError>) {
        let Some(reply) = self.pending_history.take() else {
            debug!("history result without a pending request ignored");
            return;
        };
        match result {
            Ok(page) => {
                let page = self.store.update_history(&page);
                debug!(
                    inserted = page.messages.len(),
                    start_of_conversation = page.start_of_conversation,
                    "history page fetched"
                );
                self.dispatch(ClientEvent::Message(MessageEvent::HistoryFetched {
                    messages: page.messages,
                    start_of_conversation: page.start_of_conversation,
                }));
                let _ = reply.send(Ok(()));
            }
            Err(e) => {
                warn!(error = %e, "history fetch failed");
                let action = e
                    .status()
                    .map(CorrectiveAction::from_code)
                    .unwrap_or(CorrectiveAction::Unknown);
                self.dispatch_error(ErrorCode::HistoryFetchFailure, Some(e.to_string()), action);
                let _ = reply.send(Err(e.into()));
            }
        }
    }

    // === Helpers ===

    /// Sends the configure request, restoring an authenticated session first
    /// if one existed before and the jwt is gone.
    fn send_configure(&mut self) -> MessagingResult<()> {
        if let Some(jwt) = self.auth.jwt() {
            return self.send(&Request::configure(
                &self.token,
                &self.config.deployment_id,
                Some(&jwt),
            ));
        }
        if self.config.auto_refresh_token_when_expired
            && self.auth.has_refresh_token()
            && self.vault.was_authenticated()
        {
            debug!("restoring authenticated session");
            self.refresh_auth();
            return Ok(());
        }
        self.send(&Request::configure(
            &self.token,
            &self.config.deployment_id,
            None,
        ))
    }

    fn refresh_auth(&self) {
        let auth = self.auth.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let outcome = auth.refresh_token().await;
            let _ = internal.send(Internal::AuthRefreshed(outcome));
        });
    }

    fn send(&mut self, request: &Request) -> MessagingResult<()> {
        let frame = request.encode()?;
        self.send_frame(request.action(), frame)
    }

    fn send_frame(&mut self, action: &str, frame: String) -> MessagingResult<()> {
        if self.config.log_requests {
            debug!(action, "sending frame");
        }
        self.socket.send(frame)?;
        Ok(())
    }

    /// Moves an attachment and reports the change. Returns false if the
    /// transition was rejected.
    fn update_attachment(&mut self, attachment_id: &str, state: AttachmentState) -> bool {
        match self.store.update_attachment_state(attachment_id, state) {
            Ok(attachment) => {
                self.dispatch(ClientEvent::Message(MessageEvent::AttachmentUpdated(
                    attachment,
                )));
                true
            }
            Err(e) => {
                debug!(attachment_id, error = %e, "attachment update skipped");
                false
            }
        }
    }

    fn fail_attachment(
        &mut self,
        attachment_id: &str,
        code: ErrorCode,
        message: String,
        report: Option<CorrectiveAction>,
    ) {
        self.update_attachment(
            attachment_id,
            AttachmentState::Error {
                code,
                message: message.clone(),
            },
        );
        if let Some(action) = report {
            self.dispatch_error(code, Some(message), action);
        }
    }

    /// Fails every staged or in-flight upload without reporting an error,
    /// and forgets outstanding download URL requests.
    fn cancel_uploads(&mut self) {
        self.url_requests.clear();
        for id in self.attachments.cancel_all() {
            self.fail_attachment(
                &id,
                ErrorCode::CancellationError,
                "upload cancelled".into(),
                None,
            );
        }
    }

    fn require_configured(&self, operation: &str) -> MessagingResult<()> {
        if self.state.is_configured() {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn invalid_state(&self, operation: &str) -> MessagingError {
        MessagingError::InvalidState(format!("cannot {} while {}", operation, self.state))
    }

    fn transition(&mut self, new: ClientState) {
        if self.state == new {
            return;
        }
        let old = std::mem::replace(&mut self.state, new.clone());
        info!(old = %old, new = %new, "state changed");
        self.dispatch(ClientEvent::StateChanged { old, new });
    }

    fn dispatch_error(&self, code: ErrorCode, message: Option<String>, action: CorrectiveAction) {
        self.dispatch(ClientEvent::Event(Event::Error(ErrorInfo::new(
            code, message, action,
        ))));
    }

    fn dispatch(&self, event: ClientEvent) {
        self.dispatcher.dispatch(event);
    }
}
