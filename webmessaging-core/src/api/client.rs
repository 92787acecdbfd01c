// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Messaging Client
//!
//! Main entry point for hosts.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::actor::{self, ActorParts, Command, Reply};
use super::config::Configuration;
use super::error::{MessagingError, MessagingResult};
use super::events::{CallbackHandler, ClientEvent, EventDispatcher, EventHandler};
use super::state::ClientState;
use crate::auth::{AuthCredentials, AuthHandler, AuthOutcome};
use crate::messaging::Message;
use crate::network::{
    AttachmentUploader, HttpApi, HttpUploader, ProgressCallback, SocketTransport,
    WebMessagingApi, WebSocketTransport,
};
use crate::protocol::DeploymentConfig;
use crate::push::PushService;
use crate::session::{Clock, SystemClock};
use crate::storage::Vault;

/// Handle to a running messaging session.
///
/// All operations are forwarded to one actor task that owns the socket and
/// every piece of session state. Dropping the last handle shuts the actor
/// down and closes the socket.
///
/// # Example
///
/// ```ignore
/// use webmessaging_core::api::{Configuration, MessagingClient};
///
/// let client = MessagingClient::builder(Configuration::new("deployment-id", "mypurecloud.com"))
///     .on_event(|event| println!("event: {:?}", event))
///     .build()?;
///
/// client.connect(true).await?;
/// client.send_message("Hello", Default::default()).await?;
/// ```
pub struct MessagingClient {
    commands: mpsc::UnboundedSender<Command>,
    auth: Arc<AuthHandler>,
    push: Arc<PushService>,
    config: Configuration,
}

impl MessagingClient {
    pub fn builder(config: Configuration) -> MessagingClientBuilder {
        MessagingClientBuilder::new(config)
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    // === Connection ===

    /// Opens the socket. With `should_configure` the session is configured
    /// as soon as the socket is open.
    pub async fn connect(&self, should_configure: bool) -> MessagingResult<()> {
        self.request(|reply| Command::Connect {
            should_configure,
            reply,
        })
        .await
    }

    /// Configures the session on an open socket.
    pub async fn configure_session(&self) -> MessagingResult<()> {
        self.request(|reply| Command::ConfigureSession { reply }).await
    }

    /// Closes the socket. A no-op when nothing is connected.
    pub async fn disconnect(&self) -> MessagingResult<()> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    pub async fn current_state(&self) -> MessagingResult<ClientState> {
        self.query(|reply| Command::State { reply }).await
    }

    // === Messaging ===

    /// Sends the pending message with every uploaded attachment.
    pub async fn send_message(
        &self,
        text: &str,
        custom_attributes: HashMap<String, String>,
    ) -> MessagingResult<()> {
        let text = text.to_string();
        self.request(|reply| Command::SendMessage {
            text,
            custom_attributes,
            reply,
        })
        .await
    }

    /// Sends an echo to keep the session alive. Rate limited.
    pub async fn send_health_check(&self) -> MessagingResult<()> {
        self.request(|reply| Command::SendHealthCheck { reply }).await
    }

    /// Tells the agent the user is typing. Rate limited.
    pub async fn indicate_typing(&self) -> MessagingResult<()> {
        self.request(|reply| Command::IndicateTyping { reply }).await
    }

    /// Fetches the next (older) page of history.
    ///
    /// Resolves once the page has been folded in and
    /// [`MessageEvent::HistoryFetched`](super::MessageEvent::HistoryFetched)
    /// was delivered.
    pub async fn fetch_next_page(&self) -> MessagingResult<()> {
        self.request(|reply| Command::FetchNextPage { reply }).await
    }

    /// Drops cached history; the next fetch starts from the newest page.
    pub async fn invalidate_conversation_cache(&self) -> MessagingResult<()> {
        self.request(|reply| Command::InvalidateConversationCache { reply })
            .await
    }

    /// Asks the server to clear the conversation.
    pub async fn clear_conversation(&self) -> MessagingResult<()> {
        self.request(|reply| Command::ClearConversation { reply })
            .await
    }

    /// Asks the server to close every connection of this session.
    pub async fn close_session(&self) -> MessagingResult<()> {
        self.request(|reply| Command::CloseSession { reply }).await
    }

    pub async fn pending_message(&self) -> MessagingResult<Message> {
        self.query(|reply| Command::PendingMessage { reply }).await
    }

    /// Messages held in memory, oldest first.
    pub async fn history(&self) -> MessagingResult<Vec<Message>> {
        self.query(|reply| Command::History { reply }).await
    }

    // === Attachments ===

    /// Starts uploading a file and returns its attachment id.
    ///
    /// Progress is reported to `on_progress` and as
    /// [`MessageEvent::AttachmentUpdated`](super::MessageEvent::AttachmentUpdated).
    pub async fn attach(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        on_progress: Option<ProgressCallback>,
    ) -> MessagingResult<String> {
        let file_name = file_name.to_string();
        self.request(|reply| Command::Attach {
            bytes,
            file_name,
            on_progress,
            reply,
        })
        .await
    }

    /// Removes an uploaded attachment from the pending message.
    pub async fn detach(&self, attachment_id: &str) -> MessagingResult<()> {
        let attachment_id = attachment_id.to_string();
        self.request(|reply| Command::Detach {
            attachment_id,
            reply,
        })
        .await
    }

    /// Requests a fresh download URL for an uploaded or sent attachment.
    ///
    /// The new URL arrives as
    /// [`MessageEvent::AttachmentUpdated`](super::MessageEvent::AttachmentUpdated).
    pub async fn refresh_attachment_url(&self, attachment_id: &str) -> MessagingResult<()> {
        let attachment_id = attachment_id.to_string();
        self.request(|reply| Command::RefreshAttachmentUrl {
            attachment_id,
            reply,
        })
        .await
    }

    /// Loads the deployment config and applies its upload limits.
    pub async fn fetch_deployment_config(&self) -> MessagingResult<DeploymentConfig> {
        self.request(|reply| Command::FetchDeploymentConfig { reply })
            .await
    }

    // === Authentication ===

    /// Exchanges an OAuth code for credentials. Connect afterwards to open
    /// an authenticated session.
    pub async fn authorize(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> AuthOutcome {
        self.auth.authorize(code, redirect_uri, code_verifier).await
    }

    /// Revokes the authenticated session. The server confirms with a
    /// logout event, which closes the connection.
    pub async fn logout(&self) -> AuthOutcome {
        self.auth.logout().await
    }

    pub async fn refresh_token(&self) -> AuthOutcome {
        self.auth.refresh_token().await
    }

    /// Cancels auth requests in flight; they resolve to `Cancelled`.
    pub fn cancel_auth(&self) {
        self.auth.cancel();
    }

    pub fn credentials(&self) -> AuthCredentials {
        self.auth.credentials()
    }

    pub fn is_authorized(&self) -> bool {
        self.auth.is_authorized()
    }

    /// Push device registration for this session.
    pub fn push(&self) -> &PushService {
        &self.push
    }

    /// Closes the connection and stops the actor.
    pub async fn shutdown(&self) -> MessagingResult<()> {
        self.query(|reply| Command::Shutdown { reply }).await
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> MessagingResult<T> {
        self.query(command).await?
    }

    async fn query<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> MessagingResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| MessagingError::ClientShutDown)?;
        response.await.map_err(|_| MessagingError::ClientShutDown)
    }
}

/// Builder for [`MessagingClient`].
///
/// Every collaborator defaults to its production implementation; tests
/// swap in mocks.
pub struct MessagingClientBuilder {
    config: Configuration,
    socket: Option<Box<dyn SocketTransport>>,
    api: Option<Arc<dyn WebMessagingApi>>,
    uploader: Option<Arc<dyn AttachmentUploader>>,
    vault: Option<Arc<Vault>>,
    clock: Option<Arc<dyn Clock>>,
    dispatcher: EventDispatcher,
    device_type: String,
}

impl MessagingClientBuilder {
    pub fn new(config: Configuration) -> Self {
        MessagingClientBuilder {
            config,
            socket: None,
            api: None,
            uploader: None,
            vault: None,
            clock: None,
            dispatcher: EventDispatcher::new(),
            device_type: std::env::consts::OS.to_string(),
        }
    }

    /// Sets the socket implementation.
    pub fn socket(mut self, socket: impl SocketTransport + 'static) -> Self {
        self.socket = Some(Box::new(socket));
        self
    }

    /// Sets the HTTP side channel.
    pub fn api(mut self, api: Arc<dyn WebMessagingApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn uploader(mut self, uploader: Arc<dyn AttachmentUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Sets the vault. Without one, credentials live in memory only.
    pub fn vault(mut self, vault: Arc<Vault>) -> Self {
        self.vault = Some(vault);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Device type reported with push registrations.
    pub fn device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }

    /// Adds an event handler.
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.dispatcher.add_handler(handler);
        self
    }

    /// Adds a closure as event handler.
    pub fn on_event<F>(self, callback: F) -> Self
    where
        F: Fn(ClientEvent) + Send + Sync + 'static,
    {
        self.event_handler(Arc::new(CallbackHandler::new(callback)))
    }

    /// Builds the client and spawns its actor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> MessagingResult<MessagingClient> {
        let config = self.config;
        config.validate()?;
        let socket_config = config.socket_config()?;

        let api: Arc<dyn WebMessagingApi> = match self.api {
            Some(api) => api,
            None => Arc::new(
                HttpApi::new(
                    config.api_base_url(),
                    config.deployment_config_url(),
                    config.deployment_id.clone(),
                    config.request_timeout(),
                )?
                .with_request_logging(config.log_requests),
            ),
        };
        let uploader: Arc<dyn AttachmentUploader> = match self.uploader {
            Some(uploader) => uploader,
            None => Arc::new(HttpUploader::new(config.request_timeout())?),
        };
        let vault = self.vault.unwrap_or_else(|| {
            warn!("no vault configured, session credentials will not persist");
            Arc::new(Vault::in_memory())
        });
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let socket = self
            .socket
            .unwrap_or_else(|| Box::new(WebSocketTransport::new()));

        let token = vault.token()?;
        let (auth_tx, auth_rx) = mpsc::unbounded_channel();
        let auth = Arc::new(AuthHandler::new(
            api.clone(),
            vault.clone(),
            config.auto_refresh_token_when_expired,
            auth_tx,
        ));
        let push = Arc::new(PushService::new(
            api.clone(),
            vault.clone(),
            clock.clone(),
            self.device_type,
        ));

        info!(deployment_id = %config.deployment_id, domain = %config.domain, "messaging client created");
        let commands = actor::spawn(ActorParts {
            config: config.clone(),
            socket_config,
            token,
            socket,
            api,
            uploader,
            auth: auth.clone(),
            auth_events: auth_rx,
            vault,
            clock,
            dispatcher: self.dispatcher,
        });

        Ok(MessagingClient {
            commands,
            auth,
            push,
            config,
        })
    }
}
