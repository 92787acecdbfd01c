// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Event System
//!
//! Callbacks for client events.

use std::sync::Arc;

use super::state::ClientState;
use crate::messaging::{Attachment, Message};
use crate::network::ErrorInfo;

/// Conversation events not tied to a specific message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The agent is typing.
    AgentTyping {
        /// Indicator duration in milliseconds.
        duration_ms: Option<u64>,
    },

    /// A health check echo came back.
    HealthChecked,

    /// A recoverable or terminal error the host should know about.
    Error(ErrorInfo),

    /// The conversation was started by the deployment.
    ConversationAutostart,

    /// The agent or bot disconnected the conversation.
    ConversationDisconnect,

    /// The server closed every connection of this session.
    ConnectionClosed,

    /// An authenticated session was established.
    Authorized,

    /// The authenticated session ended.
    Logout,

    /// The conversation history was cleared.
    ConversationCleared,

    /// The session expires soon.
    SessionExpirationNotice {
        /// Seconds until expiration.
        seconds_remaining: u64,
    },

    /// The server reported the session duration.
    SessionDuration {
        /// Session duration in seconds.
        seconds: u64,
    },

    /// The host user signed in on another device of this session.
    SignedIn,
}

/// Message and attachment lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEvent {
    /// The pending message changed state.
    MessageUpdated(Message),

    /// A message was appended to the history.
    MessageInserted(Message),

    /// A history page was fetched.
    HistoryFetched {
        /// Messages, oldest first.
        messages: Vec<Message>,
        /// True when no older page exists.
        start_of_conversation: bool,
    },

    /// An attachment changed state.
    AttachmentUpdated(Attachment),
}

/// Everything a client reports to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Connection state changed.
    StateChanged {
        /// The previous state.
        old: ClientState,
        /// The new state.
        new: ClientState,
    },

    /// Message lifecycle event.
    Message(MessageEvent),

    /// Conversation event.
    Event(Event),
}

/// Event handler trait.
///
/// Implement this trait to receive client events.
pub trait EventHandler: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: ClientEvent);
}

/// Simple callback-based event handler.
///
/// Wraps a closure for easy event handling.
pub struct CallbackHandler<F>
where
    F: Fn(ClientEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(ClientEvent) + Send + Sync,
{
    /// Creates a new callback handler.
    pub fn new(callback: F) -> Self {
        CallbackHandler { callback }
    }
}

impl<F> EventHandler for CallbackHandler<F>
where
    F: Fn(ClientEvent) + Send + Sync,
{
    fn on_event(&self, event: ClientEvent) {
        (self.callback)(event);
    }
}

/// Event dispatcher for managing multiple handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    /// Creates a new event dispatcher.
    pub fn new() -> Self {
        EventDispatcher {
            handlers: Vec::new(),
        }
    }

    /// Adds an event handler.
    pub fn add_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Removes all handlers.
    pub fn clear_handlers(&mut self) {
        self.handlers.clear();
    }

    /// Returns the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Dispatches an event to all handlers.
    pub fn dispatch(&self, event: ClientEvent) {
        for handler in &self.handlers {
            handler.on_event(event.clone());
        }
    }
}
