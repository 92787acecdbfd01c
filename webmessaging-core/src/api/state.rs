// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Client connection state.

use crate::network::ErrorCode;

/// Connection state of a [`MessagingClient`](super::MessagingClient).
///
/// Exactly one state is current. The host observes changes through
/// [`ClientEvent::StateChanged`](super::ClientEvent::StateChanged).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Connecting,
    Connected,
    Configured {
        connected: bool,
        new_session: bool,
    },
    Reconnecting,
    /// A session configured as read-only: history is visible, sending is not.
    ReadOnly,
    Closing {
        code: u16,
        reason: String,
    },
    Closed {
        code: u16,
        reason: String,
    },
    Error {
        code: ErrorCode,
        message: Option<String>,
    },
}

impl ClientState {
    /// True once the session is configured and writable.
    pub fn is_configured(&self) -> bool {
        matches!(self, ClientState::Configured { connected: true, .. })
    }

    /// True while a socket lifecycle is active or being established.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ClientState::Connecting
                | ClientState::Connected
                | ClientState::Configured { .. }
                | ClientState::ReadOnly
                | ClientState::Reconnecting
        )
    }

    /// True for states from which `connect` is allowed.
    pub fn can_connect(&self) -> bool {
        matches!(
            self,
            ClientState::Idle | ClientState::Closed { .. } | ClientState::Error { .. }
        )
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientState::Idle => write!(f, "Idle"),
            ClientState::Connecting => write!(f, "Connecting"),
            ClientState::Connected => write!(f, "Connected"),
            ClientState::Configured {
                connected,
                new_session,
            } => write!(f, "Configured(connected={}, newSession={})", connected, new_session),
            ClientState::Reconnecting => write!(f, "Reconnecting"),
            ClientState::ReadOnly => write!(f, "ReadOnly"),
            ClientState::Closing { code, reason } => write!(f, "Closing({}, {})", code, reason),
            ClientState::Closed { code, reason } => write!(f, "Closed({}, {})", code, reason),
            ClientState::Error { code, message } => {
                write!(f, "Error({:?}, {})", code, message.as_deref().unwrap_or(""))
            }
        }
    }
}
