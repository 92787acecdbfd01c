// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Mock Socket
//!
//! In-memory [`SocketTransport`] for tests. The paired [`MockSocketHandle`]
//! plays the server: it inspects sent frames and injects socket events.

use std::sync::Arc;

use parking_lot::Mutex;

use super::error::NetworkError;
use super::transport::{SocketConfig, SocketEvent, SocketListener, SocketTransport};

#[derive(Default)]
struct MockSocketState {
    listener: Option<SocketListener>,
    last_config: Option<SocketConfig>,
    sent: Vec<String>,
    open_calls: usize,
    close_calls: Vec<(u16, String)>,
    auto_open: bool,
    auto_close: bool,
    reject_sends: bool,
    open: bool,
}

/// Mock socket for testing.
pub struct MockSocket {
    state: Arc<Mutex<MockSocketState>>,
}

/// Server-side handle to a [`MockSocket`].
#[derive(Clone)]
pub struct MockSocketHandle {
    state: Arc<Mutex<MockSocketState>>,
}

impl MockSocket {
    /// Creates a socket that opens and closes immediately when asked.
    pub fn new() -> (MockSocket, MockSocketHandle) {
        let state = Arc::new(Mutex::new(MockSocketState {
            auto_open: true,
            auto_close: true,
            ..Default::default()
        }));
        (
            MockSocket {
                state: state.clone(),
            },
            MockSocketHandle { state },
        )
    }
}

impl SocketTransport for MockSocket {
    fn open(&mut self, config: &SocketConfig, listener: SocketListener) {
        let mut state = self.state.lock();
        state.open_calls += 1;
        state.last_config = Some(config.clone());
        state.open = false;
        if state.auto_open {
            state.open = true;
            listener.emit(SocketEvent::Open);
        }
        state.listener = Some(listener);
    }

    fn send(&mut self, text: String) -> Result<(), NetworkError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(NetworkError::NotConnected);
        }
        if state.reject_sends {
            return Err(NetworkError::SendFailed("send buffer full".into()));
        }
        state.sent.push(text);
        Ok(())
    }

    fn close(&mut self, code: u16, reason: &str) {
        let mut state = self.state.lock();
        state.close_calls.push((code, reason.to_string()));
        if state.auto_close && state.open {
            state.open = false;
            if let Some(listener) = state.listener.as_ref() {
                listener.emit(SocketEvent::Closing {
                    code,
                    reason: reason.to_string(),
                });
                listener.emit(SocketEvent::Closed {
                    code,
                    reason: reason.to_string(),
                });
            }
        }
    }
}

impl MockSocketHandle {
    /// When false, `open` waits for [`complete_open`](Self::complete_open).
    pub fn set_auto_open(&self, auto_open: bool) {
        self.state.lock().auto_open = auto_open;
    }

    /// When false, `close` waits for [`close_from_server`](Self::close_from_server).
    pub fn set_auto_close(&self, auto_close: bool) {
        self.state.lock().auto_close = auto_close;
    }

    /// When true, `send` fails while the socket stays open.
    pub fn set_reject_sends(&self, reject: bool) {
        self.state.lock().reject_sends = reject;
    }

    pub fn open_calls(&self) -> usize {
        self.state.lock().open_calls
    }

    pub fn close_calls(&self) -> Vec<(u16, String)> {
        self.state.lock().close_calls.clone()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn last_config(&self) -> Option<SocketConfig> {
        self.state.lock().last_config.clone()
    }

    /// Raw frames sent by the client.
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// Sent frames parsed as JSON.
    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    /// The `action` of every sent frame, in order.
    pub fn sent_actions(&self) -> Vec<String> {
        self.sent_json()
            .iter()
            .filter_map(|frame| frame.get("action")?.as_str().map(str::to_string))
            .collect()
    }

    pub fn clear_sent(&self) {
        self.state.lock().sent.clear();
    }

    /// Completes a pending open.
    pub fn complete_open(&self) {
        let mut state = self.state.lock();
        state.open = true;
        if let Some(listener) = state.listener.as_ref() {
            listener.emit(SocketEvent::Open);
        }
    }

    /// Delivers a text frame from the server.
    pub fn receive(&self, text: impl Into<String>) {
        let state = self.state.lock();
        if let Some(listener) = state.listener.as_ref() {
            listener.emit(SocketEvent::Message(text.into()));
        }
    }

    /// Fails the current lifecycle.
    pub fn fail(&self, error: NetworkError) {
        let mut state = self.state.lock();
        state.open = false;
        if let Some(listener) = state.listener.as_ref() {
            listener.emit(SocketEvent::Failure(error));
        }
    }

    /// Closes the current lifecycle from the server side.
    pub fn close_from_server(&self, code: u16, reason: &str) {
        let mut state = self.state.lock();
        state.open = false;
        if let Some(listener) = state.listener.as_ref() {
            listener.emit(SocketEvent::Closing {
                code,
                reason: reason.to_string(),
            });
            listener.emit(SocketEvent::Closed {
                code,
                reason: reason.to_string(),
            });
        }
    }
}
