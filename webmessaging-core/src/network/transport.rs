// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Socket Transport Trait
//!
//! Platform-agnostic abstraction over one native WebSocket implementation.

use std::time::Duration;

use tokio::sync::mpsc;

use super::error::NetworkError;

/// Lifecycle and data events reported by a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The open attempt succeeded.
    Open,
    /// A text frame arrived.
    Message(String),
    /// A graceful close has started.
    Closing { code: u16, reason: String },
    /// Terminal event of a lifecycle that ended with a close handshake.
    Closed { code: u16, reason: String },
    /// The open attempt failed, or an open socket broke.
    Failure(NetworkError),
}

/// A socket event tagged with the lifecycle that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketSignal {
    pub generation: u64,
    pub event: SocketEvent,
}

/// Sink handed to [`SocketTransport::open`].
///
/// Each open attempt gets a new generation so events from a superseded
/// socket can be told apart and ignored.
#[derive(Debug, Clone)]
pub struct SocketListener {
    generation: u64,
    tx: mpsc::UnboundedSender<SocketSignal>,
}

impl SocketListener {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<SocketSignal>) -> Self {
        SocketListener { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Reports an event. Returns false once the receiving side is gone.
    pub fn emit(&self, event: SocketEvent) -> bool {
        self.tx
            .send(SocketSignal {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Application-level keepalive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    /// Interval between pings once the socket is open.
    pub ping_interval: Duration,
    /// How long to wait for a pong before declaring the socket dead.
    pub pong_interval: Duration,
}

impl KeepAlive {
    /// Keepalive only runs when the ping interval exceeds the pong interval.
    pub fn is_active(&self) -> bool {
        !self.pong_interval.is_zero() && self.ping_interval > self.pong_interval
    }
}

impl Default for KeepAlive {
    fn default() -> Self {
        KeepAlive {
            ping_interval: Duration::from_secs(30),
            pong_interval: Duration::from_secs(10),
        }
    }
}

/// Configuration for one socket lifecycle.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// `wss://` URL including query parameters.
    pub url: String,
    /// Value of the `Origin` header.
    pub origin: String,
    /// Keepalive settings.
    pub keep_alive: KeepAlive,
    /// Time allowed for TCP + TLS + WebSocket handshake.
    pub connect_timeout: Duration,
    /// Time allowed for the server to answer our close frame.
    pub close_timeout: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        SocketConfig {
            url: String::new(),
            origin: String::new(),
            keep_alive: KeepAlive::default(),
            connect_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Socket trait for the messaging connection.
///
/// Contract:
/// - every `open` delivers exactly one of [`SocketEvent::Open`] or
///   [`SocketEvent::Failure`];
/// - every lifecycle ends with exactly one terminal event, `Closed`
///   (preceded by `Closing` for graceful shutdown) or `Failure`;
/// - a keepalive timeout is reported as a `Failure` and the socket
///   deactivates itself.
///
/// Methods never block; implementations drive I/O on their own tasks.
pub trait SocketTransport: Send {
    /// Starts an open attempt, replacing any previous lifecycle.
    fn open(&mut self, config: &SocketConfig, listener: SocketListener);

    /// Queues a text frame.
    fn send(&mut self, text: String) -> Result<(), NetworkError>;

    /// Starts a graceful close.
    fn close(&mut self, code: u16, reason: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_alive_requires_ping_longer_than_pong() {
        let active = KeepAlive {
            ping_interval: Duration::from_secs(30),
            pong_interval: Duration::from_secs(10),
        };
        assert!(active.is_active());

        let inverted = KeepAlive {
            ping_interval: Duration::from_secs(5),
            pong_interval: Duration::from_secs(10),
        };
        assert!(!inverted.is_active());

        let equal = KeepAlive {
            ping_interval: Duration::from_secs(10),
            pong_interval: Duration::from_secs(10),
        };
        assert!(!equal.is_active());
    }

    #[test]
    fn test_listener_tags_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = SocketListener::new(7, tx);
        assert!(listener.emit(SocketEvent::Open));

        let signal = rx.try_recv().unwrap();
        assert_eq!(signal.generation, 7);
        assert_eq!(signal.event, SocketEvent::Open);

        drop(rx);
        assert!(!listener.emit(SocketEvent::Open));
    }
}
