// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! WebSocket Transport
//!
//! Real socket implementation using tokio-tungstenite. Each lifecycle runs
//! on its own task: it performs the handshake, pumps frames in both
//! directions and runs the ping/pong keepalive.

use std::future;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use super::error::NetworkError;
use super::transport::{SocketConfig, SocketEvent, SocketListener, SocketTransport};

/// Close code used when no close frame was received.
const NO_STATUS_RECEIVED: u16 = 1005;

enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// WebSocket transport for the messaging connection.
///
/// # Example
///
/// ```ignore
/// use webmessaging_core::network::{SocketConfig, SocketTransport, WebSocketTransport};
///
/// let mut socket = WebSocketTransport::new();
/// socket.open(&config, listener);
/// socket.send(r#"{"action":"echo"}"#.to_string())?;
/// ```
#[derive(Default)]
pub struct WebSocketTransport {
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    task: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    /// Creates a new, inactive transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn deactivate(&mut self) {
        self.outbound = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl SocketTransport for WebSocketTransport {
    fn open(&mut self, config: &SocketConfig, listener: SocketListener) {
        self.deactivate();

        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound = Some(tx);
        self.task = Some(tokio::spawn(run_socket(config.clone(), listener, rx)));
    }

    fn send(&mut self, text: String) -> Result<(), NetworkError> {
        let outbound = self.outbound.as_ref().ok_or(NetworkError::NotConnected)?;
        outbound
            .send(Outbound::Text(text))
            .map_err(|_| NetworkError::ConnectionClosed)
    }

    fn close(&mut self, code: u16, reason: &str) {
        if let Some(outbound) = self.outbound.as_ref() {
            let _ = outbound.send(Outbound::Close {
                code,
                reason: reason.to_string(),
            });
        }
    }
}

fn build_request(
    config: &SocketConfig,
) -> Result<tungstenite::handshake::client::Request, NetworkError> {
    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| NetworkError::ConnectionFailed(format!("Invalid WebSocket request: {}", e)))?;

    if !config.origin.is_empty() {
        let origin = HeaderValue::from_str(&config.origin)
            .map_err(|e| NetworkError::ConnectionFailed(format!("Invalid origin: {}", e)))?;
        request.headers_mut().insert("Origin", origin);
    }

    Ok(request)
}

async fn run_socket(
    config: SocketConfig,
    listener: SocketListener,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let request = match build_request(&config) {
        Ok(request) => request,
        Err(e) => {
            listener.emit(SocketEvent::Failure(e));
            return;
        }
    };

    let connected = time::timeout(
        config.connect_timeout,
        tokio_tungstenite::connect_async(request),
    )
    .await;

    let stream = match connected {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(tungstenite::Error::Http(response))) => {
            let status = response.status().as_u16();
            warn!(status, "WebSocket handshake rejected");
            listener.emit(SocketEvent::Failure(NetworkError::HandshakeRejected(status)));
            return;
        }
        Ok(Err(e)) => {
            warn!(error = %e, "WebSocket connection failed");
            listener.emit(SocketEvent::Failure(NetworkError::ConnectionFailed(
                e.to_string(),
            )));
            return;
        }
        Err(_) => {
            warn!(
                timeout_secs = config.connect_timeout.as_secs(),
                "WebSocket connect timed out"
            );
            listener.emit(SocketEvent::Failure(NetworkError::Timeout));
            return;
        }
    };

    info!(generation = listener.generation(), "WebSocket connected");
    listener.emit(SocketEvent::Open);

    let (mut write, mut read) = stream.split();

    let keep_alive = config.keep_alive;
    let keep_alive_active = keep_alive.is_active();
    if !keep_alive_active {
        warn!(
            ping_ms = keep_alive.ping_interval.as_millis() as u64,
            pong_ms = keep_alive.pong_interval.as_millis() as u64,
            "ping interval must exceed pong interval, keepalive disabled"
        );
    }

    let mut ping_timer = time::interval_at(
        Instant::now() + keep_alive.ping_interval,
        keep_alive.ping_interval.max(std::time::Duration::from_millis(1)),
    );
    let mut pong_deadline: Option<Instant> = None;
    let mut close_request: Option<(u16, String, Instant)> = None;

    loop {
        let pong_wait = async {
            match pong_deadline {
                Some(deadline) => time::sleep_until(deadline).await,
                None => future::pending().await,
            }
        };
        let close_wait = async {
            match close_request.as_ref() {
                Some((_, _, deadline)) => time::sleep_until(*deadline).await,
                None => future::pending().await,
            }
        };

        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    listener.emit(SocketEvent::Message(text));
                }
                Some(Ok(Message::Pong(_))) => {
                    pong_deadline = None;
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                    if close_request.is_none() {
                        listener.emit(SocketEvent::Closing {
                            code,
                            reason: reason.clone(),
                        });
                    }
                    debug!(code, %reason, "WebSocket closed");
                    listener.emit(SocketEvent::Closed { code, reason });
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    match close_request.take() {
                        Some((code, reason, _)) => {
                            listener.emit(SocketEvent::Closed { code, reason });
                        }
                        None => {
                            warn!(error = %e, "WebSocket read error");
                            listener.emit(SocketEvent::Failure(
                                NetworkError::ConnectionFailed(e.to_string()),
                            ));
                        }
                    }
                    break;
                }
                None => {
                    match close_request.take() {
                        Some((code, reason, _)) => {
                            listener.emit(SocketEvent::Closed { code, reason });
                        }
                        None => {
                            listener.emit(SocketEvent::Failure(NetworkError::ConnectionClosed));
                        }
                    }
                    break;
                }
            },
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        warn!(error = %e, "WebSocket send failed");
                        listener.emit(SocketEvent::Failure(NetworkError::SendFailed(
                            e.to_string(),
                        )));
                        break;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    if close_request.is_some() {
                        continue;
                    }
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    listener.emit(SocketEvent::Closing {
                        code,
                        reason: reason.clone(),
                    });
                    close_request = Some((code, reason, Instant::now() + config.close_timeout));
                }
                None => break,
            },
            _ = ping_timer.tick(), if keep_alive_active && close_request.is_none() => {
                if pong_deadline.is_none() {
                    pong_deadline = Some(Instant::now() + keep_alive.pong_interval);
                }
                if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                    debug!(error = %e, "ping send failed");
                }
            }
            _ = pong_wait => {
                warn!(
                    pong_ms = keep_alive.pong_interval.as_millis() as u64,
                    "no pong received, deactivating socket"
                );
                listener.emit(SocketEvent::Failure(NetworkError::Timeout));
                break;
            }
            _ = close_wait => {
                if let Some((code, reason, _)) = close_request.take() {
                    debug!(code, "close handshake timed out");
                    listener.emit(SocketEvent::Closed { code, reason });
                }
                break;
            }
        }
    }
}
