// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Cooldown Providers
//!
//! Rate limits for health-check and typing requests. Each provider encodes
//! its request only when its own cooldown window has elapsed since the last
//! request the caller reported as sent via `mark_sent`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use super::clock::Clock;
use crate::protocol::Request;

pub const HEALTH_CHECK_COOLDOWN: Duration = Duration::from_secs(30);
pub const TYPING_INDICATOR_COOLDOWN: Duration = Duration::from_secs(5);

struct Cooldown {
    clock: Arc<dyn Clock>,
    window: Duration,
    last_sent: Option<u64>,
}

impl Cooldown {
    fn new(clock: Arc<dyn Clock>, window: Duration) -> Self {
        Cooldown {
            clock,
            window,
            last_sent: None,
        }
    }

    fn remaining(&self) -> Option<Duration> {
        let last = self.last_sent?;
        let elapsed = self.clock.now_millis().saturating_sub(last);
        let window = self.window.as_millis() as u64;
        (elapsed < window).then(|| Duration::from_millis(window - elapsed))
    }

    fn mark_sent(&mut self) {
        self.last_sent = Some(self.clock.now_millis());
    }

    fn try_encode(&self, request: Request) -> Option<String> {
        match request.encode() {
            Ok(encoded) => Some(encoded),
            Err(e) => {
                error!(action = request.action(), error = %e, "failed to encode request");
                None
            }
        }
    }
}

/// Rate-limits health-check echoes.
pub struct HealthCheckProvider {
    cooldown: Cooldown,
}

impl HealthCheckProvider {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        HealthCheckProvider {
            cooldown: Cooldown::new(clock, HEALTH_CHECK_COOLDOWN),
        }
    }

    /// Encoded echo request, or `None` while cooling down.
    pub fn encode_request(&mut self, token: &str) -> Option<String> {
        if self.cooldown.remaining().is_some() {
            return None;
        }
        self.cooldown.try_encode(Request::health_check(token))
    }

    /// Starts the cooldown window. Call once the frame reached the socket.
    pub fn mark_sent(&mut self) {
        self.cooldown.mark_sent();
    }

    pub fn clear(&mut self) {
        self.cooldown.last_sent = None;
    }
}

/// Rate-limits typing indicators.
pub struct UserTypingProvider {
    cooldown: Cooldown,
}

impl UserTypingProvider {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        UserTypingProvider {
            cooldown: Cooldown::new(clock, TYPING_INDICATOR_COOLDOWN),
        }
    }

    /// Encoded typing event, or `None` while cooling down.
    pub fn encode_request(&mut self, token: &str) -> Option<String> {
        if let Some(remaining) = self.cooldown.remaining() {
            warn!(
                remaining_ms = remaining.as_millis() as u64,
                "typing indicator on cooldown"
            );
            return None;
        }
        self.cooldown.try_encode(Request::typing(token))
    }

    pub fn mark_sent(&mut self) {
        self.cooldown.mark_sent();
    }

    pub fn clear(&mut self) {
        self.cooldown.last_sent = None;
    }
}
