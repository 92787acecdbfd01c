// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Reconnection Controller
//!
//! Decides whether and when a dropped connection is retried. The policy is
//! a fixed per-attempt interval bounded by a total time budget:
//! `max_attempts = reconnection_timeout / interval`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

/// Reconnection budget and scheduler.
pub struct ReconnectionHandler {
    attempts: Arc<AtomicU32>,
    max_attempts: u32,
    interval: Duration,
    pending: Option<JoinHandle<()>>,
}

impl ReconnectionHandler {
    /// Derives the attempt budget from a total timeout and a fixed interval.
    pub fn new(reconnection_timeout: Duration, interval: Duration) -> Self {
        let max_attempts = if interval.is_zero() {
            0
        } else {
            (reconnection_timeout.as_millis() / interval.as_millis()).min(u32::MAX as u128) as u32
        };
        Self::with_max_attempts(max_attempts, interval)
    }

    /// Creates a handler with an explicit attempt budget.
    pub fn with_max_attempts(max_attempts: u32, interval: Duration) -> Self {
        ReconnectionHandler {
            attempts: Arc::new(AtomicU32::new(0)),
            max_attempts,
            interval,
            pending: None,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the next attempt.
    pub fn delay(&self) -> Duration {
        self.interval
    }

    pub fn should_reconnect(&self) -> bool {
        self.attempts() < self.max_attempts
    }

    /// True while an attempt is scheduled but has not fired yet.
    pub fn has_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Schedules `attempt` after the reconnection delay.
    ///
    /// Does nothing once the budget is exhausted. A previously scheduled
    /// attempt is cancelled first. The counter is incremented before
    /// `attempt` runs, so a panicking attempt still counts.
    pub fn reconnect<F>(&mut self, attempt: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.should_reconnect() {
            debug!(
                attempts = self.attempts(),
                max_attempts = self.max_attempts,
                "reconnection budget exhausted"
            );
            return;
        }

        self.cancel_pending();

        let attempts = self.attempts.clone();
        let delay = self.delay();
        debug!(
            attempt = self.attempts() + 1,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            attempts.fetch_add(1, Ordering::SeqCst);
            attempt();
        }));
    }

    /// Zeroes the counter and cancels any scheduled attempt.
    pub fn clear(&mut self) {
        self.attempts.store(0, Ordering::SeqCst);
        self.cancel_pending();
    }

    fn cancel_pending(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}

impl Drop for ReconnectionHandler {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

impl std::fmt::Debug for ReconnectionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectionHandler")
            .field("attempts", &self.attempts())
            .field("max_attempts", &self.max_attempts)
            .field("interval", &self.interval)
            .finish()
    }
}
