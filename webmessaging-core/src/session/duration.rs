// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session Duration Handler
//!
//! Tracks the server-provided session duration and expiration and schedules
//! two one-shot timers: an expiration notice `notice_interval` before the
//! session expires, and a health check `health_check_lead` before that.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::clock::Clock;

/// Output of the session duration handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTimerEvent {
    /// Session duration in seconds changed.
    Duration(u64),
    /// The session expires in this many seconds.
    ExpirationNotice(u64),
    /// Time to send a health check so the session stays alive.
    HealthCheckDue,
}

pub struct SessionDurationHandler {
    clock: Arc<dyn Clock>,
    notice_interval: Duration,
    health_check_lead: Duration,
    events: mpsc::UnboundedSender<SessionTimerEvent>,
    last_duration: Option<u64>,
    expiration: Option<u64>,
    notice_timer: Option<JoinHandle<()>>,
    health_check_timer: Option<JoinHandle<()>>,
}

impl SessionDurationHandler {
    pub fn new(
        clock: Arc<dyn Clock>,
        notice_interval: Duration,
        health_check_lead: Duration,
        events: mpsc::UnboundedSender<SessionTimerEvent>,
    ) -> Self {
        SessionDurationHandler {
            clock,
            notice_interval,
            health_check_lead,
            events,
            last_duration: None,
            expiration: None,
            notice_timer: None,
            health_check_timer: None,
        }
    }

    /// Last emitted duration.
    pub fn duration(&self) -> Option<u64> {
        self.last_duration
    }

    /// Current expiration in epoch seconds.
    pub fn expiration(&self) -> Option<u64> {
        self.expiration
    }

    pub fn has_scheduled_timers(&self) -> bool {
        self.notice_timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
            || self
                .health_check_timer
                .as_ref()
                .is_some_and(|timer| !timer.is_finished())
    }

    /// Applies fresh duration/expiration data from the server.
    ///
    /// A repeated duration is not re-emitted. A new expiration replaces
    /// both timers.
    pub fn update_session_duration(
        &mut self,
        duration_seconds: Option<u64>,
        expiration_epoch_seconds: Option<u64>,
    ) {
        if let Some(duration) = duration_seconds {
            if self.last_duration != Some(duration) {
                self.last_duration = Some(duration);
                let _ = self.events.send(SessionTimerEvent::Duration(duration));
            }
        }

        if let Some(expiration) = expiration_epoch_seconds {
            if self.expiration != Some(expiration) {
                self.expiration = Some(expiration);
                self.schedule(expiration);
            }
        }
    }

    fn schedule(&mut self, expiration_epoch_seconds: u64) {
        self.cancel_timers();

        let now = self.clock.now_millis();
        let expires_at = expiration_epoch_seconds.saturating_mul(1000);
        if expires_at <= now {
            debug!(expiration_epoch_seconds, "session already expired, no timers scheduled");
            return;
        }

        let notice_at = expires_at.saturating_sub(self.notice_interval.as_millis() as u64);
        let notice_delay = notice_at.saturating_sub(now);
        let seconds_remaining = (expires_at - notice_at.max(now)) / 1000;

        let events = self.events.clone();
        self.notice_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(notice_delay)).await;
            let _ = events.send(SessionTimerEvent::ExpirationNotice(seconds_remaining));
        }));

        let health_check_at = notice_at.saturating_sub(self.health_check_lead.as_millis() as u64);
        if health_check_at <= now {
            let _ = self.events.send(SessionTimerEvent::HealthCheckDue);
        } else {
            let delay = Duration::from_millis(health_check_at - now);
            let events = self.events.clone();
            self.health_check_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = events.send(SessionTimerEvent::HealthCheckDue);
            }));
        }

        debug!(
            notice_in_ms = notice_delay,
            health_check_in_ms = health_check_at.saturating_sub(now),
            "session expiration timers scheduled"
        );
    }

    fn cancel_timers(&mut self) {
        if let Some(timer) = self.notice_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.health_check_timer.take() {
            timer.abort();
        }
    }

    /// Cancels both timers and forgets the last duration.
    pub fn clear(&mut self) {
        self.cancel_timers();
        self.last_duration = None;
        self.expiration = None;
    }
}

impl Drop for SessionDurationHandler {
    fn drop(&mut self) {
        self.cancel_timers();
    }
}
