// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session Timer Tests
//!
//! Expiration notice and keepalive health check scheduling, run on a
//! paused tokio clock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use webmessaging_core::session::{
    HealthCheckProvider, ManualClock, SessionDurationHandler, SessionTimerEvent,
    HEALTH_CHECK_COOLDOWN,
};

const NOW_SECS: u64 = 1_767_225_600;

fn handler(clock: &ManualClock) -> (SessionDurationHandler, mpsc::UnboundedReceiver<SessionTimerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = SessionDurationHandler::new(
        Arc::new(clock.clone()),
        Duration::from_secs(60),
        Duration::from_secs(10),
        tx,
    );
    (handler, rx)
}

#[tokio::test(start_paused = true)]
async fn test_health_check_precedes_expiration_notice() {
    let clock = ManualClock::new(NOW_SECS * 1000);
    let (mut handler, mut rx) = handler(&clock);
    let start = Instant::now();

    handler.update_session_duration(Some(86_400), Some(NOW_SECS + 120));
    assert_eq!(rx.recv().await, Some(SessionTimerEvent::Duration(86_400)));

    assert_eq!(rx.recv().await, Some(SessionTimerEvent::HealthCheckDue));
    assert_eq!(start.elapsed(), Duration::from_secs(50));

    assert_eq!(rx.recv().await, Some(SessionTimerEvent::ExpirationNotice(60)));
    assert_eq!(start.elapsed(), Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_update_is_idempotent() {
    let clock = ManualClock::new(NOW_SECS * 1000);
    let (mut handler, mut rx) = handler(&clock);

    handler.update_session_duration(Some(3_600), Some(NOW_SECS + 300));
    handler.update_session_duration(Some(3_600), Some(NOW_SECS + 300));
    assert!(handler.has_scheduled_timers());

    assert_eq!(rx.recv().await, Some(SessionTimerEvent::Duration(3_600)));
    assert_eq!(rx.recv().await, Some(SessionTimerEvent::HealthCheckDue));
    assert_eq!(rx.recv().await, Some(SessionTimerEvent::ExpirationNotice(60)));

    let extra = tokio::time::timeout(Duration::from_secs(600), rx.recv()).await;
    assert!(extra.is_err(), "no duplicate events");
}

#[tokio::test(start_paused = true)]
async fn test_new_expiration_replaces_timers() {
    let clock = ManualClock::new(NOW_SECS * 1000);
    let (mut handler, mut rx) = handler(&clock);
    let start = Instant::now();

    handler.update_session_duration(None, Some(NOW_SECS + 120));
    handler.update_session_duration(None, Some(NOW_SECS + 600));
    assert_eq!(handler.expiration(), Some(NOW_SECS + 600));

    assert_eq!(rx.recv().await, Some(SessionTimerEvent::HealthCheckDue));
    assert_eq!(start.elapsed(), Duration::from_secs(530));
}

#[tokio::test(start_paused = true)]
async fn test_close_expiration_checks_health_immediately() {
    let clock = ManualClock::new(NOW_SECS * 1000);
    let (mut handler, mut rx) = handler(&clock);

    // Notice at +5s, health check lead already passed.
    handler.update_session_duration(None, Some(NOW_SECS + 65));
    assert_eq!(rx.try_recv(), Ok(SessionTimerEvent::HealthCheckDue));
    assert_eq!(rx.recv().await, Some(SessionTimerEvent::ExpirationNotice(60)));
}

#[tokio::test(start_paused = true)]
async fn test_past_expiration_schedules_nothing() {
    let clock = ManualClock::new(NOW_SECS * 1000);
    let (mut handler, mut rx) = handler(&clock);

    handler.update_session_duration(None, Some(NOW_SECS - 1));
    assert!(!handler.has_scheduled_timers());
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_clear_cancels_timers() {
    let clock = ManualClock::new(NOW_SECS * 1000);
    let (mut handler, mut rx) = handler(&clock);

    handler.update_session_duration(None, Some(NOW_SECS + 120));
    handler.clear();
    assert!(!handler.has_scheduled_timers());
    assert_eq!(handler.duration(), None);

    let event = tokio::time::timeout(Duration::from_secs(300), rx.recv()).await;
    assert!(event.is_err());
}

#[test]
fn test_health_check_cooldown() {
    let clock = ManualClock::new(NOW_SECS * 1000);
    let mut provider = HealthCheckProvider::new(Arc::new(clock.clone()));

    assert!(provider.encode_request("token").is_some());
    provider.mark_sent();
    assert!(provider.encode_request("token").is_none());

    clock.advance(HEALTH_CHECK_COOLDOWN);
    let frame = provider.encode_request("token").unwrap();
    let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(json["action"], "echo");

    provider.clear();
    assert!(provider.encode_request("token").is_some());
}
