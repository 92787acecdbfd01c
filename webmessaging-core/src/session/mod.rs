// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session timers and request cooldowns.

pub mod clock;
pub mod cooldown;
pub mod duration;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cooldown::{
    HealthCheckProvider, UserTypingProvider, HEALTH_CHECK_COOLDOWN, TYPING_INDICATOR_COOLDOWN,
};
pub use duration::{SessionDurationHandler, SessionTimerEvent};
