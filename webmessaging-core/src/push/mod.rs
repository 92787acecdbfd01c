// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Push notification device registration.

pub mod config;
pub mod service;

pub use config::{Diff, PushConfig, PushConfigComparator, PushProvider, PUSH_CONFIG_EXPIRATION};
pub use service::PushService;
