// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Authentication: OAuth code exchange, jwt refresh and logout.

pub mod handler;

pub use handler::{AuthCredentials, AuthHandler, AuthOutcome, MAX_LOGOUT_ATTEMPTS};
