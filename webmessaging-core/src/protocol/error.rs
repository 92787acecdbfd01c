// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Protocol Error Types

use thiserror::Error;

/// Wire codec errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Invalid {class} body: {reason}")]
    InvalidBody { class: String, reason: String },

    #[error("Encoding failed: {0}")]
    Encode(String),
}
