// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Messaging API Layer
//!
//! High-level API for hosts embedding a web messaging session.
//!
//! # Overview
//!
//! The API layer coordinates:
//! - Socket lifecycle, configuration and reconnection
//! - Message sending and history paging
//! - Attachment uploads
//! - Authenticated sessions and token refresh
//! - Event delivery to the host
//!
//! # Example
//!
//! ```ignore
//! use webmessaging_core::api::{ClientEvent, Configuration, MessagingClient};
//!
//! let config = Configuration::new("deployment-id", "mypurecloud.com");
//! let client = MessagingClient::builder(config)
//!     .on_event(|event: ClientEvent| println!("{:?}", event))
//!     .build()?;
//!
//! client.connect(true).await?;
//! client.send_message("Hello", Default::default()).await?;
//! client.disconnect().await?;
//! ```
//!
//! # Module Structure
//!
//! - [`error`] - Error types for the API layer
//! - [`config`] - Client configuration and derived endpoints
//! - [`events`] - Event system for callbacks
//! - [`state`] - Client state machine states
//! - [`client`] - Main client handle and builder

mod actor;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod state;

pub use client::{MessagingClient, MessagingClientBuilder};
pub use config::{ConfigError, Configuration};
pub use error::{MessagingError, MessagingResult};
pub use events::{
    CallbackHandler, ClientEvent, Event, EventDispatcher, EventHandler, MessageEvent,
};
pub use state::ClientState;
