// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Messages, attachments and their lifecycles.

pub mod attachments;
pub mod store;
pub mod types;

pub use attachments::{mime_type_for, AttachmentHandler, UploadSignal};
pub use store::{HistoryPage, MessageStore};
pub use types::{Attachment, AttachmentState, Message, MessageState};
