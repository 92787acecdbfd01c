// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Message Store
//!
//! Ordered, bounded conversation history plus the message currently being
//! composed. The store is plain data: the orchestrator calls it from its
//! actor and turns the returned values into events.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};
use uuid::Uuid;

use super::types::{Attachment, AttachmentState, Message, MessageState};
use crate::api::error::{MessagingError, MessagingResult};
use crate::network::ErrorCode;
use crate::protocol::{Direction, MessageEntityList, StructuredMessage};

/// Result of folding in one history page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    /// Newly inserted messages, oldest first.
    pub messages: Vec<Message>,
    pub start_of_conversation: bool,
}

/// Conversation state for one client.
#[derive(Debug)]
pub struct MessageStore {
    history: VecDeque<Message>,
    ids: HashSet<String>,
    limit: usize,
    page_size: u32,
    next_page: u32,
    start_of_conversation: bool,
    pending: Message,
}

impl MessageStore {
    pub fn new(limit: usize, page_size: u32) -> Self {
        MessageStore {
            history: VecDeque::new(),
            ids: HashSet::new(),
            limit: limit.max(1),
            page_size: page_size.max(1),
            next_page: 1,
            start_of_conversation: false,
            pending: Message::outgoing(Uuid::new_v4().to_string()),
        }
    }

    /// History, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Message> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn pending_message(&self) -> &Message {
        &self.pending
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Page number the next history fetch should request.
    pub fn next_page(&self) -> u32 {
        self.next_page
    }

    pub fn start_of_conversation(&self) -> bool {
        self.start_of_conversation
    }

    /// Marks the pending message as sending and returns a snapshot of it.
    ///
    /// Every attachment still attached must be `Uploaded`. Failed
    /// attachments are dropped silently.
    pub fn prepare_message(&mut self, text: &str) -> MessagingResult<Message> {
        self.pending
            .attachments
            .retain(|_, attachment| !matches!(attachment.state, AttachmentState::Error { .. }));

        if let Some(attachment) = self
            .pending
            .attachments
            .values()
            .find(|attachment| !matches!(attachment.state, AttachmentState::Uploaded(_)))
        {
            return Err(MessagingError::AttachmentNotUploaded(attachment.id.clone()));
        }
        if self.pending.state == MessageState::Sending {
            return Err(MessagingError::InvalidState(
                "a message is already being sent".into(),
            ));
        }

        self.pending.text = Some(text.to_string());
        self.pending.state = MessageState::Sending;
        Ok(self.pending.clone())
    }

    /// Marks the pending send as failed and makes it retryable.
    pub fn fail_pending(&mut self, code: ErrorCode, message: Option<String>) -> Option<Message> {
        if self.pending.state != MessageState::Sending {
            return None;
        }
        self.pending.state = MessageState::Error { code, message };
        let failed = self.pending.clone();
        self.pending.state = MessageState::Idle;
        Some(failed)
    }

    /// Folds in a live structured message.
    ///
    /// Returns the inserted message, or `None` for duplicates.
    pub fn update(&mut self, structured: &StructuredMessage) -> Option<Message> {
        let mut message = Message::from(structured);

        if structured.direction == Direction::Inbound && message.id == self.pending.id {
            for (id, attachment) in self.pending.attachments.iter() {
                if let Some(url) = attachment.state.url() {
                    let mut sent = attachment.clone();
                    sent.state = AttachmentState::Sent(url.to_string());
                    message.attachments.insert(id.clone(), sent);
                }
            }
            self.pending = Message::outgoing(Uuid::new_v4().to_string());
        }

        if !self.insert(message.clone()) {
            debug!(id = %message.id, "duplicate message dropped");
            return None;
        }
        Some(message)
    }

    /// Appends a message, deduplicated by id, evicting the oldest past the limit.
    pub fn insert(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        self.history.push_back(message);
        while self.history.len() > self.limit {
            if let Some(evicted) = self.history.pop_front() {
                self.ids.remove(&evicted.id);
            }
        }
        true
    }

    /// Folds in one history page (newest first on the wire).
    pub fn update_history(&mut self, page: &MessageEntityList) -> HistoryPage {
        let mut seen = HashSet::new();
        let mut fresh: Vec<Message> = page
            .entities
            .iter()
            .rev()
            .map(Message::from)
            .filter(|m| !self.ids.contains(&m.id) && seen.insert(m.id.clone()))
            .collect();

        // Older messages beyond the limit are dropped and stay fetchable later.
        let room = self.limit.saturating_sub(self.history.len());
        let inserted = fresh.split_off(fresh.len().saturating_sub(room));
        for message in inserted.iter().rev() {
            self.ids.insert(message.id.clone());
            self.history.push_front(message.clone());
        }

        self.start_of_conversation = page.is_last_page(self.page_size);
        self.next_page += 1;

        HistoryPage {
            messages: inserted,
            start_of_conversation: self.start_of_conversation,
        }
    }

    /// Drops cached history so the next fetch starts from page one.
    pub fn invalidate_conversation_cache(&mut self) {
        self.history.clear();
        self.ids.clear();
        self.next_page = 1;
        self.start_of_conversation = false;
    }

    /// Attaches a new attachment to the pending message.
    pub fn add_attachment(&mut self, attachment: Attachment) {
        self.pending
            .attachments
            .insert(attachment.id.clone(), attachment);
    }

    pub fn attachment(&self, id: &str) -> Option<&Attachment> {
        self.pending.attachments.get(id)
    }

    /// Finds an attachment on the pending message or in the history.
    pub fn find_attachment(&self, id: &str) -> Option<&Attachment> {
        self.pending.attachments.get(id).or_else(|| {
            self.history
                .iter()
                .rev()
                .find_map(|message| message.attachments.get(id))
        })
    }

    /// Replaces the download URL of an uploaded or sent attachment.
    pub fn refresh_attachment_url(&mut self, id: &str, url: &str) -> Option<Attachment> {
        let attachment = match self.pending.attachments.get_mut(id) {
            Some(attachment) => attachment,
            None => self
                .history
                .iter_mut()
                .rev()
                .find_map(|message| message.attachments.get_mut(id))?,
        };
        let refreshed = match attachment.state {
            AttachmentState::Uploaded(_) => AttachmentState::Uploaded(url.to_string()),
            AttachmentState::Sent(_) => AttachmentState::Sent(url.to_string()),
            _ => return None,
        };
        attachment.state = refreshed;
        Some(attachment.clone())
    }

    /// Moves a pending attachment to `state`.
    ///
    /// Illegal transitions are rejected and leave the attachment untouched.
    pub fn update_attachment_state(
        &mut self,
        id: &str,
        state: AttachmentState,
    ) -> MessagingResult<Attachment> {
        let attachment = self
            .pending
            .attachments
            .get_mut(id)
            .ok_or_else(|| MessagingError::AttachmentNotFound(id.to_string()))?;

        if !attachment.state.can_transition_to(&state) {
            warn!(
                attachment_id = id,
                from = ?attachment.state,
                to = ?state,
                "illegal attachment transition ignored"
            );
            return Err(MessagingError::InvalidState(format!(
                "attachment {} cannot move from {:?} to {:?}",
                id, attachment.state, state
            )));
        }
        attachment.state = state;
        Ok(attachment.clone())
    }

    /// Removes a detached attachment from the pending message.
    pub fn remove_attachment(&mut self, id: &str) -> Option<Attachment> {
        self.pending.attachments.remove(id)
    }
}
