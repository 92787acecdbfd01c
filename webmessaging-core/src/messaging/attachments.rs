// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Attachment Handler
//!
//! Stages attachment bytes until the server hands out a presigned URL, then
//! runs the upload on its own task. Uploads for distinct ids run
//! concurrently; each id has at most one upload in flight. Progress and
//! completion come back to the orchestrator as [`UploadSignal`]s.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::types::Attachment;
use crate::api::error::{MessagingError, MessagingResult};
use crate::network::{ApiError, AttachmentUploader, ProgressCallback};
use crate::protocol::PresignedUrlResponse;

/// Upload progress reported back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSignal {
    Progress {
        attachment_id: String,
        percent: u8,
    },
    Finished {
        attachment_id: String,
        result: Result<(), ApiError>,
    },
}

struct Staged {
    bytes: Vec<u8>,
    on_progress: Option<ProgressCallback>,
}

/// Guesses a MIME type from the file extension.
pub fn mime_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

/// Owns staged bytes and in-flight uploads.
pub struct AttachmentHandler {
    uploader: Arc<dyn AttachmentUploader>,
    signals: mpsc::UnboundedSender<UploadSignal>,
    staged: HashMap<String, Staged>,
    in_flight: HashMap<String, CancellationToken>,
    max_file_size: Option<u64>,
}

impl AttachmentHandler {
    pub fn new(
        uploader: Arc<dyn AttachmentUploader>,
        signals: mpsc::UnboundedSender<UploadSignal>,
    ) -> Self {
        AttachmentHandler {
            uploader,
            signals,
            staged: HashMap::new(),
            in_flight: HashMap::new(),
            max_file_size: None,
        }
    }

    /// Applies the deployment's upload limit.
    pub fn set_max_file_size_kb(&mut self, max_kb: Option<u64>) {
        self.max_file_size = max_kb.map(|kb| kb * 1024);
    }

    pub fn max_file_size(&self) -> Option<u64> {
        self.max_file_size
    }

    /// Stages bytes under a fresh attachment id.
    pub fn prepare(
        &mut self,
        bytes: Vec<u8>,
        file_name: &str,
        on_progress: Option<ProgressCallback>,
    ) -> MessagingResult<Attachment> {
        let size = bytes.len() as u64;
        if let Some(max) = self.max_file_size {
            if size > max {
                return Err(MessagingError::FileTooLarge { size, max });
            }
        }

        let id = Uuid::new_v4().to_string();
        let mut attachment = Attachment::new(id.clone(), file_name, size);
        attachment.mime_type = Some(mime_type_for(file_name).to_string());
        self.staged.insert(id, Staged { bytes, on_progress });
        Ok(attachment)
    }

    pub fn is_in_flight(&self, attachment_id: &str) -> bool {
        self.in_flight.contains_key(attachment_id)
    }

    pub fn is_staged(&self, attachment_id: &str) -> bool {
        self.staged.contains_key(attachment_id)
    }

    /// Starts the upload for a presigned URL. Returns false if the id is
    /// unknown or already uploading.
    pub fn upload(&mut self, presigned: &PresignedUrlResponse) -> bool {
        let id = presigned.attachment_id.clone();
        if self.in_flight.contains_key(&id) {
            warn!(attachment_id = %id, "upload already in flight, ignoring presigned URL");
            return false;
        }
        let Some(Staged { bytes, on_progress }) = self.staged.remove(&id) else {
            warn!(attachment_id = %id, "presigned URL for unknown attachment");
            return false;
        };

        let token = CancellationToken::new();
        self.in_flight.insert(id.clone(), token.clone());

        let uploader = self.uploader.clone();
        let signals = self.signals.clone();
        let url = presigned.url.clone();
        let headers = presigned.headers.clone();

        let progress_signals = signals.clone();
        let progress_id = id.clone();
        let host_progress = on_progress;
        let progress: ProgressCallback = Arc::new(move |percent| {
            let _ = progress_signals.send(UploadSignal::Progress {
                attachment_id: progress_id.clone(),
                percent,
            });
            if let Some(callback) = host_progress.as_ref() {
                callback(percent);
            }
        });

        debug!(attachment_id = %id, bytes = bytes.len(), "starting upload");
        tokio::spawn(async move {
            let result = tokio::select! {
                result = uploader.upload(&url, &headers, bytes, progress) => result,
                _ = token.cancelled() => Err(ApiError::Cancelled),
            };
            let _ = signals.send(UploadSignal::Finished {
                attachment_id: id,
                result,
            });
        });
        true
    }

    /// Forgets a finished upload.
    pub fn finish(&mut self, attachment_id: &str) {
        self.in_flight.remove(attachment_id);
    }

    /// Cancels and forgets one attachment.
    pub fn discard(&mut self, attachment_id: &str) {
        self.staged.remove(attachment_id);
        if let Some(token) = self.in_flight.remove(attachment_id) {
            token.cancel();
        }
    }

    /// Cancels every staged and in-flight upload, returning the affected ids.
    pub fn cancel_all(&mut self) -> Vec<String> {
        let mut ids: Vec<String> = self.staged.drain().map(|(id, _)| id).collect();
        for (id, token) in self.in_flight.drain() {
            token.cancel();
            ids.push(id);
        }
        ids.sort();
        ids
    }
}
