// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Presigned Attachment Upload
//!
//! Streams attachment bytes to a presigned URL, reporting progress as a
//! percentage in `0..=100`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_LENGTH};
use reqwest::{Body, Client};
use tracing::debug;

use super::error::ApiError;

/// Upload progress sink, called with a percentage.
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Chunk size used when streaming an upload.
pub const UPLOAD_CHUNK_SIZE: usize = 16 * 1024;

/// Uploads attachment bytes to a presigned URL.
#[async_trait]
pub trait AttachmentUploader: Send + Sync {
    async fn upload(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        bytes: Vec<u8>,
        progress: ProgressCallback,
    ) -> Result<(), ApiError>;
}

/// Percentage of `sent` over `total`, clamped to `0..=100`.
pub fn percent(sent: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent.min(total) as u128 * 100) / total as u128) as u8
}

/// reqwest implementation of [`AttachmentUploader`].
pub struct HttpUploader {
    client: Client,
}

impl HttpUploader {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        Ok(HttpUploader {
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl AttachmentUploader for HttpUploader {
    async fn upload(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        bytes: Vec<u8>,
        progress: ProgressCallback,
    ) -> Result<(), ApiError> {
        let total = bytes.len();
        let chunks: Vec<Vec<u8>> = bytes
            .chunks(UPLOAD_CHUNK_SIZE)
            .map(|chunk| chunk.to_vec())
            .collect();

        let reporter = progress.clone();
        let mut sent = 0usize;
        let stream = futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len();
            reporter(percent(sent, total));
            Ok::<_, std::io::Error>(chunk)
        }));

        let mut request = self
            .client
            .put(url)
            .header(CONTENT_LENGTH, total)
            .body(Body::wrap_stream(stream));
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ApiError::Parse(format!("invalid header name: {}", e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ApiError::Parse(format!("invalid header value: {}", e)))?;
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), bytes = total, "attachment upload finished");
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                code: status.as_u16(),
                message,
            });
        }

        progress(100);
        Ok(())
    }
}
