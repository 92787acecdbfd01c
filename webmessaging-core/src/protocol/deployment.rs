// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Deployment configuration published on the CDN.
//!
//! Only the parts the transport acts on are modeled; everything else in
//! the document is ignored.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub default_language: Option<String>,
    #[serde(default)]
    pub messenger: Messenger,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Messenger {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub file_upload: Option<FileUpload>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpload {
    #[serde(default)]
    pub modes: Vec<FileUploadMode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadMode {
    #[serde(default)]
    pub file_types: Vec<String>,
    #[serde(rename = "maxFileSizeKB", default)]
    pub max_file_size_kb: u64,
}

impl DeploymentConfig {
    /// Largest upload allowed by any mode, in KB.
    pub fn max_file_size_kb(&self) -> Option<u64> {
        self.messenger
            .file_upload
            .as_ref()?
            .modes
            .iter()
            .map(|mode| mode.max_file_size_kb)
            .max()
    }

    /// File types accepted by any upload mode.
    pub fn allowed_file_types(&self) -> Vec<&str> {
        self.messenger
            .file_upload
            .iter()
            .flat_map(|upload| upload.modes.iter())
            .flat_map(|mode| mode.file_types.iter().map(String::as_str))
            .collect()
    }
}
