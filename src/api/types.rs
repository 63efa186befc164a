//! API request/response types

use serde::{Deserialize, Serialize};

use crate::models::Quantity;

// === Disks ===

/// `type` is accepted for compatibility with existing clients and ignored
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateDiskRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size: Option<Quantity>,
    #[serde(default, rename = "type")]
    pub disk_type: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertDiskRequest {
    #[serde(default)]
    pub new_format: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeDiskRequest {
    #[serde(default)]
    pub new_size: Option<Quantity>,
}

// === Generic ===

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiSuccess {
    pub message: String,
    /// Tool output, when the operation produced any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ApiSuccess {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            output: None,
        }
    }

    pub fn with_output(mut self, output: String) -> Self {
        let trimmed = output.trim();
        if !trimmed.is_empty() {
            self.output = Some(trimmed.to_string());
        }
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
