//! API request/response types.

use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// Message returned for every relayed submission.
pub const SUBMIT_SUCCESS_MESSAGE: &str = "Task submitted successfully";

/// Body of every `POST /api/webhook` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl SubmitResponse {
    pub fn accepted(task_id: TaskId) -> Self {
        Self {
            success: true,
            message: SUBMIT_SUCCESS_MESSAGE.to_string(),
            task_id: Some(task_id.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            task_id: None,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Current server time, ISO-8601.
    pub time: String,
}
