//! Outbound delivery of task records to the automation webhook.
//!
//! One POST per record, JSON body, no retry. Any non-2xx status or transport
//! failure comes back as a [`RelayError`]; the caller decides how to present
//! it. The destination is only validated when a record is delivered, so a
//! missing `N8N_WEBHOOK_URL` shows up as a failed submission rather than a
//! failed startup.

use reqwest::Client;
use thiserror::Error;
use url::Url;

use crate::task::{TaskId, TaskRecord};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Webhook URL is not configured (set N8N_WEBHOOK_URL)")]
    NotConfigured,

    #[error("Invalid webhook URL {url:?}: {reason}")]
    InvalidDestination { url: String, reason: String },

    #[error("n8n error: {status}")]
    Status { status: u16, body: String },

    #[error("Failed to reach webhook: {0}")]
    Transport(String),
}

impl RelayError {
    /// HTTP status returned by the destination, if it answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Confirmation that the destination accepted a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReceipt {
    pub task_id: TaskId,
    pub status: u16,
}

/// Client for the single configured webhook destination.
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: Client,
    destination: Option<String>,
}

impl RelayClient {
    pub fn new(destination: Option<String>) -> Self {
        Self::with_client(Client::new(), destination)
    }

    pub fn with_client(client: Client, destination: Option<String>) -> Self {
        Self {
            client,
            destination,
        }
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// Parse and check the configured destination.
    pub fn resolve_destination(&self) -> Result<Url, RelayError> {
        let raw = self.destination.as_deref().ok_or(RelayError::NotConfigured)?;
        let url = Url::parse(raw).map_err(|e| RelayError::InvalidDestination {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(RelayError::InvalidDestination {
                url: raw.to_string(),
                reason: format!("unsupported scheme {}", other),
            }),
        }
    }

    /// Deliver one record. Exactly one request is made when the destination
    /// is valid, none otherwise.
    pub async fn deliver(&self, record: &TaskRecord) -> Result<RelayReceipt, RelayError> {
        let url = self.resolve_destination()?;

        let resp = self
            .client
            .post(url)
            .json(record)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(
                task_id = %record.id(),
                "Webhook rejected task with {}: {}",
                status,
                body
            );
            return Err(RelayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(task_id = %record.id(), "Webhook accepted task with {}", status);
        Ok(RelayReceipt {
            task_id: record.id().clone(),
            status: status.as_u16(),
        })
    }
}
