//! # Task Relay
//!
//! Accepts task-submission forms from a browser client and relays them to an
//! automation webhook (typically an n8n workflow) for asynchronous processing.
//!
//! ## Submission Flow
//!
//! ```text
//!   multipart form ──▶ upload ──▶ task ──▶ relay ──▶ webhook
//!                     (optional   (build    (one POST,
//!                      file)      record)    no retry)
//! ```
//!
//! 1. Receive `POST /api/webhook` with text fields and an optional `file`
//! 2. Validate and store the attachment under `uploads/`
//! 3. Build an immutable task record (`status: "received"`)
//! 4. POST the record as JSON to `N8N_WEBHOOK_URL`
//! 5. Answer with `{success, message, taskId}`
//!
//! ## Modules
//! - `config`: environment-sourced settings
//! - `upload`: attachment validation and storage
//! - `task`: task records and id generation
//! - `relay`: outbound webhook client
//! - `api`: HTTP routes

pub mod api;
pub mod config;
pub mod relay;
pub mod task;
pub mod upload;

pub use config::Config;
