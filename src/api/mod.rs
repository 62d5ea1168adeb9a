//! HTTP API.
//!
//! - `POST /api/webhook` - multipart task submission, relayed downstream
//! - `GET /api/health` - liveness and server time

mod routes;
mod submit;
pub mod types;

pub use routes::{router, serve, AppState};
pub use submit::SubmitError;
