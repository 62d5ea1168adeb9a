//! Task module - the record relayed downstream for every accepted submission.
//!
//! - `TaskSubmission`: form fields as sent by the client
//! - `TaskRecord`: immutable record built from a submission, an optional
//!   stored attachment, a generated id, and a timestamp
//! - `TaskIdGenerator`: process-local, strictly increasing `task_<digits>` ids
//!
//! Building a record is pure; reading the clock and drawing an id happen in
//! the caller so the result is deterministic in tests.

mod id;
mod record;

pub use id::{TaskId, TaskIdGenerator};
pub use record::{
    iso8601, FieldDisposition, TaskRecord, TaskStatus, TaskSubmission, MAX_EXTRA_FIELDS,
    MAX_EXTRA_KEY_BYTES, MAX_EXTRA_VALUE_BYTES, RESERVED_FIELDS,
};
