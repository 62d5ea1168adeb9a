use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a relayed task, always `task_<digits>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

/// Issues task ids derived from the submission time.
///
/// The numeric part is `unix_millis * 1000`, bumped past the last issued
/// value when several ids fall in the same millisecond (or the clock steps
/// back). Ids are therefore strictly increasing for the lifetime of the
/// generator.
#[derive(Debug, Default)]
pub struct TaskIdGenerator {
    last: AtomicU64,
}

impl TaskIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next id for a submission received at `now`.
    pub fn next_at(&self, now: DateTime<Utc>) -> TaskId {
        let base = u64::try_from(now.timestamp_millis())
            .unwrap_or(0)
            .saturating_mul(1000);
        let candidate = |prev: u64| base.max(prev.saturating_add(1));
        // The closure always returns Some, so this never fails.
        let prev = match self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| Some(candidate(prev)))
        {
            Ok(prev) | Err(prev) => prev,
        };
        TaskId(format!("task_{}", candidate(prev)))
    }
}
