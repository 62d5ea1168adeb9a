use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use super::id::TaskId;
use crate::upload::StoredUpload;

/// Field names assigned by the builder. Client fields with these names are
/// ignored.
pub const RESERVED_FIELDS: &[&str] = &["id", "timestamp", "filePath", "fileName", "status"];

/// Maximum number of passthrough fields kept per submission.
pub const MAX_EXTRA_FIELDS: usize = 32;

/// Maximum length of a passthrough field name.
pub const MAX_EXTRA_KEY_BYTES: usize = 64;

/// Maximum length of a passthrough field value.
pub const MAX_EXTRA_VALUE_BYTES: usize = 64 * 1024;

/// Format a time the way it appears on the wire (`2024-05-01T12:00:00.000Z`).
pub fn iso8601(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_timestamp<S: Serializer>(time: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&iso8601(time))
}

/// Lifecycle marker on a relayed record. Only the initial state is ever set
/// here; later transitions belong to the downstream workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Received,
}

/// What happened to a single form field handed to [`TaskSubmission::set_field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDisposition {
    /// One of the known task fields.
    Known,
    /// Kept as a passthrough field.
    Extra,
    /// Name is assigned by the builder; value ignored.
    Reserved,
    /// Passthrough bounds exceeded; value dropped.
    Dropped,
}

/// Form fields of one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSubmission {
    pub name: Option<String>,
    pub email: Option<String>,
    pub task_type: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    /// Unrecognised text fields, bounded by the `MAX_EXTRA_*` limits.
    pub extra: BTreeMap<String, String>,
}

impl TaskSubmission {
    /// Record one form field. A repeated field keeps its last value.
    pub fn set_field(&mut self, key: &str, value: String) -> FieldDisposition {
        let slot = match key {
            "name" => &mut self.name,
            "email" => &mut self.email,
            "taskType" => &mut self.task_type,
            "description" => &mut self.description,
            "priority" => &mut self.priority,
            _ if RESERVED_FIELDS.contains(&key) => return FieldDisposition::Reserved,
            _ => return self.set_extra(key, value),
        };
        *slot = Some(value);
        FieldDisposition::Known
    }

    fn set_extra(&mut self, key: &str, value: String) -> FieldDisposition {
        if key.is_empty() || key.len() > MAX_EXTRA_KEY_BYTES || value.len() > MAX_EXTRA_VALUE_BYTES
        {
            return FieldDisposition::Dropped;
        }
        if !self.extra.contains_key(key) && self.extra.len() >= MAX_EXTRA_FIELDS {
            return FieldDisposition::Dropped;
        }
        self.extra.insert(key.to_string(), value);
        FieldDisposition::Extra
    }
}

/// The payload relayed downstream. Immutable once built.
///
/// Serialises with camelCase keys. Known fields the client left out are
/// omitted; `filePath` and `fileName` are always present and `null` when no
/// attachment was submitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    id: TaskId,
    #[serde(serialize_with = "serialize_timestamp")]
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, String>,
    file_path: Option<String>,
    file_name: Option<String>,
    status: TaskStatus,
}

impl TaskRecord {
    /// Build the record for an accepted submission.
    pub fn build(
        submission: TaskSubmission,
        upload: Option<&StoredUpload>,
        id: TaskId,
        now: DateTime<Utc>,
    ) -> Self {
        let TaskSubmission {
            name,
            email,
            task_type,
            description,
            priority,
            mut extra,
        } = submission;
        // Submissions built by hand may bypass set_field.
        extra.retain(|key, _| {
            !RESERVED_FIELDS.contains(&key.as_str())
                && !matches!(
                    key.as_str(),
                    "name" | "email" | "taskType" | "description" | "priority"
                )
        });

        let (file_path, file_name) = match upload {
            Some(upload) => (
                Some(upload.path.to_string_lossy().into_owned()),
                Some(upload.original_name.clone()),
            ),
            None => (None, None),
        };

        Self {
            id,
            timestamp: now,
            name,
            email,
            task_type,
            description,
            priority,
            extra,
            file_path,
            file_name,
            status: TaskStatus::Received,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn task_type(&self) -> Option<&str> {
        self.task_type.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn priority(&self) -> Option<&str> {
        self.priority.as_deref()
    }

    pub fn extra(&self) -> &BTreeMap<String, String> {
        &self.extra
    }

    pub fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskIdGenerator;
    use chrono::TimeZone;
    use serde_json::json;
    use std::path::PathBuf;

    fn fixed_now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_714_564_800_250).unwrap()
    }

    fn ana() -> TaskSubmission {
        let mut submission = TaskSubmission::default();
        for (key, value) in [
            ("name", "Ana"),
            ("email", "a@x.com"),
            ("taskType", "research"),
            ("description", "Find papers"),
            ("priority", "high"),
        ] {
            assert_eq!(
                submission.set_field(key, value.to_string()),
                FieldDisposition::Known
            );
        }
        submission
    }

    #[test]
    fn test_record_without_upload() {
        let id = TaskIdGenerator::new().next_at(fixed_now());
        let record = TaskRecord::build(ana(), None, id, fixed_now());

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "task_1714564800250000",
                "timestamp": "2024-05-01T12:00:00.250Z",
                "name": "Ana",
                "email": "a@x.com",
                "taskType": "research",
                "description": "Find papers",
                "priority": "high",
                "filePath": null,
                "fileName": null,
                "status": "received"
            })
        );
        assert!(record.file_path().is_none() && record.file_name().is_none());
    }

    #[test]
    fn test_record_with_upload() {
        let upload = StoredUpload {
            path: PathBuf::from("uploads/file-1714564800250-42.pdf"),
            original_name: "Quarterly Report.pdf".to_string(),
            size: 2048,
        };
        let id = TaskIdGenerator::new().next_at(fixed_now());
        let record = TaskRecord::build(ana(), Some(&upload), id, fixed_now());

        assert_eq!(record.file_path(), Some("uploads/file-1714564800250-42.pdf"));
        assert_eq!(record.file_name(), Some("Quarterly Report.pdf"));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["fileName"], "Quarterly Report.pdf");
    }

    #[test]
    fn test_missing_fields_are_omitted() {
        let mut submission = TaskSubmission::default();
        submission.set_field("name", "Ana".to_string());
        let id = TaskIdGenerator::new().next_at(fixed_now());
        let record = TaskRecord::build(submission, None, id, fixed_now());
        let value = serde_json::to_value(record).unwrap();

        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("name"));
        assert!(!obj.contains_key("email"));
        assert!(!obj.contains_key("priority"));
        assert_eq!(obj["status"], "received");
    }

    #[test]
    fn test_builder_fields_take_precedence() {
        let mut submission = ana();
        for key in RESERVED_FIELDS {
            assert_eq!(
                submission.set_field(key, "forged".to_string()),
                FieldDisposition::Reserved
            );
        }
        // Bypassing set_field must not work either.
        submission
            .extra
            .insert("status".to_string(), "done".to_string());
        submission.extra.insert("name".to_string(), "Eve".to_string());

        let id = TaskIdGenerator::new().next_at(fixed_now());
        let record = TaskRecord::build(submission, None, id.clone(), fixed_now());
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["id"], id.as_str());
        assert_eq!(value["status"], "received");
        assert_eq!(value["name"], "Ana");
        assert!(value["filePath"].is_null());
        assert!(record.extra().is_empty());
    }

    #[test]
    fn test_extra_fields_pass_through() {
        let mut submission = ana();
        assert_eq!(
            submission.set_field("deadline", "2024-06-01".to_string()),
            FieldDisposition::Extra
        );
        let id = TaskIdGenerator::new().next_at(fixed_now());
        let record = TaskRecord::build(submission, None, id, fixed_now());
        let value = serde_json::to_value(record).unwrap();
        assert_eq!(value["deadline"], "2024-06-01");
    }

    #[test]
    fn test_extra_fields_are_bounded() {
        let mut submission = TaskSubmission::default();
        for i in 0..MAX_EXTRA_FIELDS {
            assert_eq!(
                submission.set_field(&format!("extra{}", i), "v".to_string()),
                FieldDisposition::Extra
            );
        }
        assert_eq!(
            submission.set_field("one_too_many", "v".to_string()),
            FieldDisposition::Dropped
        );
        // Overwriting an existing extra is still allowed at the cap.
        assert_eq!(
            submission.set_field("extra0", "w".to_string()),
            FieldDisposition::Extra
        );

        let long_key = "k".repeat(MAX_EXTRA_KEY_BYTES + 1);
        let mut fresh = TaskSubmission::default();
        assert_eq!(
            fresh.set_field(&long_key, "v".to_string()),
            FieldDisposition::Dropped
        );
        assert_eq!(
            fresh.set_field("big", "x".repeat(MAX_EXTRA_VALUE_BYTES + 1)),
            FieldDisposition::Dropped
        );
        assert!(fresh.extra.is_empty());
    }

    #[test]
    fn test_repeated_field_keeps_last_value() {
        let mut submission = ana();
        submission.set_field("priority", "low".to_string());
        assert_eq!(submission.priority.as_deref(), Some("low"));
    }
}
