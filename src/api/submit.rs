//! `POST /api/webhook`: form intake, record building, and relay.
//!
//! Multipart forms are the main path and may carry one attachment. Plain
//! JSON objects and urlencoded forms are accepted too; they never carry a
//! file.

use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        FromRequest, Multipart, Request, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    Form,
};
use futures::StreamExt;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::relay::RelayError;
use crate::task::{FieldDisposition, TaskRecord, TaskSubmission};
use crate::upload::{StoredUpload, UploadError, FILE_FIELD};

use super::routes::AppState;
use super::types::SubmitResponse;

/// Everything that can fail a submission. All variants map to a `500` with
/// a JSON failure body.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("Malformed form data: {0}")]
    Form(String),
}

impl SubmitError {
    /// Message shown to the client. Filesystem failures are reported
    /// generically; the details only go to the log.
    pub fn public_message(&self) -> String {
        match self {
            Self::Upload(UploadError::Io(_)) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Status the webhook answered with, when the relay got that far.
    pub fn relay_status(&self) -> Option<u16> {
        match self {
            Self::Relay(e) => e.status_code(),
            _ => None,
        }
    }
}

impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(SubmitResponse::failed(self.public_message())),
        )
            .into_response()
    }
}

impl From<MultipartRejection> for SubmitError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::Form(rejection.body_text())
    }
}

fn form_error(e: MultipartError, limit: u64) -> SubmitError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        SubmitError::Upload(UploadError::PayloadTooLarge { limit })
    } else {
        SubmitError::Form(e.body_text())
    }
}

fn chunk_error(e: MultipartError, limit: u64) -> UploadError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::PayloadTooLarge { limit }
    } else {
        UploadError::Read(e.body_text())
    }
}

/// How the request body is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Multipart,
    Json,
    UrlEncoded,
}

/// Pick the body decoder from `Content-Type`. Anything that is neither JSON
/// nor urlencoded goes to the multipart decoder, which rejects it.
fn body_kind(headers: &HeaderMap) -> BodyKind {
    let essence = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match essence.as_str() {
        "application/json" => BodyKind::Json,
        "application/x-www-form-urlencoded" => BodyKind::UrlEncoded,
        other if other.starts_with("application/") && other.ends_with("+json") => BodyKind::Json,
        _ => BodyKind::Multipart,
    }
}

/// Flatten a JSON object into form fields. Strings are kept verbatim, other
/// values are carried as their JSON text, and nulls are skipped.
fn json_fields(body: Map<String, Value>) -> Vec<(String, String)> {
    body.into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect()
}

/// Handle one task submission.
pub async fn submit_task(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<SubmitResponse>, SubmitError> {
    let kind = body_kind(request.headers());
    let outcome = match kind {
        BodyKind::Json => {
            match Json::<Map<String, Value>>::from_request(request, &state).await {
                Ok(Json(body)) => relay_fields(&state, json_fields(body)).await,
                Err(rejection) => Err(SubmitError::Form(rejection.body_text())),
            }
        }
        BodyKind::UrlEncoded => {
            match Form::<Vec<(String, String)>>::from_request(request, &state).await {
                Ok(Form(pairs)) => relay_fields(&state, pairs).await,
                Err(rejection) => Err(SubmitError::Form(rejection.body_text())),
            }
        }
        BodyKind::Multipart => match Multipart::from_request(request, &state).await {
            Ok(mut multipart) => {
                let outcome = relay_multipart(&state, &mut multipart).await;
                if outcome.is_err() {
                    // Read out the rest of the body so the client sees the
                    // response instead of a reset connection.
                    while let Ok(Some(_)) = multipart.next_field().await {}
                }
                outcome
            }
            Err(rejection) => Err(rejection.into()),
        },
    };

    match outcome {
        Ok(response) => Ok(Json(response)),
        Err(err) => {
            tracing::error!(
                webhook_status = ?err.relay_status(),
                "Task submission failed: {}",
                err
            );
            Err(err)
        }
    }
}

async fn relay_fields<I>(state: &AppState, fields: I) -> Result<SubmitResponse, SubmitError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut submission = TaskSubmission::default();
    for (name, value) in fields {
        apply_field(&mut submission, &name, value);
    }
    relay_record(state, submission, None).await
}

async fn relay_multipart(
    state: &AppState,
    multipart: &mut Multipart,
) -> Result<SubmitResponse, SubmitError> {
    let (submission, upload) = read_form(state, multipart).await?;
    relay_record(state, submission, upload).await
}

/// Build the record and deliver it. A stored attachment is kept even when
/// the relay fails.
async fn relay_record(
    state: &AppState,
    submission: TaskSubmission,
    upload: Option<StoredUpload>,
) -> Result<SubmitResponse, SubmitError> {
    let now = chrono::Utc::now();
    let id = state.ids.next_at(now);
    let record = TaskRecord::build(submission, upload.as_ref(), id, now);

    let receipt = state.relay.deliver(&record).await?;
    tracing::info!(
        task_id = %receipt.task_id,
        file = record.file_path().unwrap_or("-"),
        "Task relayed"
    );
    Ok(SubmitResponse::accepted(receipt.task_id))
}

fn apply_field(submission: &mut TaskSubmission, name: &str, value: String) {
    match submission.set_field(name, value) {
        FieldDisposition::Known | FieldDisposition::Extra => {}
        FieldDisposition::Reserved => {
            tracing::warn!("Ignoring client value for reserved field {:?}", name)
        }
        FieldDisposition::Dropped => {
            tracing::warn!("Dropping form field {:?}: passthrough limit exceeded", name)
        }
    }
}

/// Collect text fields and store the attachment, if any.
///
/// Stops at the first failure so nothing downstream runs. An attachment
/// stored before the failure is removed again.
async fn read_form(
    state: &AppState,
    multipart: &mut Multipart,
) -> Result<(TaskSubmission, Option<StoredUpload>), SubmitError> {
    let mut submission = TaskSubmission::default();
    let mut upload: Option<StoredUpload> = None;

    if let Err(e) = read_parts(state, multipart, &mut submission, &mut upload).await {
        if let Some(stored) = upload {
            state.uploads.discard(&stored).await;
        }
        return Err(e);
    }

    Ok((submission, upload))
}

async fn read_parts(
    state: &AppState,
    multipart: &mut Multipart,
    submission: &mut TaskSubmission,
    upload: &mut Option<StoredUpload>,
) -> Result<(), SubmitError> {
    let limit = state.uploads.max_bytes();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| form_error(e, limit))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match field.file_name().map(str::to_string) {
            // Browsers send an empty file part when nothing was picked.
            Some(file_name) if file_name.is_empty() => continue,
            Some(file_name) => {
                if name != FILE_FIELD || upload.is_some() {
                    return Err(UploadError::UnexpectedField(name).into());
                }
                let chunks = field.map(|chunk| chunk.map_err(|e| chunk_error(e, limit)));
                *upload = Some(state.uploads.receive(&name, &file_name, chunks).await?);
            }
            None => {
                let value = field.text().await.map_err(|e| form_error(e, limit))?;
                apply_field(submission, &name, value);
            }
        }
    }

    Ok(())
}
