//! Attachment intake: extension allowlist, size limit, and transient storage.
//!
//! Accepted files are written to the upload directory under a generated name
//! (`<field>-<unix millis>-<random><ext>`). The client-supplied base name is
//! never used on disk, which keeps stored names unique and rules out path
//! traversal. Files are only removed when the submission they belong to is
//! rejected; retention of relayed attachments is left to the operator.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{pin_mut, Stream, StreamExt};
use rand::Rng;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Multipart field name that carries the attachment.
pub const FILE_FIELD: &str = "file";

/// Extensions accepted for attachments, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: &[&str] = &[".txt", ".pdf", ".doc", ".docx", ".csv", ".json"];

/// Attempts at finding an unused name before giving up.
const NAME_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Invalid file type")]
    InvalidFileType { file_name: String },

    #[error("File too large")]
    PayloadTooLarge { limit: u64 },

    #[error("Unexpected field")]
    UnexpectedField(String),

    #[error("Failed to read upload: {0}")]
    Read(String),

    #[error("Failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

/// A file that has been accepted and written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    /// Location of the stored file.
    pub path: PathBuf,
    /// File name as sent by the client.
    pub original_name: String,
    /// Number of bytes written.
    pub size: u64,
}

/// Return the extension of a client file name, dot included.
///
/// Only the last path component is considered. Dotfiles such as `.env` and
/// names without a dot have no extension.
pub fn extension_of(file_name: &str) -> Option<&str> {
    let base = file_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_name);
    match base.rfind('.') {
        None | Some(0) => None,
        Some(idx) => base.get(idx..),
    }
}

/// Whether the file name carries one of [`ALLOWED_EXTENSIONS`].
pub fn is_allowed(file_name: &str) -> bool {
    extension_of(file_name)
        .map(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

fn generate_name(field_name: &str, extension: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("{}-{}-{}{}", field_name, millis, suffix, extension)
}

/// Validates attachments and stores them in a single directory.
#[derive(Debug, Clone)]
pub struct UploadReceiver {
    dir: PathBuf,
    max_bytes: u64,
}

impl UploadReceiver {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Create the upload directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Validate and store one attachment.
    ///
    /// The extension is checked before anything touches the disk. The size
    /// limit is enforced while streaming; an oversize file is removed again
    /// before `PayloadTooLarge` is returned.
    pub async fn receive<S>(
        &self,
        field_name: &str,
        original_name: &str,
        chunks: S,
    ) -> Result<StoredUpload, UploadError>
    where
        S: Stream<Item = Result<Bytes, UploadError>>,
    {
        let extension = match extension_of(original_name) {
            Some(ext) if is_allowed(original_name) => ext,
            _ => {
                return Err(UploadError::InvalidFileType {
                    file_name: original_name.to_string(),
                })
            }
        };

        self.ensure_dir().await?;
        let (path, mut file) = self.create_unique(field_name, extension).await?;

        pin_mut!(chunks);
        let mut size: u64 = 0;
        let outcome = async {
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk?;
                size = size.saturating_add(chunk.len() as u64);
                if size > self.max_bytes {
                    return Err(UploadError::PayloadTooLarge {
                        limit: self.max_bytes,
                    });
                }
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok::<(), UploadError>(())
        }
        .await;

        if let Err(e) = outcome {
            drop(file);
            if let Err(rm_err) = tokio::fs::remove_file(&path).await {
                tracing::warn!(
                    "Failed to remove rejected upload {}: {}",
                    path.display(),
                    rm_err
                );
            }
            return Err(e);
        }

        tracing::debug!(
            "Stored upload {:?} ({} bytes) at {}",
            original_name,
            size,
            path.display()
        );

        Ok(StoredUpload {
            path,
            original_name: original_name.to_string(),
            size,
        })
    }

    /// Remove an attachment whose submission was rejected.
    pub async fn discard(&self, upload: &StoredUpload) {
        match tokio::fs::remove_file(&upload.path).await {
            Ok(()) => tracing::debug!("Removed rejected upload {}", upload.path.display()),
            Err(e) => tracing::warn!(
                "Failed to remove rejected upload {}: {}",
                upload.path.display(),
                e
            ),
        }
    }

    /// Open a freshly named file, never overwriting an existing one.
    async fn create_unique(
        &self,
        field_name: &str,
        extension: &str,
    ) -> Result<(PathBuf, tokio::fs::File), UploadError> {
        let mut last_err = None;
        for _ in 0..NAME_ATTEMPTS {
            let path = self.dir.join(generate_name(field_name, extension));
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => last_err = Some(e),
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err
            .unwrap_or_else(|| std::io::Error::new(ErrorKind::AlreadyExists, "name collision"))
            .into())
    }
}
