//! Cloud sync of selected tracked files.
//!
//! The upload itself is a consumed capability ([`Uploader`]); this module
//! drives it over the user's selection, reports progress, and aggregates
//! successes and failures.

pub mod http;
pub mod mime;

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::tracker::TrackedFile;

pub use http::{CloudProvider, HttpUploader};
pub use mime::mime_for;

/// Input of one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// File on the writable surface.
    pub absolute_path: PathBuf,
    /// Name to use remotely.
    pub suggested_name: String,
    /// MIME type derived from the extension.
    pub mime_hint: String,
}

impl From<&TrackedFile> for UploadRequest {
    fn from(file: &TrackedFile) -> Self {
        Self {
            absolute_path: file.absolute_path.clone(),
            suggested_name: file.name.clone(),
            mime_hint: mime_for(&file.name).to_string(),
        }
    }
}

/// Result of one successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    /// Provider-side file id.
    pub remote_id: String,
    /// Link or path to the uploaded file, when the provider returns one.
    pub remote_locator: Option<String>,
}

/// Errors raised by an [`Uploader`].
#[derive(Debug, Error)]
pub enum UploadError {
    /// The provider rejected the credentials.
    #[error("Upload was not authorized")]
    Unauthorized,
    /// The provider refused the upload.
    #[error("Upload rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status.
        status: u16,
        /// Provider message.
        message: String,
    },
    /// The provider could not be reached.
    #[error("Upload failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The local file could not be read.
    #[error("Cannot read {path}: {source}")]
    Io {
        /// Local file.
        path: PathBuf,
        /// Source error.
        #[source]
        source: std::io::Error,
    },
    /// The session stopped before the file was uploaded.
    #[error("Session stopped before upload")]
    Cancelled,
}

/// Upload capability supplied by a storage collaborator.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Uploads one file.
    async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt, UploadError>;
}

/// A file that was uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedFile {
    /// Inventory id.
    pub id: usize,
    /// File name.
    pub name: String,
    /// Provider receipt.
    #[serde(flatten)]
    pub receipt: UploadReceipt,
}

/// A file that could not be uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedFile {
    /// Inventory id.
    pub id: usize,
    /// File name.
    pub name: String,
    /// Failure description.
    pub error: String,
}

/// Progress after each handled file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncProgress {
    /// Files handled so far.
    pub completed: usize,
    /// Files selected.
    pub total: usize,
}

impl SyncProgress {
    /// Rounded percentage.
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let pct = (self.completed * 200 + self.total) / (self.total * 2);
        u8::try_from(pct.min(100)).unwrap_or(100)
    }
}

/// Aggregate result of a sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Uploaded files.
    pub uploaded: Vec<SyncedFile>,
    /// Files that failed.
    pub failed: Vec<FailedFile>,
}

/// Uploads `files` one after another. `cancelled` is checked before each
/// upload; once it returns `true` the remaining files fail as cancelled.
#[instrument(skip_all, fields(files = files.len()))]
pub async fn sync_files<P, C>(
    uploader: &dyn Uploader,
    files: &[TrackedFile],
    mut on_progress: P,
    cancelled: C,
) -> SyncReport
where
    P: FnMut(SyncProgress) + Send,
    C: Fn() -> bool + Send + Sync,
{
    let mut report = SyncReport::default();
    let total = files.len();

    for (index, file) in files.iter().enumerate() {
        let result = if cancelled() {
            Err(UploadError::Cancelled)
        } else {
            uploader.upload(UploadRequest::from(file)).await
        };
        match result {
            Ok(receipt) => report.uploaded.push(SyncedFile {
                id: file.id,
                name: file.name.clone(),
                receipt,
            }),
            Err(e) => {
                warn!(file = %file.name, error = %e, "Upload failed");
                report.failed.push(FailedFile {
                    id: file.id,
                    name: file.name.clone(),
                    error: e.to_string(),
                });
            }
        }
        on_progress(SyncProgress {
            completed: index + 1,
            total,
        });
    }

    metrics::counter!("ephemera_sync_uploaded_total").increment(report.uploaded.len() as u64);
    metrics::counter!("ephemera_sync_failed_total").increment(report.failed.len() as u64);
    info!(uploaded = report.uploaded.len(), failed = report.failed.len(), "Sync finished");
    report
}
