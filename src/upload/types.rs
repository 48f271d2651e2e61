//! Upload options, progress events and transfer states

use crate::store::AccessPolicy;
use serde::{Deserialize, Serialize};

/// Parts uploaded in parallel when the caller does not say otherwise
pub const DEFAULT_CONCURRENCY: usize = 5;

/// 5 MiB, the smallest non-final part S3 accepts
pub const DEFAULT_PART_SIZE: usize = 5 * 1024 * 1024;

/// Highest part number an S3 multipart session accepts
pub const MAX_PARTS: i32 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadOptions {
    pub concurrency: usize,
    pub part_size: usize,
    pub access_policy: AccessPolicy,
    pub content_type: Option<String>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            part_size: DEFAULT_PART_SIZE,
            access_policy: AccessPolicy::Private,
            content_type: None,
        }
    }
}

impl UploadOptions {
    /// Zero values fall back to the defaults
    pub(crate) fn normalized(&self) -> Self {
        Self {
            concurrency: if self.concurrency == 0 {
                DEFAULT_CONCURRENCY
            } else {
                self.concurrency
            },
            part_size: if self.part_size == 0 {
                DEFAULT_PART_SIZE
            } else {
                self.part_size
            },
            ..self.clone()
        }
    }
}

/// Emitted each time the store acknowledges a part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub transferred: u64,
    /// Unknown until the source stream has ended
    pub known_total: Option<u64>,
}

pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Discards every event
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// Writes each event to the log at info level
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        match event.known_total {
            Some(total) => log::info!("Uploaded {} of {} bytes", event.transferred, total),
            None => log::info!("Uploaded {} of unknown bytes", event.transferred),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransferState {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "aborted")]
    Aborted,
}

impl std::fmt::Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferState::Pending => write!(f, "pending"),
            TransferState::Succeeded => write!(f, "succeeded"),
            TransferState::Failed => write!(f, "failed"),
            TransferState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Result of a committed upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub key: String,
    pub version_id: Option<String>,
    pub location: String,
    pub e_tag: Option<String>,
    pub bytes: u64,
    /// 0 when the single-put path was taken
    pub parts: usize,
}
