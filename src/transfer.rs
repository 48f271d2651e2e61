//! Local file → bucket transfer, with optional removal of the local copy

use crate::error::{Error, Result};
use crate::store::ObjectStore;
use crate::upload::{ProgressObserver, StreamingUploader, UploadOptions, UploadOutcome};
use serde::Serialize;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub delete_after_upload: bool,
}

/// What happened to the local file after a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum LocalCleanup {
    NotRequested,
    Removed,
    /// The committed object could not be confirmed, so the file was kept
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub outcome: UploadOutcome,
    pub cleanup: LocalCleanup,
}

pub struct TransferOrchestrator {
    store: Arc<dyn ObjectStore>,
    uploader: StreamingUploader,
    options: UploadOptions,
}

impl TransferOrchestrator {
    pub fn new(store: Arc<dyn ObjectStore>, options: UploadOptions) -> Self {
        Self {
            uploader: StreamingUploader::new(store.clone()),
            store,
            options,
        }
    }

    pub async fn run(
        &self,
        path: &Path,
        run_options: RunOptions,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<TransferReport> {
        log::info!("checking for {} existence", path.display());
        let file = open_local(path).await?;
        let key = object_key(path)?;

        log::info!("Uploading file: {}...", key);
        let outcome = self
            .uploader
            .upload(file, &key, &self.options, observer, cancel)
            .await?;

        let cleanup = if run_options.delete_after_upload {
            self.remove_local(path, &outcome).await
        } else {
            LocalCleanup::NotRequested
        };

        Ok(TransferReport { outcome, cleanup })
    }

    async fn remove_local(&self, path: &Path, outcome: &UploadOutcome) -> LocalCleanup {
        match self.store.head_object(&outcome.key).await {
            Ok(meta) if meta.content_length == outcome.bytes => {}
            Ok(meta) => {
                let reason = format!(
                    "remote size {} does not match uploaded {} bytes",
                    meta.content_length, outcome.bytes
                );
                log::warn!("local_delete_skipped: {} {}", outcome.key, reason);
                return LocalCleanup::Skipped(reason);
            }
            Err(err) => {
                log::warn!("local_delete_skipped: {} verify failed: {}", outcome.key, err);
                return LocalCleanup::Skipped(err.to_string());
            }
        }

        log::info!("Deleting file: {}...", path.display());
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                log::info!("File deleted successfully.");
                LocalCleanup::Removed
            }
            Err(err) => {
                // The remote object stays committed either way
                log::warn!("local_delete_failed: {} error={}", path.display(), err);
                LocalCleanup::Failed(err.to_string())
            }
        }
    }
}

/// Opens `path` for reading, refusing anything that is not a regular file
async fn open_local(path: &Path) -> Result<File> {
    let local_error = |source: io::Error| Error::LocalFile {
        path: path.to_path_buf(),
        source,
    };

    let metadata = tokio::fs::metadata(path).await.map_err(local_error)?;
    if !metadata.is_file() {
        return Err(local_error(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }
    File::open(path).await.map_err(local_error)
}

/// Object key is the file's base name
fn object_key(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::LocalFile {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "file name is not valid UTF-8"),
        })
}
