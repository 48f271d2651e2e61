//! Download an object into any async writer, or into a local file

use crate::error::{Error, Result};
use crate::store::{ObjectBody, ObjectStore};
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};

async fn copy_body<W>(mut body: ObjectBody, writer: &mut W) -> std::io::Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let copied = tokio::io::copy(&mut body, writer).await?;
    writer.flush().await?;
    Ok(copied)
}

/// Copy the body of `key` into `writer`, returning the number of bytes written
pub async fn download_object<W>(store: &dyn ObjectStore, key: &str, writer: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let body = store.get_object(key).await?;
    let copied = copy_body(body, writer)
        .await
        .map_err(|source| Error::Write { source })?;
    log::info!("download_done: {} bytes={}", key, copied);
    Ok(copied)
}

/// Download `key` into `path`.
///
/// The file is only created once the store has returned the object, so a
/// missing key leaves an existing file at `path` untouched. A copy that fails
/// halfway removes the partial file.
pub async fn download_to_path(store: &dyn ObjectStore, key: &str, path: &Path) -> Result<u64> {
    let body = store.get_object(key).await?;
    let local_error = |source: std::io::Error| Error::LocalFile {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::create(path).await.map_err(local_error)?;
    match copy_body(body, &mut file).await {
        Ok(copied) => {
            log::info!("download_done: {} path={:?} bytes={}", key, path, copied);
            Ok(copied)
        }
        Err(source) => {
            drop(file);
            if let Err(err) = tokio::fs::remove_file(path).await {
                log::warn!("download_cleanup_failed: {:?} error={}", path, err);
            }
            Err(local_error(source))
        }
    }
}
