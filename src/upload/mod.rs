//! Streaming upload of a byte stream of unknown length
//!
//! - `types`: options, progress events, transfer states
//! - `reader`: slices the source stream into parts
//!
//! Streams shorter than two parts go out as a single PUT. Longer ones use a
//! multipart session with at most `concurrency` parts in flight; the source is
//! not read further while the pool is full.

mod reader;
mod types;

pub use types::{
    LogProgress, NoProgress, ProgressEvent, ProgressObserver, TransferState, UploadOptions,
    UploadOutcome, DEFAULT_CONCURRENCY, DEFAULT_PART_SIZE, MAX_PARTS,
};

use crate::error::{Error, Result};
use crate::store::{CompletedPart, ObjectStore};
use bytes::Bytes;
use log::{debug, info, warn};
use reader::PartReader;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

fn upload_error(key: &str, cause: Error) -> Error {
    match cause {
        Error::Aborted { .. } | Error::Upload { .. } => cause,
        other => Error::Upload {
            key: key.to_string(),
            source: Box::new(other),
        },
    }
}

fn aborted(key: &str) -> Error {
    Error::Aborted {
        key: key.to_string(),
    }
}

/// Book-keeping for one in-flight upload. Consumed when the upload settles.
struct TransferHandle {
    key: String,
    transferred: u64,
    known_total: Option<u64>,
    cancel: CancellationToken,
    state: TransferState,
}

impl TransferHandle {
    fn new(key: &str, cancel: CancellationToken) -> Self {
        Self {
            key: key.to_string(),
            transferred: 0,
            known_total: None,
            cancel,
            state: TransferState::Pending,
        }
    }

    fn observe_reader<R: AsyncRead + Unpin>(&mut self, parts: &PartReader<R>) {
        if parts.is_eof() && self.known_total.is_none() {
            self.known_total = Some(parts.bytes_read());
            debug!(
                "upload_stream_end: {} total_bytes={}",
                self.key,
                parts.bytes_read()
            );
        }
    }

    fn record_part(&mut self, len: u64) -> ProgressEvent {
        self.transferred += len;
        ProgressEvent {
            transferred: self.transferred,
            known_total: self.known_total,
        }
    }

    fn finish<T>(mut self, result: &Result<T>) -> TransferState {
        self.state = match result {
            Ok(_) => TransferState::Succeeded,
            Err(Error::Aborted { .. }) => TransferState::Aborted,
            Err(_) => TransferState::Failed,
        };
        debug!(
            "upload_state: {} state={} transferred={}",
            self.key, self.state, self.transferred
        );
        self.state
    }
}

/// One chunk of the stream, uploaded as its own task
struct PartUploadTask {
    part_number: i32,
    payload: Bytes,
}

impl PartUploadTask {
    async fn run(
        self,
        store: Arc<dyn ObjectStore>,
        key: String,
        upload_id: String,
        cancel: CancellationToken,
    ) -> Result<(CompletedPart, u64)> {
        if cancel.is_cancelled() {
            return Err(aborted(&key));
        }

        let len = self.payload.len() as u64;
        debug!(
            "multipart_part_start: {} part={} bytes={}",
            key, self.part_number, len
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(aborted(&key)),
            result = store.upload_part(&key, &upload_id, self.part_number, self.payload) => {
                result
                    .map(|part| (part, len))
                    .map_err(|e| upload_error(&key, e))
            }
        }
    }
}

async fn read_part<R>(
    parts: &mut PartReader<R>,
    cancel: &CancellationToken,
    key: &str,
) -> Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(aborted(key)),
        part = parts.next_part() => {
            part.map_err(|source| upload_error(key, Error::Read { source }))
        }
    }
}

pub struct StreamingUploader {
    store: Arc<dyn ObjectStore>,
}

impl StreamingUploader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Upload `reader` to `key`.
    ///
    /// Resolves with `Error::Aborted` once `cancel` fires, and with
    /// `Error::Upload` for any other failure. In both cases an open multipart
    /// session is aborted first (best-effort).
    pub async fn upload<R>(
        &self,
        reader: R,
        key: &str,
        options: &UploadOptions,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome>
    where
        R: AsyncRead + Unpin + Send,
    {
        let options = options.normalized();
        let mut handle = TransferHandle::new(key, cancel.clone());
        let mut parts = PartReader::new(reader, options.part_size);
        info!(
            "upload_start: {} part_size={} concurrency={}",
            key, options.part_size, options.concurrency
        );

        let result = self
            .run(&mut parts, &options, observer, &mut handle)
            .await;
        let state = handle.finish(&result);

        match &result {
            Ok(outcome) => info!(
                "upload_finish: {} bytes={} parts={} state={}",
                key, outcome.bytes, outcome.parts, state
            ),
            Err(err) => warn!("upload_finish: {} state={} error={}", key, state, err),
        }
        result
    }

    async fn run<R>(
        &self,
        parts: &mut PartReader<R>,
        options: &UploadOptions,
        observer: &dyn ProgressObserver,
        handle: &mut TransferHandle,
    ) -> Result<UploadOutcome>
    where
        R: AsyncRead + Unpin + Send,
    {
        let cancel = handle.cancel.clone();
        let key = handle.key.clone();

        let first = read_part(parts, &cancel, &key).await?;
        let second = match &first {
            Some(_) if !parts.is_eof() => read_part(parts, &cancel, &key).await?,
            _ => None,
        };
        handle.observe_reader(parts);

        match (first, second) {
            (Some(first), Some(second)) => {
                self.upload_multipart(parts, first, second, options, observer, handle)
                    .await
            }
            (first, _) => {
                self.upload_single(first.unwrap_or_default(), options, observer, handle)
                    .await
            }
        }
    }

    async fn upload_single(
        &self,
        body: Bytes,
        options: &UploadOptions,
        observer: &dyn ProgressObserver,
        handle: &mut TransferHandle,
    ) -> Result<UploadOutcome> {
        let key = handle.key.clone();
        let len = body.len() as u64;
        info!("single_put_start: {} total_bytes={}", key, len);

        let ack = tokio::select! {
            biased;
            _ = handle.cancel.cancelled() => return Err(aborted(&key)),
            result = self.store.put_object(
                &key,
                body,
                options.content_type.as_deref(),
                options.access_policy,
            ) => result.map_err(|e| upload_error(&key, e))?,
        };

        observer.on_progress(&handle.record_part(len));

        Ok(UploadOutcome {
            location: ack.location.unwrap_or_else(|| self.store.object_url(&key)),
            key,
            version_id: ack.version_id,
            e_tag: ack.e_tag,
            bytes: len,
            parts: 0,
        })
    }

    async fn upload_multipart<R>(
        &self,
        parts: &mut PartReader<R>,
        first: Bytes,
        second: Bytes,
        options: &UploadOptions,
        observer: &dyn ProgressObserver,
        handle: &mut TransferHandle,
    ) -> Result<UploadOutcome>
    where
        R: AsyncRead + Unpin + Send,
    {
        let key = handle.key.clone();
        let upload_id = self
            .store
            .create_multipart_upload(
                &key,
                options.content_type.as_deref(),
                options.access_policy,
            )
            .await
            .map_err(|e| upload_error(&key, e))?;
        info!("multipart_start: {} upload_id={}", key, upload_id);

        let mut tasks: JoinSet<Result<(CompletedPart, u64)>> = JoinSet::new();
        let pumped = self
            .pump_parts(
                parts,
                VecDeque::from([first, second]),
                &upload_id,
                options.concurrency,
                observer,
                handle,
                &mut tasks,
            )
            .await;

        let mut completed = match pumped {
            Ok(completed) => completed,
            Err(err) => {
                tasks.shutdown().await;
                self.abort_session(&key, &upload_id).await;
                return Err(err);
            }
        };

        if handle.cancel.is_cancelled() {
            self.abort_session(&key, &upload_id).await;
            return Err(aborted(&key));
        }

        completed.sort_by_key(|part| part.part_number);
        let contiguous = completed
            .iter()
            .enumerate()
            .all(|(index, part)| part.part_number == index as i32 + 1);
        let expected = parts.bytes_read().div_ceil(options.part_size as u64) as usize;
        if !contiguous || completed.len() != expected {
            self.abort_session(&key, &upload_id).await;
            return Err(upload_error(
                &key,
                Error::Incomplete {
                    expected,
                    received: completed.len(),
                },
            ));
        }

        let part_count = completed.len();
        let ack = match self
            .store
            .complete_multipart_upload(&key, &upload_id, completed)
            .await
        {
            Ok(ack) => ack,
            Err(err) => {
                self.abort_session(&key, &upload_id).await;
                return Err(upload_error(&key, err));
            }
        };
        info!("multipart_complete: {} parts={}", key, part_count);

        Ok(UploadOutcome {
            location: ack.location.unwrap_or_else(|| self.store.object_url(&key)),
            key,
            version_id: ack.version_id,
            e_tag: ack.e_tag,
            bytes: handle.transferred,
            parts: part_count,
        })
    }

    /// Feed parts into the pool until the stream ends, then drain it
    #[allow(clippy::too_many_arguments)]
    async fn pump_parts<R>(
        &self,
        parts: &mut PartReader<R>,
        mut prefetched: VecDeque<Bytes>,
        upload_id: &str,
        concurrency: usize,
        observer: &dyn ProgressObserver,
        handle: &mut TransferHandle,
        tasks: &mut JoinSet<Result<(CompletedPart, u64)>>,
    ) -> Result<Vec<CompletedPart>>
    where
        R: AsyncRead + Unpin + Send,
    {
        let cancel = handle.cancel.clone();
        let key = handle.key.clone();
        let mut completed = Vec::new();
        let mut part_number: i32 = 0;

        loop {
            while tasks.len() >= concurrency {
                settle_next(tasks, &mut completed, observer, handle).await?;
            }

            if cancel.is_cancelled() {
                return Err(aborted(&key));
            }
            let payload = match prefetched.pop_front() {
                Some(payload) => payload,
                None => match read_part(parts, &cancel, &key).await? {
                    Some(payload) => payload,
                    None => break,
                },
            };
            handle.observe_reader(parts);

            part_number += 1;
            if part_number > MAX_PARTS {
                return Err(upload_error(&key, Error::TooManyParts { limit: MAX_PARTS }));
            }
            let task = PartUploadTask {
                part_number,
                payload,
            };
            tasks.spawn(task.run(
                self.store.clone(),
                key.clone(),
                upload_id.to_string(),
                cancel.clone(),
            ));
        }

        handle.observe_reader(parts);
        while !tasks.is_empty() {
            settle_next(tasks, &mut completed, observer, handle).await?;
        }
        Ok(completed)
    }

    async fn abort_session(&self, key: &str, upload_id: &str) {
        match self.store.abort_multipart_upload(key, upload_id).await {
            Ok(()) => info!("multipart_aborted: {} upload_id={}", key, upload_id),
            // The session may leak on the remote side; nothing more to do here.
            Err(err) => warn!(
                "multipart_abort_failed: {} upload_id={} error={}",
                key, upload_id, err
            ),
        }
    }
}

/// Wait for the next part to settle and account for it. Progress counters are
/// only touched here, one acknowledgement at a time.
async fn settle_next(
    tasks: &mut JoinSet<Result<(CompletedPart, u64)>>,
    completed: &mut Vec<CompletedPart>,
    observer: &dyn ProgressObserver,
    handle: &mut TransferHandle,
) -> Result<()> {
    let joined = tokio::select! {
        biased;
        _ = handle.cancel.cancelled() => return Err(aborted(&handle.key)),
        joined = tasks.join_next() => joined,
    };

    let (part, len) = match joined {
        None => return Ok(()),
        Some(Ok(Ok(done))) => done,
        Some(Ok(Err(err))) => return Err(err),
        Some(Err(join_err)) => {
            return Err(upload_error(
                &handle.key,
                Error::remote(
                    "upload_part",
                    handle.key.clone(),
                    format!("part task failed: {}", join_err),
                ),
            ))
        }
    };

    let event = handle.record_part(len);
    debug!(
        "multipart_part_done: {} part={} transferred={}",
        handle.key, part.part_number, event.transferred
    );
    observer.on_progress(&event);
    completed.push(part);
    Ok(())
}
