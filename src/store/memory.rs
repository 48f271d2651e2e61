//! In-memory `ObjectStore` recording every call, for tests

use super::{
    AccessPolicy, CompletedPart, ObjectAck, ObjectBody, ObjectMetadata, ObjectStore,
    ObjectSummary,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Put { key: String, len: usize },
    Get { key: String },
    Head { key: String },
    List { prefix: Option<String> },
    Delete { key: String, version_id: Option<String> },
    Create { key: String },
    UploadPart { part_number: i32, len: usize },
    Complete { part_numbers: Vec<i32> },
    Abort { upload_id: String },
}

struct Session {
    access_policy: AccessPolicy,
    parts: BTreeMap<i32, Bytes>,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, (Bytes, AccessPolicy)>,
    sessions: HashMap<String, Session>,
    calls: Vec<Call>,
}

/// Counts one `upload_part` call for as long as it is alive
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(current)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    next_upload: AtomicU64,
    fail_part: Mutex<Option<i32>>,
    held_part: Mutex<Option<(i32, Arc<Notify>)>>,
    fail_abort: AtomicBool,
    vanish_after_head: AtomicBool,
    part_gate: Mutex<Option<Arc<Semaphore>>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, key: &str, data: &[u8]) {
        self.lock()
            .objects
            .insert(key.to_string(), (Bytes::copy_from_slice(data), AccessPolicy::Private));
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.lock().objects.get(key).map(|(data, _)| data.clone())
    }

    pub fn policy(&self, key: &str) -> Option<AccessPolicy> {
        self.lock().objects.get(key).map(|(_, policy)| *policy)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn open_sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn part_calls(&self) -> Vec<i32> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::UploadPart { part_number, .. } => Some(part_number),
                _ => None,
            })
            .collect()
    }

    /// `upload_part` for `part_number` fails with a remote error
    pub fn fail_part(&self, part_number: i32) {
        *self.fail_part.lock().unwrap() = Some(part_number);
    }

    /// `upload_part` for `part_number` parks until the returned notify fires
    pub fn hold_part(&self, part_number: i32) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.held_part.lock().unwrap() = Some((part_number, notify.clone()));
        notify
    }

    /// Every `upload_part` waits for a permit; hand them out with
    /// `release_parts`
    pub fn gate_parts(&self) {
        *self.part_gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_parts(&self, permits: usize) {
        if let Some(gate) = self.part_gate.lock().unwrap().as_ref() {
            gate.add_permits(permits);
        }
    }

    /// `upload_part` calls currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of `upload_part` calls that ever ran at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn fail_abort(&self) {
        self.fail_abort.store(true, Ordering::SeqCst);
    }

    /// Simulates another actor deleting the object right after a head probe
    pub fn vanish_after_head(&self) {
        self.vanish_after_head.store(true, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        _content_type: Option<&str>,
        access_policy: AccessPolicy,
    ) -> Result<ObjectAck> {
        let mut state = self.lock();
        state.calls.push(Call::Put {
            key: key.to_string(),
            len: body.len(),
        });
        state
            .objects
            .insert(key.to_string(), (body, access_policy));
        Ok(ObjectAck {
            e_tag: Some(format!("\"put-{}\"", key)),
            version_id: Some("v1".to_string()),
            location: None,
        })
    }

    async fn get_object(&self, key: &str) -> Result<ObjectBody> {
        let mut state = self.lock();
        state.calls.push(Call::Get {
            key: key.to_string(),
        });
        match state.objects.get(key) {
            Some((data, _)) => Ok(Box::pin(std::io::Cursor::new(data.to_vec()))),
            None => Err(Error::NotFound {
                key: key.to_string(),
            }),
        }
    }

    async fn head_object(&self, key: &str) -> Result<ObjectMetadata> {
        let mut state = self.lock();
        state.calls.push(Call::Head {
            key: key.to_string(),
        });
        let len = match state.objects.get(key) {
            Some((data, _)) => data.len() as u64,
            None => {
                return Err(Error::NotFound {
                    key: key.to_string(),
                })
            }
        };
        if self.vanish_after_head.load(Ordering::SeqCst) {
            state.objects.remove(key);
        }
        Ok(ObjectMetadata {
            content_length: len,
            ..ObjectMetadata::default()
        })
    }

    async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<ObjectSummary>> {
        let mut state = self.lock();
        state.calls.push(Call::List {
            prefix: prefix.map(str::to_string),
        });
        Ok(state
            .objects
            .iter()
            .filter(|(key, _)| prefix.map(|p| key.starts_with(p)).unwrap_or(true))
            .map(|(key, (data, _))| ObjectSummary {
                key: key.clone(),
                size: data.len() as u64,
                last_modified: String::new(),
                etag: String::new(),
            })
            .collect())
    }

    async fn delete_object(&self, key: &str, version_id: Option<&str>) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::Delete {
            key: key.to_string(),
            version_id: version_id.map(str::to_string),
        });
        match state.objects.remove(key) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound {
                key: key.to_string(),
            }),
        }
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        _content_type: Option<&str>,
        access_policy: AccessPolicy,
    ) -> Result<String> {
        let upload_id = format!("upload-{}", self.next_upload.fetch_add(1, Ordering::SeqCst));
        let mut state = self.lock();
        state.calls.push(Call::Create {
            key: key.to_string(),
        });
        state.sessions.insert(
            upload_id.clone(),
            Session {
                access_policy,
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart> {
        self.record(Call::UploadPart {
            part_number,
            len: body.len(),
        });
        let _in_flight = InFlight::enter(&self.in_flight, &self.peak_in_flight);

        let gate = self.part_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let held = self
            .held_part
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(n, _)| *n == part_number)
            .map(|(_, notify)| notify.clone());
        if let Some(notify) = held {
            notify.notified().await;
        }

        if *self.fail_part.lock().unwrap() == Some(part_number) {
            return Err(Error::remote("upload_part", key, "injected failure"));
        }

        let mut state = self.lock();
        let session = state
            .sessions
            .get_mut(upload_id)
            .ok_or_else(|| Error::remote("upload_part", key, "no such upload"))?;
        session.parts.insert(part_number, body);
        Ok(CompletedPart {
            part_number,
            e_tag: format!("\"etag-{}\"", part_number),
        })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<ObjectAck> {
        let mut state = self.lock();
        state.calls.push(Call::Complete {
            part_numbers: parts.iter().map(|p| p.part_number).collect(),
        });
        let session = state
            .sessions
            .remove(upload_id)
            .ok_or_else(|| Error::remote("complete_multipart_upload", key, "no such upload"))?;

        let mut assembled = BytesMut::new();
        for part in &parts {
            let data = session.parts.get(&part.part_number).ok_or_else(|| {
                Error::remote("complete_multipart_upload", key, "missing part")
            })?;
            assembled.extend_from_slice(data);
        }
        state
            .objects
            .insert(key.to_string(), (assembled.freeze(), session.access_policy));
        Ok(ObjectAck {
            e_tag: Some(format!("\"multipart-{}\"", parts.len())),
            version_id: Some("v1".to_string()),
            location: Some(format!("memory://bucket/{}", key)),
        })
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::Abort {
            upload_id: upload_id.to_string(),
        });
        if self.fail_abort.load(Ordering::SeqCst) {
            return Err(Error::remote("abort_multipart_upload", key, "injected failure"));
        }
        state.sessions.remove(upload_id);
        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        format!("memory://bucket/{}", key)
    }
}
