//! Object store module - typed access to the remote bucket
//!
//! - `ObjectStore`: the operations every caller goes through
//! - `s3`: implementation over the AWS S3 SDK (R2, MinIO, AWS)
//! - `memory`: in-process double used by the test suites

#[cfg(test)]
pub(crate) mod memory;
mod s3;

pub use s3::S3ObjectStore;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Streamed body of a downloaded object
pub type ObjectBody = Pin<Box<dyn AsyncRead + Send>>;

/// Visibility applied to an object when it is written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessPolicy {
    #[default]
    Private,
    PublicRead,
}

/// Acknowledgement of a committed write (single put or completed multipart)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectAck {
    pub e_tag: Option<String>,
    pub version_id: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObjectMetadata {
    pub content_length: u64,
    pub e_tag: Option<String>,
    pub version_id: Option<String>,
    pub content_type: Option<String>,
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: String,
    pub etag: String,
}

/// One acknowledged part of a multipart session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub e_tag: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
        access_policy: AccessPolicy,
    ) -> Result<ObjectAck>;

    /// Fails with `Error::NotFound` when the key is absent
    async fn get_object(&self, key: &str) -> Result<ObjectBody>;

    /// Fails with `Error::NotFound` when the key is absent
    async fn head_object(&self, key: &str) -> Result<ObjectMetadata>;

    /// Every object under `prefix`, in the order the store returns them
    async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<ObjectSummary>>;

    async fn delete_object(&self, key: &str, version_id: Option<&str>) -> Result<()>;

    /// Returns the upload id of the new session
    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: Option<&str>,
        access_policy: AccessPolicy,
    ) -> Result<String>;

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart>;

    /// `parts` must be sorted by part number
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<ObjectAck>;

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()>;

    /// Unsigned public address of `key`
    fn object_url(&self, key: &str) -> String;
}
