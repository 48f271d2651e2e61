//! S3 SDK implementation of `ObjectStore`

use super::{
    AccessPolicy, CompletedPart, ObjectAck, ObjectBody, ObjectMetadata, ObjectStore,
    ObjectSummary,
};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use aws_config::Region;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart as S3CompletedPart, ObjectCannedAcl,
};
use aws_sdk_s3::Client;
use bytes::Bytes;

pub struct S3ObjectStore {
    client: Client,
    config: StoreConfig,
}

impl S3ObjectStore {
    /// Create an S3 client for the configured endpoint. Nothing is sent until
    /// the first operation, so bad credentials surface there.
    pub fn new(config: &StoreConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2-uploader",
        );

        let mut builder = S3ConfigBuilder::new()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(true);

        if !config.endpoint.is_empty() {
            builder = builder.endpoint_url(&config.endpoint);
        }

        Self {
            client: Client::from_conf(builder.build()),
            config: config.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }
}

fn remote_error<E: std::error::Error>(operation: &'static str, key: &str, err: E) -> Error {
    Error::remote(operation, key, DisplayErrorContext(err).to_string())
}

fn canned_acl(policy: AccessPolicy) -> ObjectCannedAcl {
    match policy {
        AccessPolicy::Private => ObjectCannedAcl::Private,
        AccessPolicy::PublicRead => ObjectCannedAcl::PublicRead,
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
        access_policy: AccessPolicy,
    ) -> Result<ObjectAck> {
        let response = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_content_type(content_type.map(str::to_string))
            .acl(canned_acl(access_policy))
            .send()
            .await
            .map_err(|e| remote_error("put_object", key, e))?;

        Ok(ObjectAck {
            e_tag: response.e_tag().map(str::to_string),
            version_id: response.version_id().map(str::to_string),
            location: None,
        })
    }

    async fn get_object(&self, key: &str) -> Result<ObjectBody> {
        let response = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                if missing {
                    Error::NotFound {
                        key: key.to_string(),
                    }
                } else {
                    remote_error("get_object", key, e)
                }
            })?;

        Ok(Box::pin(response.body.into_async_read()))
    }

    async fn head_object(&self, key: &str) -> Result<ObjectMetadata> {
        let response = self
            .client
            .head_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                if missing {
                    Error::NotFound {
                        key: key.to_string(),
                    }
                } else {
                    remote_error("head_object", key, e)
                }
            })?;

        Ok(ObjectMetadata {
            content_length: response.content_length().unwrap_or(0).max(0) as u64,
            e_tag: response.e_tag().map(str::to_string),
            version_id: response.version_id().map(str::to_string),
            content_type: response.content_type().map(str::to_string),
            last_modified: response.last_modified().map(|dt| dt.to_string()),
        })
    }

    async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<ObjectSummary>> {
        let mut all_objects: Vec<ObjectSummary> = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.config.bucket)
                .max_keys(1000);

            if let Some(p) = prefix {
                request = request.prefix(p);
            }
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| remote_error("list_objects", prefix.unwrap_or(""), e))?;

            all_objects.extend(response.contents().iter().filter_map(|obj| {
                let key = obj.key()?.to_string();
                // Skip directory markers
                if key.ends_with('/') {
                    return None;
                }
                Some(ObjectSummary {
                    key,
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified: obj
                        .last_modified()
                        .map(|dt| dt.to_string())
                        .unwrap_or_default(),
                    etag: obj.e_tag().unwrap_or_default().to_string(),
                })
            }));

            if !response.is_truncated().unwrap_or(false) {
                break;
            }
            continuation_token = response.next_continuation_token().map(str::to_string);
            if continuation_token.is_none() {
                break;
            }
        }

        log::debug!(
            "list_objects_done: prefix={:?} count={}",
            prefix,
            all_objects.len()
        );
        Ok(all_objects)
    }

    async fn delete_object(&self, key: &str, version_id: Option<&str>) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key)
            .set_version_id(version_id.map(str::to_string))
            .send()
            .await
            .map_err(|e| remote_error("delete_object", key, e))?;
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: Option<&str>,
        access_policy: AccessPolicy,
    ) -> Result<String> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(&self.config.bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .acl(canned_acl(access_policy))
            .send()
            .await
            .map_err(|e| remote_error("create_multipart_upload", key, e))?;

        response
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| Error::remote("create_multipart_upload", key, "no upload id returned"))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart> {
        let response = self
            .client
            .upload_part()
            .bucket(&self.config.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| remote_error("upload_part", key, e))?;

        Ok(CompletedPart {
            part_number,
            e_tag: response.e_tag().unwrap_or_default().to_string(),
        })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<ObjectAck> {
        let completed_parts: Vec<S3CompletedPart> = parts
            .into_iter()
            .map(|part| {
                S3CompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(part.e_tag)
                    .build()
            })
            .collect();

        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        let response = self
            .client
            .complete_multipart_upload()
            .bucket(&self.config.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .map_err(|e| remote_error("complete_multipart_upload", key, e))?;

        Ok(ObjectAck {
            e_tag: response.e_tag().map(str::to_string),
            version_id: response.version_id().map(str::to_string),
            location: response.location().map(str::to_string),
        })
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.config.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| remote_error("abort_multipart_upload", key, e))?;
        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        self.config.object_url(key)
    }
}
