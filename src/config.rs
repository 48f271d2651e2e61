//! Store configuration, read once from the environment and passed down explicitly

use serde::{Deserialize, Serialize};
use std::env;

pub const ENV_ENDPOINT: &str = "S3_ENDPOINT";
pub const ENV_ACCESS_KEY_ID: &str = "S3_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "S3_SECRET_ACCESS_KEY";
pub const ENV_BUCKET: &str = "S3_BUCKET_NAME";
pub const ENV_REGION: &str = "S3_REGION";

/// R2 does not use regions, the SDK still wants one.
pub const DEFAULT_REGION: &str = "auto";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// e.g. `https://<ACCOUNT_ID>.r2.cloudflarestorage.com`
    pub endpoint: String,
    pub bucket: String,
    pub access_key_id: String,
    #[serde(skip_serializing)]
    pub secret_access_key: String,
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl StoreConfig {
    /// Build from `S3_*` variables. Missing values are not fatal here: they
    /// are logged and the first remote call will fail instead.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| match lookup(name).filter(|v| !v.is_empty()) {
            Some(value) => value,
            None => {
                log::warn!("config_missing: {} is not set", name);
                String::new()
            }
        };

        let config = StoreConfig {
            endpoint: read(ENV_ENDPOINT),
            bucket: read(ENV_BUCKET),
            access_key_id: read(ENV_ACCESS_KEY_ID),
            secret_access_key: read(ENV_SECRET_ACCESS_KEY),
            region: lookup(ENV_REGION)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_region),
        };

        log::debug!(
            "config_loaded: endpoint={} bucket={} region={}",
            config.endpoint,
            config.bucket,
            config.region
        );
        config
    }

    /// Unsigned `{endpoint}/{bucket}/{key}` address. Only reachable when the
    /// object was written with a public access policy.
    pub fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.bucket,
            encode_uri_path(key)
        )
    }
}

/// Encode each path segment individually, keeping `/` as separator
pub(crate) fn encode_uri_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
