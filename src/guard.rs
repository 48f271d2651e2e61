//! Check-then-delete against the bucket
//!
//! The probe and the delete are two separate remote calls. Another writer can
//! remove the object in between; the store's error from the delete is then
//! returned as-is.

use crate::error::{Error, Result};
use crate::store::ObjectStore;
use std::sync::Arc;

pub struct ExistenceGuard {
    store: Arc<dyn ObjectStore>,
}

impl ExistenceGuard {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Fresh metadata probe, never cached
    pub async fn exists(&self, key: &str) -> Result<bool> {
        match self.store.head_object(key).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Delete `key` (or one of its versions). Fails with `Error::NotFound`
    /// without issuing a delete when the object is absent.
    pub async fn delete_if_exists(&self, key: &str, version_id: Option<&str>) -> Result<()> {
        if !self.exists(key).await? {
            log::warn!("delete_skipped: {} does not exist", key);
            return Err(Error::NotFound {
                key: key.to_string(),
            });
        }

        self.store.delete_object(key, version_id).await?;
        log::info!("delete_done: {} version={:?}", key, version_id);
        Ok(())
    }
}
