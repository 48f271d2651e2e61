//! Stream local files into Cloudflare R2 or any other S3-compatible bucket.
//!
//! - `store`: typed access to the bucket (`ObjectStore`, `S3ObjectStore`)
//! - `upload`: multipart streaming uploader with progress and cancellation
//! - `guard`: check-then-delete
//! - `transfer`: local file → bucket flow used by the CLI
//! - `download`: object → writer
//! - `cli`: argument parsing and command dispatch for both binaries

pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod guard;
pub mod store;
pub mod transfer;
pub mod upload;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use guard::ExistenceGuard;
pub use store::{AccessPolicy, ObjectStore, S3ObjectStore};
pub use transfer::{LocalCleanup, RunOptions, TransferOrchestrator, TransferReport};
pub use upload::{ProgressEvent, ProgressObserver, StreamingUploader, UploadOptions, UploadOutcome};

/// Shared logger setup for the binaries; `RUST_LOG` overrides the default
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .init();
}
