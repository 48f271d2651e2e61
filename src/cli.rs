//! Command-line surface of the `r2-uploader` and `r2-bucket` binaries

use crate::download::{download_object, download_to_path};
use crate::error::{Error, Result};
use crate::guard::ExistenceGuard;
use crate::store::{AccessPolicy, ObjectStore};
use crate::transfer::{RunOptions, TransferOrchestrator};
use crate::upload::{LogProgress, UploadOptions, DEFAULT_CONCURRENCY};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const MIB: usize = 1024 * 1024;

/// 5 GiB, the largest part S3 accepts
const MAX_PART_SIZE_MB: u64 = 5 * 1024;

#[derive(Debug, Parser)]
#[command(version, about = "Upload a file to an S3-compatible bucket")]
pub struct UploadArgs {
    /// File to upload; its base name becomes the object key
    pub file: PathBuf,

    /// Delete the file after successful upload
    #[arg(short = 'd', long = "delete-after-upload")]
    pub delete_after_upload: bool,

    /// Parts uploaded in parallel
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Part size in MiB
    #[arg(
        long = "part-size-mb",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..=MAX_PART_SIZE_MB)
    )]
    pub part_size_mb: u64,

    #[arg(long)]
    pub content_type: Option<String>,

    /// Upload with a public-read policy instead of private
    #[arg(long)]
    pub public: bool,
}

impl UploadArgs {
    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            concurrency: self.concurrency,
            part_size: self.part_size_mb as usize * MIB,
            access_policy: if self.public {
                AccessPolicy::PublicRead
            } else {
                AccessPolicy::Private
            },
            content_type: self.content_type.clone(),
        }
    }
}

/// Run one upload and map the result to a process exit code: 1 when the local
/// file is unusable, 0 otherwise. Upload failures are logged, not re-raised.
pub async fn run_upload(
    args: &UploadArgs,
    store: Arc<dyn ObjectStore>,
    cancel: &CancellationToken,
) -> i32 {
    let orchestrator = TransferOrchestrator::new(store, args.upload_options());
    let run_options = RunOptions {
        delete_after_upload: args.delete_after_upload,
    };

    match orchestrator
        .run(&args.file, run_options, &LogProgress, cancel)
        .await
    {
        Ok(report) => {
            let rendered = serde_json::to_string_pretty(&report)
                .unwrap_or_else(|_| format!("{:?}", report));
            log::info!("Upload successful! {}", rendered);
            0
        }
        Err(Error::LocalFile { path, source }) => {
            log::error!(
                "Error: File {:?} does not exist or is not readable: {}",
                path,
                source
            );
            1
        }
        Err(err) => {
            log::error!("Error during upload: {}", err);
            0
        }
    }
}

#[derive(Debug, Parser)]
#[command(version, about = "Inspect and modify objects in an S3-compatible bucket")]
pub struct BucketArgs {
    #[command(subcommand)]
    pub command: BucketCommand,
}

#[derive(Debug, Subcommand)]
pub enum BucketCommand {
    /// List object keys
    List {
        #[arg(long)]
        prefix: Option<String>,
        /// Print full object summaries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Exit 0 if the object exists, 1 otherwise
    Exists { key: String },
    /// Download an object to a file, or stdout when no output is given
    Get {
        key: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete an object, failing if it does not exist
    Delete {
        key: String,
        #[arg(long)]
        version_id: Option<String>,
    },
    /// Print the unsigned public URL of an object
    Url { key: String },
}

pub async fn run_bucket(command: &BucketCommand, store: Arc<dyn ObjectStore>) -> Result<i32> {
    match command {
        BucketCommand::List { prefix, json } => {
            let objects = store.list_objects(prefix.as_deref()).await?;
            if *json {
                let rendered = serde_json::to_string_pretty(&objects)?;
                println!("{}", rendered);
            } else {
                for object in &objects {
                    println!("{}", object.key);
                }
            }
            Ok(0)
        }
        BucketCommand::Exists { key } => {
            let exists = ExistenceGuard::new(store).exists(key).await?;
            println!("{}", exists);
            Ok(if exists { 0 } else { 1 })
        }
        BucketCommand::Get { key, output } => {
            match output {
                Some(path) => {
                    download_to_path(store.as_ref(), key, path).await?;
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    download_object(store.as_ref(), key, &mut stdout).await?;
                }
            }
            Ok(0)
        }
        BucketCommand::Delete { key, version_id } => {
            ExistenceGuard::new(store)
                .delete_if_exists(key, version_id.as_deref())
                .await?;
            Ok(0)
        }
        BucketCommand::Url { key } => {
            println!("{}", store.object_url(key));
            Ok(0)
        }
    }
}
