use clap::Parser;
use r2_uploader_lib::cli::{run_bucket, BucketArgs};
use r2_uploader_lib::{S3ObjectStore, StoreConfig};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    r2_uploader_lib::init_logging();

    let args = BucketArgs::parse();
    let store = Arc::new(S3ObjectStore::new(&StoreConfig::from_env()));

    match run_bucket(&args.command, store).await {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
