use clap::Parser;
use r2_uploader_lib::cli::{run_upload, UploadArgs};
use r2_uploader_lib::{S3ObjectStore, StoreConfig};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    r2_uploader_lib::init_logging();

    let args = UploadArgs::parse();
    let config = StoreConfig::from_env();
    let store = Arc::new(S3ObjectStore::new(&config));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("............ upload aborted ..............");
            on_interrupt.cancel();
        }
    });

    let code = run_upload(&args, store, &cancel).await;
    ExitCode::from(code as u8)
}
