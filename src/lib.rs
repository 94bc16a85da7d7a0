//! mirror an s3 prefix into a local folder
use flexi_logger::{FileSpec, Logger, LoggerHandle};
use log::{error, info};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

mod basic;
mod download;
mod error;
#[cfg(test)]
mod mock;
mod store;

pub use basic::{FetchParams, InitConfig, ProgressCallback, ResultCallback};
pub use download::{download_prefix, local_target, DownloadSummary, LocalTarget};
pub use error::{FailureKind, FetchError, FetchResult};
pub use store::{ListingPage, ObjectEntry, ObjectStore, Pages, S3Store};

static RUNTIME: Mutex<Option<tokio::runtime::Runtime>> = Mutex::new(None);
static LOGGER: Mutex<Option<LoggerHandle>> = Mutex::new(None);

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn start_logger(config: &InitConfig) -> Result<LoggerHandle, Box<dyn std::error::Error>> {
    let level = config.log_level.as_deref().unwrap_or("info");
    let logger = Logger::try_with_env_or_str(level)?;
    let logger = match &config.log_path {
        Some(log_path) if !log_path.is_empty() => logger
            .log_to_file(FileSpec::default().directory(log_path).basename("s3-fetch"))
            .format(flexi_logger::detailed_format),
        _ => logger.log_to_stderr(),
    };
    Ok(logger.start()?)
}

/// init logger and tokio runtime
/// run this function before any other functions
/// # Arguments
/// * `config` - json, `{"log_path": ..., "log_level": ...}`, both optional
pub fn init(config: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = serde_json::from_str::<InitConfig>(&config)?;
    let mut logger = lock(&LOGGER);
    if logger.is_none() {
        *logger = Some(start_logger(&config)?);
    }
    let mut runtime = lock(&RUNTIME);
    if runtime.is_none() {
        // Transfers run strictly one after another.
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        *runtime = Some(rt);
    }
    info!("{} {} initialized", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    Ok(())
}

/// shutdown the runtime and flush the logger
pub fn uninit() {
    if let Some(rt) = lock(&RUNTIME).take() {
        rt.shutdown_background();
    }
    if let Some(logger) = lock(&LOGGER).take() {
        logger.flush();
    }
}

/// Fetch every object under a prefix with the s3 client
pub async fn fetch(
    params: &FetchParams,
    progress: &(dyn Fn(&str, &Path) + Send + Sync),
) -> FetchResult<DownloadSummary> {
    let store = S3Store::from_params(params).await;
    download_prefix(
        &store,
        &params.bucket,
        Path::new(&params.local_folder),
        &params.prefix,
        progress,
    )
    .await
}

/// Download every object under a prefix into a local folder
/// # Arguments
/// * `params` - The params of download, json format
/// ** `bucket` - The bucket name
/// ** `local_folder` - The destination folder, created if missing
/// ** `prefix` - Only keys starting with it are fetched, default empty
/// ** `region` - The region, resolved from the environment if not set
/// ** `endpoint` - The endpoint, use default if not set
/// ** `profile` - The shared config profile, use default if not set
/// ** `force_path_style` - Use path style addressing
/// * `result_callback` - The callback function when download finished
/// ** `success` - Every object was downloaded
/// ** `message` - The outcome line to show the user
/// * `progress_callback` - Called before each object is fetched
/// ** `key` - The object key
/// ** `path` - The local file path
pub fn download(
    params: String,
    result_callback: ResultCallback,
    progress_callback: ProgressCallback,
) {
    let params = match serde_json::from_str::<FetchParams>(&params) {
        Ok(params) => params,
        Err(err) => {
            result_callback(false, format!("parse params failed: {}", err));
            return;
        }
    };
    let runtime = lock(&RUNTIME);
    let runtime = match &*runtime {
        Some(runtime) => runtime,
        None => {
            result_callback(false, "runtime not initialized".to_string());
            return;
        }
    };
    info!(
        "downloading s3://{}/{} to {}",
        params.bucket, params.prefix, params.local_folder
    );
    match runtime.block_on(fetch(&params, &*progress_callback)) {
        Ok(_) => result_callback(true, "All files downloaded successfully.".to_string()),
        Err(err) => {
            error!("download failed: {}", err);
            result_callback(false, err.report_line());
        }
    }
}
