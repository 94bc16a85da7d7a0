use clap::Parser;
use log::info;
use s3_fetch::{download, init, uninit};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Download files from an S3 bucket to a local folder.
#[derive(Parser, Debug, Serialize)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Name of the S3 bucket
    bucket: String,
    /// Path to the local folder where files will be downloaded
    #[arg(value_name = "FOLDER")]
    local_folder: String,
    /// Prefix to filter files in the S3 bucket
    #[arg(long, default_value_t = String::new())]
    prefix: String,
    #[arg(long)]
    region: Option<String>,
    /// Custom endpoint, e.g. for an s3 compatible store
    #[arg(long)]
    endpoint: Option<String>,
    /// Profile from the shared aws config files
    #[arg(long)]
    profile: Option<String>,
    #[arg(long)]
    force_path_style: bool,
    /// Directory for log files, logs go to stderr if not set
    #[arg(long, default_value_t = String::new())]
    #[serde(skip_serializing)]
    log_path: String,
    #[arg(long, default_value_t = String::from("warn"))]
    #[serde(skip_serializing)]
    log_level: String,
}

fn status_line(success: bool) -> &'static str {
    if success {
        "Download completed successfully."
    } else {
        "Download failed."
    }
}

fn run(args: &Args) -> bool {
    if let Err(err) = init(
        json!(
            {
                "log_path": args.log_path,
                "log_level": args.log_level,
            }
        )
        .to_string(),
    ) {
        eprintln!("init failed: {}", err);
        return false;
    }
    let params = match serde_json::to_string(args) {
        Ok(params) => params,
        Err(err) => {
            eprintln!("invalid arguments: {}", err);
            uninit();
            return false;
        }
    };
    let succeeded = Arc::new(AtomicBool::new(false));
    let flag = succeeded.clone();
    download(
        params,
        Box::new(move |success: bool, message: String| {
            info!("download finished: {}", success);
            println!("{}", message);
            flag.store(success, Ordering::SeqCst);
        }),
        Box::new(|key: &str, path: &Path| {
            println!("Downloading {} to {}...", key, path.display());
        }),
    );
    uninit();
    succeeded.load(Ordering::SeqCst)
}

fn main() {
    let args = Args::parse();
    let success = run(&args);
    println!("{}", status_line(success));
}
