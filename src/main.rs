//! vev-upload - upload and download files against a video hosting service

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vev_upload::config::{Config, ConfigOptions};
use vev_upload::progress::{DownloadEvent, ProgressEvent, ProgressStatus};
use vev_upload::{DownloadSession, UploadSession};

#[derive(Parser, Debug)]
#[command(name = "vev-upload")]
#[command(about = "Chunked uploads and streamed downloads for video hosting services")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a local file to an upload target URL
    Upload {
        /// Upload target URL handed out by the API
        #[arg(long)]
        url: String,

        /// Local file to upload
        #[arg(long)]
        file: PathBuf,

        /// Chunk size in MiB
        #[arg(long)]
        chunk_size_mb: Option<u64>,

        /// Chunk transfers kept in flight
        #[arg(long)]
        concurrency: Option<usize>,

        /// Retries per chunk after the first attempt
        #[arg(long)]
        retries: Option<u32>,

        /// Per-attempt timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Download a URL into a local file
    Download {
        /// Download URL handed out by the API
        #[arg(long)]
        url: String,

        /// Destination file
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, stdout carries the result
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    match args.command {
        Command::Upload {
            url,
            file,
            chunk_size_mb,
            concurrency,
            retries,
            timeout,
        } => {
            let config = Config::new(
                url,
                file,
                ConfigOptions {
                    chunk_size: chunk_size_mb.map(|mb| mb.saturating_mul(1024 * 1024)),
                    concurrency,
                    max_retries: retries,
                    attempt_timeout_secs: timeout,
                    ..Default::default()
                },
            )?;

            let session = UploadSession::new(config)?;
            session.on_progress(log_upload_progress);

            match session.start().await {
                Ok(result) => {
                    println!("{}", serde_json::to_string_pretty(&result.video)?);
                }
                Err(e) => {
                    error!("Upload failed during {}: {}", e.phase(), e);
                    return Err(e.into());
                }
            }
        }
        Command::Download { url, file } => {
            let session = DownloadSession::new(url, file)?;
            session.on_progress(log_download_progress);

            let path = session.start().await?;
            println!("{}", path.display());
        }
    }

    Ok(())
}

fn log_upload_progress(event: &ProgressEvent) {
    let part = match (event.chunk_index, event.total_indexes) {
        (Some(index), Some(last)) => format!(" chunk {}/{}", index, last),
        _ => String::new(),
    };
    match (&event.status, &event.error) {
        (ProgressStatus::Failed, Some(err)) => error!("{}{}: {}", event.status, part, err),
        (_, Some(err)) => warn!("{}{}: {}", event.status, part, err),
        _ => info!("{}{}", event.status, part),
    }
}

fn log_download_progress(event: &DownloadEvent) {
    match event {
        DownloadEvent::Progress(p) => match p.percent {
            Some(percent) => info!(
                "downloaded {} bytes ({:.1}%) in {:.1}s",
                p.transferred_bytes,
                percent,
                p.time_elapsed.as_secs_f64()
            ),
            None => info!(
                "downloaded {} bytes in {:.1}s",
                p.transferred_bytes,
                p.time_elapsed.as_secs_f64()
            ),
        },
        DownloadEvent::Completed { path } => info!("download completed: {}", path.display()),
        DownloadEvent::Error { message } => error!("download failed: {}", message),
    }
}
