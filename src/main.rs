#![forbid(unsafe_code)]

use clap::Parser;
use color_eyre::eyre;
use std::io::Write;
use std::sync::Arc;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

use upq::cli::Cli;
use upq::model::summary::BatchSnapshot;
use upq::services::file_collector;
use upq::services::storage_client::HttpStorageClient;
use upq::services::upload_manager::{StartOutcome, UploadManager};
use upq::settings::api_credentials::{self, ApiCredential};
use upq::settings::config::{validate_concurrency, UploadConfig};
use upq::utils::{
    format_bytes, format_duration, format_progress_bar, initialize_logging,
    initialize_panic_handler,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    initialize_logging()?;
    initialize_panic_handler()?;
    let args = Cli::parse();

    let mut config = UploadConfig::load()?;
    if let Some(endpoint) = args.endpoint.clone() {
        config.endpoint = endpoint;
    }
    if let Some(limit) = args.concurrency {
        validate_concurrency(limit)?;
        config.max_concurrent_uploads = limit;
    }

    match api_credentials::load_credentials(args.creds.clone()) {
        Ok(creds) if !creds.is_empty() => {
            let credential = creds
                .iter()
                .find(|c| c.selected)
                .unwrap_or(&creds[0])
                .clone();
            run(args, config, credential).await
        }
        _ => {
            eprintln!(
                "No credentials found, add a credentials file into your $UPQ_DATA/creds directory or pass --creds."
            );
            Ok(())
        }
    }
}

async fn run(args: Cli, config: UploadConfig, credential: ApiCredential) -> eyre::Result<()> {
    let client = Arc::new(HttpStorageClient::new(
        &config.endpoint,
        &credential,
        config.request_timeout(),
    )?);
    let manager = UploadManager::new(client, &config);

    let mut selected = Vec::new();
    for path in &args.paths {
        if args.folder {
            selected.extend(file_collector::collect_folder(path).await?);
        } else {
            selected.push(file_collector::collect_file(path).await?);
        }
    }

    let total_bytes: u64 = selected.iter().map(|f| f.size).sum();
    let ids = manager.add_files(selected, args.folder).await;
    if ids.is_empty() {
        println!("No files to upload.");
        return Ok(());
    }
    println!(
        "Uploading {} file(s) ({}) to {}",
        ids.len(),
        format_bytes(total_bytes),
        config.endpoint
    );

    let started = std::time::Instant::now();
    if manager.start().await == StartOutcome::NothingToUpload {
        println!("Nothing to upload.");
        return Ok(());
    }

    let mut snapshots = WatchStream::new(manager.subscribe());
    loop {
        tokio::select! {
            maybe_snapshot = snapshots.next() => {
                match maybe_snapshot {
                    Some(snapshot) => {
                        render_progress(&snapshot);
                        if snapshot.is_settled() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                manager.pause().await;
                println!("\nUpload paused, exiting.");
                return Ok(());
            }
        }
    }

    println!();
    report(&manager.snapshot().await, started.elapsed().as_secs());
    Ok(())
}

fn render_progress(snapshot: &BatchSnapshot) {
    let summary = snapshot.summary;
    print!(
        "\r{} {:>3}% ({}/{} files)",
        format_progress_bar(summary.global_progress as f64, 30),
        summary.global_progress,
        summary.completed_files,
        summary.active_files
    );
    let _ = std::io::stdout().flush();
}

fn report(snapshot: &BatchSnapshot, elapsed_secs: u64) {
    let failed = snapshot
        .items
        .iter()
        .filter(|i| i.status.is_error())
        .count();
    let cancelled = snapshot
        .items
        .iter()
        .filter(|i| i.status.is_cancelled())
        .count();
    println!(
        "{} uploaded, {} failed, {} cancelled in {}",
        snapshot.summary.completed_files,
        failed,
        cancelled,
        format_duration(elapsed_secs)
    );
    for item in snapshot.items.iter().filter(|i| i.status.is_error()) {
        eprintln!(
            "  {}: {}",
            item.relative_path,
            item.error_message().unwrap_or("unknown error")
        );
    }
}
