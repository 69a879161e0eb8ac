//! METS image downloader: paced, resumable retrieval of digitized page images.
//!
//! Code map (reading entry points):
//! - `base_system`: config file handling and logging infrastructure
//! - `manifest`: METS parsing into the ordered page locator list
//! - `session`: viewer session bootstrap and warmed-up fetching
//! - `download`: pacing, the fetch-and-persist loop, progress, run report

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::warn;

mod base_system;
mod download;
mod manifest;
mod session;

use base_system::config::load_or_create;
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};

#[derive(Debug, Parser)]
#[command(name = "mets-image-downloader")]
#[command(about = "Download the page images of a digitized work from its METS manifest")]
struct Cli {
    /// Relative or absolute path to the METS XML file
    #[arg(short, long)]
    mets: PathBuf,

    /// Output directory for the numbered page images (default: images)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Viewer URL opened first to pass the anti-bot challenge
    #[arg(short, long)]
    viewer: Option<String>,

    /// Enable debug log output
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Config file path (created with commented defaults when missing)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log = init_logging(cli.debug)?;

    let config =
        load_or_create::<Config>(cli.config.as_deref()).map_err(|e| anyhow!(e.to_string()))?;

    // CLI flags win over config.yml values.
    let out_dir = cli
        .output
        .unwrap_or_else(|| PathBuf::from(&config.output_dir));
    let viewer_url = cli.viewer.unwrap_or_else(|| config.viewer_url.clone());

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        if let Err(err) = ctrlc::set_handler(move || {
            warn!(target: "run", "interrupt received, finishing the current page then shutting down");
            cancel.store(true, Ordering::SeqCst);
        }) {
            warn!(target: "run", error = %err, "could not install interrupt handler");
        }
    }

    download::downloader::run(&config, &cli.mets, &out_dir, &viewer_url, Some(cancel))?;
    Ok(())
}

fn init_logging(debug: bool) -> Result<LogSystem> {
    LogSystem::init(LogOptions {
        debug,
        use_color: true,
    })
    .map_err(|e| anyhow!(e))
}
