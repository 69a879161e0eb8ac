//! Fetch-and-persist loop and run orchestration.
//!
//! Pages are processed strictly in manifest order, one at a time. Concurrency
//! is deliberately absent: parallel fetches would defeat the human-cadence
//! pacing and invite rate limiting.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::base_system::context::Config;
use crate::base_system::logging;
use crate::download::models::{DownloadOutcome, ItemReport, RunReport};
use crate::download::pacing::{Pacer, PacingConfig};
use crate::download::progress::ProgressReporter;
use crate::manifest::mets;
use crate::session::{FetchError, PageFetcher, Session, SessionConfig};

const DEFAULT_EXTENSION: &str = ".jpg";
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

pub struct LoopOptions {
    pub retry: RetryPolicy,
    pub skip_existing: bool,
    pub progress_bar: bool,
}

/// File name for the page at 1-based `index`: zero-padded to eight digits,
/// extension taken from the locator's path (`.jpg` when it has none). Names
/// depend only on the manifest, so re-runs can resume by skipping files that
/// already exist.
pub fn page_file_name(index: usize, url: &str) -> String {
    format!("{index:08}{}", extension_of(url))
}

fn extension_of(url: &str) -> String {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        // Relative locator: strip query and fragment by hand.
        Err(_) => url.split(['?', '#']).next().unwrap_or("").to_string(),
    };
    match Path::new(&path).extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => format!(".{ext}"),
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

/// Run a whole invocation: parse the manifest, bootstrap the session, walk the
/// page list, then tear the session down and persist the run report.
///
/// Manifest and bootstrap errors are fatal and reach the caller; per-page
/// failures only show up in the report.
pub fn run(
    config: &Config,
    manifest_path: &Path,
    out_dir: &Path,
    viewer_url: &str,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<RunReport> {
    let locators = mets::parse_manifest(manifest_path)
        .with_context(|| format!("parse manifest {}", manifest_path.display()))?;
    info!(target: "run", "found {} pages in manifest", locators.len());

    let session_config = SessionConfig {
        entry_url: viewer_url.to_string(),
        user_agent: config.user_agent.clone(),
        request_timeout: config.request_timeout(),
        settle_time: config.settle_time(),
        ready_probe_attempts: config.ready_probe_attempts,
        ready_probe_interval: config.ready_probe_interval(),
        insecure_tls: config.insecure_tls,
    };
    let session = Session::bootstrap(&session_config)
        .with_context(|| format!("bootstrap session against {viewer_url}"))?;

    let mut pacer = Pacer::new(PacingConfig {
        base_min: Duration::from_millis(config.base_delay_min_ms),
        base_max: Duration::from_millis(config.base_delay_max_ms),
        long_pause_probability: config.long_pause_probability,
        long_min: Duration::from_millis(config.long_pause_min_ms),
        long_max: Duration::from_millis(config.long_pause_max_ms),
    });
    let options = LoopOptions {
        retry: RetryPolicy {
            max_attempts: config.max_attempts,
            backoff: config.retry_backoff(),
        },
        skip_existing: config.skip_existing,
        progress_bar: true,
    };

    // The session must be released whatever the loop does; owning it in this
    // scope means drop() runs on every exit path, including unwinding.
    let result = fetch_and_persist(
        &session,
        &locators,
        out_dir,
        &mut pacer,
        &options,
        cancel.as_deref(),
    );
    drop(session);

    let report = result?;
    info!(
        target: "run",
        "done: {} downloaded, {} skipped, {} failed, {} canceled (of {})",
        report.downloaded, report.skipped, report.failed, report.canceled, report.total
    );
    if let Err(err) = save_report(&report) {
        warn!(target: "run", error = %err, "could not write run report");
    }
    Ok(report)
}

/// Walk the ordered locator list, fetching and writing one page at a time.
/// Each page is isolated: a failure is recorded and the loop moves on.
pub fn fetch_and_persist<F: PageFetcher>(
    fetcher: &F,
    locators: &[String],
    out_dir: &Path,
    pacer: &mut Pacer,
    options: &LoopOptions,
    cancel: Option<&AtomicBool>,
) -> Result<RunReport> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("create output directory {}", out_dir.display()))?;

    let total = locators.len();
    let mut report = RunReport::new(total);
    let progress = ProgressReporter::new(total, options.progress_bar);

    for (pos, url) in locators.iter().enumerate() {
        let index = pos + 1;

        if cancel.map(|flag| flag.load(Ordering::SeqCst)).unwrap_or(false) {
            warn!(target: "download", index, "interrupted, leaving the remaining pages for a later run");
            for (rest_pos, rest_url) in locators.iter().enumerate().skip(pos) {
                report.record(ItemReport {
                    index: rest_pos + 1,
                    url: rest_url.clone(),
                    file_name: page_file_name(rest_pos + 1, rest_url),
                    outcome: DownloadOutcome::Canceled,
                    attempts: 0,
                    error: None,
                });
            }
            break;
        }

        let file_name = page_file_name(index, url);
        let target = out_dir.join(&file_name);

        if options.skip_existing && is_nonempty_file(&target) {
            debug!(target: "download", index, file = %file_name, "already on disk, skipping");
            report.record(ItemReport {
                index,
                url: url.clone(),
                file_name,
                outcome: DownloadOutcome::SkippedExisting,
                attempts: 0,
                error: None,
            });
            progress.inc();
            continue;
        }

        pacer.pause();
        info!(target: "download", "{index}/{total} -> {file_name}");

        let (attempts, fetched) = fetch_with_retry(fetcher, url, options.retry);
        let (outcome, error) = match fetched {
            // The full payload is in memory before the write; a failed page
            // never leaves a partial file behind.
            Ok(bytes) => match fs::write(&target, &bytes) {
                Ok(()) => (DownloadOutcome::Downloaded, None),
                Err(err) => {
                    error!(target: "download", index, url = %url, error = %err, "failed to write page");
                    (DownloadOutcome::Failed, Some(err.to_string()))
                }
            },
            Err(err) => {
                error!(target: "download", index, url = %url, error = %err, "giving up on page");
                (DownloadOutcome::Failed, Some(err.to_string()))
            }
        };
        report.record(ItemReport {
            index,
            url: url.clone(),
            file_name,
            outcome,
            attempts,
            error,
        });
        progress.inc();
    }

    progress.finish();
    Ok(report)
}

/// Bounded retry with doubling backoff, all inside a single page's slot.
fn fetch_with_retry<F: PageFetcher>(
    fetcher: &F,
    url: &str,
    policy: RetryPolicy,
) -> (u32, Result<Vec<u8>, FetchError>) {
    let attempts = policy.max_attempts.max(1);
    let mut delay = policy.backoff;
    for attempt in 1..attempts {
        match fetcher.fetch_page(url) {
            Ok(bytes) => return (attempt, Ok(bytes)),
            Err(err) => {
                warn!(target: "download", attempt, url = %url, error = %err, "fetch failed, retrying");
                thread::sleep(delay);
                delay = std::cmp::min(delay * 2, MAX_RETRY_BACKOFF);
            }
        }
    }
    (attempts, fetcher.fetch_page(url))
}

fn is_nonempty_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

fn save_report(report: &RunReport) -> Result<()> {
    let path: PathBuf = logging::logs_dir().join("run-report.json");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(report)?;
    fs::write(&path, bytes)?;
    debug!(target: "run", path = %path.display(), "run report written");
    Ok(())
}
