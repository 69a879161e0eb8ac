//! Viewer session bootstrap and warmed-up page fetching.
//!
//! One `Session` exists per run. It wraps a blocking HTTP client with a
//! persistent cookie store: the bootstrap navigates to the viewer first so the
//! site's anti-bot challenge can run and set its cookies, and every page fetch
//! afterwards goes through the same client.

use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONNECTION, HeaderMap, HeaderValue, USER_AGENT};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub entry_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
    /// Unconditional wait after the entry navigation so the client-side
    /// challenge has time to run.
    pub settle_time: Duration,
    pub ready_probe_attempts: u32,
    pub ready_probe_interval: Duration,
    pub insecure_tls: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            entry_url: "https://www.digitale-bibliothek-mv.de/".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            request_timeout: Duration::from_secs(30),
            settle_time: Duration::from_secs(6),
            ready_probe_attempts: 4,
            ready_probe_interval: Duration::from_secs(3),
            insecure_tls: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to build http client: {source}")]
    Client { source: reqwest::Error },
    #[error("session bootstrap failed for {url}: {source}")]
    Bootstrap { url: String, source: reqwest::Error },
    #[error("viewer session not ready after {attempts} probes of {url}")]
    NotReady { url: String, attempts: u32 },
}

/// Per-page fetch failure. Recoverable at the loop level: one bad page never
/// aborts the run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server returned {status}")]
    Status { status: StatusCode },
}

/// The seam between the fetch loop and the HTTP client.
pub trait PageFetcher {
    fn fetch_page(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

pub struct Session {
    client: Client,
    entry_url: String,
}

impl Session {
    /// Open the viewer, let the challenge settle, then probe until the site
    /// serves a success status. Entry navigation errors and exhausted probes
    /// are both fatal; without a working session no page can be fetched.
    pub fn bootstrap(config: &SessionConfig) -> Result<Self, SessionError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        // Built without a gzip decoder; ask for identity so bodies are
        // directly usable.
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );

        let client = Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .danger_accept_invalid_certs(config.insecure_tls)
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| SessionError::Client { source })?;

        info!(target: "session", url = %config.entry_url, "opening viewer session");
        let resp = client
            .get(&config.entry_url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|source| SessionError::Bootstrap {
                url: config.entry_url.clone(),
                source,
            })?;
        debug!(target: "session", status = resp.status().as_u16(), "entry page loaded");

        thread::sleep(config.settle_time);

        let session = Self {
            client,
            entry_url: config.entry_url.clone(),
        };
        session.wait_until_ready(config)?;
        Ok(session)
    }

    fn wait_until_ready(&self, config: &SessionConfig) -> Result<(), SessionError> {
        let attempts = config.ready_probe_attempts.max(1);
        for attempt in 1..=attempts {
            match self.client.get(&self.entry_url).send() {
                Ok(resp) if resp.status().is_success() => {
                    debug!(target: "session", attempt, "session ready");
                    return Ok(());
                }
                Ok(resp) => {
                    warn!(
                        target: "session",
                        attempt,
                        status = resp.status().as_u16(),
                        "viewer is still refusing the session"
                    );
                }
                Err(err) => {
                    warn!(target: "session", attempt, error = %err, "readiness probe failed");
                }
            }
            if attempt < attempts {
                thread::sleep(config.ready_probe_interval);
            }
        }
        Err(SessionError::NotReady {
            url: self.entry_url.clone(),
            attempts,
        })
    }
}

impl PageFetcher for Session {
    fn fetch_page(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let resp = self.client.get(url).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { status });
        }
        let bytes = resp.bytes()?;
        Ok(bytes.to_vec())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!(target: "session", "session closed");
    }
}
