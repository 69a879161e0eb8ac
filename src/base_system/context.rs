//! Application configuration (`Config`) and its defaults.
//!
//! Also provides the field metadata used to generate a commented `config.yml`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Target site
    #[serde(default = "default_viewer_url")]
    pub viewer_url: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // Network
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_false")]
    pub insecure_tls: bool,

    // Session bootstrap
    #[serde(default = "default_settle_time")]
    pub settle_time: u64,
    #[serde(default = "default_ready_probe_attempts")]
    pub ready_probe_attempts: u32,
    #[serde(default = "default_ready_probe_interval")]
    pub ready_probe_interval: u64,

    // Pacing between page fetches
    #[serde(default = "default_base_delay_min_ms")]
    pub base_delay_min_ms: u64,
    #[serde(default = "default_base_delay_max_ms")]
    pub base_delay_max_ms: u64,
    #[serde(default = "default_long_pause_probability")]
    pub long_pause_probability: f64,
    #[serde(default = "default_long_pause_min_ms")]
    pub long_pause_min_ms: u64,
    #[serde(default = "default_long_pause_max_ms")]
    pub long_pause_max_ms: u64,

    // Per-page retry
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    // Resumability
    #[serde(default = "default_true")]
    pub skip_existing: bool,
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn settle_time(&self) -> Duration {
        Duration::from_secs(self.settle_time)
    }

    pub fn ready_probe_interval(&self) -> Duration {
        Duration::from_secs(self.ready_probe_interval)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            viewer_url: default_viewer_url(),
            output_dir: default_output_dir(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            insecure_tls: default_false(),
            settle_time: default_settle_time(),
            ready_probe_attempts: default_ready_probe_attempts(),
            ready_probe_interval: default_ready_probe_interval(),
            base_delay_min_ms: default_base_delay_min_ms(),
            base_delay_max_ms: default_base_delay_max_ms(),
            long_pause_probability: default_long_pause_probability(),
            long_pause_min_ms: default_long_pause_min_ms(),
            long_pause_max_ms: default_long_pause_max_ms(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            skip_existing: default_true(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 16] = [
            FieldMeta {
                name: "viewer_url",
                description: "Viewer URL opened first so the session can pass the anti-bot challenge",
            },
            FieldMeta {
                name: "output_dir",
                description: "Directory for the numbered page images (overridden by --output)",
            },
            FieldMeta {
                name: "user_agent",
                description: "User-Agent header presented by the session",
            },
            FieldMeta {
                name: "request_timeout",
                description: "Per-request timeout in seconds",
            },
            FieldMeta {
                name: "insecure_tls",
                description: "Accept invalid TLS certificates (only for broken institutional proxies)",
            },
            FieldMeta {
                name: "settle_time",
                description: "Seconds to wait after opening the viewer so the challenge can run",
            },
            FieldMeta {
                name: "ready_probe_attempts",
                description: "How often to probe the viewer for a success status before giving up",
            },
            FieldMeta {
                name: "ready_probe_interval",
                description: "Seconds between readiness probes",
            },
            FieldMeta {
                name: "base_delay_min_ms",
                description: "Lower bound of the random delay before each page fetch (milliseconds)",
            },
            FieldMeta {
                name: "base_delay_max_ms",
                description: "Upper bound of the random delay before each page fetch (milliseconds)",
            },
            FieldMeta {
                name: "long_pause_probability",
                description: "Chance (0..1) of an additional long pause before a fetch",
            },
            FieldMeta {
                name: "long_pause_min_ms",
                description: "Lower bound of the additional long pause (milliseconds)",
            },
            FieldMeta {
                name: "long_pause_max_ms",
                description: "Upper bound of the additional long pause (milliseconds)",
            },
            FieldMeta {
                name: "max_attempts",
                description: "Fetch attempts per page before it is recorded as failed",
            },
            FieldMeta {
                name: "retry_backoff_ms",
                description: "Initial backoff between attempts for the same page (milliseconds, doubled per retry)",
            },
            FieldMeta {
                name: "skip_existing",
                description: "Skip pages whose output file already exists and is non-empty",
            },
        ];
        &FIELDS
    }
}

fn default_viewer_url() -> String {
    "https://www.digitale-bibliothek-mv.de/".to_string()
}

fn default_output_dir() -> String {
    "images".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_settle_time() -> u64 {
    6
}

fn default_ready_probe_attempts() -> u32 {
    4
}

fn default_ready_probe_interval() -> u64 {
    3
}

fn default_base_delay_min_ms() -> u64 {
    2000
}

fn default_base_delay_max_ms() -> u64 {
    6000
}

fn default_long_pause_probability() -> f64 {
    0.15
}

fn default_long_pause_min_ms() -> u64 {
    5000
}

fn default_long_pause_max_ms() -> u64 {
    12000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1500
}

fn default_false() -> bool {
    false
}

fn default_true() -> bool {
    true
}
