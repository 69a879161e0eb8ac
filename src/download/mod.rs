//! Download pipeline.
//!
//! - `pacing`     — randomized human-cadence delay before each fetch
//! - `models`     — per-item outcomes and the run report
//! - `progress`   — CLI progress bar
//! - `downloader` — fetch-and-persist loop and run orchestration

pub mod downloader;
pub mod models;
pub mod pacing;
pub mod progress;
