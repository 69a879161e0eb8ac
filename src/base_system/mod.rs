//! Infrastructure shared by the rest of the crate.
//!
//! - `config`  — load/create the YAML config file with field comments
//! - `context` — the application `Config` struct and its defaults
//! - `logging` — tracing setup (console + file log)

pub mod config;
pub mod context;
pub mod logging;
