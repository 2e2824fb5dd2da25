//! File logging.
//!
//! The terminal belongs to the session while it runs, so log output goes to
//! `~/.dterm/dterm.log` instead of stderr.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config;

/// Environment variable holding a filter directive, e.g. `dterm=debug`.
pub const LOG_ENV: &str = "DTERM_LOG";

/// Install the global subscriber. Returns the log file path, or `None` if
/// the file could not be opened (logging stays off).
pub fn init(level: LevelFilter) -> Option<PathBuf> {
    let log_path = config::dterm_dir()
        .map(|dir| dir.join("dterm.log"))
        .unwrap_or_else(|| PathBuf::from("dterm.log"));

    // Create log directory if needed
    if let Some(parent) = log_path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok()?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter(std::env::var(LOG_ENV).ok().as_deref(), level))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok()?;

    Some(log_path)
}

/// `DTERM_LOG` wins when it is set and parses; otherwise the configured level.
fn filter(directives: Option<&str>, level: LevelFilter) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(level.to_string()))
}
