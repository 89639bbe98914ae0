// src/logging.rs

//! Diagnostics of the controller and of every shim process.
//!
//! The level is `--log-level`, else `RELBUILD_LOG`, else `info`. Shim
//! processes inherit `RELBUILD_LOG` from the controller through `make`, so
//! one setting covers the whole build. Everything goes to stderr, where
//! `make` interleaves it with its own messages; command output goes to the
//! task logs instead.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

/// Environment variable consulted when `--log-level` is absent.
pub const LOG_ENV: &str = "RELBUILD_LOG";

/// Install the process-wide subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let level = cli_level
        .map(Level::from)
        .or_else(|| level_from_env(std::env::var(LOG_ENV).ok().as_deref()))
        .unwrap_or(Level::INFO);

    fmt()
        .with_max_level(level)
        .with_target(level >= Level::DEBUG)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing tracing subscriber: {e}"))?;

    Ok(())
}

impl From<LogLevel> for Level {
    fn from(lvl: LogLevel) -> Self {
        match lvl {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// `warning` is accepted next to the names `tracing` itself parses.
fn level_from_env(raw: Option<&str>) -> Option<Level> {
    let raw = raw?.trim();
    if raw.eq_ignore_ascii_case("warning") {
        return Some(Level::WARN);
    }
    raw.parse().ok()
}

