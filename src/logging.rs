//! Logging setup for the zipstream binary.
//!
//! Initializes a `tracing-subscriber` writing to stderr or to a file, so
//! stdout stays clean for piped entry content.
//!
//! ## Configuration priority
//!
//! 1. Level chosen on the command line (`-q`, `-v`, `--log-level`)
//! 2. `RUST_LOG` environment variable
//! 3. Default: `warn`

use std::sync::{Mutex, OnceLock};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, time::SystemTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

static LOGGING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Where and how much to log
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Log level: "off", "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
    /// Log file path. If unset, logs go to stderr.
    pub file: Option<String>,
}

impl LogConfig {
    /// Filter directive for this crate, or `None` to defer to `RUST_LOG`
    pub fn directive(&self) -> Option<String> {
        self.level
            .as_ref()
            .map(|level| format!("zipstream={}", level.to_lowercase()))
    }

    pub fn is_off(&self) -> bool {
        self.level
            .as_deref()
            .is_some_and(|level| level.eq_ignore_ascii_case("off"))
    }
}

/// Initialize the tracing subscriber.
///
/// Only the first call in a process has any effect.
pub fn init_logging(config: &LogConfig) {
    LOGGING_INITIALIZED.get_or_init(|| {
        if config.is_off() {
            return;
        }

        let filter = match config.directive() {
            Some(directive) => EnvFilter::new(directive),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("zipstream=warn")),
        };

        if let Some(ref path) = config.file {
            let file = match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("zipstream: failed to open log file {}: {}", path, e);
                    return;
                }
            };

            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_target(false)
                        .with_ansi(false)
                        .with_timer(SystemTime),
                )
                .try_init()
                .ok();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .with_timer(SystemTime),
                )
                .try_init()
                .ok();
        }
    });
}
