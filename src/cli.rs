use clap::Parser;
use std::time::Duration;

use crate::io::FetchConfig;
use crate::logging::LogConfig;

#[derive(Parser, Debug)]
#[command(name = "zipstream")]
#[command(version)]
#[command(about = "List or extract entries of remote ZIP archives in one streaming pass", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipstream https://example.com/archive.zip              list entries\n  \
  zipstream -v https://example.com/archive.zip           list with sizes and dates\n  \
  zipstream -p https://example.com/a.zip docs/spec.md    send one entry to stdout\n  \
  zipstream -d out https://example.com/a.zip docs/spec.md   extract into out/docs/spec.md\n\n\
Exit status is 3 when the requested entry is not in the archive.")]
pub struct Cli {
    /// ZIP file path or HTTP URL
    #[arg(value_name = "ARCHIVE")]
    pub archive: String,

    /// Exact path of the entry to extract (default: list entries)
    #[arg(value_name = "ENTRY")]
    pub entry: Option<String>,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely, or log progress while extracting
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Extract the entry to stdout, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract the entry into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Never overwrite existing files
    #[arg(short = 'n', conflicts_with = "overwrite")]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Seconds allowed to establish the connection
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub connect_timeout: u64,

    /// Seconds tolerated between two reads of the response body
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub read_timeout: u64,

    /// Overall deadline in seconds for the whole transfer
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Redirects to follow (0 disables redirects)
    #[arg(long, value_name = "N", default_value_t = 10)]
    pub max_redirects: usize,

    /// User-Agent header sent with the request
    #[arg(long, value_name = "UA")]
    pub user_agent: Option<String>,

    /// Log level (off, error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<String>,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.archive.starts_with("http://") || self.archive.starts_with("https://")
    }

    pub fn is_list_mode(&self) -> bool {
        self.list || self.entry.is_none()
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    pub fn fetch_config(&self) -> FetchConfig {
        let defaults = FetchConfig::default();
        FetchConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            read_timeout: Duration::from_secs(self.read_timeout),
            timeout: self.timeout.map(Duration::from_secs),
            max_redirects: self.max_redirects,
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
        }
    }

    pub fn log_config(&self) -> LogConfig {
        let level = if let Some(ref level) = self.log_level {
            Some(level.clone())
        } else if self.is_very_quiet() {
            Some("off".to_string())
        } else if self.quiet > 0 {
            Some("error".to_string())
        } else if self.verbose && !self.is_list_mode() {
            Some("info".to_string())
        } else {
            None
        };

        LogConfig {
            level,
            file: self.log_file.clone(),
        }
    }
}
