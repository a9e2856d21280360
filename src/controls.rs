//! CLI arguments and fetch tuning knobs.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

const USER_AGENT: &str = "nistcrawl/0.1 (chemistry data retrieval)";

/// Tunable knobs that bound the fetch layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchControls {
    request_timeout: Duration,
    retry_cap: u32,
    retry_backoff: Duration,
}

impl FetchControls {
    /// Constructs a new set of fetch controls. The retry cap is clamped to at
    /// least one attempt.
    pub fn new(request_timeout: Duration, retry_cap: u32, retry_backoff: Duration) -> Self {
        Self {
            request_timeout,
            retry_cap: retry_cap.max(1),
            retry_backoff,
        }
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Attempts allowed per request before a timeout becomes fatal.
    pub fn retry_cap(&self) -> u32 {
        self.retry_cap
    }

    /// Base delay between timeout retries; doubles per attempt.
    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    /// User agent sent with every request.
    pub fn user_agent(&self) -> &'static str {
        USER_AGENT
    }
}

impl Default for FetchControls {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            retry_cap: 5,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Command-line interface for the scraper binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "nistcrawl", about = "NIST WebBook IR spectrum peak scraper")]
pub struct Cli {
    /// CSV sheet with Name and Formula columns
    #[arg(long, env = "NISTCRAWL_INPUT", default_value = "input.csv")]
    pub input: PathBuf,

    /// Directory receiving result files and structure images
    #[arg(long, env = "NISTCRAWL_OUT", default_value = "results")]
    pub out_dir: PathBuf,

    /// Per-request timeout in seconds
    #[arg(long, env = "NISTCRAWL_TIMEOUT_SECS", default_value_t = 10)]
    pub timeout_secs: u64,

    /// Attempts per request before a timeout becomes fatal
    #[arg(long, env = "NISTCRAWL_RETRY_CAP", default_value_t = 5)]
    pub retry_cap: u32,

    /// Base backoff between timeout retries, in milliseconds
    #[arg(long, env = "NISTCRAWL_RETRY_BACKOFF_MS", default_value_t = 500)]
    pub retry_backoff_ms: u64,
}

impl Cli {
    /// Converts the parsed CLI into `FetchControls`.
    pub fn build_controls(&self) -> FetchControls {
        FetchControls::new(
            Duration::from_secs(self.timeout_secs),
            self.retry_cap,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }
}
