//! HTTP fetch collaborator with bounded timeout retries.

use crate::controls::FetchControls;
use log::warn;
use reqwest::{Client, Response, StatusCode};
use scraper::Html;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::time::sleep;
use url::Url;

/// Errors surfaced by the fetch layer.
#[derive(Debug)]
pub enum FetchError {
    /// The request kept timing out until the retry cap was exhausted.
    TimedOut {
        /// Requested URL.
        url: String,
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// A non-timeout transport error; fatal by contract.
    Http {
        /// Requested URL.
        url: String,
        /// Underlying client error.
        source: reqwest::Error,
    },
    /// The server answered with a non-success status.
    Status {
        /// Requested URL.
        url: String,
        /// Response status code.
        status: StatusCode,
    },
    /// Downloaded bytes could not be written to disk.
    Io {
        /// Destination path.
        path: PathBuf,
        /// Underlying filesystem error.
        source: std::io::Error,
    },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut { url, attempts } => {
                write!(f, "{url} timed out after {attempts} attempts")
            }
            Self::Http { url, source } => write!(f, "request to {url} failed: {source}"),
            Self::Status { url, status } => write!(f, "{url} answered {status}"),
            Self::Io { path, source } => {
                write!(f, "could not write {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Thin wrapper over a [`reqwest::Client`] implementing the crate's retry
/// contract: timeouts retry with exponential backoff up to a bounded cap,
/// everything else propagates immediately.
pub struct Fetcher {
    client: Client,
    controls: FetchControls,
}

impl Fetcher {
    /// Builds the underlying client from the provided controls.
    pub fn new(controls: FetchControls) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(controls.user_agent())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(controls.request_timeout())
            .build()?;
        Ok(Self { client, controls })
    }

    /// Fetches `url` and parses the body as a markup document.
    pub async fn document(&self, url: Url) -> Result<Html, FetchError> {
        let body = self.text(url).await?;
        Ok(Html::parse_document(&body))
    }

    /// Fetches `url` and returns the raw body text.
    pub async fn text(&self, url: Url) -> Result<String, FetchError> {
        let response = self.get_with_retry(&url).await?;
        response.text().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })
    }

    /// Fetches `url` and writes the body bytes to `path`.
    pub async fn download(&self, url: Url, path: &Path) -> Result<PathBuf, FetchError> {
        let response = self.get_with_retry(&url).await?;
        let bytes = response.bytes().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;
        fs::write(path, &bytes).map_err(|source| FetchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(path.to_path_buf())
    }

    async fn get_with_retry(&self, url: &Url) -> Result<Response, FetchError> {
        let cap = self.controls.retry_cap();
        let mut delay = self.controls.retry_backoff();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url.clone()).send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        return Err(FetchError::Status {
                            url: url.to_string(),
                            status,
                        });
                    }
                    return Ok(response);
                }
                Err(source) if source.is_timeout() => {
                    if attempt >= cap {
                        return Err(FetchError::TimedOut {
                            url: url.to_string(),
                            attempts: attempt,
                        });
                    }
                    warn!("timeout fetching {url}, attempt {attempt}/{cap}");
                    sleep(delay).await;
                    delay *= 2;
                }
                Err(source) => {
                    return Err(FetchError::Http {
                        url: url.to_string(),
                        source,
                    });
                }
            }
        }
    }
}
