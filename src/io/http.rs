use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::{Client, redirect};
use std::io;
use std::time::Duration;
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use super::{ArchiveSource, Fetch};
use crate::error::FetchError;

/// HTTP client settings for [`HttpFetcher`]
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Time allowed to establish the connection
    pub connect_timeout: Duration,
    /// Longest idle gap tolerated between two body reads
    pub read_timeout: Duration,
    /// Deadline for the whole request including the body, if any
    pub timeout: Option<Duration>,
    /// Redirects followed before giving up; 0 disables redirects
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            timeout: None,
            max_redirects: 10,
            user_agent: format!("zipstream/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Streams remote archives with a single HTTP GET
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Create a fetcher with an explicitly configured client
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let policy = if config.max_redirects == 0 {
            redirect::Policy::none()
        } else {
            redirect::Policy::limited(config.max_redirects)
        };

        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .redirect(policy)
            .user_agent(&config.user_agent);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(FetchError::Client)?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn open(&self, url: &str) -> Result<ArchiveSource, FetchError> {
        debug!("Opening archive stream from {}", url);

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_length = resp.content_length();
        info!(
            status = status.as_u16(),
            content_length, "Streaming archive from {}", url
        );

        // Body chunks are pulled only as fast as the parser asks for them
        let body = resp.bytes_stream().map_err(io::Error::other);
        Ok(ArchiveSource::new(url, StreamReader::new(body)).with_content_length(content_length))
    }
}
