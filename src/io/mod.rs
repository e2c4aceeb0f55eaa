mod http;
mod local;

pub use http::{FetchConfig, HttpFetcher};
pub use local::LocalFetcher;

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::FetchError;

/// Trait for opening a forward-only byte stream over an archive
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Open the archive at `location` for sequential reading
    async fn open(&self, location: &str) -> Result<ArchiveSource, FetchError>;
}

#[async_trait]
impl<T: Fetch + ?Sized> Fetch for Box<T> {
    async fn open(&self, location: &str) -> Result<ArchiveSource, FetchError> {
        (**self).open(location).await
    }
}

/// Forward-only archive byte stream.
///
/// Dropping the source releases whatever it reads from (the HTTP
/// connection or the file handle).
pub struct ArchiveSource {
    origin: String,
    content_length: Option<u64>,
    reader: Pin<Box<dyn AsyncRead + Send>>,
}

impl ArchiveSource {
    pub fn new<R>(origin: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            origin: origin.into(),
            content_length: None,
            reader: Box::pin(reader),
        }
    }

    /// In-memory source, mostly useful for tests and already-downloaded data
    pub fn from_bytes(origin: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let len = bytes.len() as u64;
        Self::new(origin, std::io::Cursor::new(bytes)).with_content_length(Some(len))
    }

    pub fn with_content_length(mut self, content_length: Option<u64>) -> Self {
        self.content_length = content_length;
        self
    }

    /// URL or path the bytes come from
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Declared total length, if the source announced one
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }
}

impl AsyncRead for ArchiveSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.reader.as_mut().poll_read(cx, buf)
    }
}

impl std::fmt::Debug for ArchiveSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveSource")
            .field("origin", &self.origin)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}
