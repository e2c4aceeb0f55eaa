//! Error types for zipstream.
//!
//! Failures fall into three families that abort a pipeline: the source could
//! not be fetched or broke mid-stream ([`FetchError`]), the bytes are not a
//! well-formed ZIP stream ([`ParseError`]), or the output sink refused data
//! ([`Error::Sink`]). A missing entry is not an error; see
//! [`ExtractionResult`](crate::zip::ExtractionResult).

use std::io;

use thiserror::Error;

/// Result type for zipstream operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level pipeline error
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The caller-supplied sink failed while receiving entry content
    #[error("output sink failed: {0}")]
    Sink(#[source] io::Error),
}

impl Error {
    /// HTTP status code when the failure came from a non-2xx response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Fetch(err) => err.status(),
            _ => None,
        }
    }
}

/// Failure to open or keep reading an archive source
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-2xx status
    #[error("HTTP request to {url} failed with status {status}")]
    Status { status: u16, url: String },

    /// Connection, DNS, TLS, redirect or timeout failure while opening
    #[error("failed to fetch {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP client could not be constructed from the given config
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Reading from the source failed (local file error or a broken
    /// connection while the body was streaming)
    #[error("failed to read {origin}: {source}")]
    Io {
        origin: String,
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            FetchError::Transport { source, .. } => source.is_timeout(),
            FetchError::Io { source, .. } => {
                source.kind() == io::ErrorKind::TimedOut
                    || source
                        .get_ref()
                        .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
                        .is_some_and(reqwest::Error::is_timeout)
            }
            _ => false,
        }
    }
}

/// Malformed, truncated or unsupported ZIP structure
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("archive truncated at offset {offset} while reading {context}")]
    Truncated { offset: u64, context: &'static str },

    #[error("unexpected signature {found:#010x} at offset {offset}")]
    BadSignature { found: u32, offset: u64 },

    #[error("invalid local file header at offset {offset}: {reason}")]
    InvalidHeader { offset: u64, reason: String },

    #[error("entry {path}: unsupported compression method {method}")]
    UnsupportedCompression { path: String, method: u16 },

    #[error("entry {path} is encrypted")]
    Encrypted { path: String },

    #[error("entry {path}: corrupt deflate data: {source}")]
    Deflate {
        path: String,
        #[source]
        source: flate2::DecompressError,
    },

    #[error("entry {path}: deflate stream made no progress")]
    DeflateStalled { path: String },

    #[error("entry {path}: deflate stream runs past its declared {compressed} bytes")]
    DeflateOverrun { path: String, compressed: u64 },

    #[error("entry {path}: CRC-32 mismatch (expected {expected:#010x}, got {actual:#010x})")]
    ChecksumMismatch {
        path: String,
        expected: u32,
        actual: u32,
    },

    #[error("entry {path}: {which} size mismatch (declared {expected}, found {actual})")]
    SizeMismatch {
        path: String,
        which: &'static str,
        expected: u64,
        actual: u64,
    },
}
