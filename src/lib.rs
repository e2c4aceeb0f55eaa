//! # zipstream
//!
//! List or extract single entries from remote ZIP archives in one
//! forward-only streaming pass.
//!
//! The archive is fetched with a single HTTP GET and parsed as the bytes
//! arrive, entry by entry, from the local file headers. Nothing seeks and
//! nothing buffers the whole archive: memory stays bounded by a read buffer,
//! a decompression window and a copy buffer, whatever the archive size.
//!
//! ## Features
//!
//! - List all entries (path, kind, sizes) of a remote or local ZIP archive
//! - Stream one entry, found by exact path, into any `AsyncWrite` sink
//! - Distinct not-found result, separate from fetch and parse errors
//! - Support for STORED and DEFLATE entries, data descriptors and ZIP64 sizes
//! - CRC-32 verification of extracted content
//!
//! ## Example
//!
//! ```no_run
//! use zipstream::{ExtractionResult, Fetch, FetchConfig, HttpFetcher, extract_entry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let fetcher = HttpFetcher::new(FetchConfig::default())?;
//!     let source = fetcher.open("https://example.com/archive.zip").await?;
//!
//!     let mut stdout = tokio::io::stdout();
//!     match extract_entry(source, "docs/readme.txt", &mut stdout).await? {
//!         ExtractionResult::Found { bytes } => eprintln!("{bytes} bytes"),
//!         ExtractionResult::NotFound => eprintln!("no such entry"),
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod logging;
pub mod zip;

pub use cli::Cli;
pub use error::{Error, FetchError, ParseError, Result};
pub use io::{ArchiveSource, Fetch, FetchConfig, HttpFetcher, LocalFetcher};
pub use zip::{
    EntryHeader, EntryKind, ExtractionResult, ListedEntry, Listing, ZipEntry, ZipExtractor,
    ZipStreamParser, extract_entry, list_entries,
};
