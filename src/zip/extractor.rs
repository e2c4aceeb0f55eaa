use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::io::{ArchiveSource, Fetch};

use super::parser::ZipStreamParser;
use super::structures::{CompressionMethod, EntryKind, dos_date, dos_time};

/// One row of a [`Listing`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub path: String,
    pub kind: EntryKind,
    /// Decompressed size, as declared or as measured from the data
    pub size: u64,
    pub compressed_size: u64,
    pub compression_method: CompressionMethod,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
}

impl ListedEntry {
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        dos_date(self.last_mod_date)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        dos_time(self.last_mod_time)
    }
}

/// Entries of an archive in stream order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    entries: Vec<ListedEntry>,
}

impl Listing {
    pub fn entries(&self) -> &[ListedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ListedEntry> {
        self.entries.iter()
    }
}

impl IntoIterator for Listing {
    type Item = ListedEntry;
    type IntoIter = std::vec::IntoIter<ListedEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Listing {
    type Item = &'a ListedEntry;
    type IntoIter = std::slice::Iter<'a, ListedEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Outcome of a targeted extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionResult {
    /// The entry was copied in full and the sink shut down
    Found { bytes: u64 },
    /// The archive ended without an entry at the requested path
    NotFound,
}

impl ExtractionResult {
    pub fn is_found(&self) -> bool {
        matches!(self, ExtractionResult::Found { .. })
    }
}

/// List every entry of the archive, draining each one.
pub async fn list_entries(source: ArchiveSource) -> Result<Listing> {
    let origin = source.origin().to_string();
    let mut parser = ZipStreamParser::new(source);
    let mut entries = Vec::new();

    while let Some(entry) = parser.next_entry().await? {
        let header = entry.header().clone();
        let sizes = entry.drain().await?;

        entries.push(ListedEntry {
            path: header.path,
            kind: header.kind,
            size: sizes.uncompressed,
            compressed_size: sizes.compressed,
            compression_method: header.compression_method,
            last_mod_time: header.last_mod_time,
            last_mod_date: header.last_mod_date,
        });
    }

    info!(
        entries = entries.len(),
        bytes_read = parser.bytes_read(),
        "Listed {}",
        origin
    );
    Ok(Listing { entries })
}

/// Progress of a targeted extraction
enum ExtractState {
    Scanning,
    Copied { bytes: u64 },
    Done(ExtractionResult),
}

/// Copy the entry at exactly `target` into `sink`.
///
/// Matching is case-sensitive with no path normalization. The first matching
/// entry wins; the rest of the archive is not read once it has been copied.
/// On [`ExtractionResult::NotFound`] nothing has been written to `sink`.
pub async fn extract_entry<W>(
    source: ArchiveSource,
    target: &str,
    sink: &mut W,
) -> Result<ExtractionResult>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let origin = source.origin().to_string();
    let mut parser = ZipStreamParser::new(source);
    let mut state = ExtractState::Scanning;

    loop {
        state = match state {
            ExtractState::Scanning => match parser.next_entry().await? {
                None => ExtractState::Done(ExtractionResult::NotFound),
                Some(entry) if entry.path() == target => {
                    debug!(path = target, "Copying matching entry");
                    let sizes = entry.pipe(sink).await?;
                    ExtractState::Copied {
                        bytes: sizes.uncompressed,
                    }
                }
                Some(entry) => {
                    entry.drain().await?;
                    ExtractState::Scanning
                }
            },
            ExtractState::Copied { bytes } => {
                sink.shutdown().await.map_err(Error::Sink)?;
                ExtractState::Done(ExtractionResult::Found { bytes })
            }
            ExtractState::Done(result) => {
                info!(
                    ?result,
                    entries_scanned = parser.entries_seen(),
                    bytes_read = parser.bytes_read(),
                    "Extraction of {} from {} finished",
                    target,
                    origin
                );
                return Ok(result);
            }
        };
    }
}

/// Runs listings and extractions against archives opened through a
/// [`Fetch`] implementation.
pub struct ZipExtractor<F: Fetch> {
    fetcher: F,
}

impl<F: Fetch> ZipExtractor<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// List all entries of the archive at `location`
    pub async fn list(&self, location: &str) -> Result<Listing> {
        let source = self.fetcher.open(location).await?;
        list_entries(source).await
    }

    /// Stream one entry of the archive at `location` into `sink`
    pub async fn extract<W>(
        &self,
        location: &str,
        target: &str,
        sink: &mut W,
    ) -> Result<ExtractionResult>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let source = self.fetcher.open(location).await?;
        extract_entry(source, target, sink).await
    }

    /// Extract one entry to a file on disk.
    ///
    /// Content goes to a `.part` file next to `output_path` that is renamed
    /// into place only once the entry was found and verified. Otherwise,
    /// including when the returned future is dropped, it is removed and
    /// `output_path` is left untouched.
    pub async fn extract_to_file(
        &self,
        location: &str,
        target: &str,
        output_path: &Path,
    ) -> Result<ExtractionResult> {
        // Open the archive first so a failed fetch leaves nothing on disk
        let source = self.fetcher.open(location).await?;

        // Create parent directories if needed
        if let Some(parent) = output_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await.map_err(Error::Sink)?;
        }

        let mut partial = PartialFile::new(output_path);
        let mut file = fs::File::create(&partial.path)
            .await
            .map_err(Error::Sink)?;
        let result = extract_entry(source, target, &mut file).await;
        drop(file);

        if let Ok(ExtractionResult::Found { .. }) = result {
            fs::rename(&partial.path, output_path)
                .await
                .map_err(Error::Sink)?;
            partial.keep();
        }
        result
    }
}

/// `<path>.part` file being written, removed on drop unless kept. Dropping
/// also covers a cancelled extraction future.
struct PartialFile {
    path: PathBuf,
    keep: bool,
}

impl PartialFile {
    fn new(output_path: &Path) -> Self {
        Self {
            path: partial_path(output_path),
            keep: false,
        }
    }

    fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.path)
            && err.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Could not remove {}: {}", self.path.display(), err);
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}
