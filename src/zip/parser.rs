//! Forward-only ZIP stream parser.
//!
//! Entries are discovered by walking local file headers in the order they
//! appear in the byte stream. The central directory is never consulted: the
//! first central directory (or end of central directory) record simply ends
//! the entry sequence.
//!
//! ## Consumption
//!
//! [`ZipStreamParser::next_entry`] hands out a [`ZipEntry`] that mutably
//! borrows the parser, so only one entry is alive at a time. Its content can
//! be pulled with [`ZipEntry::read`], forwarded with [`ZipEntry::pipe`] or
//! discarded with [`ZipEntry::drain`]. Whatever is left unread is drained
//! automatically on the next call to `next_entry`.
//!
//! ## Entry boundaries
//!
//! - STORED entries end after their declared compressed size.
//! - DEFLATE entries end where the deflate stream ends, which also covers
//!   entries whose sizes are deferred to a data descriptor.
//! - STORED entries with deferred sizes end at the first signed data
//!   descriptor whose sizes and CRC-32 agree with the bytes before it.

use flate2::{Decompress, FlushDecompress, Status};
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, trace};

use crate::error::{Error, FetchError, ParseError, Result};
use crate::io::ArchiveSource;

use super::structures::*;

/// Capacity of the buffer between the source and the parser
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Chunk size used when decoding an entry only to discard it
const DRAIN_BUFFER_SIZE: usize = 16 * 1024;

/// Chunk size used when copying an entry to a sink
pub const PIPE_BUFFER_SIZE: usize = 64 * 1024;

/// Buffered, position-tracking view of the archive source
struct SourceCursor {
    reader: BufReader<ArchiveSource>,
    origin: String,
    /// Bytes consumed from the source so far
    offset: u64,
}

impl SourceCursor {
    fn new(source: ArchiveSource) -> Self {
        let origin = source.origin().to_string();
        Self {
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, source),
            origin,
            offset: 0,
        }
    }

    fn error(&self, err: io::Error, context: &'static str) -> Error {
        source_error(&self.origin, self.offset, err, context)
    }

    fn truncated(&self, context: &'static str) -> Error {
        ParseError::Truncated {
            offset: self.offset,
            context,
        }
        .into()
    }

    async fn read_exact(&mut self, buf: &mut [u8], context: &'static str) -> Result<()> {
        match self.reader.read_exact(buf).await {
            Ok(_) => {
                self.offset += buf.len() as u64;
                Ok(())
            }
            Err(err) => Err(self.error(err, context)),
        }
    }

    /// Buffered bytes, refilling from the source when empty. An empty slice
    /// means end of stream.
    async fn fill_buf(&mut self, context: &'static str) -> Result<&[u8]> {
        match self.reader.fill_buf().await {
            Ok(buf) => Ok(buf),
            Err(err) => Err(source_error(&self.origin, self.offset, err, context)),
        }
    }

    fn consume(&mut self, amt: usize) {
        self.reader.consume(amt);
        self.offset += amt as u64;
    }

    /// Discard exactly `len` bytes without copying them anywhere
    async fn skip(&mut self, mut len: u64, context: &'static str) -> Result<()> {
        while len > 0 {
            let available = self.fill_buf(context).await?.len();
            if available == 0 {
                return Err(self.truncated(context));
            }
            let n = available.min(usize::try_from(len).unwrap_or(usize::MAX));
            self.consume(n);
            len -= n as u64;
        }
        Ok(())
    }

    /// Read the rest of the source, returning how many bytes were left
    async fn skip_to_end(&mut self) -> Result<u64> {
        let mut skipped = 0u64;
        loop {
            let available = self.fill_buf("trailing records").await?.len();
            if available == 0 {
                return Ok(skipped);
            }
            self.consume(available);
            skipped += available as u64;
        }
    }
}

/// Classify an I/O failure of the source: running out of bytes means the
/// archive is cut short, anything else is the source itself failing.
fn source_error(origin: &str, offset: u64, err: io::Error, context: &'static str) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        ParseError::Truncated { offset, context }.into()
    } else {
        FetchError::Io {
            origin: origin.to_string(),
            source: err,
        }
        .into()
    }
}

/// Sizes of an entry once its content has been consumed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntrySizes {
    pub compressed: u64,
    pub uncompressed: u64,
}

/// Why an entry can be skipped but not decoded
#[derive(Debug, Clone, Copy)]
enum Unsupported {
    Encrypted,
    Compression(u16),
}

enum Decoder {
    Stored { remaining: u64 },
    /// STORED content whose length is only known once its descriptor shows up
    StoredScan {
        /// Consumed bytes that could still be the start of the descriptor
        carry: Vec<u8>,
        descriptor: Option<DataDescriptor>,
    },
    Deflate(Decompress),
    Unsupported(Unsupported),
}

/// Decoding state of the entry currently being read
struct EntryBody {
    header: EntryHeader,
    decoder: Decoder,
    crc: crc32fast::Hasher,
    /// Compressed bytes taken from the source
    consumed: u64,
    /// Decompressed bytes handed out
    produced: u64,
    /// Content was decoded, so CRC and sizes can be checked
    verified: bool,
    content_done: bool,
    finished: bool,
}

impl EntryBody {
    fn new(header: EntryHeader) -> Result<Self> {
        let decoder = match (header.is_encrypted(), header.compression_method) {
            (true, _) => Decoder::Unsupported(Unsupported::Encrypted),
            (false, CompressionMethod::Stored) => match header.compressed_size {
                Some(remaining) => Decoder::Stored { remaining },
                None => Decoder::StoredScan {
                    carry: Vec::new(),
                    descriptor: None,
                },
            },
            (false, CompressionMethod::Deflate) => Decoder::Deflate(Decompress::new(false)),
            (false, CompressionMethod::Unknown(method)) => {
                Decoder::Unsupported(Unsupported::Compression(method))
            }
        };

        // Without a declared size there is no way to step over opaque data
        if header.compressed_size.is_none()
            && let Decoder::Unsupported(reason) = decoder
        {
            return Err(unsupported_error(&header.path, reason));
        }

        Ok(Self {
            header,
            decoder,
            crc: crc32fast::Hasher::new(),
            consumed: 0,
            produced: 0,
            verified: true,
            content_done: false,
            finished: false,
        })
    }

    fn untouched(&self) -> bool {
        self.consumed == 0 && self.produced == 0 && !self.content_done
    }

    fn sizes(&self) -> EntrySizes {
        EntrySizes {
            compressed: self.header.compressed_size.unwrap_or(self.consumed),
            uncompressed: self.header.uncompressed_size.unwrap_or(self.produced),
        }
    }

    async fn read(&mut self, cursor: &mut SourceCursor, out: &mut [u8]) -> Result<usize> {
        if self.finished || out.is_empty() {
            return Ok(0);
        }

        if !self.content_done {
            let n = self.decode(cursor, out).await?;
            if n > 0 {
                self.crc.update(&out[..n]);
                self.produced += n as u64;
                return Ok(n);
            }
        }

        self.finish(cursor).await?;
        Ok(0)
    }

    /// Produce the next decompressed bytes; 0 means the content ended
    async fn decode(&mut self, cursor: &mut SourceCursor, out: &mut [u8]) -> Result<usize> {
        match &mut self.decoder {
            Decoder::Stored { remaining } => {
                if *remaining == 0 {
                    self.content_done = true;
                    return Ok(0);
                }

                let input = cursor.fill_buf("entry data").await?;
                if input.is_empty() {
                    return Err(cursor.truncated("entry data"));
                }
                let n = input
                    .len()
                    .min(out.len())
                    .min(usize::try_from(*remaining).unwrap_or(usize::MAX));
                out[..n].copy_from_slice(&input[..n]);
                cursor.consume(n);

                *remaining -= n as u64;
                self.consumed += n as u64;
                Ok(n)
            }
            Decoder::StoredScan { carry, descriptor } => {
                if descriptor.is_some() {
                    self.content_done = true;
                    return Ok(0);
                }
                let n = scan_stored(
                    cursor,
                    carry,
                    descriptor,
                    Scanned {
                        len: self.consumed,
                        crc: &self.crc,
                        zip64: self.header.zip64,
                    },
                    out,
                )
                .await?;
                self.consumed += n as u64;
                if descriptor.is_some() {
                    self.content_done = true;
                }
                Ok(n)
            }
            Decoder::Deflate(inflater) => loop {
                // Never feed the inflater past a declared compressed size
                let remaining = self.header.compressed_size.map(|size| size - self.consumed);
                let exhausted = remaining == Some(0);
                if exhausted && self.consumed == 0 {
                    // Zero-length body, e.g. a directory stored as deflate
                    self.content_done = true;
                    return Ok(0);
                }

                // Once every declared byte is in, the inflater may still hold
                // decoded output: keep calling it with no input until it ends.
                let input: &[u8] = match remaining {
                    Some(0) => &[],
                    Some(remaining) => {
                        let buf = cursor.fill_buf("deflate data").await?;
                        &buf[..buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX))]
                    }
                    None => cursor.fill_buf("deflate data").await?,
                };
                let eof = input.is_empty();
                let flush = if eof {
                    FlushDecompress::Finish
                } else {
                    FlushDecompress::None
                };

                let before_in = inflater.total_in();
                let before_out = inflater.total_out();
                let status = match inflater.decompress(input, out, flush) {
                    Ok(status) => status,
                    Err(_) if exhausted => {
                        return Err(ParseError::DeflateOverrun {
                            path: self.header.path.clone(),
                            compressed: self.consumed,
                        }
                        .into());
                    }
                    // Finishing a stream that is cut short
                    Err(_) if eof => return Err(cursor.truncated("deflate data")),
                    Err(source) => {
                        return Err(ParseError::Deflate {
                            path: self.header.path.clone(),
                            source,
                        }
                        .into());
                    }
                };
                let used = (inflater.total_in() - before_in) as usize;
                let written = (inflater.total_out() - before_out) as usize;
                cursor.consume(used);
                self.consumed = inflater.total_in();

                if status == Status::StreamEnd {
                    self.content_done = true;
                    return Ok(written);
                }
                if written > 0 {
                    return Ok(written);
                }
                if exhausted {
                    return Err(ParseError::DeflateOverrun {
                        path: self.header.path.clone(),
                        compressed: self.consumed,
                    }
                    .into());
                }
                if eof {
                    return Err(cursor.truncated("deflate data"));
                }
                if used == 0 {
                    return Err(ParseError::DeflateStalled {
                        path: self.header.path.clone(),
                    }
                    .into());
                }
            },
            Decoder::Unsupported(reason) => Err(unsupported_error(&self.header.path, *reason)),
        }
    }

    /// Read the data descriptor if present and check what was decoded
    /// against the declared CRC and sizes.
    async fn finish(&mut self, cursor: &mut SourceCursor) -> Result<()> {
        if self.finished {
            return Ok(());
        }

        let (crc32, compressed, uncompressed) = if self.header.has_data_descriptor() {
            let descriptor = match self.decoder {
                Decoder::StoredScan {
                    descriptor: Some(found),
                    ..
                } => found,
                _ => read_data_descriptor(cursor, self.header.zip64).await?,
            };
            (
                descriptor.crc32,
                descriptor.compressed_size,
                descriptor.uncompressed_size,
            )
        } else {
            (
                self.header.crc32,
                self.header.compressed_size.unwrap_or(self.consumed),
                self.header.uncompressed_size.unwrap_or(self.produced),
            )
        };

        if self.verified {
            let path = &self.header.path;
            if self.consumed != compressed {
                return Err(ParseError::SizeMismatch {
                    path: path.clone(),
                    which: "compressed",
                    expected: compressed,
                    actual: self.consumed,
                }
                .into());
            }
            if self.produced != uncompressed {
                return Err(ParseError::SizeMismatch {
                    path: path.clone(),
                    which: "uncompressed",
                    expected: uncompressed,
                    actual: self.produced,
                }
                .into());
            }
            let actual = self.crc.clone().finalize();
            if actual != crc32 {
                return Err(ParseError::ChecksumMismatch {
                    path: path.clone(),
                    expected: crc32,
                    actual,
                }
                .into());
            }
        }

        self.header.crc32 = crc32;
        self.header.compressed_size = Some(compressed);
        self.header.uncompressed_size = Some(uncompressed);
        self.finished = true;

        trace!(
            path = %self.header.path,
            compressed,
            uncompressed,
            verified = self.verified,
            "Entry finished"
        );
        Ok(())
    }

    async fn drain(&mut self, cursor: &mut SourceCursor) -> Result<EntrySizes> {
        if self.finished {
            return Ok(self.sizes());
        }

        // Known length and nothing read yet: skip the raw bytes undecoded
        if self.untouched()
            && let Some(compressed) = self.header.compressed_size
        {
            cursor.skip(compressed, "entry data").await?;
            self.consumed = compressed;
            self.content_done = true;
            self.verified = false;
        }

        if !self.content_done {
            let mut scratch = vec![0u8; DRAIN_BUFFER_SIZE];
            while self.read(cursor, &mut scratch).await? > 0 {}
        }
        self.finish(cursor).await?;

        Ok(self.sizes())
    }
}

fn unsupported_error(path: &str, reason: Unsupported) -> Error {
    match reason {
        Unsupported::Encrypted => ParseError::Encrypted {
            path: path.to_string(),
        },
        Unsupported::Compression(method) => ParseError::UnsupportedCompression {
            path: path.to_string(),
            method,
        },
    }
    .into()
}

/// Content scanned so far for a STORED entry with a deferred size
struct Scanned<'a> {
    len: u64,
    crc: &'a crc32fast::Hasher,
    zip64: bool,
}

impl Scanned<'_> {
    /// A descriptor closes the entry only if it describes exactly the
    /// scanned bytes plus `content`.
    fn closes_with(&self, content: &[u8], descriptor: &DataDescriptor) -> bool {
        let len = self.len + content.len() as u64;
        if descriptor.compressed_size != len || descriptor.uncompressed_size != len {
            return false;
        }
        let mut crc = self.crc.clone();
        crc.update(content);
        crc.finalize() == descriptor.crc32
    }
}

/// First signed descriptor in `view` that closes the entry, with its position
fn find_descriptor(view: &[u8], scanned: &Scanned<'_>) -> Option<(usize, DataDescriptor)> {
    let len = 4 + DataDescriptor::body_size(scanned.zip64);
    if view.len() < len {
        return None;
    }
    (0..=view.len() - len)
        .filter(|&pos| view[pos..pos + 4] == DATA_DESCRIPTOR_SIGNATURE)
        .find_map(|pos| {
            let body = &view[pos + 4..pos + len];
            let descriptor = DataDescriptor::from_bytes(body, scanned.zip64).ok()?;
            scanned
                .closes_with(&view[..pos], &descriptor)
                .then_some((pos, descriptor))
        })
}

/// Copy STORED content into `out` up to its data descriptor.
///
/// Bytes are taken from the source only once they are known to be content,
/// or kept in `carry` while they could still begin the descriptor, so the
/// source never advances past the descriptor's last byte.
async fn scan_stored(
    cursor: &mut SourceCursor,
    carry: &mut Vec<u8>,
    found: &mut Option<DataDescriptor>,
    scanned: Scanned<'_>,
    out: &mut [u8],
) -> Result<usize> {
    let len = 4 + DataDescriptor::body_size(scanned.zip64);

    loop {
        let buf = cursor.fill_buf("entry data").await?;
        let eof = buf.is_empty();
        let mut view = std::mem::take(carry);
        let carried = view.len();
        view.extend_from_slice(&buf[..buf.len().min(out.len() + len)]);
        let fresh = view.len() - carried;

        // Only descriptors starting within `out.len()` bytes matter this round
        let searchable = &view[..view.len().min(out.len() + len)];
        if let Some((pos, descriptor)) = find_descriptor(searchable, &scanned) {
            out[..pos].copy_from_slice(&view[..pos]);
            cursor.consume(pos + len - carried);
            *found = Some(descriptor);
            return Ok(pos);
        }

        if eof {
            return Err(cursor.truncated("data descriptor"));
        }

        // Bytes that cannot be the start of a descriptor are content
        let safe = (view.len() + 1).saturating_sub(len).min(out.len());
        if safe == 0 {
            cursor.consume(fresh);
            *carry = view;
            continue;
        }

        out[..safe].copy_from_slice(&view[..safe]);
        if safe < carried {
            *carry = view[safe..carried].to_vec();
        } else {
            cursor.consume(safe - carried);
        }
        return Ok(safe);
    }
}

async fn read_data_descriptor(cursor: &mut SourceCursor, zip64: bool) -> Result<DataDescriptor> {
    let mut first = [0u8; 4];
    cursor.read_exact(&mut first, "data descriptor").await?;

    let size = DataDescriptor::body_size(zip64);
    let mut body = vec![0u8; size];
    if first == DATA_DESCRIPTOR_SIGNATURE {
        cursor.read_exact(&mut body, "data descriptor").await?;
    } else {
        // The signature is optional: those four bytes were already the CRC
        body[..4].copy_from_slice(&first);
        cursor.read_exact(&mut body[4..], "data descriptor").await?;
    }

    DataDescriptor::from_bytes(&body, zip64).map_err(|err| {
        ParseError::InvalidHeader {
            offset: cursor.offset,
            reason: format!("bad data descriptor: {err}"),
        }
        .into()
    })
}

/// Sequential reader of the entries in a ZIP byte stream.
///
/// ## Example
///
/// ```no_run
/// # async fn example(source: zipstream::ArchiveSource) -> zipstream::Result<()> {
/// use zipstream::ZipStreamParser;
///
/// let mut parser = ZipStreamParser::new(source);
/// while let Some(entry) = parser.next_entry().await? {
///     println!("{} ({})", entry.path(), entry.kind());
///     entry.drain().await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct ZipStreamParser {
    cursor: SourceCursor,
    body: Option<EntryBody>,
    entries_seen: usize,
    finished: bool,
}

impl ZipStreamParser {
    pub fn new(source: ArchiveSource) -> Self {
        Self {
            cursor: SourceCursor::new(source),
            body: None,
            entries_seen: 0,
            finished: false,
        }
    }

    /// Bytes consumed from the source so far
    pub fn bytes_read(&self) -> u64 {
        self.cursor.offset
    }

    /// Number of entries handed out so far
    pub fn entries_seen(&self) -> usize {
        self.entries_seen
    }

    /// Advance to the next entry, draining whatever the previous entry left
    /// unread. Returns `None` once the central directory is reached.
    pub async fn next_entry(&mut self) -> Result<Option<ZipEntry<'_>>> {
        if let Some(mut body) = self.body.take()
            && !body.finished
        {
            debug!(path = %body.header.path, "Draining unread entry before advancing");
            body.drain(&mut self.cursor).await?;
        }

        if self.finished {
            return Ok(None);
        }

        let offset = self.cursor.offset;
        let mut signature = [0u8; 4];
        self.cursor
            .read_exact(&mut signature, "entry signature")
            .await?;

        match signature {
            LFH_SIGNATURE => {}
            CDFH_SIGNATURE | EOCD_SIGNATURE | ZIP64_EOCD_SIGNATURE => {
                debug!(
                    entries = self.entries_seen,
                    offset, "Reached central directory"
                );
                self.finished = true;
                return Ok(None);
            }
            _ => {
                return Err(ParseError::BadSignature {
                    found: u32::from_le_bytes(signature),
                    offset,
                }
                .into());
            }
        }

        let header = self.read_local_header(offset).await?;
        debug!(
            path = %header.path,
            kind = %header.kind,
            method = header.compression_method.as_u16(),
            compressed = header.compressed_size,
            uncompressed = header.uncompressed_size,
            "Found entry"
        );

        self.body = Some(EntryBody::new(header.clone())?);
        self.entries_seen += 1;

        Ok(Some(ZipEntry {
            parser: self,
            header,
        }))
    }

    /// Read the rest of the stream after the entry sequence ended, so the
    /// source is fully consumed. Returns the number of trailing bytes.
    pub async fn finish(&mut self) -> Result<u64> {
        while self.next_entry().await?.is_some() {}
        self.cursor.skip_to_end().await
    }

    async fn read_local_header(&mut self, offset: u64) -> Result<EntryHeader> {
        let invalid = |reason: String| -> Error { ParseError::InvalidHeader { offset, reason }.into() };

        let mut fixed = [0u8; LocalFileHeader::SIZE];
        self.cursor
            .read_exact(&mut fixed, "local file header")
            .await?;
        let lfh = LocalFileHeader::from_bytes(&fixed).map_err(|e| invalid(e.to_string()))?;

        if lfh.file_name_length == 0 {
            return Err(invalid("empty file name".to_string()));
        }

        let mut name = vec![0u8; lfh.file_name_length as usize];
        self.cursor.read_exact(&mut name, "file name").await?;
        let mut extra = vec![0u8; lfh.extra_field_length as usize];
        self.cursor.read_exact(&mut extra, "extra field").await?;

        let path = decode_file_name(&name, lfh.flags);
        let kind = if path.ends_with('/') {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        let sizes = resolve_zip64_sizes(&extra, lfh.compressed_size, lfh.uncompressed_size)
            .map_err(|e| invalid(format!("bad extra field: {e}")))?;
        let deferred = lfh.flags & FLAG_DATA_DESCRIPTOR != 0;

        Ok(EntryHeader {
            path,
            kind,
            compression_method: lfh.compression_method,
            flags: lfh.flags,
            crc32: lfh.crc32,
            compressed_size: (!deferred).then_some(sizes.compressed_size),
            uncompressed_size: (!deferred).then_some(sizes.uncompressed_size),
            last_mod_time: lfh.last_mod_time,
            last_mod_date: lfh.last_mod_date,
            offset,
            zip64: sizes.zip64,
        })
    }

    async fn read_body(&mut self, out: &mut [u8]) -> Result<usize> {
        match self.body.as_mut() {
            Some(body) => body.read(&mut self.cursor, out).await,
            None => Ok(0),
        }
    }

    async fn drain_body(&mut self) -> Result<EntrySizes> {
        match self.body.as_mut() {
            Some(body) => body.drain(&mut self.cursor).await,
            None => Ok(EntrySizes::default()),
        }
    }

    fn body_sizes(&self) -> Option<EntrySizes> {
        self.body.as_ref().map(EntryBody::sizes)
    }
}

/// One entry of the stream, valid until the next call to
/// [`ZipStreamParser::next_entry`].
pub struct ZipEntry<'a> {
    parser: &'a mut ZipStreamParser,
    header: EntryHeader,
}

impl ZipEntry<'_> {
    /// Header as found in the stream. Sizes deferred to a data descriptor
    /// stay `None` here; [`drain`](Self::drain) and [`pipe`](Self::pipe)
    /// report the resolved values.
    pub fn header(&self) -> &EntryHeader {
        &self.header
    }

    pub fn path(&self) -> &str {
        &self.header.path
    }

    pub fn kind(&self) -> EntryKind {
        self.header.kind
    }

    /// Read decompressed content. Returns 0 once the entry is complete and
    /// its checksum verified.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.parser.read_body(buf).await
    }

    /// Discard the remaining content without buffering it
    pub async fn drain(self) -> Result<EntrySizes> {
        self.parser.drain_body().await
    }

    /// Copy the remaining decompressed content into `sink` as it is
    /// produced, then flush the sink.
    pub async fn pipe<W>(mut self, sink: &mut W) -> Result<EntrySizes>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; PIPE_BUFFER_SIZE];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            sink.write_all(&buf[..n]).await.map_err(Error::Sink)?;
        }
        sink.flush().await.map_err(Error::Sink)?;

        Ok(self.parser.body_sizes().unwrap_or_default())
    }
}
