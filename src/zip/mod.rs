//! Streaming ZIP parsing and extraction.
//!
//! This module reads ZIP archives strictly front to back, the way they
//! arrive over a network connection, without ever seeking.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (local headers, data descriptors, ZIP64 extra fields)
//! - [`parser`]: Incremental walk over local file headers with per-entry decompression
//! - [`extractor`]: Listing and single-entry extraction on top of the parser
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! Only part 1 is needed here. Everything about an entry is known from its
//! local header, except when sizes are deferred to a data descriptor that
//! follows the data, so the parser stops as soon as it meets the Central
//! Directory.
//!
//! ## Supported Features
//!
//! - STORED (no compression) method
//! - DEFLATE compression method, including entries with data descriptors
//! - ZIP64 sizes in local headers and data descriptors
//! - CRC-32 verification of extracted content
//!
//! ## Limitations
//!
//! - No encryption support (encrypted entries are listed but not extracted)
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

mod extractor;
mod parser;
mod structures;

pub use extractor::{
    ExtractionResult, ListedEntry, Listing, ZipExtractor, extract_entry, list_entries,
};
pub use parser::{EntrySizes, PIPE_BUFFER_SIZE, ZipEntry, ZipStreamParser};
pub use structures::{CompressionMethod, EntryHeader, EntryKind};
