//! Archive fixtures and instrumented readers/writers shared by the
//! integration tests.

#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::{self, Cursor, Read, Write};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use zipstream::ArchiveSource;

pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Stored,
    Deflate,
}

struct CentralRecord {
    name: String,
    flags: u16,
    method: u16,
    crc: u32,
    compressed: u32,
    uncompressed: u32,
    offset: u32,
}

/// Hand-rolled ZIP writer for layouts the `zip` crate does not produce on
/// a seekable writer: data descriptors, wrong checksums, duplicate names.
#[derive(Default)]
pub struct ArchiveBuilder {
    out: Vec<u8>,
    central: Vec<CentralRecord>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(self, name: &str, data: &[u8], method: Method) -> Self {
        self.entry(name, data, method, false, crc32fast::hash(data))
    }

    pub fn directory(self, name: &str) -> Self {
        assert!(name.ends_with('/'));
        self.entry(name, b"", Method::Stored, false, 0)
    }

    /// Deflate entry whose CRC and sizes follow the data (flag bit 3)
    pub fn file_with_descriptor(self, name: &str, data: &[u8]) -> Self {
        self.entry(name, data, Method::Deflate, true, crc32fast::hash(data))
    }

    /// Stored entry whose CRC and sizes follow the data, as Go's
    /// `archive/zip` writes them
    pub fn stored_with_descriptor(self, name: &str, data: &[u8]) -> Self {
        self.entry(name, data, Method::Stored, true, crc32fast::hash(data))
    }

    /// Entry declaring a CRC that does not match its content
    pub fn file_with_crc(self, name: &str, data: &[u8], method: Method, crc: u32) -> Self {
        self.entry(name, data, method, false, crc)
    }

    fn entry(mut self, name: &str, data: &[u8], method: Method, descriptor: bool, crc: u32) -> Self {
        let payload = match method {
            Method::Stored => data.to_vec(),
            Method::Deflate => deflate(data),
        };
        let method_id = match method {
            Method::Stored => 0,
            Method::Deflate => 8,
        };
        let flags = if descriptor { FLAG_DATA_DESCRIPTOR } else { 0 };
        let offset = self.out.len() as u32;

        let (header_crc, header_compressed, header_uncompressed) = if descriptor {
            (0, 0, 0)
        } else {
            (crc, payload.len() as u32, data.len() as u32)
        };

        let out = &mut self.out;
        out.extend_from_slice(b"PK\x03\x04");
        out.write_u16::<LittleEndian>(20).unwrap();
        out.write_u16::<LittleEndian>(flags).unwrap();
        out.write_u16::<LittleEndian>(method_id).unwrap();
        out.write_u16::<LittleEndian>(0x6000).unwrap();
        out.write_u16::<LittleEndian>(0x5821).unwrap();
        out.write_u32::<LittleEndian>(header_crc).unwrap();
        out.write_u32::<LittleEndian>(header_compressed).unwrap();
        out.write_u32::<LittleEndian>(header_uncompressed).unwrap();
        out.write_u16::<LittleEndian>(name.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&payload);

        if descriptor {
            out.extend_from_slice(b"PK\x07\x08");
            out.write_u32::<LittleEndian>(crc).unwrap();
            out.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
            out.write_u32::<LittleEndian>(data.len() as u32).unwrap();
        }

        self.central.push(CentralRecord {
            name: name.to_string(),
            flags,
            method: method_id,
            crc,
            compressed: payload.len() as u32,
            uncompressed: data.len() as u32,
            offset,
        });
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = self.out;
        let cd_offset = out.len() as u32;

        for record in &self.central {
            out.extend_from_slice(b"PK\x01\x02");
            out.write_u16::<LittleEndian>(20).unwrap(); // made by
            out.write_u16::<LittleEndian>(20).unwrap(); // needed
            out.write_u16::<LittleEndian>(record.flags).unwrap();
            out.write_u16::<LittleEndian>(record.method).unwrap();
            out.write_u16::<LittleEndian>(0x6000).unwrap();
            out.write_u16::<LittleEndian>(0x5821).unwrap();
            out.write_u32::<LittleEndian>(record.crc).unwrap();
            out.write_u32::<LittleEndian>(record.compressed).unwrap();
            out.write_u32::<LittleEndian>(record.uncompressed).unwrap();
            out.write_u16::<LittleEndian>(record.name.len() as u16).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap(); // extra
            out.write_u16::<LittleEndian>(0).unwrap(); // comment
            out.write_u16::<LittleEndian>(0).unwrap(); // disk
            out.write_u16::<LittleEndian>(0).unwrap(); // internal attrs
            out.write_u32::<LittleEndian>(0).unwrap(); // external attrs
            out.write_u32::<LittleEndian>(record.offset).unwrap();
            out.extend_from_slice(record.name.as_bytes());
        }

        let cd_size = out.len() as u32 - cd_offset;
        let count = self.central.len() as u16;
        out.extend_from_slice(b"PK\x05\x06");
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(count).unwrap();
        out.write_u16::<LittleEndian>(count).unwrap();
        out.write_u32::<LittleEndian>(cd_size).unwrap();
        out.write_u32::<LittleEndian>(cd_offset).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out
    }
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// 30 bytes of text for `docs/spec.md`
pub const SPEC_MD: &[u8] = b"# Spec\n\nStream, do not buffer\n";

/// The reference archive: readme.txt, docs/, docs/spec.md, written by the
/// `zip` crate with deflate compression.
pub fn sample_archive() -> Vec<u8> {
    assert_eq!(SPEC_MD.len(), 30);

    let mut w = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    w.start_file("readme.txt", options).unwrap();
    w.write_all(b"hello world\n").unwrap();
    w.add_directory("docs/", options).unwrap();
    w.start_file("docs/spec.md", options).unwrap();
    w.write_all(SPEC_MD).unwrap();

    w.finish().unwrap().into_inner()
}

/// Archive written by the `zip` crate from `(name, data, method)` triples
pub fn zip_crate_archive(entries: &[(&str, &[u8], CompressionMethod)]) -> Vec<u8> {
    let mut w = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data, method) in entries {
        let options = SimpleFileOptions::default().compression_method(*method);
        if name.ends_with('/') {
            w.add_directory(*name, options).unwrap();
        } else {
            w.start_file(*name, options).unwrap();
            w.write_all(data).unwrap();
        }
    }
    w.finish().unwrap().into_inner()
}

/// Decompress an entry with the `zip` crate's random-access reader
pub fn reference_content(archive: &[u8], name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(archive)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut out = Vec::new();
    file.read_to_end(&mut out).unwrap();
    out
}

/// Deterministic, poorly compressible bytes
pub fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).max(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

pub fn source(bytes: Vec<u8>) -> ArchiveSource {
    ArchiveSource::from_bytes("memory", bytes)
}

/// Source that hands out at most `chunk` bytes per read, like a network
/// connection delivering small packets, and optionally fails or goes
/// silent once a number of bytes were delivered.
pub struct ChunkedReader {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
    fail_after: Option<usize>,
    stall_after: Option<usize>,
}

impl ChunkedReader {
    pub fn new(data: Vec<u8>, chunk: usize) -> Self {
        Self {
            data,
            pos: 0,
            chunk,
            fail_after: None,
            stall_after: None,
        }
    }

    pub fn failing_after(mut self, bytes: usize) -> Self {
        self.fail_after = Some(bytes);
        self
    }

    /// Never complete a read once `bytes` were delivered
    pub fn stalling_after(mut self, bytes: usize) -> Self {
        self.stall_after = Some(bytes);
        self
    }

    pub fn into_source(self) -> ArchiveSource {
        ArchiveSource::new("chunked", self)
    }
}

impl AsyncRead for ChunkedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut end = self.data.len();
        if let Some(limit) = self.fail_after {
            if self.pos >= limit {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )));
            }
            end = end.min(limit);
        }
        if let Some(limit) = self.stall_after {
            if self.pos >= limit {
                return Poll::Pending;
            }
            end = end.min(limit);
        }

        let n = (end - self.pos).min(self.chunk).min(buf.remaining());
        let start = self.pos;
        buf.put_slice(&self.data[start..start + n]);
        self.pos += n;
        Poll::Ready(Ok(()))
    }
}

/// Sink that records what it receives and the largest single write
#[derive(Default)]
pub struct RecordingSink {
    pub data: Vec<u8>,
    pub writes: usize,
    pub largest_write: usize,
    pub shut_down: bool,
}

impl AsyncWrite for RecordingSink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.data.extend_from_slice(buf);
        self.writes += 1;
        self.largest_write = self.largest_write.max(buf.len());
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shut_down = true;
        Poll::Ready(Ok(()))
    }
}

/// Sink that rejects every write
pub struct FailingSink;

impl AsyncWrite for FailingSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
