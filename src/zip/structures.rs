use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::{self, Cursor};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Local File Header (LFH) - 30 bytes including the signature
pub const LFH_SIGNATURE: [u8; 4] = *b"PK\x03\x04";
/// Central Directory File Header, first record after the last entry
pub const CDFH_SIGNATURE: [u8; 4] = *b"PK\x01\x02";
/// End of Central Directory, the only record of an empty archive
pub const EOCD_SIGNATURE: [u8; 4] = *b"PK\x05\x06";
/// ZIP64 End of Central Directory
pub const ZIP64_EOCD_SIGNATURE: [u8; 4] = *b"PK\x06\x06";
/// Optional signature in front of a data descriptor
pub const DATA_DESCRIPTOR_SIGNATURE: [u8; 4] = *b"PK\x07\x08";

/// Extra field id of the ZIP64 extended information block
const ZIP64_EXTRA_ID: u16 = 0x0001;

/// General purpose flag: entry is encrypted
pub const FLAG_ENCRYPTED: u16 = 1 << 0;
/// General purpose flag: CRC and sizes follow the data in a descriptor
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// General purpose flag: name is UTF-8 rather than IBM code page 437
pub const FLAG_UTF8: u16 = 1 << 11;

/// Upper half of code page 437; the lower half is ASCII
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ',
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»',
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐',
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧',
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀',
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩',
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];

/// Decode an entry name: UTF-8 when flag bit 11 is set, code page 437
/// otherwise.
pub fn decode_file_name(raw: &[u8], flags: u16) -> String {
    if flags & FLAG_UTF8 != 0 {
        return String::from_utf8_lossy(raw).into_owned();
    }
    raw.iter()
        .map(|&b| {
            if b < 0x80 {
                b as char
            } else {
                CP437_HIGH[(b - 0x80) as usize]
            }
        })
        .collect()
}

/// Fixed part of a Local File Header, after the signature - 26 bytes
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
}

impl LocalFileHeader {
    pub const SIZE: usize = 26;

    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);

        Ok(Self {
            version_needed: cursor.read_u16::<LittleEndian>()?,
            flags: cursor.read_u16::<LittleEndian>()?,
            compression_method: CompressionMethod::from_u16(cursor.read_u16::<LittleEndian>()?),
            last_mod_time: cursor.read_u16::<LittleEndian>()?,
            last_mod_date: cursor.read_u16::<LittleEndian>()?,
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
            file_name_length: cursor.read_u16::<LittleEndian>()?,
            extra_field_length: cursor.read_u16::<LittleEndian>()?,
        })
    }
}

/// Sizes resolved from a local header and its extra field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zip64Sizes {
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// A ZIP64 block was present, so a data descriptor uses 8-byte sizes
    pub zip64: bool,
}

/// Apply the ZIP64 extended information extra field to 32-bit header sizes.
///
/// Fields appear in the block only when the matching header field is
/// 0xFFFFFFFF, uncompressed size first.
pub fn resolve_zip64_sizes(
    extra: &[u8],
    compressed_size: u32,
    uncompressed_size: u32,
) -> io::Result<Zip64Sizes> {
    let mut sizes = Zip64Sizes {
        compressed_size: compressed_size as u64,
        uncompressed_size: uncompressed_size as u64,
        zip64: false,
    };

    let mut cursor = Cursor::new(extra);
    let end = extra.len() as u64;

    while cursor.position() + 4 <= end {
        let header_id = cursor.read_u16::<LittleEndian>()?;
        let field_size = cursor.read_u16::<LittleEndian>()? as u64;
        let field_end = cursor.position() + field_size;

        if header_id == ZIP64_EXTRA_ID {
            sizes.zip64 = true;
            if uncompressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                sizes.uncompressed_size = cursor.read_u64::<LittleEndian>()?;
            }
            if compressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                sizes.compressed_size = cursor.read_u64::<LittleEndian>()?;
            }
        }

        cursor.set_position(field_end);
    }

    Ok(sizes)
}

/// Trailer written after entry data when sizes were unknown up front
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Parse the descriptor body (everything after the optional signature)
    pub fn from_bytes(data: &[u8], zip64: bool) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let (compressed_size, uncompressed_size) = if zip64 {
            (
                cursor.read_u64::<LittleEndian>()?,
                cursor.read_u64::<LittleEndian>()?,
            )
        } else {
            (
                cursor.read_u32::<LittleEndian>()? as u64,
                cursor.read_u32::<LittleEndian>()? as u64,
            )
        };

        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }

    /// Body length after the signature
    pub fn body_size(zip64: bool) -> usize {
        if zip64 { 4 + 8 + 8 } else { 4 + 4 + 4 }
    }
}

/// Whether an entry is a regular file or a directory marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => f.write_str("File"),
            EntryKind::Directory => f.write_str("Directory"),
        }
    }
}

/// Metadata decoded from one local file header
#[derive(Debug, Clone)]
pub struct EntryHeader {
    /// Archive-relative path as stored, forward-slash separated
    pub path: String,
    pub kind: EntryKind,
    pub compression_method: CompressionMethod,
    pub flags: u16,
    pub crc32: u32,
    /// `None` when the header defers sizes to a data descriptor
    pub compressed_size: Option<u64>,
    pub uncompressed_size: Option<u64>,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    /// Offset of the local file header in the stream
    pub offset: u64,
    pub(crate) zip64: bool,
}

impl EntryHeader {
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
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

pub(crate) fn dos_date(date: u16) -> (u16, u8, u8) {
    let day = (date & 0x1F) as u8;
    let month = ((date >> 5) & 0x0F) as u8;
    let year = ((date >> 9) & 0x7F) + 1980;
    (year, month, day)
}

pub(crate) fn dos_time(time: u16) -> (u8, u8, u8) {
    let second = ((time & 0x1F) * 2) as u8;
    let minute = ((time >> 5) & 0x3F) as u8;
    let hour = ((time >> 11) & 0x1F) as u8;
    (hour, minute, second)
}
