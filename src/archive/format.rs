//! Archive container constants and header.

use std::fmt;

use super::stream::{IStream, OStream};
use crate::util::{Error, Result};

/// Magic bytes at the start of an archive.
pub const ARCHIVE_MAGIC: &[u8; 4] = b"RTBA";

/// Size of the header in bytes.
pub const HEADER_SIZE: usize = 32;

/// Current container format version.
pub const CURRENT_VERSION: u16 = 1;

/// Pipeline type byte stored for shader entries.
pub const NO_PIPELINE_TYPE: u8 = 0xFF;

/// Entry flag: payload is zlib-compressed.
pub const ENTRY_FLAG_COMPRESSED: u8 = 0x01;

/// Mask of all known entry flags.
pub const ENTRY_FLAGS_KNOWN: u8 = ENTRY_FLAG_COMPRESSED;

/// Fixed part of a directory record (excluding the name bytes).
pub const DIRECTORY_RECORD_FIXED_SIZE: usize = 4 + 2 + 8 + 8;

/// Kind of an archive entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum EntryKind {
    Shader,
    PipelineState,
}

impl EntryKind {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Shader => 0,
            Self::PipelineState => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Shader),
            1 => Some(Self::PipelineState),
            _ => None,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Shader => "shader",
            Self::PipelineState => "pipeline state",
        })
    }
}

/// Archive header.
///
/// ```text
/// +------------------+
/// | Magic "RTBA"     |  4 bytes
/// | Format version   |  2 bytes (u16 LE)
/// | Flags            |  2 bytes (reserved)
/// | Content version  |  4 bytes (u32 LE)
/// | Entry count      |  4 bytes (u32 LE)
/// | Body size        |  8 bytes (u64 LE)
/// | Body checksum    |  8 bytes (xxh3-64)
/// +------------------+
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub version: u16,
    pub flags: u16,
    pub content_version: u32,
    pub entry_count: u32,
    pub body_size: u64,
    pub checksum: u64,
}

impl ArchiveHeader {
    /// Parse and validate the header fields (not the checksum).
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::corrupt(format!(
                "header truncated: {} of {} bytes",
                data.len(),
                HEADER_SIZE
            )));
        }
        if &data[0..4] != ARCHIVE_MAGIC {
            return Err(Error::corrupt("bad magic bytes"));
        }

        let mut s = IStream::at(data, 4, "header");
        let header = Self {
            version: s.read_u16()?,
            flags: s.read_u16()?,
            content_version: s.read_u32()?,
            entry_count: s.read_u32()?,
            body_size: s.read_u64()?,
            checksum: s.read_u64()?,
        };

        if header.version != CURRENT_VERSION {
            return Err(Error::UnsupportedVersion(header.version));
        }
        Ok(header)
    }

    /// Serialize the header.
    pub fn write<W: std::io::Write>(&self, out: &mut OStream<W>) -> Result<()> {
        out.write_bytes(ARCHIVE_MAGIC)?;
        out.write_u16(self.version)?;
        out.write_u16(self.flags)?;
        out.write_u32(self.content_version)?;
        out.write_u32(self.entry_count)?;
        out.write_u64(self.body_size)?;
        out.write_u64(self.checksum)
    }
}

/// Checksum of the archive body.
#[inline]
pub fn body_checksum(body: &[u8]) -> u64 {
    xxhash_rust::xxh3::xxh3_64(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> ArchiveHeader {
        ArchiveHeader {
            version: CURRENT_VERSION,
            flags: 0,
            content_version: 7,
            entry_count: 2,
            body_size: 100,
            checksum: 0xDEAD_BEEF,
        }
    }

    #[test]
    fn test_header_layout() -> Result<()> {
        let mut out = OStream::memory();
        header().write(&mut out)?;
        let buf = out.finish()?;
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(&buf[0..4], ARCHIVE_MAGIC);
        assert_eq!(ArchiveHeader::parse(&buf)?, header());
        Ok(())
    }

    #[test]
    fn test_bad_headers() {
        assert!(matches!(ArchiveHeader::parse(&[0u8; 10]), Err(Error::CorruptArchive(_))));
        assert!(matches!(ArchiveHeader::parse(&[0u8; HEADER_SIZE]), Err(Error::CorruptArchive(_))));

        let mut out = OStream::memory();
        ArchiveHeader { version: 9, ..header() }.write(&mut out).unwrap();
        let buf = out.finish().unwrap();
        assert!(matches!(ArchiveHeader::parse(&buf), Err(Error::UnsupportedVersion(9))));
    }

    #[test]
    fn test_entry_kind_codes() {
        assert_eq!(EntryKind::from_u8(EntryKind::Shader.as_u8()), Some(EntryKind::Shader));
        assert_eq!(EntryKind::from_u8(1), Some(EntryKind::PipelineState));
        assert_eq!(EntryKind::from_u8(2), None);
    }
}
