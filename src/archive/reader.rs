//! Archive parsing and validation.

use std::borrow::Cow;
use std::collections::HashSet;

use super::compression;
use super::data::ArchiveData;
use super::format::{
    body_checksum, ArchiveHeader, EntryKind, DIRECTORY_RECORD_FIXED_SIZE, ENTRY_FLAGS_KNOWN, ENTRY_FLAG_COMPRESSED,
    HEADER_SIZE, NO_PIPELINE_TYPE,
};
use super::stream::IStream;
use crate::pipeline::PipelineType;
use crate::util::{Error, Result};

/// One directory entry.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ArchiveEntry {
    pub kind: EntryKind,
    pub name: String,
    /// Recorded type of a pipeline-state entry; `None` for shaders.
    pub pipeline_type: Option<PipelineType>,
    pub compressed: bool,
    /// Absolute payload offset.
    pub offset: u64,
    /// Stored payload size (compressed size when compressed).
    pub size: u64,
}

/// A fully validated archive.
///
/// Construction checks the header, the body size, the checksum and every
/// directory record; payloads are decoded lazily.
#[derive(Debug, Clone)]
pub struct ArchiveReader {
    data: ArchiveData,
    header: ArchiveHeader,
    entries: Vec<ArchiveEntry>,
}

impl ArchiveReader {
    /// Parse and validate an archive.
    pub fn new(data: impl Into<ArchiveData>) -> Result<Self> {
        let data = data.into();
        let header = ArchiveHeader::parse(&data)?;

        let body = &data[HEADER_SIZE..];
        if body.len() as u64 != header.body_size {
            return Err(Error::corrupt(format!(
                "body size mismatch: header says {} bytes, found {}",
                header.body_size,
                body.len()
            )));
        }
        let checksum = body_checksum(body);
        if checksum != header.checksum {
            return Err(Error::corrupt(format!(
                "checksum mismatch: expected {:016x}, computed {:016x}",
                header.checksum, checksum
            )));
        }

        let entries = Self::parse_directory(&data, &header)?;
        tracing::debug!(
            entries = entries.len(),
            content_version = header.content_version,
            "archive validated"
        );
        Ok(Self { data, header, entries })
    }

    fn parse_directory(data: &[u8], header: &ArchiveHeader) -> Result<Vec<ArchiveEntry>> {
        let count = header.entry_count as usize;
        let min_directory = count.saturating_mul(DIRECTORY_RECORD_FIXED_SIZE);
        if min_directory as u64 > header.body_size {
            return Err(Error::corrupt(format!("{} entries cannot fit in the archive body", count)));
        }

        let mut s = IStream::at(data, HEADER_SIZE as u64, "directory");
        let mut entries = Vec::with_capacity(count);
        let mut seen = HashSet::with_capacity(count);

        for index in 0..count {
            let kind_code = s.read_u8()?;
            let kind = EntryKind::from_u8(kind_code)
                .ok_or_else(|| Error::corrupt(format!("entry {}: unknown kind {}", index, kind_code)))?;

            let type_code = s.read_u8()?;
            let pipeline_type = match kind {
                EntryKind::Shader if type_code == NO_PIPELINE_TYPE => None,
                EntryKind::Shader => {
                    return Err(Error::corrupt(format!(
                        "entry {}: shader carries pipeline type {}",
                        index, type_code
                    )))
                }
                EntryKind::PipelineState => Some(PipelineType::from_u8(type_code).ok_or_else(|| {
                    Error::corrupt(format!("entry {}: unknown pipeline type {}", index, type_code))
                })?),
            };

            let flags = s.read_u8()?;
            if flags & !ENTRY_FLAGS_KNOWN != 0 {
                return Err(Error::corrupt(format!("entry {}: unknown flags {:#04x}", index, flags)));
            }
            let _reserved = s.read_u8()?;

            let name = s.read_str16()?;
            if name.is_empty() {
                return Err(Error::corrupt(format!("entry {}: empty name", index)));
            }
            if !seen.insert((kind, name.clone())) {
                return Err(Error::corrupt(format!("duplicate {} entry '{}'", kind, name)));
            }

            let offset = s.read_u64()?;
            let size = s.read_u64()?;
            let end = offset.checked_add(size);
            if offset < HEADER_SIZE as u64 || end.map_or(true, |end| end > data.len() as u64) {
                return Err(Error::corrupt(format!(
                    "{} '{}': payload {}+{} out of bounds",
                    kind, name, offset, size
                )));
            }

            entries.push(ArchiveEntry {
                kind,
                name,
                pipeline_type,
                compressed: flags & ENTRY_FLAG_COMPRESSED != 0,
                offset,
                size,
            });
        }

        let directory_end = s.pos();
        if let Some(e) = entries.iter().find(|e| e.offset < directory_end) {
            return Err(Error::corrupt(format!("{} '{}': payload overlaps the directory", e.kind, e.name)));
        }
        Ok(entries)
    }

    /// Validated header.
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    /// Directory entries in archive order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Find an entry by kind and name.
    pub fn find(&self, kind: EntryKind, name: &str) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|e| e.kind == kind && e.name == name)
    }

    /// Payload bytes of an entry, decompressed if needed.
    pub fn payload(&self, entry: &ArchiveEntry) -> Result<Cow<'_, [u8]>> {
        let start = entry.offset as usize;
        let raw = &self.data[start..start + entry.size as usize];
        if entry.compressed {
            compression::decompress(raw).map(Cow::Owned)
        } else {
            Ok(Cow::Borrowed(raw))
        }
    }

    /// Whether the archive is backed by a memory map.
    pub fn is_mapped(&self) -> bool {
        self.data.is_mapped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::stream::OStream;
    use crate::archive::format::CURRENT_VERSION;

    /// Assemble an archive from raw directory records and payload bytes.
    fn assemble(records: &[(u8, u8, u8, &str)], payloads: &[&[u8]]) -> Vec<u8> {
        let dir_size: usize = records.iter().map(|r| DIRECTORY_RECORD_FIXED_SIZE + r.3.len()).sum();
        let mut body = OStream::memory();
        let mut offset = (HEADER_SIZE + dir_size) as u64;
        for (record, payload) in records.iter().zip(payloads) {
            body.write_u8(record.0).unwrap();
            body.write_u8(record.1).unwrap();
            body.write_u8(record.2).unwrap();
            body.write_u8(0).unwrap();
            body.write_str16(record.3).unwrap();
            body.write_u64(offset).unwrap();
            body.write_u64(payload.len() as u64).unwrap();
            offset += payload.len() as u64;
        }
        for payload in payloads {
            body.write_bytes(payload).unwrap();
        }
        let body = body.finish().unwrap();

        let mut out = OStream::memory();
        ArchiveHeader {
            version: CURRENT_VERSION,
            flags: 0,
            content_version: 3,
            entry_count: records.len() as u32,
            body_size: body.len() as u64,
            checksum: body_checksum(&body),
        }
        .write(&mut out)
        .unwrap();
        out.write_bytes(&body).unwrap();
        out.finish().unwrap()
    }

    #[test]
    fn test_directory() -> Result<()> {
        let bytes = assemble(
            &[(0, NO_PIPELINE_TYPE, 0, "VS"), (1, PipelineType::Compute.as_u8(), 0, "Blur")],
            &[b"abc", b"defg"],
        );
        let reader = ArchiveReader::new(bytes)?;
        assert_eq!(reader.header().content_version, 3);
        assert_eq!(reader.entries().len(), 2);

        let vs = reader.find(EntryKind::Shader, "VS").expect("shader entry");
        assert_eq!(vs.pipeline_type, None);
        assert_eq!(&*reader.payload(vs)?, b"abc");

        let blur = reader.find(EntryKind::PipelineState, "Blur").expect("pipeline entry");
        assert_eq!(blur.pipeline_type, Some(PipelineType::Compute));
        assert_eq!(&*reader.payload(blur)?, b"defg");
        assert!(reader.find(EntryKind::Shader, "Blur").is_none());
        Ok(())
    }

    #[test]
    fn test_checksum_and_size() {
        let mut bytes = assemble(&[(0, NO_PIPELINE_TYPE, 0, "VS")], &[b"abc"]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let err = ArchiveReader::new(bytes.clone()).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(msg) if msg.contains("checksum")));

        bytes.push(0);
        let err = ArchiveReader::new(bytes).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(msg) if msg.contains("size")));
    }

    #[test]
    fn test_invalid_records() {
        let cases: [(&[(u8, u8, u8, &str)], &str); 5] = [
            (&[(7, NO_PIPELINE_TYPE, 0, "X")], "kind"),
            (&[(0, 3, 0, "X")], "pipeline type"),
            (&[(1, 99, 0, "X")], "pipeline type"),
            (&[(0, NO_PIPELINE_TYPE, 0x80, "X")], "flags"),
            (&[(0, NO_PIPELINE_TYPE, 0, "")], "empty"),
        ];
        for (records, needle) in cases {
            let err = ArchiveReader::new(assemble(records, &[b"p"])).unwrap_err();
            assert!(
                matches!(&err, Error::CorruptArchive(msg) if msg.contains(needle)),
                "{needle}: {err}"
            );
        }

        let dup = assemble(&[(0, NO_PIPELINE_TYPE, 0, "X"), (0, NO_PIPELINE_TYPE, 0, "X")], &[b"a", b"b"]);
        assert!(matches!(ArchiveReader::new(dup), Err(Error::CorruptArchive(msg)) if msg.contains("duplicate")));

        // Same name under different kinds is allowed.
        let ok = assemble(&[(0, NO_PIPELINE_TYPE, 0, "X"), (1, 0, 0, "X")], &[b"a", b"b"]);
        assert!(ArchiveReader::new(ok).is_ok());
    }
}
