//! Archive writer.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::codec;
use super::compression;
use super::format::{
    body_checksum, ArchiveHeader, EntryKind, CURRENT_VERSION, DIRECTORY_RECORD_FIXED_SIZE, ENTRY_FLAG_COMPRESSED,
    HEADER_SIZE, NO_PIPELINE_TYPE,
};
use super::stream::OStream;
use crate::pipeline::{PipelineStateDesc, ShaderDesc};
use crate::util::{Error, Result};

/// Default zlib level for payloads.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Collects shader and pipeline descriptors and serializes them into an
/// archive.
#[derive(Debug, Clone)]
pub struct Archiver {
    content_version: u32,
    compression_level: u32,
    shaders: Vec<ShaderDesc>,
    pipelines: Vec<PipelineStateDesc>,
}

impl Default for Archiver {
    fn default() -> Self {
        Self::new()
    }
}

/// Directory record before offsets are assigned.
struct PendingEntry {
    kind: EntryKind,
    pipeline_type: u8,
    flags: u8,
    name: String,
    payload: Vec<u8>,
}

impl Archiver {
    pub fn new() -> Self {
        Self {
            content_version: 0,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            shaders: Vec::new(),
            pipelines: Vec::new(),
        }
    }

    /// Caller-defined version stored in the header.
    pub fn set_content_version(&mut self, version: u32) {
        self.content_version = version;
    }

    /// zlib level 0..=9; 0 stores payloads raw.
    pub fn set_compression_level(&mut self, level: u32) {
        if level > 9 {
            tracing::warn!(level, "compression level clamped to 9");
        }
        self.compression_level = level.min(9);
    }

    /// Number of stored descriptors.
    pub fn len(&self) -> usize {
        self.shaders.len() + self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a shader descriptor.
    pub fn add_shader(&mut self, desc: ShaderDesc) -> Result<()> {
        desc.validate()?;
        if self.shaders.iter().any(|s| s.name == desc.name) {
            return Err(Error::DuplicateName(desc.name));
        }
        self.shaders.push(desc);
        Ok(())
    }

    /// Add a pipeline-state descriptor. Referenced shaders are resolved at
    /// [`serialize`](Self::serialize) time.
    pub fn add_pipeline_state(&mut self, desc: PipelineStateDesc) -> Result<()> {
        desc.validate()?;
        if self.pipelines.iter().any(|p| p.name == desc.name) {
            return Err(Error::DuplicateName(desc.name));
        }
        self.pipelines.push(desc);
        Ok(())
    }

    fn pending_entries(&self) -> Result<Vec<PendingEntry>> {
        let shader_names: HashSet<&str> = self.shaders.iter().map(|s| s.name.as_str()).collect();
        for pipeline in &self.pipelines {
            if let Some(missing) = pipeline
                .referenced_shaders()
                .into_iter()
                .find(|name| !shader_names.contains(name))
            {
                return Err(Error::invalid_desc(format!(
                    "pipeline '{}' references shader '{}' which is not in the archive",
                    pipeline.name, missing
                )));
            }
        }

        let mut encoded = Vec::with_capacity(self.len());
        for shader in &self.shaders {
            encoded.push((EntryKind::Shader, NO_PIPELINE_TYPE, &shader.name, codec::encode_shader(shader)?));
        }
        for pipeline in &self.pipelines {
            encoded.push((
                EntryKind::PipelineState,
                pipeline.pipeline_type.as_u8(),
                &pipeline.name,
                codec::encode_pipeline_state(pipeline)?,
            ));
        }

        let mut entries = Vec::with_capacity(encoded.len());
        for (kind, pipeline_type, name, raw) in encoded {
            let (flags, payload) = match compression::compress(&raw, self.compression_level)? {
                Some(packed) => (ENTRY_FLAG_COMPRESSED, packed),
                None => (0, raw),
            };
            entries.push(PendingEntry {
                kind,
                pipeline_type,
                flags,
                name: name.clone(),
                payload,
            });
        }
        Ok(entries)
    }

    /// Serialize into a complete archive.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let entries = self.pending_entries()?;
        let entry_count = u32::try_from(entries.len()).map_err(|_| Error::other("too many archive entries"))?;

        let directory_size: usize = entries
            .iter()
            .map(|e| DIRECTORY_RECORD_FIXED_SIZE + e.name.len())
            .sum();
        let mut offset = (HEADER_SIZE + directory_size) as u64;

        let mut body = OStream::memory();
        for entry in &entries {
            body.write_u8(entry.kind.as_u8())?;
            body.write_u8(entry.pipeline_type)?;
            body.write_u8(entry.flags)?;
            body.write_u8(0)?;
            body.write_str16(&entry.name)?;
            body.write_u64(offset)?;
            body.write_u64(entry.payload.len() as u64)?;
            offset += entry.payload.len() as u64;
        }
        for entry in &entries {
            body.write_bytes(&entry.payload)?;
        }
        let body = body.finish()?;

        let header = ArchiveHeader {
            version: CURRENT_VERSION,
            flags: 0,
            content_version: self.content_version,
            entry_count,
            body_size: body.len() as u64,
            checksum: body_checksum(&body),
        };
        let mut out = OStream::new(Vec::with_capacity(HEADER_SIZE + body.len()));
        header.write(&mut out)?;
        out.write_bytes(&body)?;

        tracing::debug!(
            entries = entries.len(),
            compressed = entries.iter().filter(|e| e.flags & ENTRY_FLAG_COMPRESSED != 0).count(),
            size = out.pos(),
            "archive serialized"
        );
        out.finish()
    }

    /// Serialize and write the archive to a file.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.serialize()?;
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::reader::ArchiveReader;
    use crate::pipeline::{PipelineType, ShaderType};

    #[test]
    fn test_duplicates_rejected() {
        let mut archiver = Archiver::new();
        archiver.add_shader(ShaderDesc::new("VS", ShaderType::Vertex)).unwrap();
        let err = archiver.add_shader(ShaderDesc::new("VS", ShaderType::Pixel)).unwrap_err();
        assert!(matches!(err, Error::DuplicateName(name) if name == "VS"));

        // A pipeline may share a shader's name.
        archiver
            .add_pipeline_state(PipelineStateDesc::new("VS", PipelineType::Graphics).with_shader("VS"))
            .unwrap();
        assert_eq!(archiver.len(), 2);
    }

    #[test]
    fn test_missing_shader_reference() {
        let mut archiver = Archiver::new();
        archiver
            .add_pipeline_state(PipelineStateDesc::new("Blur", PipelineType::Compute).with_shader("CS"))
            .unwrap();
        assert!(matches!(archiver.serialize(), Err(Error::InvalidDescriptor(_))));
    }

    #[test]
    fn test_layout_and_compression() -> Result<()> {
        let bytecode = vec![0x42u8; 4096];
        let mut archiver = Archiver::new();
        archiver.set_content_version(11);
        archiver.add_shader(ShaderDesc::new("CS", ShaderType::Compute).with_bytecode(bytecode.clone()))?;
        archiver.add_pipeline_state(PipelineStateDesc::new("Blur", PipelineType::Compute).with_shader("CS"))?;

        let packed = archiver.serialize()?;
        assert!(packed.len() < bytecode.len());
        let reader = ArchiveReader::new(packed)?;
        assert_eq!(reader.header().content_version, 11);
        let cs = reader.find(EntryKind::Shader, "CS").expect("shader entry");
        assert!(cs.compressed);
        assert_eq!(codec::decode_shader(&reader.payload(cs)?)?.bytecode, bytecode);

        archiver.set_compression_level(0);
        let raw = ArchiveReader::new(archiver.serialize()?)?;
        assert!(raw.entries().iter().all(|e| !e.compressed));
        Ok(())
    }
}
