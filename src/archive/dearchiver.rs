//! Dearchiver: archive blob to descriptors to device objects.
//!
//! # Example
//!
//! ```ignore
//! use rtbind::prelude::*;
//!
//! let mut dearchiver = Dearchiver::new();
//! dearchiver.load_archive_file("pipelines.rtba")?;
//! let device = NullDevice::new();
//! let shader = dearchiver.unpack_shader_with("Cube pixel shader", &device, |desc| {
//!     desc.name = "ModifiedName".into();
//! })?;
//! assert_eq!(shader.name(), "ModifiedName");
//! ```

use std::path::Path;

use super::codec;
use super::data::ArchiveData;
use super::format::{ArchiveHeader, EntryKind};
use super::reader::{ArchiveEntry, ArchiveReader};
use crate::pipeline::{PipelineStateCreateInfo, PipelineType, RenderDevice, ShaderDesc};
use crate::util::{Error, Result};

/// Loads one archive and unpacks named shaders and pipeline states from it.
///
/// States: unloaded (after [`new`](Self::new) or [`reset`](Self::reset)) and
/// loaded. Loading twice without a reset fails with [`Error::AlreadyLoaded`];
/// a failed load or unpack leaves the state unchanged.
#[derive(Debug, Default)]
pub struct Dearchiver {
    archive: Option<ArchiveReader>,
}

impl Dearchiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if an archive is loaded.
    pub fn is_loaded(&self) -> bool {
        self.archive.is_some()
    }

    /// Load an archive from memory.
    pub fn load_archive(&mut self, data: impl Into<ArchiveData>) -> Result<()> {
        if self.archive.is_some() {
            return Err(Error::AlreadyLoaded);
        }
        let reader = ArchiveReader::new(data)?;
        tracing::debug!(entries = reader.entries().len(), "archive loaded");
        self.archive = Some(reader);
        Ok(())
    }

    /// Load an archive, requiring a specific content version.
    pub fn load_archive_versioned(&mut self, data: impl Into<ArchiveData>, content_version: u32) -> Result<()> {
        if self.archive.is_some() {
            return Err(Error::AlreadyLoaded);
        }
        let reader = ArchiveReader::new(data)?;
        let actual = reader.header().content_version;
        if actual != content_version {
            return Err(Error::ContentVersionMismatch {
                expected: content_version,
                actual,
            });
        }
        self.archive = Some(reader);
        Ok(())
    }

    /// Load an archive file (memory-mapped when the `mmap` feature is on).
    pub fn load_archive_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.archive.is_some() {
            return Err(Error::AlreadyLoaded);
        }
        self.load_archive(ArchiveData::open(path)?)
    }

    /// Drop the loaded archive.
    pub fn reset(&mut self) {
        if self.archive.take().is_some() {
            tracing::debug!("archive unloaded");
        }
    }

    fn archive(&self) -> Result<&ArchiveReader> {
        self.archive.as_ref().ok_or(Error::NotLoaded)
    }

    /// Header of the loaded archive.
    pub fn header(&self) -> Result<&ArchiveHeader> {
        Ok(self.archive()?.header())
    }

    /// Caller-defined content version of the loaded archive.
    pub fn content_version(&self) -> Result<u32> {
        Ok(self.archive()?.header().content_version)
    }

    /// Directory of the loaded archive.
    pub fn entries(&self) -> Result<&[ArchiveEntry]> {
        Ok(self.archive()?.entries())
    }

    fn entry(&self, kind: EntryKind, name: &str) -> Result<(&ArchiveReader, &ArchiveEntry)> {
        let archive = self.archive()?;
        let entry = archive.find(kind, name).ok_or_else(|| Error::EntryNotFound {
            kind,
            name: name.to_string(),
        })?;
        Ok((archive, entry))
    }

    fn read_shader(archive: &ArchiveReader, entry: &ArchiveEntry) -> Result<ShaderDesc> {
        let desc = codec::decode_shader(&archive.payload(entry)?)?;
        if desc.name != entry.name {
            return Err(Error::corrupt(format!(
                "shader entry '{}' holds descriptor '{}'",
                entry.name, desc.name
            )));
        }
        Ok(desc)
    }

    // ========================================================================
    // Decoding
    // ========================================================================

    /// Decode a shader descriptor.
    pub fn decode_shader(&self, name: &str) -> Result<ShaderDesc> {
        self.decode_shader_with(name, |_| {})
    }

    /// Decode a shader descriptor and let `modify` edit it.
    pub fn decode_shader_with<F>(&self, name: &str, modify: F) -> Result<ShaderDesc>
    where
        F: FnOnce(&mut ShaderDesc),
    {
        let (archive, entry) = self.entry(EntryKind::Shader, name)?;
        let mut desc = Self::read_shader(archive, entry)?;
        modify(&mut desc);
        desc.validate()?;
        Ok(desc)
    }

    /// Decode a pipeline state together with every shader it references.
    pub fn decode_pipeline_state(&self, name: &str, pipeline_type: PipelineType) -> Result<PipelineStateCreateInfo> {
        self.decode_pipeline_state_with(name, pipeline_type, |_| {})
    }

    /// Decode a pipeline state and let `modify` edit the create info.
    pub fn decode_pipeline_state_with<F>(
        &self,
        name: &str,
        pipeline_type: PipelineType,
        modify: F,
    ) -> Result<PipelineStateCreateInfo>
    where
        F: FnOnce(&mut PipelineStateCreateInfo),
    {
        let (archive, entry) = self.entry(EntryKind::PipelineState, name)?;
        if entry.pipeline_type != Some(pipeline_type) {
            return Err(Error::TypeMismatch {
                expected: pipeline_type.to_string(),
                actual: entry
                    .pipeline_type
                    .map_or_else(|| "unknown".to_string(), |t| t.to_string()),
            });
        }

        let desc = codec::decode_pipeline_state(&archive.payload(entry)?)?;
        if desc.name != entry.name || desc.pipeline_type != pipeline_type {
            return Err(Error::corrupt(format!(
                "pipeline entry '{}' holds {} pipeline '{}'",
                entry.name, desc.pipeline_type, desc.name
            )));
        }

        let shaders = desc
            .referenced_shaders()
            .into_iter()
            .map(|shader| {
                let (_, shader_entry) = self.entry(EntryKind::Shader, shader)?;
                Self::read_shader(archive, shader_entry)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut info = PipelineStateCreateInfo { desc, shaders };
        modify(&mut info);

        if info.desc.pipeline_type != pipeline_type {
            return Err(Error::TypeMismatch {
                expected: pipeline_type.to_string(),
                actual: info.desc.pipeline_type.to_string(),
            });
        }
        info.desc.validate()?;
        for shader in &info.shaders {
            shader.validate()?;
        }
        Ok(info)
    }

    // ========================================================================
    // Unpacking
    // ========================================================================

    /// Decode a shader and create it on `device`.
    pub fn unpack_shader<D: RenderDevice>(&self, name: &str, device: &D) -> Result<D::Shader> {
        self.unpack_shader_with(name, device, |_| {})
    }

    /// Decode a shader, let `modify` edit it, then create it on `device`.
    pub fn unpack_shader_with<D, F>(&self, name: &str, device: &D, modify: F) -> Result<D::Shader>
    where
        D: RenderDevice,
        F: FnOnce(&mut ShaderDesc),
    {
        let desc = self.decode_shader_with(name, modify)?;
        tracing::debug!(entry = name, shader = %desc.name, "unpacking shader");
        device.create_shader(desc)
    }

    /// Decode a pipeline state and create it on `device`.
    pub fn unpack_pipeline_state<D: RenderDevice>(
        &self,
        name: &str,
        pipeline_type: PipelineType,
        device: &D,
    ) -> Result<D::PipelineState> {
        self.unpack_pipeline_state_with(name, pipeline_type, device, |_| {})
    }

    /// Decode a pipeline state, let `modify` edit the create info, then
    /// create it on `device`.
    pub fn unpack_pipeline_state_with<D, F>(
        &self,
        name: &str,
        pipeline_type: PipelineType,
        device: &D,
        modify: F,
    ) -> Result<D::PipelineState>
    where
        D: RenderDevice,
        F: FnOnce(&mut PipelineStateCreateInfo),
    {
        let info = self.decode_pipeline_state_with(name, pipeline_type, modify)?;
        tracing::debug!(
            entry = name,
            pipeline = %info.desc.name,
            %pipeline_type,
            shaders = info.shaders.len(),
            "unpacking pipeline state"
        );
        device.create_pipeline_state(info)
    }
}
