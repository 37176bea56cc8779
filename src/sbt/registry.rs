//! Shader group registry.
//!
//! Populated once when a ray-tracing pipeline is created. Builders share it
//! through `Arc`, after which it is never mutated.

use std::collections::HashMap;

use super::layout::{SbtLayout, SbtTable, ShaderGroupKind, ShaderHandle};
use crate::pipeline::RayTracingPipeline;
use crate::util::{align_up, Error, Result};

/// Record template for one named shader group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderGroupRecord {
    /// Group name (unique within the pipeline).
    pub name: String,
    /// Group kind; decides which sub-tables accept it.
    pub kind: ShaderGroupKind,
    /// Device handle written at the start of every record.
    pub handle: ShaderHandle,
    /// Inline payload size every bind for this group must match.
    pub data_size: u32,
}

/// Name-keyed set of shader group records for one pipeline.
#[derive(Debug)]
pub struct ShaderGroupRegistry {
    layout: SbtLayout,
    records: Vec<ShaderGroupRecord>,
    by_name: HashMap<String, usize>,
}

impl ShaderGroupRegistry {
    /// Create an empty registry for the given device layout.
    pub fn new(layout: SbtLayout) -> Result<Self> {
        layout.validate()?;
        Ok(Self {
            layout,
            records: Vec::new(),
            by_name: HashMap::new(),
        })
    }

    /// Register every shader group a ray-tracing pipeline exposes.
    pub fn from_pipeline<P: RayTracingPipeline + ?Sized>(layout: SbtLayout, pipeline: &P) -> Result<Self> {
        let mut registry = Self::new(layout)?;
        let data_size = pipeline.shader_record_size();
        for group in pipeline.shader_groups() {
            registry.register(group.name, group.kind, group.handle, data_size)?;
        }
        tracing::debug!(groups = registry.len(), data_size, "shader group registry populated");
        Ok(registry)
    }

    /// Register a shader group.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        kind: ShaderGroupKind,
        handle: ShaderHandle,
        data_size: u32,
    ) -> Result<&ShaderGroupRecord> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(Error::DuplicateName(name));
        }
        if handle.len() != self.layout.handle_size as usize {
            return Err(Error::InvalidHandle {
                group: name,
                reason: format!(
                    "expected {} bytes, got {}",
                    self.layout.handle_size,
                    handle.len()
                ),
            });
        }
        if handle.is_null() {
            return Err(Error::InvalidHandle {
                group: name,
                reason: "handle equals the null-shader sentinel".into(),
            });
        }

        let index = self.records.len();
        self.by_name.insert(name.clone(), index);
        self.records.push(ShaderGroupRecord {
            name,
            kind,
            handle,
            data_size,
        });
        Ok(&self.records[index])
    }

    /// Look up a group by name.
    pub fn lookup(&self, name: &str) -> Result<&ShaderGroupRecord> {
        self.by_name
            .get(name)
            .map(|&i| &self.records[i])
            .ok_or_else(|| Error::UnknownGroup(name.to_string()))
    }

    /// Position of a group in registration order.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownGroup(name.to_string()))
    }

    /// Group at a registration index.
    pub fn get(&self, index: usize) -> Option<&ShaderGroupRecord> {
        self.records.get(index)
    }

    /// Device layout the registry was created for.
    #[inline]
    pub fn layout(&self) -> &SbtLayout {
        &self.layout
    }

    /// Number of registered groups.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over groups in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ShaderGroupRecord> {
        self.records.iter()
    }

    /// Largest inline data size among groups admissible to `table`.
    pub fn max_data_size(&self, table: SbtTable) -> u32 {
        self.records
            .iter()
            .filter(|r| r.kind.fits(table))
            .map(|r| r.data_size)
            .max()
            .unwrap_or(0)
    }

    /// Record stride for `table`: handle plus largest payload, aligned.
    pub fn record_stride(&self, table: SbtTable) -> u64 {
        let raw = self.layout.handle_size as u64 + self.max_data_size(table) as u64;
        align_up(raw, self.layout.handle_alignment as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(tag: u8) -> ShaderHandle {
        ShaderHandle::new(&[tag; 32])
    }

    #[test]
    fn test_register_and_lookup() {
        let mut reg = ShaderGroupRegistry::new(SbtLayout::default()).unwrap();
        reg.register("Main", ShaderGroupKind::General, handle(1), 0).unwrap();
        reg.register("Hit0", ShaderGroupKind::TriangleHit, handle(2), 16).unwrap();

        let hit = reg.lookup("Hit0").unwrap();
        assert_eq!(hit.kind, ShaderGroupKind::TriangleHit);
        assert_eq!(hit.data_size, 16);
        assert!(matches!(reg.lookup("Nope"), Err(Error::UnknownGroup(n)) if n == "Nope"));
    }

    #[test]
    fn test_duplicate_name() {
        let mut reg = ShaderGroupRegistry::new(SbtLayout::default()).unwrap();
        reg.register("Miss", ShaderGroupKind::General, handle(1), 0).unwrap();
        let err = reg.register("Miss", ShaderGroupKind::General, handle(2), 0).unwrap_err();
        assert!(matches!(err, Error::DuplicateName(_)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_invalid_handles() {
        let mut reg = ShaderGroupRegistry::new(SbtLayout::default()).unwrap();
        let short = ShaderHandle::new(&[1; 8]);
        assert!(matches!(
            reg.register("A", ShaderGroupKind::General, short, 0),
            Err(Error::InvalidHandle { .. })
        ));
        assert!(matches!(
            reg.register("B", ShaderGroupKind::General, ShaderHandle::null(32), 0),
            Err(Error::InvalidHandle { .. })
        ));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_record_stride() {
        let mut reg = ShaderGroupRegistry::new(SbtLayout::default()).unwrap();
        reg.register("Gen", ShaderGroupKind::General, handle(1), 4).unwrap();
        reg.register("Hit", ShaderGroupKind::ProceduralHit, handle(2), 40).unwrap();

        // 32 + 4 -> 64, 32 + 40 -> 96
        assert_eq!(reg.record_stride(SbtTable::Miss), 64);
        assert_eq!(reg.record_stride(SbtTable::Hit), 96);
        assert_eq!(reg.max_data_size(SbtTable::Callable), 4);
    }
}
