//! Shader binding table builder.
//!
//! Records are stored per sub-table as explicit slot sequences; an unbound
//! slot is serialized as the null-shader sentinel followed by zeros. Every
//! bind validates fully before touching any slot, so a failed bind leaves the
//! builder exactly as it was.

use std::sync::Arc;

use bytemuck::Pod;

use super::layout::SbtTable;
use super::registry::ShaderGroupRegistry;
use super::table::{BindingTable, SbtRegion};
use super::tlas::{resolve_geometry, resolve_instance, resolve_structure, TopLevelStructure};
use crate::util::{align_up, Error, Result};

/// View a slice of plain-old-data values as record payload bytes.
#[inline]
pub fn payload_bytes<T: Pod>(data: &[T]) -> &[u8] {
    bytemuck::cast_slice(data)
}

/// Where a bind writes its record(s).
#[derive(Clone, Copy)]
pub enum BindingTarget<'a> {
    /// The single ray generation record.
    RayGen,
    /// Miss record by ray type index.
    Miss(u32),
    /// Callable record by index.
    Callable(u32),
    /// Hit record by absolute index.
    HitByIndex(u32),
    /// Hit record of one geometry of one TLAS instance.
    HitForGeometry {
        tlas: &'a Arc<dyn TopLevelStructure>,
        instance: &'a str,
        geometry: &'a str,
        ray_offset: u32,
    },
    /// Hit records of every geometry of one TLAS instance.
    HitForInstance {
        tlas: &'a Arc<dyn TopLevelStructure>,
        instance: &'a str,
        ray_offset: u32,
    },
    /// Hit records of every instance of a TLAS.
    HitForStructure {
        tlas: &'a Arc<dyn TopLevelStructure>,
        ray_offset: u32,
    },
}

impl BindingTarget<'_> {
    /// Sub-table this target writes into.
    pub fn table(&self) -> SbtTable {
        match self {
            Self::RayGen => SbtTable::RayGen,
            Self::Miss(_) => SbtTable::Miss,
            Self::Callable(_) => SbtTable::Callable,
            _ => SbtTable::Hit,
        }
    }

    fn structure(&self) -> Option<&Arc<dyn TopLevelStructure>> {
        match *self {
            Self::HitForGeometry { tlas, .. }
            | Self::HitForInstance { tlas, .. }
            | Self::HitForStructure { tlas, .. } => Some(tlas),
            _ => None,
        }
    }

    /// Resolve to record indices within the target's sub-table.
    fn resolve(&self) -> Result<Vec<u32>> {
        match *self {
            Self::RayGen => Ok(vec![0]),
            Self::Miss(i) | Self::Callable(i) | Self::HitByIndex(i) => Ok(vec![i]),
            Self::HitForGeometry {
                tlas,
                instance,
                geometry,
                ray_offset,
            } => Ok(vec![resolve_geometry(&**tlas, instance, geometry, ray_offset)?]),
            Self::HitForInstance {
                tlas,
                instance,
                ray_offset,
            } => resolve_instance(&**tlas, instance, ray_offset),
            Self::HitForStructure { tlas, ray_offset } => resolve_structure(&**tlas, ray_offset),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum RecordSlot {
    /// Serialized as the null-shader sentinel.
    Null,
    Bound { group: usize, payload: Vec<u8> },
}

impl RecordSlot {
    fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

struct BoundStructure {
    tlas: Arc<dyn TopLevelStructure>,
    generation: u64,
}

/// Assembles a shader binding table for one ray-tracing pipeline.
///
/// Not synchronized: bind from one thread, share the registry instead.
pub struct BindingTableBuilder {
    registry: Arc<ShaderGroupRegistry>,
    ray_gen: RecordSlot,
    miss: Vec<RecordSlot>,
    hit: Vec<RecordSlot>,
    callable: Vec<RecordSlot>,
    structures: Vec<BoundStructure>,
}

impl BindingTableBuilder {
    /// Create an empty builder. The layout comes from the registry's device.
    pub fn new(registry: Arc<ShaderGroupRegistry>) -> Self {
        Self {
            registry,
            ray_gen: RecordSlot::Null,
            miss: Vec::new(),
            hit: Vec::new(),
            callable: Vec::new(),
            structures: Vec::new(),
        }
    }

    /// Registry the builder resolves group names against.
    #[inline]
    pub fn registry(&self) -> &Arc<ShaderGroupRegistry> {
        &self.registry
    }

    // ------------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------------

    /// Bind `group` with inline `data` at `target`.
    pub fn bind(&mut self, target: BindingTarget<'_>, group: &str, data: &[u8]) -> Result<()> {
        let table = target.table();
        let group_index = self.registry.index_of(group)?;
        let (kind, data_size) = match self.registry.get(group_index) {
            Some(record) => (record.kind, record.data_size as usize),
            None => return Err(Error::UnknownGroup(group.to_string())),
        };

        if !kind.fits(table) {
            return Err(Error::GroupKindMismatch {
                group: group.to_string(),
                table,
            });
        }
        if data.len() != data_size {
            return Err(Error::PayloadSizeMismatch {
                group: group.to_string(),
                expected: data_size,
                actual: data.len(),
            });
        }

        let limit = self.registry.layout().max_records;
        let generation = match target.structure() {
            Some(tlas) => {
                let current = tlas.generation();
                // Records from an older build must be cleared before binding
                // against the new one.
                if let Some(bound) = self.bound_structure(tlas) {
                    if bound.generation != current {
                        return Err(Error::StaleStructure {
                            structure: tlas.name().to_string(),
                            bound: bound.generation,
                            current,
                        });
                    }
                }
                let slot_count = tlas.hit_slot_count();
                if slot_count > limit {
                    return Err(Error::SlotOutOfRange {
                        table,
                        index: slot_count - 1,
                        limit,
                    });
                }
                Some(current)
            }
            None => None,
        };
        let slots = target.resolve()?;
        if let Some(&index) = slots.iter().find(|&&s| s >= limit) {
            return Err(Error::SlotOutOfRange { table, index, limit });
        }

        // Validation done; commit.
        if let (Some(tlas), Some(generation)) = (target.structure(), generation) {
            self.remember_structure(tlas, generation);
        }
        let record = RecordSlot::Bound {
            group: group_index,
            payload: data.to_vec(),
        };
        tracing::trace!(%table, group, slots = ?slots, "bind");

        match table {
            SbtTable::RayGen => self.ray_gen = record,
            SbtTable::Miss => write_slots(&mut self.miss, &slots, &record),
            SbtTable::Hit => write_slots(&mut self.hit, &slots, &record),
            SbtTable::Callable => write_slots(&mut self.callable, &slots, &record),
        }
        Ok(())
    }

    /// Bind the ray generation shader. Always overwrites the single record.
    pub fn bind_ray_gen(&mut self, group: &str, data: &[u8]) -> Result<()> {
        self.bind(BindingTarget::RayGen, group, data)
    }

    /// Bind a miss shader for ray type `miss_index`.
    pub fn bind_miss(&mut self, miss_index: u32, group: &str, data: &[u8]) -> Result<()> {
        self.bind(BindingTarget::Miss(miss_index), group, data)
    }

    /// Bind a callable shader at `callable_index`.
    pub fn bind_callable(&mut self, callable_index: u32, group: &str, data: &[u8]) -> Result<()> {
        self.bind(BindingTarget::Callable(callable_index), group, data)
    }

    /// Bind a hit group at an absolute hit record index.
    pub fn bind_hit_group_by_index(&mut self, binding_index: u32, group: &str, data: &[u8]) -> Result<()> {
        self.bind(BindingTarget::HitByIndex(binding_index), group, data)
    }

    /// Bind a hit group for one geometry of a TLAS instance.
    pub fn bind_hit_group_for_geometry(
        &mut self,
        tlas: &Arc<dyn TopLevelStructure>,
        instance: &str,
        geometry: &str,
        ray_offset: u32,
        group: &str,
        data: &[u8],
    ) -> Result<()> {
        self.bind(
            BindingTarget::HitForGeometry {
                tlas,
                instance,
                geometry,
                ray_offset,
            },
            group,
            data,
        )
    }

    /// Bind a hit group for every geometry of a TLAS instance.
    pub fn bind_hit_group_for_instance(
        &mut self,
        tlas: &Arc<dyn TopLevelStructure>,
        instance: &str,
        ray_offset: u32,
        group: &str,
        data: &[u8],
    ) -> Result<()> {
        self.bind(
            BindingTarget::HitForInstance {
                tlas,
                instance,
                ray_offset,
            },
            group,
            data,
        )
    }

    /// Bind a hit group for every instance of a TLAS.
    pub fn bind_hit_group_for_structure(
        &mut self,
        tlas: &Arc<dyn TopLevelStructure>,
        ray_offset: u32,
        group: &str,
        data: &[u8],
    ) -> Result<()> {
        self.bind(BindingTarget::HitForStructure { tlas, ray_offset }, group, data)
    }

    fn bound_structure(&self, tlas: &Arc<dyn TopLevelStructure>) -> Option<&BoundStructure> {
        self.structures
            .iter()
            .find(|s| std::ptr::addr_eq(Arc::as_ptr(&s.tlas), Arc::as_ptr(tlas)))
    }

    fn remember_structure(&mut self, tlas: &Arc<dyn TopLevelStructure>, generation: u64) {
        if self.bound_structure(tlas).is_none() {
            self.structures.push(BoundStructure {
                tlas: Arc::clone(tlas),
                generation,
            });
        }
    }

    /// Clear every record and forget referenced structures.
    pub fn reset(&mut self) {
        self.ray_gen = RecordSlot::Null;
        self.miss.clear();
        self.callable.clear();
        self.reset_hit_groups();
    }

    /// Clear only the hit sub-table (e.g. after a TLAS rebuild).
    pub fn reset_hit_groups(&mut self) {
        self.hit.clear();
        self.structures.clear();
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Number of records `build()` would emit for `table`.
    pub fn record_count(&self, table: SbtTable) -> u32 {
        match table {
            SbtTable::RayGen => 1,
            SbtTable::Miss => self.miss.len() as u32,
            SbtTable::Callable => self.callable.len() as u32,
            SbtTable::Hit => self
                .structures
                .iter()
                .map(|s| s.tlas.hit_slot_count())
                .fold(self.hit.len() as u32, u32::max),
        }
    }

    /// Check whether a record is bound.
    pub fn is_bound(&self, table: SbtTable, index: u32) -> bool {
        let slot = match table {
            SbtTable::RayGen if index == 0 => Some(&self.ray_gen),
            SbtTable::RayGen => None,
            SbtTable::Miss => self.miss.get(index as usize),
            SbtTable::Hit => self.hit.get(index as usize),
            SbtTable::Callable => self.callable.get(index as usize),
        };
        slot.is_some_and(|s| !s.is_null())
    }

    /// Fail on the first record a dispatch could reach that is still unbound.
    pub fn verify(&self) -> Result<()> {
        for table in SbtTable::ALL {
            for index in 0..self.record_count(table) {
                if !self.is_bound(table, index) {
                    return Err(Error::UnboundRecord { table, index });
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------------

    /// Serialize all four sub-tables into one buffer.
    ///
    /// Does not modify the builder; repeated calls without binds in between
    /// produce identical output.
    pub fn build(&self) -> Result<BindingTable> {
        for bound in &self.structures {
            let current = bound.tlas.generation();
            if current != bound.generation {
                return Err(Error::StaleStructure {
                    structure: bound.tlas.name().to_string(),
                    bound: bound.generation,
                    current,
                });
            }
        }

        let mut data = Vec::new();
        let ray_gen = self.write_table(&mut data, SbtTable::RayGen, std::slice::from_ref(&self.ray_gen));
        let miss = self.write_table(&mut data, SbtTable::Miss, &self.miss);
        let hit = self.write_table(&mut data, SbtTable::Hit, &self.hit);
        let callable = self.write_table(&mut data, SbtTable::Callable, &self.callable);

        tracing::debug!(
            bytes = data.len(),
            miss = miss.count,
            hit = hit.count,
            callable = callable.count,
            "binding table built"
        );

        Ok(BindingTable {
            data,
            ray_gen,
            miss,
            hit,
            callable,
        })
    }

    fn write_table(&self, data: &mut Vec<u8>, table: SbtTable, slots: &[RecordSlot]) -> SbtRegion {
        let layout = self.registry.layout();
        let stride = self.registry.record_stride(table);
        let count = self.record_count(table);
        let null = layout.null_handle();

        let offset = align_up(data.len() as u64, layout.base_alignment as u64);
        data.resize(offset as usize, 0);

        for index in 0..count as usize {
            let start = data.len();
            match slots.get(index) {
                Some(RecordSlot::Bound { group, payload }) => match self.registry.get(*group) {
                    Some(record) => {
                        data.extend_from_slice(record.handle.as_bytes());
                        data.extend_from_slice(payload);
                    }
                    None => data.extend_from_slice(null.as_bytes()),
                },
                _ => data.extend_from_slice(null.as_bytes()),
            }
            data.resize(start + stride as usize, 0);
        }

        SbtRegion {
            offset,
            stride,
            size: stride * count as u64,
            count,
        }
    }
}

/// Write `record` at every index, growing with null slots as needed.
fn write_slots(slots: &mut Vec<RecordSlot>, indices: &[u32], record: &RecordSlot) {
    for &index in indices {
        let index = index as usize;
        if index >= slots.len() {
            slots.resize(index + 1, RecordSlot::Null);
        }
        slots[index] = record.clone();
    }
}
