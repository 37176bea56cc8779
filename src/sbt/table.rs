//! Serialized shader binding table.

use super::layout::SbtTable;

/// Placement of one sub-table inside the binding table buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SbtRegion {
    /// Byte offset of the first record.
    pub offset: u64,
    /// Distance between consecutive records.
    pub stride: u64,
    /// Size of the region in bytes (`stride * count`).
    pub size: u64,
    /// Number of records.
    pub count: u32,
}

impl SbtRegion {
    /// Byte offset of record `index`, if it lies inside the region.
    pub fn record_offset(&self, index: u32) -> Option<u64> {
        (index < self.count).then(|| self.offset + index as u64 * self.stride)
    }
}

/// Output of [`BindingTableBuilder::build`](super::BindingTableBuilder::build).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingTable {
    /// Contiguous buffer: ray-gen, miss, hit, callable.
    pub data: Vec<u8>,
    pub ray_gen: SbtRegion,
    pub miss: SbtRegion,
    pub hit: SbtRegion,
    pub callable: SbtRegion,
}

impl BindingTable {
    /// Region of the given sub-table.
    pub fn region(&self, table: SbtTable) -> &SbtRegion {
        match table {
            SbtTable::RayGen => &self.ray_gen,
            SbtTable::Miss => &self.miss,
            SbtTable::Hit => &self.hit,
            SbtTable::Callable => &self.callable,
        }
    }

    /// Bytes of one record (full stride, including padding).
    pub fn record(&self, table: SbtTable, index: u32) -> Option<&[u8]> {
        let region = self.region(table);
        let start = region.record_offset(index)? as usize;
        self.data.get(start..start + region.stride as usize)
    }

    /// Total buffer size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
