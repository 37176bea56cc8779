//! Backend-defined binding table layout, shader handles and group kinds.

use std::fmt;

use smallvec::SmallVec;

use crate::util::{is_power_of_two, Error, Result};

/// Default cap on records per sub-table.
pub const DEFAULT_MAX_RECORDS: u32 = 1 << 20;

/// One of the four sub-tables of a shader binding table, in buffer order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SbtTable {
    RayGen,
    Miss,
    Hit,
    Callable,
}

impl SbtTable {
    /// All sub-tables in the order they are laid out in the buffer.
    pub const ALL: [SbtTable; 4] = [Self::RayGen, Self::Miss, Self::Hit, Self::Callable];

    /// Short lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RayGen => "ray-gen",
            Self::Miss => "miss",
            Self::Hit => "hit",
            Self::Callable => "callable",
        }
    }
}

impl fmt::Display for SbtTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a ray-tracing shader group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ShaderGroupKind {
    /// Ray generation, miss or callable shader.
    General,
    /// Closest-hit and/or any-hit shaders for triangle geometry.
    TriangleHit,
    /// Intersection shader plus optional closest-hit/any-hit for AABB geometry.
    ProceduralHit,
}

impl ShaderGroupKind {
    /// Check whether a group of this kind may be placed in `table`.
    pub fn fits(&self, table: SbtTable) -> bool {
        match self {
            Self::General => table != SbtTable::Hit,
            Self::TriangleHit | Self::ProceduralHit => table == SbtTable::Hit,
        }
    }
}

/// Opaque shader group handle as reported by the device.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ShaderHandle(SmallVec<[u8; 32]>);

impl ShaderHandle {
    /// Wrap raw handle bytes.
    pub fn new(bytes: &[u8]) -> Self {
        Self(SmallVec::from_slice(bytes))
    }

    /// The null-shader sentinel: `size` zero bytes.
    pub fn null(size: usize) -> Self {
        Self(smallvec::smallvec![0u8; size])
    }

    /// Handle bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Handle size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check if this is the null sentinel.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Debug for ShaderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShaderHandle(")?;
        for b in self.0.iter() {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

/// Binding table layout reported by the rendering backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SbtLayout {
    /// Size of a shader group handle in bytes.
    pub handle_size: u32,
    /// Alignment of every record (record strides are multiples of this).
    pub handle_alignment: u32,
    /// Alignment of the start of every sub-table.
    pub base_alignment: u32,
    /// Maximum number of records in one sub-table.
    pub max_records: u32,
}

impl SbtLayout {
    /// Create and validate a layout.
    pub fn new(handle_size: u32, handle_alignment: u32, base_alignment: u32) -> Result<Self> {
        let layout = Self {
            handle_size,
            handle_alignment,
            base_alignment,
            max_records: DEFAULT_MAX_RECORDS,
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Override the per-table record limit.
    pub fn with_max_records(mut self, max_records: u32) -> Self {
        self.max_records = max_records;
        self
    }

    /// Check the layout invariants.
    pub fn validate(&self) -> Result<()> {
        if self.handle_size == 0 {
            return Err(Error::InvalidLayout("handle size is zero".into()));
        }
        if !is_power_of_two(self.handle_alignment as u64) {
            return Err(Error::InvalidLayout(format!(
                "handle alignment {} is not a power of two",
                self.handle_alignment
            )));
        }
        if !is_power_of_two(self.base_alignment as u64) {
            return Err(Error::InvalidLayout(format!(
                "base alignment {} is not a power of two",
                self.base_alignment
            )));
        }
        if self.max_records == 0 {
            return Err(Error::InvalidLayout("max records is zero".into()));
        }
        Ok(())
    }

    /// The null-shader sentinel for this layout.
    pub fn null_handle(&self) -> ShaderHandle {
        ShaderHandle::null(self.handle_size as usize)
    }
}

impl Default for SbtLayout {
    /// Vulkan-style defaults: 32-byte handles, 32-byte records, 64-byte tables.
    fn default() -> Self {
        Self {
            handle_size: 32,
            handle_alignment: 32,
            base_alignment: 64,
            max_records: DEFAULT_MAX_RECORDS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_fits() {
        assert!(ShaderGroupKind::General.fits(SbtTable::RayGen));
        assert!(ShaderGroupKind::General.fits(SbtTable::Callable));
        assert!(!ShaderGroupKind::General.fits(SbtTable::Hit));
        assert!(ShaderGroupKind::ProceduralHit.fits(SbtTable::Hit));
        assert!(!ShaderGroupKind::TriangleHit.fits(SbtTable::Miss));
    }

    #[test]
    fn test_layout_validation() {
        assert!(SbtLayout::new(32, 32, 64).is_ok());
        assert!(matches!(SbtLayout::new(0, 32, 64), Err(Error::InvalidLayout(_))));
        assert!(matches!(SbtLayout::new(32, 48, 64), Err(Error::InvalidLayout(_))));
        assert!(matches!(SbtLayout::new(32, 32, 0), Err(Error::InvalidLayout(_))));
    }

    #[test]
    fn test_null_handle() {
        let layout = SbtLayout::default();
        let null = layout.null_handle();
        assert_eq!(null.len(), 32);
        assert!(null.is_null());
        assert!(!ShaderHandle::new(&[0, 1]).is_null());
    }
}
