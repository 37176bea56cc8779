//! Ray-tracing shader binding tables.
//!
//! ## Layout
//!
//! ```text
//! +-----------------+  offset 0
//! | ray-gen (1)     |  handle | payload | pad
//! +-----------------+  aligned to base_alignment
//! | miss (N)        |
//! +-----------------+  aligned to base_alignment
//! | hit (M)         |
//! +-----------------+  aligned to base_alignment
//! | callable (K)    |
//! +-----------------+
//! ```
//!
//! Each sub-table's stride is the handle size plus the largest inline payload
//! of the groups it may hold, rounded up to `handle_alignment`.

mod builder;
mod layout;
mod registry;
mod table;
mod tlas;

pub use builder::{payload_bytes, BindingTableBuilder, BindingTarget};
pub use layout::{SbtLayout, SbtTable, ShaderGroupKind, ShaderHandle, DEFAULT_MAX_RECORDS};
pub use registry::{ShaderGroupRecord, ShaderGroupRegistry};
pub use table::{BindingTable, SbtRegion};
pub use tlas::{
    resolve_geometry, resolve_instance, resolve_structure, HitGroupBindingMode, InstanceSlots,
    TlasBuildInfo, TlasInstance, TopLevelAs, TopLevelStructure,
};
