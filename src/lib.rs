//! # rtbind
//!
//! Ray-tracing shader binding table assembly and binary pipeline archives.
//!
//! ## Modules
//!
//! - [`util`] - Errors and alignment helpers
//! - [`sbt`] - Shader group registry, acceleration-structure slot resolution
//!   and the binding table builder
//! - [`pipeline`] - Shader and pipeline descriptors, device traits and the
//!   CPU-only [`NullDevice`](pipeline::NullDevice)
//! - [`archive`] - Archive container, [`Archiver`](archive::Archiver) and
//!   [`Dearchiver`](archive::Dearchiver)
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rtbind::prelude::*;
//!
//! let device = NullDevice::new();
//! let mut dearchiver = Dearchiver::new();
//! dearchiver.load_archive_file("scene.rtba")?;
//! let pso = dearchiver.unpack_pipeline_state("PathTracer", PipelineType::RayTracing, &device)?;
//!
//! let registry = Arc::new(ShaderGroupRegistry::from_pipeline(device.sbt_layout(), &pso)?);
//! let mut sbt = BindingTableBuilder::new(registry);
//! sbt.bind_ray_gen("Main", &[])?;
//! sbt.bind_miss(0, "Sky", &[])?;
//! let table = sbt.build()?;
//! ```

pub mod util;
pub mod sbt;
pub mod pipeline;
pub mod archive;

// Re-export commonly used types
pub use util::{Error, Result};

/// Build date stamped by the build script.
pub const BUILD_DATE: &str = env!("RTBIND_BUILD_DATE");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, Result};
    pub use crate::sbt::{
        payload_bytes, BindingTable, BindingTableBuilder, BindingTarget, HitGroupBindingMode, SbtLayout, SbtTable,
        ShaderGroupKind, ShaderGroupRegistry, ShaderHandle, TlasBuildInfo, TlasInstance, TopLevelAs,
        TopLevelStructure,
    };
    pub use crate::pipeline::{
        DeviceObject, NullDevice, PipelineStateCreateInfo, PipelineStateDesc, PipelineType, RayTracingPipeline,
        RenderDevice, ShaderDesc, ShaderType,
    };
    pub use crate::archive::{Archiver, Dearchiver, EntryKind};
}
