//! Device model: descriptors, device capability traits, and a CPU-only
//! reference backend.

mod desc;
mod device;
mod null_device;

pub use desc::*;
pub use device::{DeviceObject, RayTracingPipeline, RenderDevice, ShaderGroupInfo};
pub use null_device::{NullDevice, NullPipelineState, NullShader};
