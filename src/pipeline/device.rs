//! Rendering device capabilities consumed by the dearchiver and the binding
//! table registry.

use super::desc::{PipelineStateCreateInfo, ShaderDesc};
use crate::sbt::{SbtLayout, ShaderGroupKind, ShaderHandle};
use crate::util::Result;

/// Any named device object.
pub trait DeviceObject {
    /// Name the object was created with.
    fn name(&self) -> &str;
}

/// A shader group as enumerated from a created ray-tracing pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderGroupInfo {
    pub name: String,
    pub kind: ShaderGroupKind,
    pub handle: ShaderHandle,
}

/// A created ray-tracing pipeline.
pub trait RayTracingPipeline {
    /// Inline data size of every binding table record.
    fn shader_record_size(&self) -> u32;

    /// Shader groups in declaration order, with their device handles.
    fn shader_groups(&self) -> Vec<ShaderGroupInfo>;
}

/// Creates device objects from descriptors.
pub trait RenderDevice {
    type Shader: DeviceObject;
    type PipelineState: DeviceObject;

    /// Binding table layout of this backend.
    fn sbt_layout(&self) -> SbtLayout;

    fn create_shader(&self, desc: ShaderDesc) -> Result<Self::Shader>;

    fn create_pipeline_state(&self, info: PipelineStateCreateInfo) -> Result<Self::PipelineState>;
}
