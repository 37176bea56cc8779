//! CPU-only device that validates descriptors and hands out deterministic
//! shader group handles. Used by the CLI and tests.

use std::collections::HashSet;
use std::sync::Arc;

use xxhash_rust::xxh3::xxh3_64_with_seed;

use super::desc::{PipelineStateCreateInfo, PipelineStateDesc, PipelineType, ShaderDesc, ShaderType};
use super::device::{DeviceObject, RayTracingPipeline, RenderDevice, ShaderGroupInfo};
use crate::sbt::{SbtLayout, ShaderGroupKind, ShaderHandle};
use crate::util::{Error, Result};

/// Device without a GPU behind it.
#[derive(Clone, Debug, Default)]
pub struct NullDevice {
    layout: SbtLayout,
}

impl NullDevice {
    /// Device with the default binding table layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Device reporting a custom binding table layout.
    pub fn with_layout(layout: SbtLayout) -> Result<Self> {
        layout.validate()?;
        Ok(Self { layout })
    }

    /// Derive a non-null handle from pipeline and group names.
    fn group_handle(&self, pipeline: &str, group: &str) -> ShaderHandle {
        let key = format!("{}/{}", pipeline, group);
        let size = self.layout.handle_size as usize;
        let mut bytes = Vec::with_capacity(size + 8);
        let mut seed = 0u64;
        while bytes.len() < size {
            bytes.extend_from_slice(&xxh3_64_with_seed(key.as_bytes(), seed).to_le_bytes());
            seed += 1;
        }
        bytes.truncate(size);
        if bytes.iter().all(|&b| b == 0) {
            bytes[0] = 1;
        }
        ShaderHandle::new(&bytes)
    }

    fn check_stage(info: &PipelineStateCreateInfo, group: &str, shader: &str, allowed: &[ShaderType]) -> Result<()> {
        let desc = info
            .shader(shader)
            .ok_or_else(|| Error::invalid_desc(format!("group '{}' references missing shader '{}'", group, shader)))?;
        if !allowed.contains(&desc.shader_type) {
            return Err(Error::TypeMismatch {
                expected: format!("{:?}", allowed),
                actual: format!("{:?} ('{}' in group '{}')", desc.shader_type, shader, group),
            });
        }
        Ok(())
    }

    fn ray_tracing_groups(&self, info: &PipelineStateCreateInfo) -> Result<Vec<ShaderGroupInfo>> {
        let rt = match &info.desc.ray_tracing {
            Some(rt) => rt,
            None => return Ok(Vec::new()),
        };

        let mut names = HashSet::new();
        let mut groups = Vec::with_capacity(rt.groups.len());
        for g in &rt.groups {
            if !names.insert(g.name.as_str()) {
                return Err(Error::DuplicateName(g.name.clone()));
            }
            match g.kind {
                ShaderGroupKind::General => {
                    let shader = g.general.as_deref().ok_or_else(|| {
                        Error::invalid_desc(format!("general group '{}' has no shader", g.name))
                    })?;
                    Self::check_stage(
                        info,
                        &g.name,
                        shader,
                        &[ShaderType::RayGen, ShaderType::RayMiss, ShaderType::Callable],
                    )?;
                }
                ShaderGroupKind::TriangleHit | ShaderGroupKind::ProceduralHit => {
                    if g.kind == ShaderGroupKind::ProceduralHit {
                        let isect = g.intersection.as_deref().ok_or_else(|| {
                            Error::invalid_desc(format!("procedural group '{}' has no intersection shader", g.name))
                        })?;
                        Self::check_stage(info, &g.name, isect, &[ShaderType::RayIntersection])?;
                    } else if g.closest_hit.is_none() && g.any_hit.is_none() {
                        return Err(Error::invalid_desc(format!("hit group '{}' has no shaders", g.name)));
                    }
                    if let Some(chit) = g.closest_hit.as_deref() {
                        Self::check_stage(info, &g.name, chit, &[ShaderType::RayClosestHit])?;
                    }
                    if let Some(ahit) = g.any_hit.as_deref() {
                        Self::check_stage(info, &g.name, ahit, &[ShaderType::RayAnyHit])?;
                    }
                }
            }
            groups.push(ShaderGroupInfo {
                name: g.name.clone(),
                kind: g.kind,
                handle: self.group_handle(&info.desc.name, &g.name),
            });
        }

        if !groups.iter().any(|g| g.kind == ShaderGroupKind::General) {
            return Err(Error::invalid_desc(format!(
                "ray-tracing pipeline '{}' has no general shader group",
                info.desc.name
            )));
        }
        Ok(groups)
    }
}

/// Shader created by [`NullDevice`].
#[derive(Clone, Debug)]
pub struct NullShader {
    desc: Arc<ShaderDesc>,
}

impl NullShader {
    pub fn desc(&self) -> &ShaderDesc {
        &self.desc
    }
}

impl DeviceObject for NullShader {
    fn name(&self) -> &str {
        &self.desc.name
    }
}

/// Pipeline state created by [`NullDevice`].
#[derive(Clone, Debug)]
pub struct NullPipelineState {
    desc: Arc<PipelineStateDesc>,
    shaders: Vec<NullShader>,
    groups: Vec<ShaderGroupInfo>,
}

impl NullPipelineState {
    pub fn desc(&self) -> &PipelineStateDesc {
        &self.desc
    }

    /// Shaders the pipeline was created with.
    pub fn shaders(&self) -> &[NullShader] {
        &self.shaders
    }
}

impl DeviceObject for NullPipelineState {
    fn name(&self) -> &str {
        &self.desc.name
    }
}

impl RayTracingPipeline for NullPipelineState {
    fn shader_record_size(&self) -> u32 {
        self.desc
            .ray_tracing
            .as_ref()
            .map(|rt| rt.shader_record_size as u32)
            .unwrap_or(0)
    }

    fn shader_groups(&self) -> Vec<ShaderGroupInfo> {
        self.groups.clone()
    }
}

impl RenderDevice for NullDevice {
    type Shader = NullShader;
    type PipelineState = NullPipelineState;

    fn sbt_layout(&self) -> SbtLayout {
        self.layout
    }

    fn create_shader(&self, desc: ShaderDesc) -> Result<NullShader> {
        desc.validate()?;
        tracing::trace!(shader = %desc.name, "null device: create shader");
        Ok(NullShader { desc: Arc::new(desc) })
    }

    fn create_pipeline_state(&self, info: PipelineStateCreateInfo) -> Result<NullPipelineState> {
        info.desc.validate()?;
        for name in info.desc.referenced_shaders() {
            if info.shader(name).is_none() {
                return Err(Error::invalid_desc(format!(
                    "pipeline '{}' references missing shader '{}'",
                    info.desc.name, name
                )));
            }
        }
        if info.desc.pipeline_type == PipelineType::Compute {
            let compute = info
                .desc
                .shaders
                .iter()
                .filter(|s| info.shader(s).is_some_and(|d| d.shader_type == ShaderType::Compute))
                .count();
            if compute != 1 {
                return Err(Error::invalid_desc(format!(
                    "compute pipeline '{}' needs exactly one compute shader, found {}",
                    info.desc.name, compute
                )));
            }
        }

        let groups = self.ray_tracing_groups(&info)?;
        let shaders = info
            .shaders
            .into_iter()
            .map(|d| self.create_shader(d))
            .collect::<Result<Vec<_>>>()?;

        tracing::trace!(pipeline = %info.desc.name, groups = groups.len(), "null device: create pipeline");
        Ok(NullPipelineState {
            desc: Arc::new(info.desc),
            shaders,
            groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{RayTracingPipelineDesc, ShaderGroupDesc};

    fn rt_info() -> PipelineStateCreateInfo {
        PipelineStateCreateInfo {
            desc: PipelineStateDesc::new("RT", PipelineType::RayTracing).with_ray_tracing(RayTracingPipelineDesc {
                shader_record_size: 16,
                max_recursion_depth: 1,
                groups: vec![
                    ShaderGroupDesc::general("Main", "RayGen"),
                    ShaderGroupDesc::triangle_hit("Hit", Some("CHit"), None),
                ],
            }),
            shaders: vec![
                ShaderDesc::new("RayGen", ShaderType::RayGen),
                ShaderDesc::new("CHit", ShaderType::RayClosestHit),
            ],
        }
    }

    #[test]
    fn test_ray_tracing_pipeline_groups() {
        let device = NullDevice::new();
        let pso = device.create_pipeline_state(rt_info()).unwrap();
        assert_eq!(pso.name(), "RT");
        assert_eq!(pso.shader_record_size(), 16);

        let groups = pso.shader_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].kind, ShaderGroupKind::TriangleHit);
        assert_eq!(groups[0].handle.len(), 32);
        assert!(!groups[0].handle.is_null());
        assert_ne!(groups[0].handle, groups[1].handle);

        // Deterministic across creations.
        let again = device.create_pipeline_state(rt_info()).unwrap();
        assert_eq!(again.shader_groups(), groups);
    }

    #[test]
    fn test_stage_mismatch() {
        let mut info = rt_info();
        info.shaders[1].shader_type = ShaderType::Pixel;
        let err = NullDevice::new().create_pipeline_state(info).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_missing_shader() {
        let mut info = rt_info();
        info.shaders.pop();
        let err = NullDevice::new().create_pipeline_state(info).unwrap_err();
        assert!(matches!(err, Error::InvalidDescriptor(_)));
    }

    #[test]
    fn test_compute_needs_one_shader() {
        let device = NullDevice::new();
        let info = PipelineStateCreateInfo {
            desc: PipelineStateDesc::new("C", PipelineType::Compute).with_shader("CS"),
            shaders: vec![ShaderDesc::new("CS", ShaderType::Compute)],
        };
        assert!(device.create_pipeline_state(info).is_ok());

        let info = PipelineStateCreateInfo {
            desc: PipelineStateDesc::new("C", PipelineType::Compute),
            shaders: vec![],
        };
        assert!(device.create_pipeline_state(info).is_err());
    }
}
