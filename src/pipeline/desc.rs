//! Shader and pipeline-state descriptors.
//!
//! These are the values stored in archives and handed to a [`RenderDevice`]
//! for materialization.
//!
//! [`RenderDevice`]: super::RenderDevice

use std::fmt;

use crate::sbt::ShaderGroupKind;
use crate::util::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Shader stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShaderType {
    Vertex,
    Pixel,
    Geometry,
    Hull,
    Domain,
    Compute,
    Amplification,
    Mesh,
    RayGen,
    RayMiss,
    RayClosestHit,
    RayAnyHit,
    RayIntersection,
    Callable,
    Tile,
}

impl ShaderType {
    /// Check if this is a ray-tracing stage.
    pub fn is_ray_tracing(&self) -> bool {
        matches!(
            self,
            Self::RayGen
                | Self::RayMiss
                | Self::RayClosestHit
                | Self::RayAnyHit
                | Self::RayIntersection
                | Self::Callable
        )
    }
}

/// Source language the shader was authored in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShaderSourceLanguage {
    #[default]
    Default,
    Hlsl,
    Glsl,
    Msl,
    Wgsl,
}

/// Shader descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShaderDesc {
    pub name: String,
    pub shader_type: ShaderType,
    pub entry_point: String,
    pub source_language: ShaderSourceLanguage,
    /// Compiled device bytecode.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub bytecode: Vec<u8>,
}

impl ShaderDesc {
    /// Create a descriptor with entry point `main` and no bytecode.
    pub fn new(name: impl Into<String>, shader_type: ShaderType) -> Self {
        Self {
            name: name.into(),
            shader_type,
            entry_point: "main".to_string(),
            source_language: ShaderSourceLanguage::Default,
            bytecode: Vec::new(),
        }
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    pub fn with_language(mut self, language: ShaderSourceLanguage) -> Self {
        self.source_language = language;
        self
    }

    pub fn with_bytecode(mut self, bytecode: impl Into<Vec<u8>>) -> Self {
        self.bytecode = bytecode.into();
        self
    }

    /// Check the descriptor is usable.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid_desc("shader name is empty"));
        }
        if self.entry_point.is_empty() {
            return Err(Error::invalid_desc(format!("shader '{}' has no entry point", self.name)));
        }
        Ok(())
    }
}

/// Pipeline kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PipelineType {
    Graphics,
    Compute,
    Mesh,
    RayTracing,
    Tile,
}

impl PipelineType {
    /// Archive code of this type.
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Graphics => 0,
            Self::Compute => 1,
            Self::Mesh => 2,
            Self::RayTracing => 3,
            Self::Tile => 4,
        }
    }

    /// Decode an archive code.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Graphics),
            1 => Some(Self::Compute),
            2 => Some(Self::Mesh),
            3 => Some(Self::RayTracing),
            4 => Some(Self::Tile),
            _ => None,
        }
    }
}

impl fmt::Display for PipelineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Graphics => "graphics",
            Self::Compute => "compute",
            Self::Mesh => "mesh",
            Self::RayTracing => "ray-tracing",
            Self::Tile => "tile",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for PipelineType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "graphics" => Ok(Self::Graphics),
            "compute" => Ok(Self::Compute),
            "mesh" => Ok(Self::Mesh),
            "ray-tracing" | "raytracing" | "rt" => Ok(Self::RayTracing),
            "tile" => Ok(Self::Tile),
            other => Err(Error::other(format!("unknown pipeline type '{}'", other))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    TriangleStrip,
    LineList,
    LineStrip,
    PointList,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

/// Fixed-function state of graphics and mesh pipelines.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GraphicsPipelineDesc {
    pub topology: PrimitiveTopology,
    pub num_render_targets: u8,
    pub cull_mode: CullMode,
    pub depth_enable: bool,
}

impl Default for GraphicsPipelineDesc {
    fn default() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            num_render_targets: 1,
            cull_mode: CullMode::Back,
            depth_enable: true,
        }
    }
}

/// One shader group of a ray-tracing pipeline. Shaders are referenced by name.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShaderGroupDesc {
    pub name: String,
    pub kind: ShaderGroupKind,
    #[cfg_attr(feature = "serde", serde(default))]
    pub general: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub closest_hit: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub any_hit: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub intersection: Option<String>,
}

impl ShaderGroupDesc {
    /// Ray-gen, miss or callable group.
    pub fn general(name: impl Into<String>, shader: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ShaderGroupKind::General,
            general: Some(shader.into()),
            closest_hit: None,
            any_hit: None,
            intersection: None,
        }
    }

    /// Triangle hit group.
    pub fn triangle_hit(name: impl Into<String>, closest_hit: Option<&str>, any_hit: Option<&str>) -> Self {
        Self {
            name: name.into(),
            kind: ShaderGroupKind::TriangleHit,
            general: None,
            closest_hit: closest_hit.map(str::to_string),
            any_hit: any_hit.map(str::to_string),
            intersection: None,
        }
    }

    /// Procedural (AABB) hit group.
    pub fn procedural_hit(
        name: impl Into<String>,
        intersection: impl Into<String>,
        closest_hit: Option<&str>,
        any_hit: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ShaderGroupKind::ProceduralHit,
            general: None,
            closest_hit: closest_hit.map(str::to_string),
            any_hit: any_hit.map(str::to_string),
            intersection: Some(intersection.into()),
        }
    }

    /// Shader names this group references.
    pub fn shader_names(&self) -> impl Iterator<Item = &str> {
        [&self.general, &self.closest_hit, &self.any_hit, &self.intersection]
            .into_iter()
            .filter_map(|s| s.as_deref())
    }
}

/// Ray-tracing specific pipeline state.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RayTracingPipelineDesc {
    /// Inline data size of every binding table record.
    pub shader_record_size: u16,
    pub max_recursion_depth: u8,
    pub groups: Vec<ShaderGroupDesc>,
}

/// Pipeline-state descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PipelineStateDesc {
    pub name: String,
    pub pipeline_type: PipelineType,
    /// Stage shaders by name (graphics, mesh, compute, tile).
    #[cfg_attr(feature = "serde", serde(default))]
    pub shaders: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub graphics: Option<GraphicsPipelineDesc>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub ray_tracing: Option<RayTracingPipelineDesc>,
}

impl PipelineStateDesc {
    pub fn new(name: impl Into<String>, pipeline_type: PipelineType) -> Self {
        Self {
            name: name.into(),
            pipeline_type,
            shaders: Vec::new(),
            graphics: None,
            ray_tracing: None,
        }
    }

    pub fn with_shader(mut self, shader: impl Into<String>) -> Self {
        self.shaders.push(shader.into());
        self
    }

    pub fn with_graphics(mut self, graphics: GraphicsPipelineDesc) -> Self {
        self.graphics = Some(graphics);
        self
    }

    pub fn with_ray_tracing(mut self, ray_tracing: RayTracingPipelineDesc) -> Self {
        self.ray_tracing = Some(ray_tracing);
        self
    }

    /// Every shader name the pipeline references, first occurrence order.
    pub fn referenced_shaders(&self) -> Vec<&str> {
        let groups = self
            .ray_tracing
            .iter()
            .flat_map(|rt| rt.groups.iter().flat_map(|g| g.shader_names()));
        let mut out: Vec<&str> = Vec::new();
        for name in self.shaders.iter().map(String::as_str).chain(groups) {
            if !out.contains(&name) {
                out.push(name);
            }
        }
        out
    }

    /// Check the descriptor is self-consistent.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid_desc("pipeline name is empty"));
        }
        match self.pipeline_type {
            PipelineType::RayTracing => {
                if self.ray_tracing.is_none() {
                    return Err(Error::invalid_desc(format!(
                        "ray-tracing pipeline '{}' has no ray-tracing state",
                        self.name
                    )));
                }
            }
            _ => {
                if self.ray_tracing.is_some() {
                    return Err(Error::invalid_desc(format!(
                        "{} pipeline '{}' carries ray-tracing state",
                        self.pipeline_type, self.name
                    )));
                }
            }
        }
        if self.graphics.is_some()
            && !matches!(self.pipeline_type, PipelineType::Graphics | PipelineType::Mesh)
        {
            return Err(Error::invalid_desc(format!(
                "{} pipeline '{}' carries graphics state",
                self.pipeline_type, self.name
            )));
        }
        Ok(())
    }
}

/// Everything a device needs to create a pipeline state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineStateCreateInfo {
    pub desc: PipelineStateDesc,
    /// Descriptors of every referenced shader.
    pub shaders: Vec<ShaderDesc>,
}

impl PipelineStateCreateInfo {
    /// Find a referenced shader by name.
    pub fn shader(&self, name: &str) -> Option<&ShaderDesc> {
        self.shaders.iter().find(|s| s.name == name)
    }
}
