//! Binary encoding of shader and pipeline-state descriptors.
//!
//! Shader payload:
//! ```text
//! shader type u8 | language u8 | name str16 | entry point str16 | bytecode blob32
//! ```
//!
//! Pipeline payload:
//! ```text
//! pipeline type u8 | name str16 | shader count u16 | shader names str16...
//! graphics flag u8 [topology u8 | render targets u8 | cull u8 | depth u8]
//! ray-tracing flag u8 [record size u16 | recursion u8 | group count u16 | groups...]
//! group: name str16 | kind u8 | presence mask u8 | present shader names str16...
//! ```

use super::stream::{IStream, OStream};
use crate::pipeline::{
    CullMode, GraphicsPipelineDesc, PipelineStateDesc, PipelineType, PrimitiveTopology, RayTracingPipelineDesc,
    ShaderDesc, ShaderGroupDesc, ShaderSourceLanguage, ShaderType,
};
use crate::sbt::ShaderGroupKind;
use crate::util::{Error, Result};

// ============================================================================
// Enum codes
// ============================================================================

const SHADER_TYPES: [ShaderType; 15] = [
    ShaderType::Vertex,
    ShaderType::Pixel,
    ShaderType::Geometry,
    ShaderType::Hull,
    ShaderType::Domain,
    ShaderType::Compute,
    ShaderType::Amplification,
    ShaderType::Mesh,
    ShaderType::RayGen,
    ShaderType::RayMiss,
    ShaderType::RayClosestHit,
    ShaderType::RayAnyHit,
    ShaderType::RayIntersection,
    ShaderType::Callable,
    ShaderType::Tile,
];

const LANGUAGES: [ShaderSourceLanguage; 5] = [
    ShaderSourceLanguage::Default,
    ShaderSourceLanguage::Hlsl,
    ShaderSourceLanguage::Glsl,
    ShaderSourceLanguage::Msl,
    ShaderSourceLanguage::Wgsl,
];

const TOPOLOGIES: [PrimitiveTopology; 5] = [
    PrimitiveTopology::TriangleList,
    PrimitiveTopology::TriangleStrip,
    PrimitiveTopology::LineList,
    PrimitiveTopology::LineStrip,
    PrimitiveTopology::PointList,
];

const CULL_MODES: [CullMode; 3] = [CullMode::None, CullMode::Front, CullMode::Back];

const GROUP_KINDS: [ShaderGroupKind; 3] = [
    ShaderGroupKind::General,
    ShaderGroupKind::TriangleHit,
    ShaderGroupKind::ProceduralHit,
];

fn encode_code<T: PartialEq>(table: &[T], value: &T) -> u8 {
    table.iter().position(|v| v == value).unwrap_or(0) as u8
}

fn decode_code<T: Copy>(table: &[T], code: u8, what: &str) -> Result<T> {
    table
        .get(code as usize)
        .copied()
        .ok_or_else(|| Error::corrupt(format!("unknown {} code {}", what, code)))
}

const GROUP_HAS_GENERAL: u8 = 1 << 0;
const GROUP_HAS_CLOSEST_HIT: u8 = 1 << 1;
const GROUP_HAS_ANY_HIT: u8 = 1 << 2;
const GROUP_HAS_INTERSECTION: u8 = 1 << 3;

// ============================================================================
// Shaders
// ============================================================================

/// Encode a shader descriptor.
pub fn encode_shader(desc: &ShaderDesc) -> Result<Vec<u8>> {
    let mut out = OStream::new(Vec::with_capacity(16 + desc.name.len() + desc.bytecode.len()));
    out.write_u8(encode_code(&SHADER_TYPES, &desc.shader_type))?;
    out.write_u8(encode_code(&LANGUAGES, &desc.source_language))?;
    out.write_str16(&desc.name)?;
    out.write_str16(&desc.entry_point)?;
    out.write_blob32(&desc.bytecode)?;
    out.finish()
}

/// Decode a shader descriptor. The whole payload must be consumed.
pub fn decode_shader(data: &[u8]) -> Result<ShaderDesc> {
    let mut s = IStream::new(data, "shader payload");
    let shader_type = decode_code(&SHADER_TYPES, s.read_u8()?, "shader type")?;
    let source_language = decode_code(&LANGUAGES, s.read_u8()?, "source language")?;
    let name = s.read_str16()?;
    let entry_point = s.read_str16()?;
    let bytecode = s.read_blob32()?;
    s.expect_end()?;
    Ok(ShaderDesc {
        name,
        shader_type,
        entry_point,
        source_language,
        bytecode,
    })
}

// ============================================================================
// Pipeline states
// ============================================================================

fn write_count<W: std::io::Write>(out: &mut OStream<W>, count: usize, what: &str) -> Result<()> {
    let count = u16::try_from(count).map_err(|_| Error::invalid_desc(format!("too many {} ({})", what, count)))?;
    out.write_u16(count)
}

/// Encode a pipeline-state descriptor.
pub fn encode_pipeline_state(desc: &PipelineStateDesc) -> Result<Vec<u8>> {
    let mut out = OStream::memory();
    out.write_u8(desc.pipeline_type.as_u8())?;
    out.write_str16(&desc.name)?;

    write_count(&mut out, desc.shaders.len(), "stage shaders")?;
    for shader in &desc.shaders {
        out.write_str16(shader)?;
    }

    match &desc.graphics {
        Some(g) => {
            out.write_u8(1)?;
            out.write_u8(encode_code(&TOPOLOGIES, &g.topology))?;
            out.write_u8(g.num_render_targets)?;
            out.write_u8(encode_code(&CULL_MODES, &g.cull_mode))?;
            out.write_u8(g.depth_enable as u8)?;
        }
        None => out.write_u8(0)?,
    }

    match &desc.ray_tracing {
        Some(rt) => {
            out.write_u8(1)?;
            out.write_u16(rt.shader_record_size)?;
            out.write_u8(rt.max_recursion_depth)?;
            write_count(&mut out, rt.groups.len(), "shader groups")?;
            for group in &rt.groups {
                encode_group(&mut out, group)?;
            }
        }
        None => out.write_u8(0)?,
    }
    out.finish()
}

fn encode_group<W: std::io::Write>(out: &mut OStream<W>, group: &ShaderGroupDesc) -> Result<()> {
    out.write_str16(&group.name)?;
    out.write_u8(encode_code(&GROUP_KINDS, &group.kind))?;

    let slots = [
        (GROUP_HAS_GENERAL, &group.general),
        (GROUP_HAS_CLOSEST_HIT, &group.closest_hit),
        (GROUP_HAS_ANY_HIT, &group.any_hit),
        (GROUP_HAS_INTERSECTION, &group.intersection),
    ];
    let mask = slots
        .iter()
        .filter(|(_, name)| name.is_some())
        .fold(0u8, |m, (bit, _)| m | bit);
    out.write_u8(mask)?;
    for name in slots.iter().filter_map(|(_, name)| name.as_deref()) {
        out.write_str16(name)?;
    }
    Ok(())
}

fn read_flag(s: &mut IStream<'_>, what: &str) -> Result<bool> {
    match s.read_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        v => Err(Error::corrupt(format!("invalid {} flag {}", what, v))),
    }
}

/// Decode a pipeline-state descriptor. The whole payload must be consumed.
pub fn decode_pipeline_state(data: &[u8]) -> Result<PipelineStateDesc> {
    let mut s = IStream::new(data, "pipeline payload");
    let code = s.read_u8()?;
    let pipeline_type =
        PipelineType::from_u8(code).ok_or_else(|| Error::corrupt(format!("unknown pipeline type code {}", code)))?;
    let name = s.read_str16()?;

    let shader_count = s.read_u16()? as usize;
    let mut shaders = Vec::with_capacity(shader_count.min(64));
    for _ in 0..shader_count {
        shaders.push(s.read_str16()?);
    }

    let graphics = if read_flag(&mut s, "graphics")? {
        Some(GraphicsPipelineDesc {
            topology: decode_code(&TOPOLOGIES, s.read_u8()?, "topology")?,
            num_render_targets: s.read_u8()?,
            cull_mode: decode_code(&CULL_MODES, s.read_u8()?, "cull mode")?,
            depth_enable: read_flag(&mut s, "depth")?,
        })
    } else {
        None
    };

    let ray_tracing = if read_flag(&mut s, "ray-tracing")? {
        let shader_record_size = s.read_u16()?;
        let max_recursion_depth = s.read_u8()?;
        let group_count = s.read_u16()? as usize;
        let mut groups = Vec::with_capacity(group_count.min(64));
        for _ in 0..group_count {
            groups.push(decode_group(&mut s)?);
        }
        Some(RayTracingPipelineDesc {
            shader_record_size,
            max_recursion_depth,
            groups,
        })
    } else {
        None
    };

    s.expect_end()?;
    Ok(PipelineStateDesc {
        name,
        pipeline_type,
        shaders,
        graphics,
        ray_tracing,
    })
}

fn decode_group(s: &mut IStream<'_>) -> Result<ShaderGroupDesc> {
    let name = s.read_str16()?;
    let kind = decode_code(&GROUP_KINDS, s.read_u8()?, "shader group kind")?;
    let mask = s.read_u8()?;
    if mask & !0x0F != 0 {
        return Err(Error::corrupt(format!("group '{}' has unknown shader mask {:#04x}", name, mask)));
    }

    let mut read_if = |bit: u8| -> Result<Option<String>> {
        if mask & bit != 0 {
            Ok(Some(s.read_str16()?))
        } else {
            Ok(None)
        }
    };
    let general = read_if(GROUP_HAS_GENERAL)?;
    let closest_hit = read_if(GROUP_HAS_CLOSEST_HIT)?;
    let any_hit = read_if(GROUP_HAS_ANY_HIT)?;
    let intersection = read_if(GROUP_HAS_INTERSECTION)?;

    Ok(ShaderGroupDesc {
        name,
        kind,
        general,
        closest_hit,
        any_hit,
        intersection,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rt_pipeline() -> PipelineStateDesc {
        PipelineStateDesc::new("PathTracer", PipelineType::RayTracing).with_ray_tracing(RayTracingPipelineDesc {
            shader_record_size: 16,
            max_recursion_depth: 2,
            groups: vec![
                ShaderGroupDesc::general("Main", "RayGen"),
                ShaderGroupDesc::general("Sky", "Miss"),
                ShaderGroupDesc::procedural_hit("Sphere", "SphereIsect", Some("CHit"), Some("AHit")),
            ],
        })
    }

    #[test]
    fn test_shader_payload() -> Result<()> {
        let desc = ShaderDesc::new("Blur", ShaderType::Compute)
            .with_entry_point("CSMain")
            .with_language(ShaderSourceLanguage::Hlsl)
            .with_bytecode(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        let bytes = encode_shader(&desc)?;
        assert_eq!(bytes[0], 5);
        assert_eq!(bytes[1], 1);
        assert_eq!(decode_shader(&bytes)?, desc);
        Ok(())
    }

    #[test]
    fn test_pipeline_payload() -> Result<()> {
        let desc = rt_pipeline();
        assert_eq!(decode_pipeline_state(&encode_pipeline_state(&desc)?)?, desc);

        let gfx = PipelineStateDesc::new("Opaque", PipelineType::Graphics)
            .with_shader("VS")
            .with_shader("PS")
            .with_graphics(GraphicsPipelineDesc {
                topology: PrimitiveTopology::LineStrip,
                num_render_targets: 3,
                cull_mode: CullMode::None,
                depth_enable: false,
            });
        assert_eq!(decode_pipeline_state(&encode_pipeline_state(&gfx)?)?, gfx);
        Ok(())
    }

    #[test]
    fn test_trailing_and_truncated() -> Result<()> {
        let mut bytes = encode_shader(&ShaderDesc::new("VS", ShaderType::Vertex))?;
        bytes.push(0);
        assert!(matches!(decode_shader(&bytes), Err(Error::CorruptArchive(_))));

        let bytes = encode_pipeline_state(&rt_pipeline())?;
        let err = decode_pipeline_state(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(_)));
        Ok(())
    }

    #[test]
    fn test_unknown_codes() {
        assert!(matches!(decode_shader(&[99, 0]), Err(Error::CorruptArchive(_))));
        assert!(matches!(decode_pipeline_state(&[42]), Err(Error::CorruptArchive(_))));
    }
}
