//! Integration tests for archiving and dearchiving pipelines.

use std::sync::Arc;

use rtbind::archive::{Archiver, Dearchiver, EntryKind, HEADER_SIZE};
use rtbind::pipeline::{
    DeviceObject, GraphicsPipelineDesc, NullDevice, PipelineStateDesc, PipelineType, RayTracingPipeline,
    RayTracingPipelineDesc, RenderDevice, ShaderDesc, ShaderGroupDesc, ShaderSourceLanguage, ShaderType,
};
use rtbind::sbt::{BindingTableBuilder, SbtTable, ShaderGroupRegistry};
use rtbind::{Error, Result};

use tempfile::NamedTempFile;

fn cube_archiver() -> Archiver {
    let mut archiver = Archiver::new();
    archiver.set_content_version(2);
    archiver
        .add_shader(
            ShaderDesc::new("Cube vertex shader", ShaderType::Vertex)
                .with_language(ShaderSourceLanguage::Hlsl)
                .with_bytecode(vec![0x56; 512]),
        )
        .unwrap();
    archiver
        .add_shader(
            ShaderDesc::new("Cube pixel shader", ShaderType::Pixel)
                .with_language(ShaderSourceLanguage::Hlsl)
                .with_bytecode(vec![0x50; 512]),
        )
        .unwrap();
    archiver
        .add_pipeline_state(
            PipelineStateDesc::new("Cube Graphics PSO", PipelineType::Graphics)
                .with_shader("Cube vertex shader")
                .with_shader("Cube pixel shader")
                .with_graphics(GraphicsPipelineDesc::default()),
        )
        .unwrap();
    archiver
}

fn ray_tracing_archiver() -> Archiver {
    let mut archiver = Archiver::new();
    for (name, ty) in [
        ("RayGen", ShaderType::RayGen),
        ("Miss", ShaderType::RayMiss),
        ("CHit", ShaderType::RayClosestHit),
        ("Isect", ShaderType::RayIntersection),
    ] {
        archiver.add_shader(ShaderDesc::new(name, ty)).unwrap();
    }
    archiver
        .add_pipeline_state(
            PipelineStateDesc::new("PathTracer", PipelineType::RayTracing).with_ray_tracing(
                RayTracingPipelineDesc {
                    shader_record_size: 16,
                    max_recursion_depth: 1,
                    groups: vec![
                        ShaderGroupDesc::general("Main", "RayGen"),
                        ShaderGroupDesc::general("Sky", "Miss"),
                        ShaderGroupDesc::triangle_hit("Opaque", Some("CHit"), None),
                        ShaderGroupDesc::procedural_hit("Sphere", "Isect", Some("CHit"), None),
                    ],
                },
            ),
        )
        .unwrap();
    archiver
}

fn loaded(bytes: Vec<u8>) -> Dearchiver {
    let mut dearchiver = Dearchiver::new();
    dearchiver.load_archive(bytes).expect("archive loads");
    dearchiver
}

#[test]
fn test_unpack_graphics_pipeline_and_shaders() -> Result<()> {
    let dearchiver = loaded(cube_archiver().serialize()?);
    let device = NullDevice::new();

    let pso = dearchiver.unpack_pipeline_state("Cube Graphics PSO", PipelineType::Graphics, &device)?;
    assert_eq!(pso.name(), "Cube Graphics PSO");
    assert_eq!(pso.shaders().len(), 2);
    assert_eq!(pso.desc().graphics, Some(GraphicsPipelineDesc::default()));

    let vs = dearchiver.unpack_shader("Cube vertex shader", &device)?;
    assert_eq!(vs.name(), "Cube vertex shader");
    assert_eq!(vs.desc().shader_type, ShaderType::Vertex);
    assert_eq!(vs.desc().bytecode, vec![0x56; 512]);
    Ok(())
}

#[test]
fn test_repeated_unpack_yields_independent_objects() -> Result<()> {
    let dearchiver = loaded(cube_archiver().serialize()?);
    let device = NullDevice::new();

    let first = dearchiver.unpack_shader("Cube vertex shader", &device)?;
    let second = dearchiver.unpack_shader("Cube vertex shader", &device)?;
    assert_eq!(first.desc(), second.desc());
    assert!(!std::ptr::eq(first.desc(), second.desc()));

    let pso_a = dearchiver.unpack_pipeline_state("Cube Graphics PSO", PipelineType::Graphics, &device)?;
    let pso_b = dearchiver.unpack_pipeline_state("Cube Graphics PSO", PipelineType::Graphics, &device)?;
    assert_eq!(pso_a.desc(), pso_b.desc());
    assert!(!std::ptr::eq(pso_a.desc(), pso_b.desc()));

    // Entries stay in the archive after unpacking.
    assert_eq!(dearchiver.entries()?.len(), 3);
    Ok(())
}

#[test]
fn test_rename_through_mutation() -> Result<()> {
    let dearchiver = loaded(cube_archiver().serialize()?);
    let device = NullDevice::new();

    let shader = dearchiver.unpack_shader_with("Cube pixel shader", &device, |desc| {
        desc.name = "ModifiedName".into();
    })?;
    assert_eq!(shader.name(), "ModifiedName");

    let pso = dearchiver.unpack_pipeline_state_with("Cube Graphics PSO", PipelineType::Graphics, &device, |info| {
        info.desc.name = "ModifiedName".into();
    })?;
    assert_eq!(pso.name(), "ModifiedName");

    // Mutation does not touch the archive: later unpacks see the stored name.
    let original = dearchiver.unpack_shader("Cube pixel shader", &device)?;
    assert_eq!(original.name(), "Cube pixel shader");
    assert_eq!(shader.desc().bytecode, original.desc().bytecode);
    Ok(())
}

#[test]
fn test_lookup_errors() -> Result<()> {
    let dearchiver = loaded(cube_archiver().serialize()?);
    let device = NullDevice::new();

    let err = dearchiver
        .unpack_pipeline_state("Cube Graphics PSO", PipelineType::Compute, &device)
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));

    let err = dearchiver.unpack_shader("Missing", &device).unwrap_err();
    assert!(matches!(
        err,
        Error::EntryNotFound { kind: EntryKind::Shader, ref name } if name == "Missing"
    ));

    // Names are looked up per kind.
    let err = dearchiver
        .unpack_pipeline_state("Cube vertex shader", PipelineType::Graphics, &device)
        .unwrap_err();
    assert!(matches!(err, Error::EntryNotFound { kind: EntryKind::PipelineState, .. }));
    assert!(dearchiver.is_loaded());
    Ok(())
}

#[test]
fn test_corrupt_and_reload() -> Result<()> {
    let bytes = cube_archiver().serialize()?;

    let mut dearchiver = Dearchiver::new();
    let err = dearchiver.load_archive(&bytes[..HEADER_SIZE - 4]).unwrap_err();
    assert!(matches!(err, Error::CorruptArchive(_)));
    assert!(!dearchiver.is_loaded());

    let mut flipped = bytes.clone();
    let mid = HEADER_SIZE + (flipped.len() - HEADER_SIZE) / 2;
    flipped[mid] ^= 0x5A;
    assert!(matches!(dearchiver.load_archive(flipped), Err(Error::CorruptArchive(_))));

    let mut truncated_body = bytes.clone();
    truncated_body.truncate(bytes.len() - 1);
    assert!(matches!(dearchiver.load_archive(truncated_body), Err(Error::CorruptArchive(_))));

    dearchiver.load_archive(bytes.clone())?;
    assert!(matches!(dearchiver.load_archive(bytes.clone()), Err(Error::AlreadyLoaded)));

    dearchiver.reset();
    dearchiver.load_archive(Arc::<[u8]>::from(bytes))?;
    assert_eq!(dearchiver.content_version()?, 2);
    Ok(())
}

#[test]
fn test_uncompressed_matches_compressed() -> Result<()> {
    let compressed = cube_archiver().serialize()?;
    let mut raw_archiver = cube_archiver();
    raw_archiver.set_compression_level(0);
    let raw = raw_archiver.serialize()?;
    assert!(compressed.len() < raw.len());

    let a = loaded(compressed);
    let b = loaded(raw);
    assert!(a.entries()?.iter().any(|e| e.compressed));
    assert!(b.entries()?.iter().all(|e| !e.compressed));

    for name in ["Cube vertex shader", "Cube pixel shader"] {
        assert_eq!(a.decode_shader(name)?, b.decode_shader(name)?);
    }
    assert_eq!(
        a.decode_pipeline_state("Cube Graphics PSO", PipelineType::Graphics)?,
        b.decode_pipeline_state("Cube Graphics PSO", PipelineType::Graphics)?
    );
    Ok(())
}

#[test]
fn test_load_from_file() -> Result<()> {
    let temp = NamedTempFile::new()?;
    cube_archiver().write_to(temp.path())?;

    let mut dearchiver = Dearchiver::new();
    dearchiver.load_archive_file(temp.path())?;
    assert_eq!(dearchiver.entries()?.len(), 3);

    let info = dearchiver.decode_pipeline_state("Cube Graphics PSO", PipelineType::Graphics)?;
    let names: Vec<&str> = info.shaders.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["Cube vertex shader", "Cube pixel shader"]);

    let missing = temp.path().with_extension("missing");
    let mut other = Dearchiver::new();
    assert!(matches!(other.load_archive_file(&missing), Err(Error::FileNotFound(_))));
    Ok(())
}

#[test]
fn test_ray_tracing_pipeline_feeds_binding_table() -> Result<()> {
    let dearchiver = loaded(ray_tracing_archiver().serialize()?);
    let device = NullDevice::new();
    let pso = dearchiver.unpack_pipeline_state("PathTracer", PipelineType::RayTracing, &device)?;
    assert_eq!(pso.shader_record_size(), 16);

    let registry = Arc::new(ShaderGroupRegistry::from_pipeline(device.sbt_layout(), &pso)?);
    assert_eq!(registry.len(), 4);

    let mut sbt = BindingTableBuilder::new(Arc::clone(&registry));
    sbt.bind_ray_gen("Main", &[1; 16])?;
    sbt.bind_miss(0, "Sky", &[2; 16])?;
    sbt.bind_hit_group_by_index(0, "Opaque", &[3; 16])?;
    sbt.bind_hit_group_by_index(1, "Sphere", &[4; 16])?;
    sbt.verify()?;

    let table = sbt.build()?;
    let sphere = registry.lookup("Sphere")?;
    let record = table.record(SbtTable::Hit, 1).expect("hit record");
    assert_eq!(&record[..32], sphere.handle.as_bytes());
    assert_eq!(&record[32..48], &[4; 16]);
    Ok(())
}

#[test]
fn test_device_rejects_invalid_pipeline() -> Result<()> {
    let dearchiver = loaded(ray_tracing_archiver().serialize()?);
    let device = NullDevice::new();

    // Dropping the only general groups leaves nothing to dispatch.
    let err = dearchiver
        .unpack_pipeline_state_with("PathTracer", PipelineType::RayTracing, &device, |info| {
            if let Some(rt) = info.desc.ray_tracing.as_mut() {
                rt.groups.retain(|g| g.general.is_none());
            }
        })
        .unwrap_err();
    assert!(matches!(err, Error::InvalidDescriptor(_)));
    assert!(dearchiver.is_loaded());
    Ok(())
}
