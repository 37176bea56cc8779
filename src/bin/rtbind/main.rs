//! rtbind CLI - inspect, unpack and build pipeline archives.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use rtbind::archive::{ArchiveEntry, Archiver, Dearchiver, EntryKind, DEFAULT_COMPRESSION_LEVEL};
use rtbind::pipeline::{
    DeviceObject, NullDevice, PipelineStateDesc, PipelineType, RayTracingPipeline, RenderDevice, ShaderDesc,
    ShaderSourceLanguage, ShaderType,
};
use rtbind::sbt::{SbtTable, ShaderGroupRegistry};

#[derive(Parser, Debug)]
#[command(
    name = "rtbind",
    version,
    about = "Inspect and build ray-tracing pipeline archives",
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("RTBIND_BUILD_DATE"), ")")
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show header fields and entry counts
    Info {
        archive: PathBuf,
    },

    /// List archive entries
    List {
        archive: PathBuf,

        /// Print the listing as JSON
        #[arg(long, action = clap::ArgAction::SetTrue)]
        json: bool,
    },

    /// Print a decoded descriptor as JSON
    Dump {
        archive: PathBuf,
        name: String,

        /// Dump a pipeline state of this type instead of a shader
        #[arg(long, value_name = "TYPE")]
        pipeline: Option<PipelineType>,

        /// Rename the descriptor before printing
        #[arg(long, value_name = "NAME")]
        rename: Option<String>,
    },

    /// Unpack a ray-tracing pipeline and show its binding table layout
    Sbt {
        archive: PathBuf,
        pipeline: String,
    },

    /// Build an archive from a JSON manifest
    Pack {
        manifest: PathBuf,
        output: PathBuf,
    },
}

// ============================================================================
// Manifest
// ============================================================================

/// Input of `rtbind pack`.
#[derive(Deserialize, Debug)]
struct Manifest {
    #[serde(default)]
    content_version: u32,
    #[serde(default = "default_compression_level")]
    compression_level: u32,
    #[serde(default)]
    shaders: Vec<ManifestShader>,
    #[serde(default)]
    pipelines: Vec<PipelineStateDesc>,
}

fn default_compression_level() -> u32 {
    DEFAULT_COMPRESSION_LEVEL
}

#[derive(Deserialize, Debug)]
struct ManifestShader {
    name: String,
    shader_type: ShaderType,
    #[serde(default)]
    entry_point: Option<String>,
    #[serde(default)]
    source_language: ShaderSourceLanguage,
    /// Bytecode file, relative to the manifest.
    #[serde(default)]
    bytecode: Option<PathBuf>,
}

impl ManifestShader {
    fn into_desc(self, base: &Path) -> anyhow::Result<ShaderDesc> {
        let mut desc = ShaderDesc::new(self.name, self.shader_type).with_language(self.source_language);
        if let Some(entry_point) = self.entry_point {
            desc = desc.with_entry_point(entry_point);
        }
        if let Some(path) = self.bytecode {
            let path = base.join(path);
            let bytes = fs::read(&path).with_context(|| format!("read bytecode {}", path.display()))?;
            desc = desc.with_bytecode(bytes);
        }
        Ok(desc)
    }
}

// ============================================================================
// Output
// ============================================================================

#[derive(Serialize, Debug)]
struct SbtReport {
    pipeline: String,
    shader_record_size: u32,
    handle_size: u32,
    groups: Vec<SbtGroupReport>,
    strides: Vec<SbtStrideReport>,
}

#[derive(Serialize, Debug)]
struct SbtGroupReport {
    name: String,
    kind: rtbind::sbt::ShaderGroupKind,
    handle: String,
}

#[derive(Serialize, Debug)]
struct SbtStrideReport {
    table: &'static str,
    stride: u64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli.command)
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "rtbind=debug",
        _ => "rtbind=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Info { archive } => cmd_info(&archive),
        Command::List { archive, json } => cmd_list(&archive, json),
        Command::Dump {
            archive,
            name,
            pipeline,
            rename,
        } => cmd_dump(&archive, &name, pipeline, rename),
        Command::Sbt { archive, pipeline } => cmd_sbt(&archive, &pipeline),
        Command::Pack { manifest, output } => cmd_pack(&manifest, &output),
    }
}

fn open(path: &Path) -> anyhow::Result<Dearchiver> {
    let mut dearchiver = Dearchiver::new();
    dearchiver
        .load_archive_file(path)
        .with_context(|| format!("load archive {}", path.display()))?;
    Ok(dearchiver)
}

fn cmd_info(path: &Path) -> anyhow::Result<()> {
    let dearchiver = open(path)?;
    let header = dearchiver.header()?;
    let entries = dearchiver.entries()?;
    let count = |kind: EntryKind| entries.iter().filter(|e| e.kind == kind).count();

    println!("Archive: {}", path.display());
    println!("  format version:  {}", header.version);
    println!("  content version: {}", header.content_version);
    println!("  body size:       {} bytes", header.body_size);
    println!("  checksum:        {:016x}", header.checksum);
    println!("  shaders:         {}", count(EntryKind::Shader));
    println!("  pipeline states: {}", count(EntryKind::PipelineState));
    println!(
        "  compressed:      {}",
        entries.iter().filter(|e| e.compressed).count()
    );
    Ok(())
}

fn cmd_list(path: &Path, json: bool) -> anyhow::Result<()> {
    let dearchiver = open(path)?;
    let entries: &[ArchiveEntry] = dearchiver.entries()?;
    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }
    for entry in entries {
        let kind = match entry.pipeline_type {
            Some(ty) => format!("{} pipeline", ty),
            None => entry.kind.to_string(),
        };
        println!(
            "{:<20} {:<32} {:>10} bytes{}",
            kind,
            entry.name,
            entry.size,
            if entry.compressed { " (zlib)" } else { "" }
        );
    }
    Ok(())
}

fn cmd_dump(path: &Path, name: &str, pipeline: Option<PipelineType>, rename: Option<String>) -> anyhow::Result<()> {
    let dearchiver = open(path)?;
    let json = match pipeline {
        Some(ty) => {
            let info = dearchiver.decode_pipeline_state_with(name, ty, |info| {
                if let Some(new_name) = rename {
                    info.desc.name = new_name;
                }
            })?;
            serde_json::to_string_pretty(&serde_json::json!({
                "desc": info.desc,
                "shaders": info.shaders,
            }))?
        }
        None => {
            let desc = dearchiver.decode_shader_with(name, |desc| {
                if let Some(new_name) = rename {
                    desc.name = new_name;
                }
            })?;
            serde_json::to_string_pretty(&desc)?
        }
    };
    println!("{}", json);
    Ok(())
}

fn cmd_sbt(path: &Path, name: &str) -> anyhow::Result<()> {
    let dearchiver = open(path)?;
    let device = NullDevice::new();
    let pso = dearchiver.unpack_pipeline_state(name, PipelineType::RayTracing, &device)?;
    let layout = device.sbt_layout();
    let registry = ShaderGroupRegistry::from_pipeline(layout, &pso)?;

    let report = SbtReport {
        pipeline: pso.name().to_string(),
        shader_record_size: pso.shader_record_size(),
        handle_size: layout.handle_size,
        groups: registry
            .iter()
            .map(|record| SbtGroupReport {
                name: record.name.clone(),
                kind: record.kind,
                handle: format!("{:?}", record.handle),
            })
            .collect(),
        strides: SbtTable::ALL
            .iter()
            .map(|&table| SbtStrideReport {
                table: table.as_str(),
                stride: registry.record_stride(table),
            })
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_pack(manifest_path: &Path, output: &Path) -> anyhow::Result<()> {
    let text = fs::read_to_string(manifest_path)
        .with_context(|| format!("read manifest {}", manifest_path.display()))?;
    let manifest: Manifest = serde_json::from_str(&text).context("parse manifest")?;
    let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));

    if manifest.shaders.is_empty() && manifest.pipelines.is_empty() {
        bail!("manifest {} has no shaders or pipelines", manifest_path.display());
    }

    let mut archiver = Archiver::new();
    archiver.set_content_version(manifest.content_version);
    archiver.set_compression_level(manifest.compression_level);
    for shader in manifest.shaders {
        archiver.add_shader(shader.into_desc(base)?)?;
    }
    for pipeline in manifest.pipelines {
        archiver.add_pipeline_state(pipeline)?;
    }
    archiver
        .write_to(output)
        .with_context(|| format!("write archive {}", output.display()))?;

    tracing::info!(entries = archiver.len(), output = %output.display(), "archive written");
    Ok(())
}
