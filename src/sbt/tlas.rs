//! Top-level acceleration structure identity resolution.
//!
//! A TLAS assigns each instance a contribution to the hit group index. The
//! hit record for a ray hitting geometry `g` of instance `i` with ray type `r`
//! lives at:
//!
//! ```text
//! per-geometry:  contribution(i) + g * stride + r
//! per-instance:  contribution(i) + r
//! per-structure: r
//! ```
//!
//! Resolved slots are only meaningful for the build generation they were
//! computed against.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;

use crate::util::{Error, Result};

/// How a TLAS maps instances and geometries to hit group records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitGroupBindingMode {
    /// One record per geometry per ray type.
    PerGeometry,
    /// One record per instance per ray type.
    PerInstance,
    /// One record per ray type for the whole structure.
    PerStructure,
    /// Contributions are supplied by the application.
    UserDefined,
}

impl fmt::Display for HitGroupBindingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PerGeometry => "per-geometry",
            Self::PerInstance => "per-instance",
            Self::PerStructure => "per-structure",
            Self::UserDefined => "user-defined",
        };
        f.write_str(s)
    }
}

/// Hit group placement of one instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstanceSlots {
    /// Offset of the instance's first hit record.
    pub contribution: u32,
    /// Number of geometries in the instance's bottom-level structure.
    pub geometry_count: u32,
}

/// Capability exposed by a built top-level acceleration structure.
pub trait TopLevelStructure: Send + Sync {
    /// Debug name.
    fn name(&self) -> &str;

    /// Build generation; changes every time the structure is rebuilt.
    fn generation(&self) -> u64;

    fn binding_mode(&self) -> HitGroupBindingMode;

    /// Number of ray types (distance between consecutive geometries' records).
    fn hit_group_stride(&self) -> u32;

    /// Placement of a named instance in the current build.
    fn instance(&self, name: &str) -> Option<InstanceSlots>;

    /// Index of a named geometry within an instance's bottom-level structure.
    fn geometry_index(&self, instance: &str, geometry: &str) -> Option<u32>;

    /// Instance names in build order.
    fn instance_names(&self) -> Vec<String>;

    /// Number of hit records a binding table needs to cover this structure.
    fn hit_slot_count(&self) -> u32;
}

// ============================================================================
// Resolution
// ============================================================================

fn check_ray_offset<T: TopLevelStructure + ?Sized>(tlas: &T, ray_offset: u32) -> Result<u32> {
    let stride = tlas.hit_group_stride();
    if ray_offset >= stride {
        return Err(Error::InvalidRayOffset {
            offset: ray_offset,
            stride,
        });
    }
    Ok(stride)
}

fn find_instance<T: TopLevelStructure + ?Sized>(tlas: &T, instance: &str) -> Result<InstanceSlots> {
    tlas.instance(instance).ok_or_else(|| Error::NotFound {
        structure: tlas.name().to_string(),
        what: format!("instance '{}'", instance),
    })
}

/// `contribution + geometry * stride + ray_offset`, rejecting overflow.
fn slot_index<T: TopLevelStructure + ?Sized>(
    tlas: &T,
    slots: InstanceSlots,
    geometry: u32,
    stride: u32,
    ray_offset: u32,
) -> Result<u32> {
    geometry
        .checked_mul(stride)
        .and_then(|g| g.checked_add(slots.contribution))
        .and_then(|g| g.checked_add(ray_offset))
        .ok_or_else(|| slot_overflow(tlas.name()))
}

fn slot_overflow(name: &str) -> Error {
    Error::other(format!("hit group index of '{}' overflows u32", name))
}

fn mode_error<T: TopLevelStructure + ?Sized>(tlas: &T, operation: &str) -> Error {
    Error::InvalidBindingMode {
        structure: tlas.name().to_string(),
        operation: format!("{} in {} mode", operation, tlas.binding_mode()),
    }
}

/// Resolve the hit record of one geometry of one instance.
pub fn resolve_geometry<T: TopLevelStructure + ?Sized>(
    tlas: &T,
    instance: &str,
    geometry: &str,
    ray_offset: u32,
) -> Result<u32> {
    if tlas.binding_mode() != HitGroupBindingMode::PerGeometry {
        return Err(mode_error(tlas, "geometry binding"));
    }
    let stride = check_ray_offset(tlas, ray_offset)?;
    let slots = find_instance(tlas, instance)?;
    let geometry_index = tlas
        .geometry_index(instance, geometry)
        .ok_or_else(|| Error::NotFound {
            structure: tlas.name().to_string(),
            what: format!("geometry '{}' in instance '{}'", geometry, instance),
        })?;
    slot_index(tlas, slots, geometry_index, stride, ray_offset)
}

/// Resolve every hit record of one instance.
pub fn resolve_instance<T: TopLevelStructure + ?Sized>(
    tlas: &T,
    instance: &str,
    ray_offset: u32,
) -> Result<Vec<u32>> {
    let stride = check_ray_offset(tlas, ray_offset)?;
    match tlas.binding_mode() {
        HitGroupBindingMode::PerGeometry => {
            let slots = find_instance(tlas, instance)?;
            (0..slots.geometry_count)
                .map(|g| slot_index(tlas, slots, g, stride, ray_offset))
                .collect()
        }
        HitGroupBindingMode::PerInstance => {
            let slots = find_instance(tlas, instance)?;
            Ok(vec![slot_index(tlas, slots, 0, stride, ray_offset)?])
        }
        _ => Err(mode_error(tlas, "instance binding")),
    }
}

/// Resolve every hit record of the whole structure.
pub fn resolve_structure<T: TopLevelStructure + ?Sized>(tlas: &T, ray_offset: u32) -> Result<Vec<u32>> {
    check_ray_offset(tlas, ray_offset)?;
    match tlas.binding_mode() {
        HitGroupBindingMode::PerGeometry | HitGroupBindingMode::PerInstance => {
            let mut out = Vec::new();
            for name in tlas.instance_names() {
                out.extend(resolve_instance(tlas, &name, ray_offset)?);
            }
            Ok(out)
        }
        HitGroupBindingMode::PerStructure => Ok(vec![ray_offset]),
        HitGroupBindingMode::UserDefined => Err(mode_error(tlas, "whole-structure binding")),
    }
}

// ============================================================================
// In-memory TLAS
// ============================================================================

/// One instance in a TLAS build.
#[derive(Clone, Debug)]
pub struct TlasInstance {
    pub name: String,
    /// Geometry names of the instance's bottom-level structure, in order.
    pub geometries: Vec<String>,
    /// Explicit contribution; required in user-defined mode, ignored otherwise.
    pub contribution: Option<u32>,
}

impl TlasInstance {
    pub fn new<S: Into<String>>(name: impl Into<String>, geometries: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            geometries: geometries.into_iter().map(Into::into).collect(),
            contribution: None,
        }
    }

    /// Set an explicit hit group contribution (user-defined mode).
    pub fn with_contribution(mut self, contribution: u32) -> Self {
        self.contribution = Some(contribution);
        self
    }
}

/// Parameters of a TLAS build.
#[derive(Clone, Debug)]
pub struct TlasBuildInfo {
    pub binding_mode: HitGroupBindingMode,
    pub hit_group_stride: u32,
    pub instances: Vec<TlasInstance>,
}

impl TlasBuildInfo {
    pub fn new(binding_mode: HitGroupBindingMode, hit_group_stride: u32) -> Self {
        Self {
            binding_mode,
            hit_group_stride,
            instances: Vec::new(),
        }
    }

    pub fn with_instance(mut self, instance: TlasInstance) -> Self {
        self.instances.push(instance);
        self
    }
}

#[derive(Debug)]
struct BuiltInstance {
    name: String,
    slots: InstanceSlots,
    geometries: HashMap<String, u32>,
}

#[derive(Debug)]
struct TlasState {
    generation: u64,
    binding_mode: HitGroupBindingMode,
    hit_group_stride: u32,
    instances: Vec<BuiltInstance>,
    by_name: HashMap<String, usize>,
    hit_slot_count: u32,
}

/// CPU-side TLAS holding only the naming information the resolver needs.
#[derive(Debug)]
pub struct TopLevelAs {
    name: String,
    state: RwLock<TlasState>,
}

impl TopLevelAs {
    /// Build a structure (generation 1).
    pub fn new(name: impl Into<String>, info: TlasBuildInfo) -> Result<Self> {
        let state = Self::build_state(info, 1)?;
        Ok(Self {
            name: name.into(),
            state: RwLock::new(state),
        })
    }

    /// Replace the instance set. Slots resolved before this call are stale.
    pub fn rebuild(&self, info: TlasBuildInfo) -> Result<()> {
        let mut state = self.state.write();
        let next = Self::build_state(info, state.generation + 1)?;
        *state = next;
        tracing::debug!(tlas = %self.name, generation = state.generation, "TLAS rebuilt");
        Ok(())
    }

    fn build_state(info: TlasBuildInfo, generation: u64) -> Result<TlasState> {
        if info.hit_group_stride == 0 {
            return Err(Error::other("hit group stride must be at least 1"));
        }
        let stride = info.hit_group_stride;

        let mut instances = Vec::with_capacity(info.instances.len());
        let mut by_name = HashMap::with_capacity(info.instances.len());
        let mut next_contribution = 0u32;
        let mut hit_slot_count = 0u32;

        for (index, inst) in info.instances.into_iter().enumerate() {
            if by_name.contains_key(&inst.name) {
                return Err(Error::DuplicateName(inst.name));
            }

            let mut geometries = HashMap::with_capacity(inst.geometries.len());
            for (g, geom) in inst.geometries.iter().enumerate() {
                if geometries.insert(geom.clone(), g as u32).is_some() {
                    return Err(Error::DuplicateName(format!("{}/{}", inst.name, geom)));
                }
            }
            let geometry_count = u32::try_from(inst.geometries.len()).map_err(|_| slot_overflow(&inst.name))?;

            let contribution = match info.binding_mode {
                HitGroupBindingMode::PerGeometry => {
                    let c = next_contribution;
                    next_contribution = geometry_count
                        .checked_mul(stride)
                        .and_then(|span| c.checked_add(span))
                        .ok_or_else(|| slot_overflow(&inst.name))?;
                    c
                }
                HitGroupBindingMode::PerInstance => u32::try_from(index)
                    .ok()
                    .and_then(|i| i.checked_mul(stride))
                    .ok_or_else(|| slot_overflow(&inst.name))?,
                HitGroupBindingMode::PerStructure => 0,
                HitGroupBindingMode::UserDefined => inst.contribution.ok_or_else(|| {
                    Error::other(format!(
                        "instance '{}' needs an explicit contribution in user-defined mode",
                        inst.name
                    ))
                })?,
            };

            let span = match info.binding_mode {
                HitGroupBindingMode::PerGeometry | HitGroupBindingMode::UserDefined => {
                    geometry_count.max(1).checked_mul(stride)
                }
                HitGroupBindingMode::PerInstance | HitGroupBindingMode::PerStructure => Some(stride),
            };
            let end = span
                .and_then(|span| contribution.checked_add(span))
                .ok_or_else(|| slot_overflow(&inst.name))?;
            hit_slot_count = hit_slot_count.max(end);

            by_name.insert(inst.name.clone(), instances.len());
            instances.push(BuiltInstance {
                name: inst.name,
                slots: InstanceSlots {
                    contribution,
                    geometry_count,
                },
                geometries,
            });
        }

        Ok(TlasState {
            generation,
            binding_mode: info.binding_mode,
            hit_group_stride: stride,
            instances,
            by_name,
            hit_slot_count,
        })
    }
}

impl TopLevelStructure for TopLevelAs {
    fn name(&self) -> &str {
        &self.name
    }

    fn generation(&self) -> u64 {
        self.state.read().generation
    }

    fn binding_mode(&self) -> HitGroupBindingMode {
        self.state.read().binding_mode
    }

    fn hit_group_stride(&self) -> u32 {
        self.state.read().hit_group_stride
    }

    fn instance(&self, name: &str) -> Option<InstanceSlots> {
        let state = self.state.read();
        state.by_name.get(name).map(|&i| state.instances[i].slots)
    }

    fn geometry_index(&self, instance: &str, geometry: &str) -> Option<u32> {
        let state = self.state.read();
        let &i = state.by_name.get(instance)?;
        state.instances[i].geometries.get(geometry).copied()
    }

    fn instance_names(&self) -> Vec<String> {
        self.state.read().instances.iter().map(|i| i.name.clone()).collect()
    }

    fn hit_slot_count(&self) -> u32 {
        self.state.read().hit_slot_count
    }
}
