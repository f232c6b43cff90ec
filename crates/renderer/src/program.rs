//! GLSL front end: compiles both stages with naga, checks that they link, and
//! reflects the uniform block and texture bindings into a [`ProgramState`].
//!
//! The reflection runs once at startup. Everything the frame loop needs to
//! know about the shader afterwards (uniform offsets, which binding holds
//! which texture slot) is cached here so nothing is looked up per frame.

use std::collections::HashMap;

use naga::front::glsl;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, Module, ScalarKind, TypeInner, VectorSize};

use crate::error::PipelineError;
use crate::types::{Role, ShaderStageKind};

/// Vertex attribute fed with the quad positions.
pub const POSITION_ATTRIBUTE: &str = "a_position";

/// A stage that parsed and validated cleanly.
pub struct CompiledStage {
    pub stage: ShaderStageKind,
    pub source: String,
    pub module: Module,
}

/// Parses and validates one stage; failures carry naga's rendered diagnostic.
pub fn compile_stage(stage: ShaderStageKind, source: &str) -> Result<CompiledStage, PipelineError> {
    let mut frontend = glsl::Frontend::default();
    let module = frontend
        .parse(&glsl::Options::from(stage.as_naga()), source)
        .map_err(|errors| PipelineError::ShaderCompile {
            stage,
            diagnostic: errors.emit_to_string(source),
        })?;

    Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|error| PipelineError::ShaderCompile {
            stage,
            diagnostic: error.emit_to_string(source),
        })?;

    Ok(CompiledStage {
        stage,
        source: source.to_string(),
        module,
    })
}

/// Value shape of a uniform block member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Vec2,
    Int,
}

impl UniformKind {
    pub fn byte_len(self) -> usize {
        match self {
            UniformKind::Float | UniformKind::Int => 4,
            UniformKind::Vec2 => 8,
        }
    }
}

/// Cached position of a named uniform inside the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocation {
    pub offset: u32,
    pub kind: UniformKind,
}

/// What sits at a reflected `(group, binding)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    UniformBlock { size: u32 },
    Texture(Role),
    Sampler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSlot {
    pub group: u32,
    pub binding: u32,
    pub kind: ResourceKind,
}

/// Link-time facts about the program, immutable after creation.
#[derive(Debug, Clone)]
pub struct ProgramState {
    uniforms: HashMap<String, UniformLocation>,
    block_size: u32,
    resources: Vec<ResourceSlot>,
    position_location: u32,
}

impl ProgramState {
    pub fn location(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).copied()
    }

    pub fn uniform_names(&self) -> impl Iterator<Item = &str> {
        self.uniforms.keys().map(String::as_str)
    }

    /// Size of the std140 uniform block in bytes, zero when the program has none.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn resources(&self) -> &[ResourceSlot] {
        &self.resources
    }

    /// Number of bind groups the pipeline layout needs.
    pub fn group_count(&self) -> u32 {
        self.resources
            .iter()
            .map(|slot| slot.group + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn position_location(&self) -> u32 {
        self.position_location
    }
}

/// Compiles and links both stages in one step.
pub fn build_program(vertex: &str, fragment: &str) -> Result<ProgramState, PipelineError> {
    let vertex = compile_stage(ShaderStageKind::Vertex, vertex)?;
    let fragment = compile_stage(ShaderStageKind::Fragment, fragment)?;
    link(&vertex, &fragment)
}

pub fn link(vertex: &CompiledStage, fragment: &CompiledStage) -> Result<ProgramState, PipelineError> {
    let vertex_entry = entry_point(vertex)?;
    let fragment_entry = entry_point(fragment)?;

    let produced = vertex_output_locations(&vertex.module, vertex_entry);
    for argument in &fragment_entry.function.arguments {
        if let Some(Binding::Location { location, .. }) = argument.binding {
            if !produced.contains(&location) {
                return Err(PipelineError::ProgramLink(format!(
                    "fragment input {} at location {location} is not written by the vertex shader",
                    argument.name.as_deref().unwrap_or("<unnamed>")
                )));
            }
        }
    }

    let position_location = position_location(vertex_entry)?;

    let mut uniforms = HashMap::new();
    let mut block_size = 0;
    let mut resources: Vec<ResourceSlot> = Vec::new();
    for stage in [vertex, fragment] {
        for (_, global) in stage.module.global_variables.iter() {
            let Some(binding) = global.binding.as_ref() else {
                continue;
            };
            let kind = match (&global.space, &stage.module.types[global.ty].inner) {
                (AddressSpace::Uniform, TypeInner::Struct { members, span }) => {
                    for member in members {
                        let Some(name) = member.name.as_ref() else {
                            continue;
                        };
                        match uniform_kind(&stage.module.types[member.ty].inner) {
                            Some(kind) => {
                                uniforms.insert(
                                    name.clone(),
                                    UniformLocation {
                                        offset: member.offset,
                                        kind,
                                    },
                                );
                            }
                            None => tracing::debug!(
                                uniform = %name,
                                "uniform has a type the compositor never writes; leaving it zeroed"
                            ),
                        }
                    }
                    block_size = block_size.max(*span);
                    ResourceKind::UniformBlock { size: *span }
                }
                (AddressSpace::Handle, TypeInner::Image { .. }) => {
                    let name = global.name.as_deref().unwrap_or("<unnamed>");
                    let role = Role::from_texture_name(name).ok_or_else(|| {
                        PipelineError::ProgramLink(format!(
                            "texture '{name}' is not one of src_img or dst_img"
                        ))
                    })?;
                    ResourceKind::Texture(role)
                }
                (AddressSpace::Handle, TypeInner::Sampler { .. }) => ResourceKind::Sampler,
                (space, _) => {
                    return Err(PipelineError::ProgramLink(format!(
                        "unsupported resource '{}' in address space {space:?}",
                        global.name.as_deref().unwrap_or("<unnamed>")
                    )))
                }
            };
            let slot = ResourceSlot {
                group: binding.group,
                binding: binding.binding,
                kind,
            };
            merge_resource(&mut resources, slot)?;
        }
    }

    let blocks = resources
        .iter()
        .filter(|slot| matches!(slot.kind, ResourceKind::UniformBlock { .. }))
        .count();
    if blocks > 1 {
        return Err(PipelineError::ProgramLink(format!(
            "expected at most one uniform block, found {blocks}"
        )));
    }
    resources.sort_by_key(|slot| (slot.group, slot.binding));

    tracing::debug!(
        uniforms = uniforms.len(),
        block_size,
        resources = resources.len(),
        position_location,
        "linked shader program"
    );

    Ok(ProgramState {
        uniforms,
        block_size,
        resources,
        position_location,
    })
}

fn entry_point(stage: &CompiledStage) -> Result<&naga::EntryPoint, PipelineError> {
    let expected = stage.stage.as_naga();
    stage
        .module
        .entry_points
        .iter()
        .find(|entry| entry.stage == expected)
        .ok_or_else(|| PipelineError::ProgramLink(format!("{} stage has no entry point", stage.stage)))
}

fn vertex_output_locations(module: &Module, entry: &naga::EntryPoint) -> Vec<u32> {
    let Some(result) = entry.function.result.as_ref() else {
        return Vec::new();
    };
    if let Some(Binding::Location { location, .. }) = result.binding {
        return vec![location];
    }
    match &module.types[result.ty].inner {
        TypeInner::Struct { members, .. } => members
            .iter()
            .filter_map(|member| match member.binding {
                Some(Binding::Location { location, .. }) => Some(location),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn position_location(entry: &naga::EntryPoint) -> Result<u32, PipelineError> {
    let inputs: Vec<(Option<&str>, u32)> = entry
        .function
        .arguments
        .iter()
        .filter_map(|argument| match argument.binding {
            Some(Binding::Location { location, .. }) => Some((argument.name.as_deref(), location)),
            _ => None,
        })
        .collect();

    if let Some((_, location)) = inputs
        .iter()
        .find(|(name, _)| *name == Some(POSITION_ATTRIBUTE))
    {
        return Ok(*location);
    }
    match inputs.as_slice() {
        [(_, location)] => Ok(*location),
        [] => Err(PipelineError::ProgramLink(format!(
            "vertex shader does not declare the {POSITION_ATTRIBUTE} attribute"
        ))),
        _ => Err(PipelineError::ProgramLink(format!(
            "vertex shader has several inputs and none is named {POSITION_ATTRIBUTE}"
        ))),
    }
}

fn uniform_kind(inner: &TypeInner) -> Option<UniformKind> {
    match inner {
        TypeInner::Scalar(scalar) if scalar.width == 4 => match scalar.kind {
            ScalarKind::Float => Some(UniformKind::Float),
            ScalarKind::Sint | ScalarKind::Uint | ScalarKind::Bool => Some(UniformKind::Int),
            _ => None,
        },
        TypeInner::Vector {
            size: VectorSize::Bi,
            scalar,
        } if scalar.kind == ScalarKind::Float && scalar.width == 4 => Some(UniformKind::Vec2),
        _ => None,
    }
}

/// Both stages may declare the same binding; they must agree on what it is.
fn merge_resource(resources: &mut Vec<ResourceSlot>, slot: ResourceSlot) -> Result<(), PipelineError> {
    match resources
        .iter()
        .find(|existing| existing.group == slot.group && existing.binding == slot.binding)
    {
        Some(existing) if existing.kind == slot.kind => Ok(()),
        Some(existing) => Err(PipelineError::ProgramLink(format!(
            "binding (group {}, binding {}) declared as both {:?} and {:?}",
            slot.group, slot.binding, existing.kind, slot.kind
        ))),
        None => {
            resources.push(slot);
            Ok(())
        }
    }
}
