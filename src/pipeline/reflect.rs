//! WGSL compilation and reflection of a post-process program's binding contract.
//!
//! A post-process program declares, in bind group 0:
//!
//! - one `texture_2d<f32>` global per sampled input, named after the input
//!   (for example `u_depth_texture`)
//! - a shared filtering sampler named [`SAMPLER_NAME`]
//! - zero or more uniforms, either as members of a `var<uniform>` struct or as
//!   standalone `var<uniform>` scalars/vectors
//!
//! Names are resolved here once, when the stage is built. Anything the caller
//! declares that the program lacks, and any texture or sampler in the program
//! the caller does not bind, is a construction error.

use crate::error::{PipelineError, Result};

/// Name of the shared sampler every post-process program declares.
pub const SAMPLER_NAME: &str = "u_sampler";
/// Vertex entry point name.
pub const VERTEX_ENTRY: &str = "vs";
/// Fragment entry point name.
pub const FRAGMENT_ENTRY: &str = "fs";

/// Type of a named uniform value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
}

impl UniformKind {
    pub fn size(self) -> u32 {
        match self {
            UniformKind::Float => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 => 12,
            UniformKind::Vec4 => 16,
        }
    }

    fn wgsl_name(self) -> &'static str {
        match self {
            UniformKind::Float => "f32",
            UniformKind::Vec2 => "vec2<f32>",
            UniformKind::Vec3 => "vec3<f32>",
            UniformKind::Vec4 => "vec4<f32>",
        }
    }
}

/// A value for a named uniform, set once per draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            UniformValue::Float(v) => bytemuck::bytes_of(v),
            UniformValue::Vec2(v) => bytemuck::cast_slice(v),
            UniformValue::Vec3(v) => bytemuck::cast_slice(v),
            UniformValue::Vec4(v) => bytemuck::cast_slice(v),
        }
    }
}

/// What a stage expects its program to declare.
#[derive(Clone, Copy, Debug)]
pub struct StageInterface {
    /// Texture names, in unit order: unit `k` feeds `samplers[k]`.
    pub samplers: &'static [&'static str],
    /// Uniform names and types, in the order values are passed per draw.
    pub uniforms: &'static [(&'static str, UniformKind)],
}

/// One `var<uniform>` buffer of the program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformBlock {
    pub name: String,
    pub binding: u32,
    /// Byte size, rounded up to 16.
    pub size: u32,
}

/// Where a declared uniform lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformSlot {
    /// Index into [`ProgramInterface::blocks`].
    pub block: usize,
    pub offset: u32,
    pub kind: UniformKind,
}

/// Resolved bindings of a program, in the caller's declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramInterface {
    /// Binding index of each declared texture, by unit.
    pub textures: Vec<u32>,
    pub sampler_binding: u32,
    pub blocks: Vec<UniformBlock>,
    /// Slot of each declared uniform.
    pub uniforms: Vec<UniformSlot>,
}

/// Parses and validates WGSL source.
pub fn compile(program: &str, source: &str) -> Result<naga::Module> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| PipelineError::ShaderCompile {
        program: program.to_string(),
        message: e.emit_to_string(source),
    })?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    )
    .validate(&module)
    .map_err(|e| PipelineError::ShaderCompile {
        program: program.to_string(),
        message: e.emit_to_string(source),
    })?;

    Ok(module)
}

/// Checks that `vs` and `fs` entry points exist.
pub fn require_entry_points(program: &str, module: &naga::Module) -> Result<()> {
    for (stage, entry, label) in [
        (naga::ShaderStage::Vertex, VERTEX_ENTRY, "vertex"),
        (naga::ShaderStage::Fragment, FRAGMENT_ENTRY, "fragment"),
    ] {
        let found = module
            .entry_points
            .iter()
            .any(|ep| ep.stage == stage && ep.name == entry);
        if !found {
            return Err(PipelineError::MissingEntryPoint {
                program: program.to_string(),
                stage: label,
                entry,
            });
        }
    }
    Ok(())
}

/// Resolves `interface` against the program's globals.
pub fn reflect(
    program: &str,
    module: &naga::Module,
    interface: &StageInterface,
) -> Result<ProgramInterface> {
    let missing = |name: &str| PipelineError::MissingUniform {
        program: program.to_string(),
        name: name.to_string(),
    };
    let mismatch = |name: &str, expected: &str, found: String| PipelineError::UniformTypeMismatch {
        program: program.to_string(),
        name: name.to_string(),
        expected: expected.to_string(),
        found,
    };

    let group0_binding = |var: &naga::GlobalVariable, name: &str| -> Result<u32> {
        match var.binding {
            Some(naga::ResourceBinding { group: 0, binding }) => Ok(binding),
            Some(naga::ResourceBinding { group, .. }) => {
                Err(mismatch(name, "@group(0)", format!("@group({group})")))
            }
            None => Err(mismatch(name, "a resource binding", "no binding".to_string())),
        }
    };

    let find_global = |name: &str| {
        module
            .global_variables
            .iter()
            .map(|(_, var)| var)
            .find(|var| var.name.as_deref() == Some(name))
    };

    // Textures, in unit order.
    let mut textures = Vec::with_capacity(interface.samplers.len());
    for &name in interface.samplers {
        let var = find_global(name).ok_or_else(|| missing(name))?;
        let inner = &module.types[var.ty].inner;
        let is_2d_float = matches!(
            *inner,
            naga::TypeInner::Image {
                dim: naga::ImageDimension::D2,
                arrayed: false,
                class: naga::ImageClass::Sampled {
                    kind: naga::ScalarKind::Float,
                    multi: false,
                },
            }
        );
        if !is_2d_float {
            return Err(mismatch(name, "texture_2d<f32>", describe(module, inner)));
        }
        textures.push(group0_binding(var, name)?);
    }

    // Shared sampler.
    let sampler_var = find_global(SAMPLER_NAME).ok_or_else(|| missing(SAMPLER_NAME))?;
    let sampler_inner = &module.types[sampler_var.ty].inner;
    if !matches!(*sampler_inner, naga::TypeInner::Sampler { comparison: false }) {
        return Err(mismatch(
            SAMPLER_NAME,
            "sampler",
            describe(module, sampler_inner),
        ));
    }
    let sampler_binding = group0_binding(sampler_var, SAMPLER_NAME)?;

    // Every other handle resource must be one the caller binds.
    for (_, var) in module.global_variables.iter() {
        if var.space != naga::AddressSpace::Handle {
            continue;
        }
        let name = var.name.as_deref().unwrap_or("<unnamed>");
        if name != SAMPLER_NAME && !interface.samplers.contains(&name) {
            return Err(PipelineError::UnboundResource {
                program: program.to_string(),
                name: name.to_string(),
            });
        }
    }

    // Uniform blocks: every `var<uniform>` gets a buffer.
    let mut blocks = Vec::new();
    let mut block_vars = Vec::new();
    for (_, var) in module.global_variables.iter() {
        if var.space != naga::AddressSpace::Uniform {
            continue;
        }
        let name = var.name.clone().unwrap_or_default();
        let binding = group0_binding(var, &name)?;
        let size = match module.types[var.ty].inner {
            naga::TypeInner::Struct { span, .. } => span,
            ref other => uniform_kind(other).map_or(16, UniformKind::size),
        };
        blocks.push(UniformBlock {
            name,
            binding,
            size: size.max(16).next_multiple_of(16),
        });
        block_vars.push(var);
    }

    // Declared uniforms: a struct member or a standalone uniform of that name.
    let mut uniforms = Vec::with_capacity(interface.uniforms.len());
    for &(name, kind) in interface.uniforms {
        let mut slot = None;
        for (block, var) in block_vars.iter().enumerate() {
            match module.types[var.ty].inner {
                naga::TypeInner::Struct { ref members, .. } => {
                    if let Some(member) = members.iter().find(|m| m.name.as_deref() == Some(name)) {
                        slot = Some((block, member.offset, &module.types[member.ty].inner));
                    }
                }
                ref other if var.name.as_deref() == Some(name) => {
                    slot = Some((block, 0, other));
                }
                _ => {}
            }
            if slot.is_some() {
                break;
            }
        }

        let (block, offset, inner) = slot.ok_or_else(|| missing(name))?;
        if uniform_kind(inner) != Some(kind) {
            return Err(mismatch(name, kind.wgsl_name(), describe(module, inner)));
        }
        uniforms.push(UniformSlot {
            block,
            offset,
            kind,
        });
    }

    Ok(ProgramInterface {
        textures,
        sampler_binding,
        blocks,
        uniforms,
    })
}

fn uniform_kind(inner: &naga::TypeInner) -> Option<UniformKind> {
    match *inner {
        naga::TypeInner::Scalar(scalar) if scalar == naga::Scalar::F32 => Some(UniformKind::Float),
        naga::TypeInner::Vector { size, scalar } if scalar == naga::Scalar::F32 => Some(match size {
            naga::VectorSize::Bi => UniformKind::Vec2,
            naga::VectorSize::Tri => UniformKind::Vec3,
            naga::VectorSize::Quad => UniformKind::Vec4,
        }),
        _ => None,
    }
}

fn describe(module: &naga::Module, inner: &naga::TypeInner) -> String {
    if let Some(kind) = uniform_kind(inner) {
        return kind.wgsl_name().to_string();
    }
    match *inner {
        naga::TypeInner::Scalar(scalar) => format!("{:?} scalar", scalar.kind),
        naga::TypeInner::Vector { size, .. } => format!("{}-component vector", size as u8),
        naga::TypeInner::Matrix { columns, rows, .. } => {
            format!("mat{}x{}", columns as u8, rows as u8)
        }
        naga::TypeInner::Image { dim, .. } => format!("{dim:?} texture"),
        naga::TypeInner::Sampler { comparison: true } => "comparison sampler".to_string(),
        naga::TypeInner::Sampler { comparison: false } => "sampler".to_string(),
        naga::TypeInner::Struct { ref members, .. } => format!("struct of {} members", members.len()),
        naga::TypeInner::Array { base, .. } => {
            format!("array of {}", describe(module, &module.types[base].inner))
        }
        _ => "unsupported type".to_string(),
    }
}
