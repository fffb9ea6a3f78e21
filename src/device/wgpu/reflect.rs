//! GLSL front end and shader interface reflection.
//!
//! Stages are parsed with naga's GLSL frontend and validated up front so
//! compile errors come back synchronously with a readable log. The parsed
//! modules are then inspected for what the device needs to bind a program:
//! uniform blocks (with member offsets, so uniforms can be set by name),
//! texture and sampler slots, and the vertex/fragment interface.

use std::collections::{BTreeMap, HashMap};

use wgpu::naga::{
    self, AddressSpace, Binding, Module, ScalarKind, ShaderStage as NagaStage, TypeInner,
    front::glsl,
    valid::{Capabilities, ValidationFlags, Validator},
};

use crate::{
    device::Uniform,
    error::{Error, Result, ShaderStage},
};

/// Parses and validates one stage.
pub fn compile(stage: ShaderStage, source: &str) -> Result<Module> {
    let naga_stage = match stage {
        ShaderStage::Vertex => NagaStage::Vertex,
        ShaderStage::Fragment => NagaStage::Fragment,
    };
    let module = glsl::Frontend::default()
        .parse(&glsl::Options::from(naga_stage), source)
        .map_err(|e| Error::CompileFailure {
            stage,
            log: e.emit_to_string(source),
        })?;
    Validator::new(ValidationFlags::all(), Capabilities::empty())
        .validate(&module)
        .map_err(|e| Error::CompileFailure {
            stage,
            log: e.emit_to_string(source),
        })?;
    Ok(module)
}

/// The scalar layout of a uniform member.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ValueKind {
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

#[derive(Clone, Debug)]
struct Member {
    offset: u32,
    kind: ValueKind,
    /// Element count and stride for arrays.
    array: Option<(u32, u32)>,
}

#[derive(Clone, Debug)]
pub struct UniformBlock {
    pub group: u32,
    pub binding: u32,
    pub size: u64,
    members: HashMap<String, Member>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotKind {
    Texture,
    Sampler,
}

/// A texture or sampler binding.
#[derive(Clone, Debug)]
pub struct Slot {
    pub group: u32,
    pub binding: u32,
    pub kind: SlotKind,
    /// Uniform name selecting the texture unit: the global's name without
    /// its `_tex` or `_sampler` suffix.
    pub unit_name: String,
}

/// Everything bound through bind groups, merged over both stages.
#[derive(Clone, Debug, Default)]
pub struct Interface {
    pub blocks: Vec<UniformBlock>,
    pub slots: Vec<Slot>,
}

impl Interface {
    pub fn reflect(vertex: &Module, fragment: &Module) -> Self {
        let mut blocks: BTreeMap<(u32, u32), UniformBlock> = BTreeMap::new();
        let mut slots: BTreeMap<(u32, u32), Slot> = BTreeMap::new();
        for module in [vertex, fragment] {
            for (_, global) in module.global_variables.iter() {
                let Some(binding) = &global.binding else {
                    continue;
                };
                let key = (binding.group, binding.binding);
                let inner = &module.types[global.ty].inner;
                match (global.space, inner) {
                    (AddressSpace::Uniform, TypeInner::Struct { members, span }) => {
                        let block = blocks.entry(key).or_insert_with(|| UniformBlock {
                            group: key.0,
                            binding: key.1,
                            size: 0,
                            members: HashMap::new(),
                        });
                        block.size = block.size.max(round_up(*span as u64, 16));
                        for member in members {
                            let Some(name) = &member.name else { continue };
                            if let Some(reflected) = reflect_member(module, member.ty, member.offset) {
                                block.members.insert(name.clone(), reflected);
                            }
                        }
                    }
                    (_, TypeInner::Image { .. }) | (_, TypeInner::Sampler { .. }) => {
                        let kind = if matches!(inner, TypeInner::Image { .. }) {
                            SlotKind::Texture
                        } else {
                            SlotKind::Sampler
                        };
                        let name = global.name.clone().unwrap_or_default();
                        slots.entry(key).or_insert_with(|| Slot {
                            group: key.0,
                            binding: key.1,
                            kind,
                            unit_name: unit_name(&name, kind),
                        });
                    }
                    _ => log::debug!("ignoring shader global {:?}", global.name),
                }
            }
        }
        Self {
            blocks: blocks.into_values().collect(),
            slots: slots.into_values().collect(),
        }
    }

    /// Number of bind groups, including empty ones below the highest used.
    pub fn group_count(&self) -> u32 {
        let blocks = self.blocks.iter().map(|b| b.group + 1);
        let slots = self.slots.iter().map(|s| s.group + 1);
        blocks.chain(slots).max().unwrap_or(0)
    }

    /// Locates `name` (optionally `name[i]`) and encodes `value` for it.
    /// Returns the block index, byte offset and bytes, or `None` when no
    /// block member has that name.
    pub fn encode(&self, name: &str, value: Uniform) -> Option<(usize, usize, Vec<u8>)> {
        let (base, index) = split_index(name)?;
        for (i, block) in self.blocks.iter().enumerate() {
            let Some(member) = block.members.get(base) else {
                continue;
            };
            let offset = match (member.array, index) {
                (Some((count, stride)), Some(index)) if index < count => {
                    member.offset + index * stride
                }
                (Some(_), None) => member.offset,
                (None, None) => member.offset,
                _ => return None,
            };
            let bytes = encode_value(member.kind, value)?;
            return Some((i, offset as usize, bytes));
        }
        None
    }
}

/// Checks that every input the fragment stage reads is written by the
/// vertex stage.
pub fn link(vertex: &Module, fragment: &Module) -> Result<()> {
    let vertex_entry = vertex
        .entry_points
        .iter()
        .find(|e| e.stage == NagaStage::Vertex)
        .ok_or_else(|| Error::LinkFailure {
            log: String::from("vertex stage has no entry point"),
        })?;
    let fragment_entry = fragment
        .entry_points
        .iter()
        .find(|e| e.stage == NagaStage::Fragment)
        .ok_or_else(|| Error::LinkFailure {
            log: String::from("fragment stage has no entry point"),
        })?;

    let mut written = Vec::new();
    if let Some(result) = &vertex_entry.function.result {
        locations(vertex, result.ty, result.binding.as_ref(), &mut written);
    }
    let mut read = Vec::new();
    for argument in &fragment_entry.function.arguments {
        locations(fragment, argument.ty, argument.binding.as_ref(), &mut read);
    }
    for location in read {
        if !written.contains(&location) {
            return Err(Error::LinkFailure {
                log: format!(
                    "fragment shader reads location {} which the vertex shader does not write",
                    location
                ),
            });
        }
    }
    Ok(())
}

fn locations(
    module: &Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&Binding>,
    out: &mut Vec<u32>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => out.push(*location),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    locations(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

fn reflect_member(module: &Module, ty: naga::Handle<naga::Type>, offset: u32) -> Option<Member> {
    match &module.types[ty].inner {
        TypeInner::Array { base, size, stride } => {
            let naga::ArraySize::Constant(count) = size else {
                return None;
            };
            let kind = value_kind(&module.types[*base].inner)?;
            Some(Member {
                offset,
                kind,
                array: Some((count.get(), *stride)),
            })
        }
        inner => Some(Member {
            offset,
            kind: value_kind(inner)?,
            array: None,
        }),
    }
}

fn value_kind(inner: &TypeInner) -> Option<ValueKind> {
    match inner {
        TypeInner::Scalar(scalar) => match scalar.kind {
            ScalarKind::Float => Some(ValueKind::Float),
            ScalarKind::Sint | ScalarKind::Uint | ScalarKind::Bool => Some(ValueKind::Int),
            _ => None,
        },
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float => match size {
            naga::VectorSize::Bi => Some(ValueKind::Vec2),
            naga::VectorSize::Tri => Some(ValueKind::Vec3),
            naga::VectorSize::Quad => Some(ValueKind::Vec4),
        },
        TypeInner::Matrix {
            columns: naga::VectorSize::Quad,
            rows: naga::VectorSize::Quad,
            ..
        } => Some(ValueKind::Mat4),
        _ => None,
    }
}

fn encode_value(kind: ValueKind, value: Uniform) -> Option<Vec<u8>> {
    let floats: Vec<f32> = match (kind, value) {
        (ValueKind::Int, Uniform::Int(v)) => return Some(v.to_ne_bytes().to_vec()),
        (ValueKind::Int, Uniform::Float(v)) => return Some((v as i32).to_ne_bytes().to_vec()),
        (ValueKind::Float, Uniform::Float(v)) => vec![v],
        (ValueKind::Float, Uniform::Int(v)) => vec![v as f32],
        (ValueKind::Vec2, Uniform::Vec2(v)) => v.to_vec(),
        (ValueKind::Vec3, Uniform::Vec3(v)) => v.to_vec(),
        (ValueKind::Vec4, Uniform::Vec4(v)) => v.to_vec(),
        (ValueKind::Mat4, Uniform::Mat4(m)) => m.iter().flatten().copied().collect(),
        (kind, value) => {
            log::warn!("uniform value {:?} does not fit a {:?}", value, kind);
            return None;
        }
    };
    Some(bytemuck::cast_slice(&floats).to_vec())
}

/// `"factors[3]"` becomes `("factors", Some(3))`.
fn split_index(name: &str) -> Option<(&str, Option<u32>)> {
    match name.strip_suffix(']').and_then(|n| n.split_once('[')) {
        Some((base, index)) => Some((base, Some(index.trim().parse().ok()?))),
        None => Some((name, None)),
    }
}

fn unit_name(global: &str, kind: SlotKind) -> String {
    let suffix = match kind {
        SlotKind::Texture => "_tex",
        SlotKind::Sampler => "_sampler",
    };
    global.strip_suffix(suffix).unwrap_or(global).to_string()
}

fn round_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment).max(1) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = "#version 450
layout(location = 0) in vec3 position;
layout(location = 0) out vec2 uv;
layout(std140, set = 0, binding = 0) uniform Transform {
    mat4 modelview;
    vec2 delta;
    float factors[3];
};
void main() {
    uv = position.xy + delta * factors[1];
    gl_Position = modelview * vec4(position, 1.0);
}
";

    const FRAGMENT: &str = "#version 450
layout(location = 0) in vec2 uv;
layout(location = 0) out vec4 color;
layout(set = 1, binding = 0) uniform texture2D source_tex;
layout(set = 1, binding = 1) uniform sampler source_sampler;
void main() {
    color = texture(sampler2D(source_tex, source_sampler), uv);
}
";

    #[test]
    fn reflects_blocks_and_slots() {
        let vertex = compile(ShaderStage::Vertex, VERTEX).unwrap();
        let fragment = compile(ShaderStage::Fragment, FRAGMENT).unwrap();
        link(&vertex, &fragment).unwrap();
        let interface = Interface::reflect(&vertex, &fragment);
        assert_eq!(interface.group_count(), 2);
        assert_eq!(interface.slots.len(), 2);
        assert!(interface.slots.iter().all(|s| s.unit_name == "source"));

        let (block, offset, bytes) = interface.encode("modelview", Uniform::Mat4([[0.0; 4]; 4])).unwrap();
        assert_eq!((block, offset, bytes.len()), (0, 0, 64));
        let (_, first, _) = interface.encode("factors[0]", Uniform::Float(1.0)).unwrap();
        let (_, second, _) = interface.encode("factors[1]", Uniform::Float(1.0)).unwrap();
        assert_eq!(second - first, 16);
        assert!(interface.encode("factors[3]", Uniform::Float(1.0)).is_none());
        assert!(interface.encode("missing", Uniform::Float(1.0)).is_none());
    }

    #[test]
    fn syntax_errors_are_compile_failures() {
        let err = compile(ShaderStage::Fragment, "#version 450\nvoid main() { oops }").unwrap_err();
        assert!(matches!(
            err,
            Error::CompileFailure {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
    }

    #[test]
    fn unmatched_varyings_fail_to_link() {
        let vertex = compile(
            ShaderStage::Vertex,
            "#version 450\nlayout(location = 0) in vec3 p;\nvoid main() { gl_Position = vec4(p, 1.0); }\n",
        )
        .unwrap();
        let fragment = compile(ShaderStage::Fragment, FRAGMENT).unwrap();
        assert!(matches!(link(&vertex, &fragment), Err(Error::LinkFailure { .. })));
    }
}
