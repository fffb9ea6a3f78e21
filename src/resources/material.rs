use std::path::Path;

use crate::{
    device::{GraphicsDevice, Uniform},
    error::Result,
    resources::{
        Handle, Registry, Resource, ResourceKind, Shader, Texture, description_lines, load_string,
    },
};

/// Texture unit the material texture is bound to.
pub const MATERIAL_TEXTURE_UNIT: u32 = 0;

/// A float uniform with one to four components.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialUniform {
    pub name: String,
    pub values: Vec<f32>,
}

impl MaterialUniform {
    fn value(&self) -> Option<Uniform> {
        match self.values.as_slice() {
            [x] => Some(Uniform::Float(*x)),
            [x, y] => Some(Uniform::Vec2([*x, *y])),
            [x, y, z] => Some(Uniform::Vec3([*x, *y, *z])),
            [x, y, z, w] => Some(Uniform::Vec4([*x, *y, *z, *w])),
            _ => None,
        }
    }
}

/// Surface description: which shader draws a mesh, with which texture and
/// which constant uniforms.
///
/// `.mat` format, one command per line:
///
/// ```text
/// shader lit            # lit.glsl
/// texture bricks.png
/// uniform tint 1.0 0.8 0.8
/// ```
#[derive(Debug, Default)]
pub struct Material {
    shader: Option<Handle<Shader>>,
    texture: Option<Handle<Texture>>,
    uniforms: Vec<MaterialUniform>,
}

impl Material {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `.mat` description. Referenced shaders and textures must be
    /// registered already.
    pub fn parse(text: &str, registry: &Registry) -> Result<Self> {
        let mut material = Self::new();
        for words in description_lines(text) {
            match words[0] {
                "shader" => {
                    let name = words.get(1).copied().unwrap_or_default();
                    material.shader = Some(registry.get(&format!("{name}.glsl"))?);
                }
                "texture" => {
                    let name = words.get(1).copied().unwrap_or_default();
                    material.texture = Some(registry.get(name)?);
                }
                "uniform" => {
                    let Some(name) = words.get(1) else { continue };
                    let values = words[2..]
                        .iter()
                        .take(4)
                        .map_while(|w| w.parse::<f32>().ok())
                        .collect::<Vec<_>>();
                    material.uniforms.push(MaterialUniform {
                        name: name.to_string(),
                        values,
                    });
                }
                _ => {}
            }
        }
        Ok(material)
    }

    pub fn shader(&self) -> Option<Handle<Shader>> {
        self.shader
    }

    pub fn set_shader(&mut self, shader: Option<Handle<Shader>>) {
        self.shader = shader;
    }

    pub fn texture(&self) -> Option<Handle<Texture>> {
        self.texture
    }

    pub fn set_texture(&mut self, texture: Option<Handle<Texture>>) {
        self.texture = texture;
    }

    pub fn uniforms(&self) -> &[MaterialUniform] {
        &self.uniforms
    }

    /// Sets a uniform, replacing an earlier value of the same name. Values
    /// beyond the fourth are dropped.
    pub fn set_uniform(&mut self, name: &str, values: &[f32]) {
        let values = values.iter().copied().take(4).collect();
        match self.uniforms.iter_mut().find(|u| u.name == name) {
            Some(uniform) => uniform.values = values,
            None => self.uniforms.push(MaterialUniform {
                name: name.to_string(),
                values,
            }),
        }
    }

    /// Makes the material current: binds its shader, uploads its uniforms and
    /// binds its texture to unit 0 (or clears unit 0).
    ///
    /// Returns the bound shader, or `None` when there is nothing to draw with.
    pub fn apply<'r>(
        &self,
        device: &mut dyn GraphicsDevice,
        registry: &'r Registry,
    ) -> Option<&'r Shader> {
        let shader = registry.resolve(self.shader?)?;
        shader.bind(device);

        for uniform in &self.uniforms {
            if let Some(value) = uniform.value() {
                shader.set_uniform(device, &uniform.name, value);
            }
        }

        match self.texture.and_then(|t| registry.resolve(t)) {
            Some(texture) => {
                texture.bind(device, MATERIAL_TEXTURE_UNIT);
                shader.set_uniform(device, "texture", Uniform::Int(MATERIAL_TEXTURE_UNIT as i32));
            }
            None => Texture::unbind(device, MATERIAL_TEXTURE_UNIT),
        }
        Some(shader)
    }
}

impl Resource for Material {
    const KIND: ResourceKind = ResourceKind::Material;

    fn load(path: &Path, registry: &Registry, _: &mut dyn GraphicsDevice) -> Result<Self> {
        Self::parse(&load_string(path)?, registry)
    }

    // Shader and texture belong to the registry
    fn release(&self, _: &mut dyn GraphicsDevice) {}

    fn pool(registry: &Registry) -> &Vec<Self> {
        &registry.materials
    }

    fn pool_mut(registry: &mut Registry) -> &mut Vec<Self> {
        &mut registry.materials
    }
}
