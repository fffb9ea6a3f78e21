use std::path::Path;

use crate::{
    device::{GraphicsDevice, ProgramId, Uniform},
    error::{Error, Result},
    resources::{Registry, Resource, ResourceKind, load_string},
};

/// A linked vertex + fragment program.
///
/// In a `.glsl` file the two stages are separated by a line made only of `-`
/// characters:
///
/// ```text
/// #version 450
/// // vertex stage
/// ---
/// #version 450
/// // fragment stage
/// ```
#[derive(Debug)]
pub struct Shader {
    program: ProgramId,
}

impl Shader {
    pub fn from_source(device: &mut dyn GraphicsDevice, label: &str, source: &str) -> Result<Self> {
        let (vertex, fragment) =
            split_stages(source).map_err(|reason| Error::load(label, reason))?;
        Self::from_stages(device, label, &vertex, &fragment)
    }

    pub fn from_stages(
        device: &mut dyn GraphicsDevice,
        label: &str,
        vertex: &str,
        fragment: &str,
    ) -> Result<Self> {
        let program = device.create_program(label, vertex, fragment)?;
        Ok(Self { program })
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn bind(&self, device: &mut dyn GraphicsDevice) {
        device.use_program(self.program);
    }

    pub fn set_uniform(&self, device: &mut dyn GraphicsDevice, name: &str, value: impl Into<Uniform>) {
        device.set_uniform(self.program, name, value.into());
    }
}

impl Resource for Shader {
    const KIND: ResourceKind = ResourceKind::Shader;

    fn load(path: &Path, _: &Registry, device: &mut dyn GraphicsDevice) -> Result<Self> {
        let source = load_string(path)?;
        let (vertex, fragment) = split_stages(&source).map_err(|reason| Error::load(path, reason))?;
        Self::from_stages(device, &path.display().to_string(), &vertex, &fragment)
    }

    fn release(&self, device: &mut dyn GraphicsDevice) {
        device.delete_program(self.program);
    }

    fn pool(registry: &Registry) -> &Vec<Self> {
        &registry.shaders
    }

    fn pool_mut(registry: &mut Registry) -> &mut Vec<Self> {
        &mut registry.shaders
    }
}

fn is_separator(line: &str) -> bool {
    !line.is_empty() && line.chars().all(|c| c == '-')
}

/// Splits a combined shader source into its vertex and fragment stage.
pub fn split_stages(source: &str) -> Result<(String, String), &'static str> {
    let mut stages = [String::new(), String::new()];
    let mut part = 0;
    for line in source.lines() {
        if is_separator(line) {
            part += 1;
            if part > 1 {
                return Err("shader file has more than two parts");
            }
            continue;
        }
        stages[part].push_str(line);
        stages[part].push('\n');
    }
    if part == 0 {
        return Err("shader file has only one part");
    }
    let [vertex, fragment] = stages;
    Ok((vertex, fragment))
}
