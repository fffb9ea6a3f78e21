//! A device without a GPU.
//!
//! [`HeadlessDevice`] keeps enough bookkeeping to behave like a real device
//! towards the engine (handles, bound state, depth attachments) and records
//! every state-changing call in a command log that tests can inspect.
//! The log is shared: keep a [`CommandLog`] handle to read it after the
//! device has been moved into an engine.

use std::{cell::RefCell, rc::Rc};

use slotmap::SlotMap;

use crate::{
    device::{
        FramebufferId, GraphicsDevice, MeshId, ProgramId, RenderTarget, TEXTURE_UNITS, TextureDesc,
        TextureId, Uniform, Vertex,
    },
    error::{Error, Result, ShaderStage},
};

/// One recorded device call.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    CreateProgram(ProgramId, String),
    DeleteProgram(ProgramId),
    UseProgram(ProgramId),
    SetUniform(ProgramId, String, Uniform),
    CreateTexture(TextureId, TextureDesc),
    SetTextureWrap(TextureId, bool),
    DeleteTexture(TextureId),
    BindTexture(u32, Option<TextureId>),
    CreateMesh(MeshId, String),
    DeleteMesh(MeshId),
    Draw {
        mesh: MeshId,
        program: Option<ProgramId>,
        target: RenderTarget,
    },
    CreateFramebuffer(FramebufferId, TextureId),
    AttachDepth(FramebufferId),
    DeleteFramebuffer(FramebufferId),
    BindTarget(RenderTarget),
    /// Target and clear color.
    Clear(RenderTarget, [f32; 4]),
    Present,
}

/// Shared handle to a device's command log.
#[derive(Clone, Debug, Default)]
pub struct CommandLog(Rc<RefCell<Vec<Command>>>);

impl CommandLog {
    fn push(&self, command: Command) {
        self.0.borrow_mut().push(command);
    }

    /// Copy of everything recorded so far.
    pub fn snapshot(&self) -> Vec<Command> {
        self.0.borrow().clone()
    }

    /// Returns the recorded commands and starts a fresh log.
    pub fn take(&self) -> Vec<Command> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

#[derive(Debug)]
pub struct ProgramInfo {
    pub label: String,
    pub vertex: String,
    pub fragment: String,
}

#[derive(Debug)]
pub struct MeshInfo {
    pub label: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

#[derive(Debug)]
pub struct FramebufferInfo {
    pub color: TextureId,
    pub has_depth: bool,
}

#[derive(Debug)]
pub struct HeadlessDevice {
    size: (u32, u32),
    commands: CommandLog,
    programs: SlotMap<ProgramId, ProgramInfo>,
    textures: SlotMap<TextureId, TextureDesc>,
    meshes: SlotMap<MeshId, MeshInfo>,
    framebuffers: SlotMap<FramebufferId, FramebufferInfo>,
    current_program: Option<ProgramId>,
    texture_units: [Option<TextureId>; TEXTURE_UNITS],
    target: RenderTarget,
    clear_color: [f32; 4],
    errors: Vec<String>,
    rejected_programs: Vec<String>,
}

impl HeadlessDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            commands: CommandLog::default(),
            programs: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            meshes: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            current_program: None,
            texture_units: [None; TEXTURE_UNITS],
            target: RenderTarget::Display,
            clear_color: [0.0; 4],
            errors: Vec::new(),
            rejected_programs: Vec::new(),
        }
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.snapshot()
    }

    /// Returns the recorded commands and starts a fresh log.
    pub fn take_commands(&mut self) -> Vec<Command> {
        self.commands.take()
    }

    /// A handle that keeps reading this device's log.
    pub fn log(&self) -> CommandLog {
        self.commands.clone()
    }

    pub fn program(&self, program: ProgramId) -> Option<&ProgramInfo> {
        self.programs.get(program)
    }

    pub fn texture(&self, texture: TextureId) -> Option<&TextureDesc> {
        self.textures.get(texture)
    }

    pub fn mesh(&self, mesh: MeshId) -> Option<&MeshInfo> {
        self.meshes.get(mesh)
    }

    pub fn framebuffer(&self, framebuffer: FramebufferId) -> Option<&FramebufferInfo> {
        self.framebuffers.get(framebuffer)
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn bound_target(&self) -> RenderTarget {
        self.target
    }

    pub fn bound_texture(&self, unit: u32) -> Option<TextureId> {
        self.texture_units.get(unit as usize).copied().flatten()
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    /// Queues an error for the next [`GraphicsDevice::last_error`] call.
    pub fn inject_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Makes every later program created under `label` fail to link.
    pub fn reject_program(&mut self, label: impl Into<String>) {
        self.rejected_programs.push(label.into());
    }

    fn report(&mut self, message: String) {
        log::warn!("{}", message);
        self.errors.push(message);
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_program(&mut self, label: &str, vertex: &str, fragment: &str) -> Result<ProgramId> {
        for (stage, source) in [(ShaderStage::Vertex, vertex), (ShaderStage::Fragment, fragment)] {
            if source.trim().is_empty() {
                return Err(Error::CompileFailure {
                    stage,
                    log: format!("{label}: empty {stage} stage"),
                });
            }
        }
        if self.rejected_programs.iter().any(|l| l == label) {
            return Err(Error::LinkFailure {
                log: format!("{label}: rejected"),
            });
        }
        let id = self.programs.insert(ProgramInfo {
            label: label.to_string(),
            vertex: vertex.to_string(),
            fragment: fragment.to_string(),
        });
        self.commands.push(Command::CreateProgram(id, label.to_string()));
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(program).is_some() {
            if self.current_program == Some(program) {
                self.current_program = None;
            }
            self.commands.push(Command::DeleteProgram(program));
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        if !self.programs.contains_key(program) {
            self.report(format!("use of unknown program {:?}", program));
            return;
        }
        self.current_program = Some(program);
        self.commands.push(Command::UseProgram(program));
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: Uniform) {
        self.commands
            .push(Command::SetUniform(program, name.to_string(), value));
    }

    fn create_texture(&mut self, desc: &TextureDesc, pixels: Option<&[u8]>) -> Result<TextureId> {
        if let Some(pixels) = pixels {
            let expected =
                desc.width as usize * desc.height as usize * desc.format.bytes_per_pixel();
            if pixels.len() != expected {
                return Err(Error::Device(format!(
                    "texture upload of {} bytes, expected {}",
                    pixels.len(),
                    expected
                )));
            }
        }
        let id = self.textures.insert(*desc);
        self.commands.push(Command::CreateTexture(id, *desc));
        Ok(id)
    }

    fn set_texture_wrap(&mut self, texture: TextureId, wrap: bool) {
        if let Some(desc) = self.textures.get_mut(texture) {
            desc.wrap = wrap;
            self.commands.push(Command::SetTextureWrap(texture, wrap));
        }
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.textures.remove(texture).is_some() {
            self.texture_units
                .iter_mut()
                .filter(|unit| **unit == Some(texture))
                .for_each(|unit| *unit = None);
            self.commands.push(Command::DeleteTexture(texture));
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        match self.texture_units.get_mut(unit as usize) {
            Some(slot) => {
                *slot = texture;
                self.commands.push(Command::BindTexture(unit, texture));
            }
            None => self.report(format!("texture unit {} out of range", unit)),
        }
    }

    fn create_mesh(&mut self, label: &str, vertices: &[Vertex], indices: &[u32]) -> Result<MeshId> {
        let id = self.meshes.insert(MeshInfo {
            label: label.to_string(),
            vertices: vertices.to_vec(),
            indices: indices.to_vec(),
        });
        self.commands.push(Command::CreateMesh(id, label.to_string()));
        Ok(id)
    }

    fn delete_mesh(&mut self, mesh: MeshId) {
        if self.meshes.remove(mesh).is_some() {
            self.commands.push(Command::DeleteMesh(mesh));
        }
    }

    fn draw(&mut self, mesh: MeshId) {
        if !self.meshes.contains_key(mesh) {
            self.report(format!("draw of unknown mesh {:?}", mesh));
            return;
        }
        self.commands.push(Command::Draw {
            mesh,
            program: self.current_program,
            target: self.target,
        });
    }

    fn create_framebuffer(&mut self, color: TextureId) -> Result<FramebufferId> {
        if !self.textures.contains_key(color) {
            return Err(Error::Device(format!(
                "framebuffer color attachment {:?} does not exist",
                color
            )));
        }
        let id = self.framebuffers.insert(FramebufferInfo {
            color,
            has_depth: false,
        });
        self.commands.push(Command::CreateFramebuffer(id, color));
        Ok(id)
    }

    fn attach_depth(&mut self, framebuffer: FramebufferId) -> Result<()> {
        let info = self
            .framebuffers
            .get_mut(framebuffer)
            .ok_or_else(|| Error::Device(format!("unknown framebuffer {:?}", framebuffer)))?;
        info.has_depth = true;
        self.commands.push(Command::AttachDepth(framebuffer));
        Ok(())
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.framebuffers.remove(framebuffer).is_some() {
            if self.target == RenderTarget::Framebuffer(framebuffer) {
                self.target = RenderTarget::Display;
            }
            self.commands.push(Command::DeleteFramebuffer(framebuffer));
        }
    }

    fn bind_target(&mut self, target: RenderTarget) -> RenderTarget {
        if let RenderTarget::Framebuffer(id) = target {
            if !self.framebuffers.contains_key(id) {
                self.report(format!("bind of unknown framebuffer {:?}", id));
                return self.target;
            }
        }
        self.commands.push(Command::BindTarget(target));
        std::mem::replace(&mut self.target, target)
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    fn clear(&mut self) {
        self.commands.push(Command::Clear(self.target, self.clear_color));
    }

    fn present(&mut self) -> Result<()> {
        self.commands.push(Command::Present);
        Ok(())
    }

    fn last_error(&mut self) -> Option<String> {
        (!self.errors.is_empty()).then(|| self.errors.remove(0))
    }

    fn display_size(&self) -> (u32, u32) {
        self.size
    }
}
