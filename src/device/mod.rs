//! The graphics device seam.
//!
//! Everything above this module (registry, scene graph, post-processing,
//! engine) talks to the GPU exclusively through [`GraphicsDevice`]. The trait
//! is deliberately close to a classic bind-and-draw API: a program is made
//! current, uniforms are set by name, textures are bound to numbered units and
//! an indexed triangle-strip draw is issued against the currently bound
//! render target.
//!
//! Two implementations ship with the crate:
//!
//! - [`headless::HeadlessDevice`] records every call and is what the tests use
//! - `wgpu::WgpuDevice` (feature `backend_wgpu`) drives a real window surface

pub mod headless;
#[cfg(feature = "backend_wgpu")]
pub mod wgpu;

use cgmath::{Matrix4, SquareMatrix};

use crate::error::Result;

slotmap::new_key_type! {
    /// A linked shader program.
    pub struct ProgramId;
    /// A 2D texture.
    pub struct TextureId;
    /// A vertex buffer, an index buffer and their attribute layout.
    pub struct MeshId;
    /// An off-screen render target.
    pub struct FramebufferId;
}

/// Index value that terminates one triangle strip and starts the next one
/// within the same draw call.
pub const PRIMITIVE_RESTART: u32 = u32::MAX;

/// Number of texture units a device has to support.
pub const TEXTURE_UNITS: usize = 4;

/// Vertex layout shared by every mesh.
///
/// Attribute locations: 0 position, 1 normal, 2 texture coordinate.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
}

/// A uniform value as accepted by [`GraphicsDevice::set_uniform`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Uniform {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat4([[f32; 4]; 4]),
}

impl From<f32> for Uniform {
    fn from(value: f32) -> Self {
        Uniform::Float(value)
    }
}

impl From<cgmath::Vector3<f32>> for Uniform {
    fn from(value: cgmath::Vector3<f32>) -> Self {
        Uniform::Vec3(value.into())
    }
}

impl From<Matrix4<f32>> for Uniform {
    fn from(value: Matrix4<f32>) -> Self {
        Uniform::Mat4(value.into())
    }
}

/// Pixel layout of a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 24-bit RGB
    Rgb8,
    /// 32-bit RGBA
    Rgba8,
    RgbFloat,
    RgbaFloat,
}

impl PixelFormat {
    pub fn is_float(self) -> bool {
        matches!(self, PixelFormat::RgbFloat | PixelFormat::RgbaFloat)
    }

    /// Bytes per pixel of the client-side representation. Float formats have
    /// no client-side uploads and report zero.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
            PixelFormat::RgbFloat | PixelFormat::RgbaFloat => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Tile the texture outside [0, 1] instead of clamping to the edge.
    pub wrap: bool,
}

/// Where draw calls go.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenderTarget {
    /// The window surface.
    #[default]
    Display,
    Framebuffer(FramebufferId),
}

/// The GPU capability the engine consumes but does not implement.
///
/// All calls happen on the thread that owns the graphics context. Resource
/// handles are only meaningful for the device that created them; passing a
/// stale or foreign handle is logged by the device and otherwise ignored.
pub trait GraphicsDevice {
    /// Compiles both stages and links them into a program.
    ///
    /// Fails with [`crate::Error::CompileFailure`] or
    /// [`crate::Error::LinkFailure`] carrying the device diagnostic. Nothing
    /// is left allocated on failure.
    fn create_program(&mut self, label: &str, vertex: &str, fragment: &str) -> Result<ProgramId>;

    fn delete_program(&mut self, program: ProgramId);

    /// Makes `program` current for subsequent draws.
    fn use_program(&mut self, program: ProgramId);

    /// Sets a uniform of `program`. Names the program does not use are
    /// silently ignored. Array elements are addressed as `name[i]`.
    fn set_uniform(&mut self, program: ProgramId, name: &str, value: Uniform);

    /// Creates a texture, optionally filled with tightly packed `pixels` in
    /// `desc.format`. Contents are unspecified when `pixels` is `None`.
    ///
    /// The first row is sampled at v = 0. When the texture backs a
    /// framebuffer, the first row holds the top of the rendered image.
    fn create_texture(&mut self, desc: &TextureDesc, pixels: Option<&[u8]>) -> Result<TextureId>;

    fn set_texture_wrap(&mut self, texture: TextureId, wrap: bool);

    fn delete_texture(&mut self, texture: TextureId);

    /// Binds `texture` to `unit`, or clears the unit with `None`.
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>);

    /// Uploads vertex and index data. `indices` form triangle strips separated
    /// by [`PRIMITIVE_RESTART`].
    fn create_mesh(&mut self, label: &str, vertices: &[Vertex], indices: &[u32]) -> Result<MeshId>;

    fn delete_mesh(&mut self, mesh: MeshId);

    /// Issues one indexed draw of `mesh` with the current program and
    /// textures into the bound render target.
    fn draw(&mut self, mesh: MeshId);

    /// Creates a framebuffer rendering into `color`, which must have been
    /// created by this device.
    fn create_framebuffer(&mut self, color: TextureId) -> Result<FramebufferId>;

    /// Adds a depth attachment sized like the color attachment.
    fn attach_depth(&mut self, framebuffer: FramebufferId) -> Result<()>;

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Redirects draws to `target`, sets the viewport to its full size and
    /// returns the target that was bound before.
    fn bind_target(&mut self, target: RenderTarget) -> RenderTarget;

    fn set_clear_color(&mut self, color: [f32; 4]);

    /// Clears color and depth of the bound target.
    fn clear(&mut self);

    /// Makes the frame visible. May block for display synchronization.
    fn present(&mut self) -> Result<()>;

    /// Drains the most recent device error, if any.
    fn last_error(&mut self) -> Option<String>;

    /// Size of the display surface in pixels.
    fn display_size(&self) -> (u32, u32);

    /// Matrix pre-multiplied onto GL-convention projection matrices so that
    /// clip space matches the device.
    fn clip_space_correction(&self) -> Matrix4<f32> {
        Matrix4::identity()
    }
}
