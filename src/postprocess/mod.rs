//! Image-space effects applied after the scene has been rendered.
//!
//! The engine keeps an ordered chain of [`Postprocessor`]s. The scene is drawn
//! into the render target of the first stage; each stage then reads its own
//! render target and writes into the next stage's target, the last one
//! writing to the display.
//!
//! - `bloom`: separable Gaussian glow, see [`bloom::Bloom`]

use std::any::Any;

use crate::{
    data_structures::framebuffer::Framebuffer,
    device::{GraphicsDevice, MeshId, RenderTarget, Vertex},
    error::Result,
};

pub mod bloom;

pub use bloom::Bloom;

slotmap::new_key_type! {
    /// A postprocessor owned by the engine.
    pub struct PostprocessorId;
}

pub trait Postprocessor: Any {
    /// Where the previous step renders the image this stage consumes.
    fn render_target(&self) -> &Framebuffer;

    fn render_target_mut(&mut self) -> &mut Framebuffer;

    /// Reads [`Self::render_target`] and writes the processed image into
    /// `target`.
    fn render_effect(&mut self, device: &mut dyn GraphicsDevice, target: RenderTarget);

    /// Frees every GPU object the stage owns.
    fn release(&self, device: &mut dyn GraphicsDevice);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl std::fmt::Debug for dyn Postprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Postprocessor")
    }
}

/// Vertex source shared by full-screen passes. Emits `texcoord` with v = 0 at
/// the top edge, matching the row order of render targets.
pub const FULLSCREEN_VERTEX_SHADER: &str = include_str!("shaders/fullscreen.vert");

/// Uploads a quad covering all of clip space as a single four-index strip.
pub fn fullscreen_quad(device: &mut dyn GraphicsDevice, label: &str) -> Result<MeshId> {
    let vertices: Vec<Vertex> = (0..4)
        .map(|i| Vertex {
            position: [(i / 2) as f32 * 2.0 - 1.0, 1.0 - (i % 2) as f32 * 2.0, 0.0],
            ..Default::default()
        })
        .collect();
    device.create_mesh(label, &vertices, &[0, 1, 2, 3])
}
