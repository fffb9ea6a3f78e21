//! Per-frame scene traversal.
//!
//! The engine builds one [`RenderState`] per frame and hands the scene root to
//! a [`Frame`]. Each node implements [`Renderable`]: groups visit their
//! entries in order, instances fold their matrix into the model-view matrix
//! and meshes issue the actual draw.
//!
//! # Key types
//!
//! - [`RenderState`] holds the camera matrices and lighting for one pass
//! - [`Frame`] resolves [`NodeRef`]s against the registry and the scene
//! - [`Renderable`] is implemented by [`crate::resources::Mesh`],
//!   [`crate::data_structures::scene_graph::Group`] and
//!   [`crate::data_structures::instance::Instance`]
//!
//! Rendering a node may change the bound program, the texture on unit 0 and
//! the mesh being drawn, and nothing else.

use cgmath::{Matrix4, SquareMatrix, Vector3};

use crate::{
    data_structures::scene_graph::{NodeRef, Scene},
    device::GraphicsDevice,
    resources::Registry,
};

/// Nesting deeper than this is treated as a cycle and cut off.
pub const MAX_DEPTH: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderState {
    pub projection: Matrix4<f32>,
    pub modelview: Matrix4<f32>,
    /// Direction towards the light, in eye space.
    pub light_direction: Vector3<f32>,
    /// World up (+Z), in eye space.
    pub sky_direction: Vector3<f32>,
    pub light_intensity: f32,
    pub ambient_intensity: f32,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            projection: Matrix4::identity(),
            modelview: Matrix4::identity(),
            light_direction: Vector3::unit_z(),
            sky_direction: Vector3::unit_z(),
            light_intensity: 0.8,
            ambient_intensity: 0.2,
        }
    }
}

impl RenderState {
    /// Same state with a different model-view matrix.
    pub fn with_modelview(&self, modelview: Matrix4<f32>) -> Self {
        Self { modelview, ..*self }
    }
}

/// Something that can draw itself given the per-frame state.
pub trait Renderable {
    fn render(&self, frame: &mut Frame<'_>, state: &RenderState);
}

/// Everything a traversal needs besides the state: the device to draw with
/// and the two places nodes live in.
pub struct Frame<'a> {
    device: &'a mut dyn GraphicsDevice,
    pub registry: &'a Registry,
    pub scene: &'a Scene,
    depth: usize,
}

impl<'a> Frame<'a> {
    pub fn new(device: &'a mut dyn GraphicsDevice, registry: &'a Registry, scene: &'a Scene) -> Self {
        Self {
            device,
            registry,
            scene,
            depth: 0,
        }
    }

    pub fn device(&mut self) -> &mut dyn GraphicsDevice {
        &mut *self.device
    }

    /// Resolves `node` and renders it. Dangling references are skipped.
    pub fn render(&mut self, node: NodeRef, state: &RenderState) {
        if self.depth >= MAX_DEPTH {
            log::warn!(
                "scene nesting exceeds {} levels at {:?}, probably a cycle; skipping",
                MAX_DEPTH,
                node
            );
            return;
        }
        let (registry, scene) = (self.registry, self.scene);
        let renderable: Option<&dyn Renderable> = match node {
            NodeRef::Mesh(handle) => registry.resolve(handle).map(|m| m as &dyn Renderable),
            NodeRef::Asset(handle) => registry.resolve(handle).map(|g| g as &dyn Renderable),
            NodeRef::Group(id) => scene.group(id).map(|g| g as &dyn Renderable),
            NodeRef::Instance(id) => scene.instance(id).map(|i| i as &dyn Renderable),
        };
        let Some(renderable) = renderable else {
            log::warn!("skipping dangling scene reference {:?}", node);
            return;
        };
        self.depth += 1;
        renderable.render(self, state);
        self.depth -= 1;
    }
}
