//! Engine data structures: scene graph nodes and render targets.
//!
//! - `scene_graph` holds groups, node references and the runtime scene arena
//! - `instance` places a renderable with a transform
//! - `framebuffer` is an off-screen color target with an optional depth buffer

pub mod framebuffer;
pub mod instance;
pub mod scene_graph;
