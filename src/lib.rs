//! bloom-ngin
//!
//! A small real-time 3D engine for teaching: a name-addressed resource
//! registry loaded from a directory, a scene graph of groups and transformed
//! instances, a heading/pitch/roll camera, time-based animations, and an
//! ordered post-processing chain with a bloom effect.
//!
//! High-level modules
//! - `device`: the graphics device seam, with a recording headless device
//!   and a wgpu backend
//! - `resources`: the registry and the file-backed resource kinds
//!   (shaders, textures, materials, meshes, scene files)
//! - `data_structures`: scene groups, instances and framebuffers
//! - `render`: per-frame scene traversal
//! - `camera`: view and projection matrices
//! - `animation`: translation and rotation animations and their scheduler
//! - `postprocess`: the post-processor trait and bloom
//! - `engine`: the frame loop tying it together
//! - `config`, `input`, `display`: startup settings, input events and the
//!   winit window
//!

pub mod animation;
pub mod camera;
pub mod config;
pub mod data_structures;
pub mod device;
#[cfg(feature = "backend_wgpu")]
pub mod display;
pub mod engine;
pub mod error;
pub mod input;
pub mod postprocess;
pub mod render;
pub mod resources;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use engine::{Engine, EventListener};
pub use error::{Error, Result};
