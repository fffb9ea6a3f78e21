//! Startup configuration.
//!
//! Everything here can also be changed at runtime through the setters on
//! [`crate::engine::Engine`]; the config only provides the initial values.
//!
//! ```toml
//! width = 960
//! height = 540
//! title = "Windmill"
//! background_color = [0.30, 0.47, 0.55]
//! light_direction = [-0.8, -0.7, 1.3]
//! light_intensity = 0.4
//! assets = "assets"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub background_color: [f32; 3],
    /// Direction towards the light in world space. Normalized on use.
    pub light_direction: [f32; 3],
    pub light_intensity: f32,
    pub ambient_intensity: f32,
    /// Resource directory loaded into the registry when the engine opens.
    pub assets: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: String::from("bloom-ngin"),
            background_color: [0.0, 0.0, 0.0],
            light_direction: [0.0, 0.0, 1.0],
            light_intensity: 0.8,
            ambient_intensity: 0.2,
            assets: None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::load("<config>", e))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::load(path, e))?;
        toml::from_str(&text).map_err(|e| Error::load(path, e))
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}
