//! Named, registry-owned assets and the loaders that create them.
//!
//! The [`Registry`] owns every shader, texture, material, mesh and scene
//! group loaded from disk. Everything else refers to these assets through
//! typed [`Handle`]s, which are indices checked against the resource
//! kind when they are handed out by [`Registry::get`].
//!
//! - `shader`: `.glsl` files holding a vertex and a fragment stage
//! - `texture`: `.png` / `.jpg` images
//! - `material`: `.mat` descriptions binding a shader, a texture and uniforms
//! - `mesh`: `.obj` geometry rebuilt into triangle strips
//! - `scene`: `.scene` descriptions of instanced meshes

use std::{
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    path::{Path, PathBuf},
};

use crate::{
    data_structures::scene_graph::Group,
    device::GraphicsDevice,
    error::{Error, Result},
};

pub mod material;
pub mod mesh;
pub mod scene;
pub mod shader;
pub mod texture;

pub use material::Material;
pub use mesh::Mesh;
pub use shader::Shader;
pub use texture::Texture;

/// The kinds of asset a [`Registry`] can hold, in the order a directory is
/// loaded. Later kinds may refer to earlier ones by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Shader,
    Texture,
    Material,
    Mesh,
    Group,
}

impl ResourceKind {
    /// Maps a file extension (without the dot, any case) to the kind it holds.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "glsl" => Some(ResourceKind::Shader),
            "png" | "jpg" | "jpeg" => Some(ResourceKind::Texture),
            "mat" => Some(ResourceKind::Material),
            "obj" => Some(ResourceKind::Mesh),
            "scene" => Some(ResourceKind::Group),
            _ => None,
        }
    }

    pub fn for_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Shader => "shader",
            ResourceKind::Texture => "texture",
            ResourceKind::Material => "material",
            ResourceKind::Mesh => "mesh",
            ResourceKind::Group => "group",
        })
    }
}

/// A typed, non-owning reference to an asset held by a [`Registry`].
///
/// Handles are only created by the registry, so the kind is checked once at
/// lookup and never again when the handle is resolved. A handle also
/// carries the registry generation it was issued in, so it stops resolving
/// once the registry has been released.
pub struct Handle<T> {
    index: usize,
    generation: u32,
    marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: usize, generation: u32) -> Self {
        Self {
            index,
            generation,
            marker: PhantomData,
        }
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T: Resource> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle<{}>({})", T::KIND, self.index)
    }
}

/// An asset type that can live in a [`Registry`].
pub trait Resource: Sized {
    const KIND: ResourceKind;

    /// Builds the resource from `path`. Other resources it refers to must
    /// already be present in `registry`.
    ///
    /// On failure nothing may be left allocated on `device`.
    fn load(path: &Path, registry: &Registry, device: &mut dyn GraphicsDevice) -> Result<Self>;

    /// Frees the GPU objects this resource owns.
    fn release(&self, device: &mut dyn GraphicsDevice);

    #[doc(hidden)]
    fn pool(registry: &Registry) -> &Vec<Self>;

    #[doc(hidden)]
    fn pool_mut(registry: &mut Registry) -> &mut Vec<Self>;
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    kind: ResourceKind,
    index: usize,
}

/// Named cache of loaded assets.
///
/// Populated during startup and read-only afterwards. Names are file names
/// (`"windmill.obj"`), which is also how assets refer to each other.
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<String, Entry>,
    shaders: Vec<Shader>,
    textures: Vec<Texture>,
    materials: Vec<Material>,
    meshes: Vec<Mesh>,
    groups: Vec<Group>,
    // bumped by release
    generation: u32,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Kind of the resource registered under `name`, if any.
    pub fn kind_of(&self, name: &str) -> Option<ResourceKind> {
        self.entries.get(name).map(|entry| entry.kind)
    }

    /// Looks up `name` and checks that it holds a `T`.
    pub fn get<T: Resource>(&self, name: &str) -> Result<Handle<T>> {
        let entry = self.entries.get(name).ok_or_else(|| Error::NotFound {
            name: name.to_string(),
        })?;
        if entry.kind != T::KIND {
            return Err(Error::TypeMismatch {
                name: name.to_string(),
                expected: T::KIND,
                found: entry.kind,
            });
        }
        Ok(Handle::new(entry.index, self.generation))
    }

    /// Returns the resource behind `handle`. `None` only after [`Self::release`].
    pub fn resolve<T: Resource>(&self, handle: Handle<T>) -> Option<&T> {
        if handle.generation != self.generation {
            return None;
        }
        T::pool(self).get(handle.index)
    }

    /// [`Self::get`] followed by [`Self::resolve`].
    pub fn lookup<T: Resource>(&self, name: &str) -> Result<&T> {
        let handle = self.get::<T>(name)?;
        self.resolve(handle).ok_or_else(|| Error::NotFound {
            name: name.to_string(),
        })
    }

    /// Loads every recognized file in `dir`.
    ///
    /// Files are processed kind by kind (shaders, textures, materials, meshes,
    /// scenes) and by name within a kind. The first failure aborts the scan;
    /// resources loaded before it stay registered.
    pub fn load_directory(
        &mut self,
        dir: impl AsRef<Path>,
        device: &mut dyn GraphicsDevice,
    ) -> Result<()> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| Error::load(dir, e))?;

        let mut files: Vec<(ResourceKind, String, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::load(dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                log::debug!("skipping non UTF-8 file name in {}", dir.display());
                continue;
            };
            match ResourceKind::for_path(&path) {
                Some(kind) => files.push((kind, name, path)),
                None => log::debug!("ignoring {}", path.display()),
            }
        }
        files.sort();

        for (kind, name, path) in files {
            self.load_as(kind, &name, &path, device)?;
        }
        Ok(())
    }

    /// Loads a single file, choosing the resource kind by extension. The
    /// resource is registered under the file name.
    pub fn load_file(&mut self, path: impl AsRef<Path>, device: &mut dyn GraphicsDevice) -> Result<()> {
        let path = path.as_ref();
        let kind = ResourceKind::for_path(path)
            .ok_or_else(|| Error::load(path, "unrecognized resource type"))?;
        let name = file_name(path)?;
        self.load_as(kind, &name, path, device)
    }

    /// Loads `path` as a `T` and returns its handle. Loading a name that is
    /// already registered is a no-op that returns the existing handle.
    pub fn load<T: Resource>(
        &mut self,
        path: impl AsRef<Path>,
        device: &mut dyn GraphicsDevice,
    ) -> Result<Handle<T>> {
        let path = path.as_ref();
        let name = file_name(path)?;
        self.load_named(&name, path, device)
    }

    fn load_as(
        &mut self,
        kind: ResourceKind,
        name: &str,
        path: &Path,
        device: &mut dyn GraphicsDevice,
    ) -> Result<()> {
        match kind {
            ResourceKind::Shader => self.load_named::<Shader>(name, path, device).map(drop),
            ResourceKind::Texture => self.load_named::<Texture>(name, path, device).map(drop),
            ResourceKind::Material => self.load_named::<Material>(name, path, device).map(drop),
            ResourceKind::Mesh => self.load_named::<Mesh>(name, path, device).map(drop),
            ResourceKind::Group => self.load_named::<Group>(name, path, device).map(drop),
        }
    }

    fn load_named<T: Resource>(
        &mut self,
        name: &str,
        path: &Path,
        device: &mut dyn GraphicsDevice,
    ) -> Result<Handle<T>> {
        if self.contains(name) {
            log::debug!("{} is already loaded", name);
            return self.get(name);
        }
        let resource = T::load(path, self, device)?;
        log::debug!("registered {} {}", T::KIND, name);
        Ok(self.insert(name, resource))
    }

    fn insert<T: Resource>(&mut self, name: &str, resource: T) -> Handle<T> {
        let pool = T::pool_mut(self);
        pool.push(resource);
        let index = pool.len() - 1;
        self.entries.insert(
            name.to_string(),
            Entry {
                kind: T::KIND,
                index,
            },
        );
        Handle::new(index, self.generation)
    }

    /// Frees every GPU object owned by the registered resources and empties
    /// the registry. Handles obtained earlier stop resolving.
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        // Dependents first
        self.groups.iter().for_each(|r| r.release(device));
        self.meshes.iter().for_each(|r| r.release(device));
        self.materials.iter().for_each(|r| r.release(device));
        self.textures.iter().for_each(|r| r.release(device));
        self.shaders.iter().for_each(|r| r.release(device));
        let generation = self.generation.wrapping_add(1);
        *self = Self::default();
        self.generation = generation;
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::load(path, "path has no usable file name"))
}

pub(crate) fn load_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::load(path, e))
}

pub(crate) fn load_binary(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| Error::load(path, e))
}

/// Lines of a text description with comments removed: blank lines and lines
/// starting with `#` are skipped, the rest is split into whitespace separated
/// words.
pub(crate) fn description_lines(text: &str) -> impl Iterator<Item = Vec<&str>> {
    text.lines()
        .filter(|line| !line.starts_with('#'))
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .filter(|words| !words.is_empty())
}

/// Parses the float at `words[index]`. Missing or malformed numbers read as
/// zero, matching the lenient description formats.
pub(crate) fn float_at(words: &[&str], index: usize) -> f32 {
    words
        .get(index)
        .and_then(|w| w.parse::<f32>().ok())
        .unwrap_or(0.0)
}
