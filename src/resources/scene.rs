use std::path::Path;

use crate::{
    data_structures::scene_graph::Group,
    device::GraphicsDevice,
    error::Result,
    resources::{Registry, Resource, ResourceKind, load_string},
};

impl Resource for Group {
    const KIND: ResourceKind = ResourceKind::Group;

    fn load(path: &Path, registry: &Registry, _: &mut dyn GraphicsDevice) -> Result<Self> {
        Group::parse(&load_string(path)?, registry)
    }

    // Meshes referenced by the group belong to the registry
    fn release(&self, _: &mut dyn GraphicsDevice) {}

    fn pool(registry: &Registry) -> &Vec<Self> {
        &registry.groups
    }

    fn pool_mut(registry: &mut Registry) -> &mut Vec<Self> {
        &mut registry.groups
    }
}
