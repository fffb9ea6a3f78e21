//! Scene graph and hierarchical scene organization.
//!
//! The graph is made of three kinds of node:
//!
//! - meshes and `.scene` assets, owned by the [`crate::resources::Registry`]
//! - [`Group`]s, ordered lists of other nodes
//! - [`Instance`]s, a transform around exactly one other node
//!
//! Nodes never own what they point at. References are [`NodeRef`] values:
//! registry handles for assets and [`Scene`] arena keys for groups and
//! instances built at runtime. The registry and the scene have to outlive
//! every traversal, which the engine guarantees by owning both.

use cgmath::{Deg, Matrix4, Vector3};
use slotmap::SlotMap;

use crate::{
    data_structures::instance::Instance,
    error::Result,
    render::{Frame, RenderState, Renderable},
    resources::{Handle, Mesh, Registry, description_lines, float_at},
};

slotmap::new_key_type! {
    /// A group created at runtime and stored in a [`Scene`].
    pub struct GroupId;
    /// An instance created at runtime and stored in a [`Scene`].
    pub struct InstanceId;
}

/// Non-owning reference to anything that can be rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Mesh(Handle<Mesh>),
    /// A group loaded from a `.scene` file.
    Asset(Handle<Group>),
    Group(GroupId),
    Instance(InstanceId),
}

impl From<Handle<Mesh>> for NodeRef {
    fn from(handle: Handle<Mesh>) -> Self {
        NodeRef::Mesh(handle)
    }
}

impl From<Handle<Group>> for NodeRef {
    fn from(handle: Handle<Group>) -> Self {
        NodeRef::Asset(handle)
    }
}

impl From<GroupId> for NodeRef {
    fn from(id: GroupId) -> Self {
        NodeRef::Group(id)
    }
}

impl From<InstanceId> for NodeRef {
    fn from(id: InstanceId) -> Self {
        NodeRef::Instance(id)
    }
}

/// One slot in a group's draw order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entry {
    /// A node owned elsewhere.
    Node(NodeRef),
    /// Index into the instances the group created itself while parsing.
    Owned(usize),
}

/// An ordered composite of renderables.
///
/// `.scene` format, one command per line. Transform commands apply to the
/// most recently started object, in its already transformed local frame:
///
/// ```text
/// object windmill        # windmill.obj
/// translate 9 -0.6 0
/// rotate_z 30
/// ```
#[derive(Debug, Default)]
pub struct Group {
    entries: Vec<Entry>,
    instances: Vec<Instance>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `.scene` description. Referenced meshes must already be
    /// registered. Unknown commands, and transforms before the first
    /// `object`, are ignored.
    pub fn parse(text: &str, registry: &Registry) -> Result<Self> {
        let mut group = Self::new();
        let mut current: Option<usize> = None;
        for words in description_lines(text) {
            if words[0] == "object" {
                let name = words.get(1).copied().unwrap_or_default();
                let mesh = registry.get::<Mesh>(&format!("{name}.obj"))?;
                group.instances.push(Instance::new(mesh));
                let index = group.instances.len() - 1;
                group.entries.push(Entry::Owned(index));
                current = Some(index);
                continue;
            }
            let Some(instance) = current.and_then(|i| group.instances.get_mut(i)) else {
                continue;
            };
            let transform = match words[0] {
                "translate" => Matrix4::from_translation(Vector3::new(
                    float_at(&words, 1),
                    float_at(&words, 2),
                    float_at(&words, 3),
                )),
                "rotate_x" => Matrix4::from_angle_x(Deg(float_at(&words, 1))),
                "rotate_y" => Matrix4::from_angle_y(Deg(float_at(&words, 1))),
                "rotate_z" => Matrix4::from_angle_z(Deg(float_at(&words, 1))),
                _ => continue,
            };
            instance.transform_local(transform);
        }
        Ok(group)
    }

    /// Appends `node` to the draw order. A node may be added more than once.
    pub fn add(&mut self, node: impl Into<NodeRef>) {
        self.entries.push(Entry::Node(node.into()));
    }

    /// Removes every occurrence of `node`. Removing an absent node does
    /// nothing.
    pub fn remove(&mut self, node: impl Into<NodeRef>) {
        let node = Entry::Node(node.into());
        self.entries.retain(|entry| *entry != node);
    }

    pub fn contains(&self, node: impl Into<NodeRef>) -> bool {
        self.entries.contains(&Entry::Node(node.into()))
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Instances created by [`Self::parse`].
    pub fn owned_instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Renderable for Group {
    fn render(&self, frame: &mut Frame<'_>, state: &RenderState) {
        for entry in &self.entries {
            match entry {
                Entry::Node(node) => frame.render(*node, state),
                Entry::Owned(index) => {
                    if let Some(instance) = self.instances.get(*index) {
                        instance.render(frame, state);
                    }
                }
            }
        }
    }
}

/// Arena for the groups and instances an application builds at runtime.
#[derive(Debug, Default)]
pub struct Scene {
    groups: SlotMap<GroupId, Group>,
    instances: SlotMap<InstanceId, Instance>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_group(&mut self, group: Group) -> GroupId {
        self.groups.insert(group)
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(id)
    }

    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups.get_mut(id)
    }

    /// Removes the group. References to it elsewhere are left dangling and
    /// skipped when rendering.
    pub fn remove_group(&mut self, id: GroupId) -> Option<Group> {
        self.groups.remove(id)
    }

    pub fn add_instance(&mut self, instance: Instance) -> InstanceId {
        self.instances.insert(instance)
    }

    pub fn instance(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.get(id)
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> Option<&mut Instance> {
        self.instances.get_mut(id)
    }

    pub fn remove_instance(&mut self, id: InstanceId) -> Option<Instance> {
        self.instances.remove(id)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}
