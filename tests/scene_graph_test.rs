use approx::assert_relative_eq;
use bloom_ngin::{
    data_structures::{
        instance::Instance,
        scene_graph::{Group, NodeRef, Scene},
    },
    device::headless::{Command, HeadlessDevice},
    render::{Frame, RenderState},
    resources::{Mesh, Registry},
};
use cgmath::{Matrix4, SquareMatrix, Vector3};

use crate::common::test_utils::{draws, full_asset_dir, init_logger, uploaded_matrices};

mod common;

fn loaded() -> (HeadlessDevice, Registry, tempfile::TempDir) {
    init_logger();
    let dir = full_asset_dir();
    let mut device = HeadlessDevice::default();
    let mut registry = Registry::new();
    registry.load_directory(dir.path(), &mut device).unwrap();
    device.take_commands();
    (device, registry, dir)
}

fn render(device: &mut HeadlessDevice, registry: &Registry, scene: &Scene, root: NodeRef) -> Vec<Command> {
    Frame::new(device, registry, scene).render(root, &RenderState::default());
    device.take_commands()
}

#[test]
fn instances_compose_their_matrices_down_the_tree() {
    let (mut device, registry, _dir) = loaded();
    let quad = registry.get::<Mesh>("quad.obj").unwrap();
    let mut scene = Scene::new();

    let inner = scene.add_instance(
        Instance::with_matrix(quad, Matrix4::from_translation(Vector3::new(1.0, 0.0, 0.0))),
    );
    let mut group = Group::new();
    group.add(inner);
    group.add(quad);
    let group = scene.add_group(group);
    let outer = scene.add_instance(
        Instance::with_matrix(group, Matrix4::from_translation(Vector3::new(0.0, 0.0, 2.0))),
    );

    let commands = render(&mut device, &registry, &scene, outer.into());

    assert_eq!(draws(&commands), 2);
    let modelviews = uploaded_matrices(&commands, "modelview");
    assert_eq!(modelviews.len(), 2);
    assert_relative_eq!(
        modelviews[0],
        Matrix4::from_translation(Vector3::new(1.0, 0.0, 2.0))
    );
    assert_relative_eq!(
        modelviews[1],
        Matrix4::from_translation(Vector3::new(0.0, 0.0, 2.0))
    );
}

#[test]
fn scene_files_render_their_own_instances() {
    let (mut device, registry, _dir) = loaded();
    let scene_asset = registry.get::<Group>("two_quads.scene").unwrap();
    let scene = Scene::new();

    let commands = render(&mut device, &registry, &scene, scene_asset.into());

    assert_eq!(draws(&commands), 2);
    let modelviews = uploaded_matrices(&commands, "modelview");
    assert_relative_eq!(
        modelviews[0],
        Matrix4::from_translation(Vector3::new(1.0, 2.0, 3.0))
    );
    assert_relative_eq!(modelviews[1], Matrix4::from_angle_z(cgmath::Deg(90.0)));
}

#[test]
fn group_membership_is_ordered_and_removal_drops_all_copies() {
    let (mut device, registry, _dir) = loaded();
    let quad = registry.get::<Mesh>("quad.obj").unwrap();
    let mut scene = Scene::new();
    let a = scene.add_instance(Instance::new(quad));
    let b = scene.add_instance(Instance::new(quad));

    let mut group = Group::new();
    group.add(a);
    group.add(b);
    group.add(a);
    assert_eq!(group.len(), 3);
    group.remove(a);
    assert_eq!(group.len(), 1);
    assert!(group.contains(b));
    assert!(!group.contains(a));
    // removing something absent is fine
    group.remove(a);

    let group = scene.add_group(group);
    let commands = render(&mut device, &registry, &scene, group.into());
    assert_eq!(draws(&commands), 1);
}

#[test]
fn dangling_references_are_skipped() {
    let (mut device, registry, _dir) = loaded();
    let quad = registry.get::<Mesh>("quad.obj").unwrap();
    let mut scene = Scene::new();
    let gone = scene.add_instance(Instance::new(quad));
    let kept = scene.add_instance(Instance::new(quad));
    let mut group = Group::new();
    group.add(gone);
    group.add(kept);
    let group = scene.add_group(group);
    scene.remove_instance(gone);

    let commands = render(&mut device, &registry, &scene, group.into());
    assert_eq!(draws(&commands), 1);
}

#[test]
fn cycles_are_cut_off() {
    let (mut device, registry, _dir) = loaded();
    let quad = registry.get::<Mesh>("quad.obj").unwrap();
    let mut scene = Scene::new();
    let group = scene.add_group(Group::new());
    let looping = scene.add_instance(Instance::new(group));
    let group_mut = scene.group_mut(group).unwrap();
    group_mut.add(quad);
    group_mut.add(looping);

    let commands = render(&mut device, &registry, &scene, group.into());
    // one draw per level until the depth limit
    assert!(draws(&commands) > 1);
    assert!(draws(&commands) <= bloom_ngin::render::MAX_DEPTH);
}

#[test]
fn meshes_without_material_draw_nothing() {
    let (mut device, mut registry, dir) = loaded();
    std::fs::write(dir.path().join("bare.obj"), "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
    let bare = registry
        .load::<Mesh>(dir.path().join("bare.obj"), &mut device)
        .unwrap();
    let scene = Scene::new();
    let commands = render(&mut device, &registry, &scene, bare.into());
    assert_eq!(draws(&commands), 0);
}

#[test]
fn render_state_feeds_every_lighting_uniform() {
    let (mut device, registry, _dir) = loaded();
    let quad = registry.get::<Mesh>("quad.obj").unwrap();
    let scene = Scene::new();
    let state = RenderState {
        light_intensity: 0.4,
        ..RenderState::default()
    };
    Frame::new(&mut device, &registry, &scene).render(quad.into(), &state);
    let commands = device.take_commands();
    let names: Vec<&str> = commands
        .iter()
        .filter_map(|c| match c {
            Command::SetUniform(_, name, _) => Some(name.as_str()),
            _ => None,
        })
        .collect();
    for expected in [
        "tint",
        "texture",
        "modelview",
        "projection",
        "light_direction",
        "light_intensity",
        "ambient_intensity",
        "sky_direction",
    ] {
        assert!(names.contains(&expected), "{expected} not set: {names:?}");
    }
    assert!(commands.contains(&Command::SetUniform(
        registry.lookup::<bloom_ngin::resources::Shader>("plain.glsl").unwrap().program(),
        String::from("light_intensity"),
        bloom_ngin::device::Uniform::Float(0.4),
    )));
    assert_relative_eq!(uploaded_matrices(&commands, "projection")[0], Matrix4::identity());
}
