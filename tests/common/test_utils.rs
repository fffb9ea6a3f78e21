#![allow(dead_code)]

use std::path::Path;

use bloom_ngin::{
    Engine,
    config::EngineConfig,
    device::headless::{Command, CommandLog, HeadlessDevice},
    input::ScriptedEvents,
};
use cgmath::Matrix4;

/// Vertex and fragment stage separated by a dashed line.
pub const SHADER: &str = "#version 450
layout(location = 0) in vec3 position;
layout(std140, set = 0, binding = 0) uniform Transform {
    mat4 modelview;
    mat4 projection;
};
void main() {
    gl_Position = projection * modelview * vec4(position, 1.0);
}
-----
#version 450
layout(location = 0) out vec4 color;
void main() {
    color = vec4(1.0);
}
";

pub const MATERIAL: &str = "# plain white
shader plain
texture checker.png
uniform tint 1.0 0.5 0.25
";

pub const QUAD_OBJ: &str = "usemtl white
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vn 0 0 1
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
";

pub const SCENE: &str = "object quad
translate 1 2 3
object quad
rotate_z 90
";

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Writes `files` into a fresh temporary directory.
pub fn asset_dir(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        std::fs::write(dir.path().join(name), content).unwrap();
    }
    dir
}

pub fn write_png(path: &Path, width: u32, height: u32) {
    let image = image::RgbImage::from_fn(width, height, |x, y| {
        if (x + y) % 2 == 0 {
            image::Rgb([255, 255, 255])
        } else {
            image::Rgb([0, 0, 0])
        }
    });
    image.save(path).unwrap();
}

/// A directory holding one of every resource kind, all referencing each
/// other: `plain.glsl`, `checker.png`, `white.mat`, `quad.obj`,
/// `two_quads.scene`.
pub fn full_asset_dir() -> tempfile::TempDir {
    let dir = asset_dir(&[
        ("plain.glsl", SHADER),
        ("white.mat", MATERIAL),
        ("quad.obj", QUAD_OBJ),
        ("two_quads.scene", SCENE),
        ("notes.txt", "not a resource"),
    ]);
    write_png(&dir.path().join("checker.png"), 2, 2);
    dir
}

/// An engine on a headless device, plus a handle to the device's log.
pub fn headless_engine(events: ScriptedEvents) -> (Engine, CommandLog) {
    init_logger();
    let device = HeadlessDevice::new(640, 480);
    let log = device.log();
    let engine = Engine::new(Box::new(device), Box::new(events), &EngineConfig::default()).unwrap();
    (engine, log)
}

pub fn draws(commands: &[Command]) -> usize {
    commands
        .iter()
        .filter(|c| matches!(c, Command::Draw { .. }))
        .count()
}

/// Every matrix uploaded as `name`, in order.
pub fn uploaded_matrices(commands: &[Command], name: &str) -> Vec<Matrix4<f32>> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::SetUniform(_, n, bloom_ngin::device::Uniform::Mat4(m)) if n == name => {
                Some(Matrix4::from(*m))
            }
            _ => None,
        })
        .collect()
}
