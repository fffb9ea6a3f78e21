//! A cottage with a windmill. Drive around with W/S, turn with A/D.

use bloom_ngin::{
    Engine, EventListener,
    animation::Axis,
    camera::Camera,
    cgmath::{Deg, Matrix4, Point3, Vector3},
    config::EngineConfig,
    data_structures::{instance::Instance, scene_graph::Group},
    engine::heading_vector,
    input::{KeyCode, char_key},
    postprocess::Bloom,
    resources::Mesh,
};

/// Degrees per second.
const TURN_RATE: f32 = 90.0;
/// Units per second.
const SPEED: f32 = 5.0;

#[derive(Default)]
struct Controller {
    movement: f32,
    rotation: f32,
}

impl EventListener for Controller {
    fn on_key_press(&mut self, _engine: &mut Engine, key: KeyCode) {
        if key == char_key('w') {
            self.movement = 1.0;
        } else if key == char_key('s') {
            self.movement = -1.0;
        } else if key == char_key('a') {
            self.rotation = 1.0;
        } else if key == char_key('d') {
            self.rotation = -1.0;
        }
    }

    fn on_key_release(&mut self, _engine: &mut Engine, key: KeyCode) {
        if key == char_key('w') || key == char_key('s') {
            self.movement = 0.0;
        } else if key == char_key('a') || key == char_key('d') {
            self.rotation = 0.0;
        }
    }

    fn on_frame(&mut self, engine: &mut Engine, dt: f32) {
        let Some(camera) = engine.camera_mut() else {
            return;
        };
        camera.set_heading(camera.heading() + self.rotation * TURN_RATE * dt);
        let step = heading_vector(camera.heading()) * (self.movement * SPEED * dt);
        camera.set_position(camera.position() + step);
    }
}

fn main() -> anyhow::Result<()> {
    let config = EngineConfig {
        title: String::from("Windmill"),
        background_color: [0.30, 0.47, 0.55],
        light_direction: [-0.8, -0.7, 1.3],
        light_intensity: 0.4,
        ambient_intensity: 0.2,
        assets: Some(concat!(env!("CARGO_MANIFEST_DIR"), "/data").into()),
        ..EngineConfig::default().with_size(960, 540)
    };
    let mut engine = Engine::open(&config)?;

    let mut camera = Camera::new();
    camera.set_aspect_ratio(config.aspect_ratio());
    camera.set_position(Point3::new(10.0, -23.0, 1.7));
    camera.set_heading(120.0);
    camera.set_depth_range(0.1, 100.0);
    engine.set_camera(Some(camera));
    engine.set_event_listener(Some(Box::new(Controller::default())));

    let cottage = engine.registry().get::<Group>("cottage.scene")?;
    let blades = engine.registry().get::<Mesh>("blades.obj")?;
    let blades = engine.scene_mut().add_instance(Instance::with_matrix(
        blades,
        Matrix4::from_translation(Vector3::new(9.0, -0.6, 5.1)) * Matrix4::from_angle_x(Deg(90.0)),
    ));
    let scene = engine.create_group();
    if let Some(group) = engine.scene_mut().group_mut(scene) {
        group.add(cottage);
        group.add(blades);
    }
    engine.set_scene_root(Some(scene.into()));
    engine.rotate_animated_continuous(blades, Axis::try_from('Y')?, 90.0)?;

    let bloom = Bloom::new(engine.device_mut(), config.width, config.height)?;
    engine.insert_postprocessor(Box::new(bloom));

    log::info!("running");
    while engine.next_frame() {}
    Ok(())
}
