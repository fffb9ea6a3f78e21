use std::{cell::RefCell, rc::Rc, time::Duration};

use approx::assert_relative_eq;
use bloom_ngin::{
    Engine, EventListener,
    camera::Camera,
    config::EngineConfig,
    device::{
        RenderTarget,
        headless::{Command, HeadlessDevice},
    },
    error::Error,
    input::{InputEvent, KeyCode, ScriptedEvents, char_key, keys},
    postprocess::{Bloom, Postprocessor},
    resources::Mesh,
};
use cgmath::Vector3;
use instant::Instant;

use crate::common::test_utils::{draws, full_asset_dir, headless_engine, init_logger};

mod common;

type Journal = Rc<RefCell<Vec<String>>>;

struct Recorder(Journal);

impl EventListener for Recorder {
    fn on_quit(&mut self, _engine: &mut Engine) {
        self.0.borrow_mut().push("quit".to_string());
    }

    fn on_key_press(&mut self, _engine: &mut Engine, key: KeyCode) {
        self.0.borrow_mut().push(format!("press {}", key));
    }

    fn on_key_release(&mut self, _engine: &mut Engine, key: KeyCode) {
        self.0.borrow_mut().push(format!("release {}", key));
    }

    fn on_frame(&mut self, _engine: &mut Engine, dt: f32) {
        self.0.borrow_mut().push(format!("frame {:.1}", dt));
    }
}

fn recorded(events: ScriptedEvents) -> (Engine, Journal, bloom_ngin::device::headless::CommandLog) {
    let (mut engine, log) = headless_engine(events);
    let journal = Journal::default();
    engine.set_event_listener(Some(Box::new(Recorder(journal.clone()))));
    (engine, journal, log)
}

/// An engine with the test assets loaded, the quad as scene root and a
/// camera set.
fn rendering_engine() -> (Engine, bloom_ngin::device::headless::CommandLog, tempfile::TempDir) {
    let dir = full_asset_dir();
    let (mut engine, log) = headless_engine(ScriptedEvents::new());
    engine.load_directory(dir.path()).unwrap();
    let quad = engine.registry().get::<Mesh>("quad.obj").unwrap();
    engine.set_scene_root(Some(quad.into()));
    engine.set_camera(Some(Camera::new()));
    log.take();
    (engine, log, dir)
}

#[test]
fn events_are_dispatched_before_the_frame_hook() {
    let events = ScriptedEvents::new()
        .with_frame([InputEvent::KeyPress(char_key('W')), InputEvent::KeyRelease(keys::ESCAPE)])
        .with_frame([]);
    let (mut engine, journal, _log) = recorded(events);

    let start = Instant::now();
    assert!(engine.next_frame_at(start));
    assert!(engine.next_frame_at(start + Duration::from_millis(500)));

    assert_eq!(
        *journal.borrow(),
        vec!["press 119", "release 27", "frame 0.0", "frame 0.5"]
    );
}

#[test]
fn quit_stops_before_rendering() {
    let events = ScriptedEvents::new().with_frame([InputEvent::KeyPress(char_key('q')), InputEvent::Quit]);
    let (mut engine, journal, log) = recorded(events);

    assert!(!engine.next_frame());

    // the remaining events of the frame are still delivered
    assert_eq!(*journal.borrow(), vec!["press 113", "quit"]);
    let commands = log.take();
    assert!(!commands.contains(&Command::Present));
    assert!(!commands.iter().any(|c| matches!(c, Command::Clear(..))));
}

#[test]
fn every_frame_clears_with_the_background_and_presents() {
    let (mut engine, log) = headless_engine(ScriptedEvents::new());
    engine.set_background_color(0.3, 0.47, 0.55);
    log.take();

    assert!(engine.next_frame());
    let commands = log.take();

    assert_eq!(
        commands,
        vec![
            Command::BindTarget(RenderTarget::Display),
            Command::Clear(RenderTarget::Display, [0.3, 0.47, 0.55, 1.0]),
            Command::Present,
        ]
    );
}

#[test]
fn nothing_is_drawn_without_camera_or_root() {
    let (mut engine, log, _dir) = rendering_engine();

    engine.set_camera(None);
    engine.next_frame();
    assert_eq!(draws(&log.take()), 0);

    engine.set_camera(Some(Camera::new()));
    let root = engine.scene_root();
    engine.set_scene_root(None);
    engine.next_frame();
    assert_eq!(draws(&log.take()), 0);

    engine.set_scene_root(root);
    engine.next_frame();
    assert_eq!(draws(&log.take()), 1);
}

#[test]
fn scene_renders_through_the_postprocessing_chain() {
    let (mut engine, log, _dir) = rendering_engine();
    let first = Bloom::new(engine.device_mut(), 640, 480).unwrap();
    let second = Bloom::new(engine.device_mut(), 640, 480).unwrap();
    let first_target = first.render_target().target();
    let second_target = second.render_target().target();
    let first = engine.insert_postprocessor(Box::new(first));
    let second = engine.insert_postprocessor(Box::new(second));
    assert_eq!(engine.postprocessor_chain(), &[first, second]);
    log.take();

    engine.next_frame();
    let commands = log.take();

    let RenderTarget::Framebuffer(first_framebuffer) = first_target else {
        panic!("bloom renders into a framebuffer");
    };
    assert_eq!(commands[0], Command::AttachDepth(first_framebuffer));
    assert!(commands.contains(&Command::Clear(first_target, [0.0, 0.0, 0.0, 1.0])));

    let targets: Vec<RenderTarget> = commands
        .iter()
        .filter_map(|c| match c {
            Command::Draw { target, .. } => Some(*target),
            _ => None,
        })
        .collect();
    // the quad, then three passes per bloom
    assert_eq!(targets.len(), 7);
    assert_eq!(targets[0], first_target);
    assert_eq!(targets[3], second_target);
    assert_eq!(targets[6], RenderTarget::Display);
    assert_eq!(commands.last(), Some(&Command::Present));

    // the depth attachment is only added once
    engine.next_frame();
    assert!(!log.take().iter().any(|c| matches!(c, Command::AttachDepth(_))));
    assert!(engine.postprocessor::<Bloom>(first).unwrap().render_target().has_depth_buffer());
}

#[test]
fn readding_a_postprocessor_moves_it_to_the_end() {
    let (mut engine, _log) = headless_engine(ScriptedEvents::new());
    let a = Bloom::new(engine.device_mut(), 64, 64).unwrap();
    let b = Bloom::new(engine.device_mut(), 64, 64).unwrap();
    let a = engine.insert_postprocessor(Box::new(a));
    let b = engine.insert_postprocessor(Box::new(b));

    engine.add_postprocessor(a).unwrap();
    assert_eq!(engine.postprocessor_chain(), &[b, a]);
    engine.add_postprocessor(a).unwrap();
    assert_eq!(engine.postprocessor_chain(), &[b, a]);

    engine.remove_postprocessor(b);
    assert_eq!(engine.postprocessor_chain(), &[a]);
    // still owned, so it can come back
    engine.add_postprocessor(b).unwrap();
    assert_eq!(engine.postprocessor_chain(), &[a, b]);

    engine
        .postprocessor_mut::<Bloom>(b)
        .unwrap()
        .set_strength(0.9);
    assert_relative_eq!(engine.postprocessor::<Bloom>(b).unwrap().strength(), 0.9);

    let taken = engine.take_postprocessor(b).unwrap();
    assert_eq!(engine.postprocessor_chain(), &[a]);
    assert!(matches!(engine.add_postprocessor(b), Err(Error::InvalidArgument(_))));
    taken.release(engine.device_mut());
}

#[test]
fn listeners_can_replace_themselves() {
    struct Once(Journal);

    impl EventListener for Once {
        fn on_frame(&mut self, engine: &mut Engine, _dt: f32) {
            self.0.borrow_mut().push("once".to_string());
            engine.set_event_listener(Some(Box::new(Recorder(self.0.clone()))));
        }
    }

    let (mut engine, _log) = headless_engine(ScriptedEvents::new());
    let journal = Journal::default();
    engine.set_event_listener(Some(Box::new(Once(journal.clone()))));

    let start = Instant::now();
    engine.next_frame_at(start);
    engine.next_frame_at(start + Duration::from_secs(1));
    assert_eq!(*journal.borrow(), vec!["once", "frame 1.0"]);
}

#[test]
fn listeners_can_remove_themselves() {
    struct OneShot(Journal);

    impl EventListener for OneShot {
        fn on_key_press(&mut self, engine: &mut Engine, key: KeyCode) {
            self.0.borrow_mut().push(format!("press {}", key));
            engine.set_event_listener(None);
        }
    }

    let events = ScriptedEvents::new()
        .with_frame([InputEvent::KeyPress(char_key('w'))])
        .with_frame([InputEvent::KeyPress(char_key('w'))]);
    let (mut engine, _log) = headless_engine(events);
    let journal = Journal::default();
    engine.set_event_listener(Some(Box::new(OneShot(journal.clone()))));

    let start = Instant::now();
    engine.next_frame_at(start);
    engine.next_frame_at(start + Duration::from_secs(1));
    assert_eq!(*journal.borrow(), vec!["press 119"]);
}

#[test]
fn light_direction_is_normalized_and_must_not_be_zero() {
    let (mut engine, _log) = headless_engine(ScriptedEvents::new());
    engine.set_light_direction(Vector3::new(0.0, 3.0, 4.0)).unwrap();
    assert_relative_eq!(engine.light_direction(), Vector3::new(0.0, 0.6, 0.8));

    assert!(matches!(
        engine.set_light_direction(Vector3::new(0.0, 0.0, 0.0)),
        Err(Error::InvalidArgument(_))
    ));
    assert_relative_eq!(engine.light_direction(), Vector3::new(0.0, 0.6, 0.8));

    engine.set_light_intensity(0.4);
    engine.set_ambient_intensity(0.1);
    assert_relative_eq!(engine.light_intensity(), 0.4);
    assert_relative_eq!(engine.ambient_intensity(), 0.1);
}

#[test]
fn dropping_the_engine_releases_resources_and_postprocessors() {
    init_logger();
    let dir = full_asset_dir();
    let device = HeadlessDevice::new(64, 64);
    let log = device.log();
    let config = EngineConfig {
        assets: Some(dir.path().to_path_buf()),
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(Box::new(device), Box::new(ScriptedEvents::new()), &config).unwrap();
    assert_eq!(engine.registry().len(), 5);
    let bloom = Bloom::new(engine.device_mut(), 64, 64).unwrap();
    engine.insert_postprocessor(Box::new(bloom));
    log.take();

    drop(engine);
    let commands = log.take();
    let count = |pred: fn(&Command) -> bool| commands.iter().filter(|c| pred(c)).count();
    // bloom's three framebuffers
    assert_eq!(count(|c| matches!(c, Command::DeleteFramebuffer(_))), 3);
    // the shader plus bloom's two programs
    assert_eq!(count(|c| matches!(c, Command::DeleteProgram(_))), 3);
    // the checker texture plus bloom's three color buffers
    assert_eq!(count(|c| matches!(c, Command::DeleteTexture(_))), 4);
    // the quad plus bloom's full-screen quad
    assert_eq!(count(|c| matches!(c, Command::DeleteMesh(_))), 2);
}

#[test]
fn device_errors_do_not_stop_the_loop() {
    let (mut engine, _log) = headless_engine(ScriptedEvents::new());
    engine.device_mut().bind_target(RenderTarget::Framebuffer(Default::default()));
    assert!(engine.next_frame());
    assert_eq!(engine.device_mut().last_error(), None);
}
