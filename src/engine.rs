//! The frame loop.
//!
//! [`Engine`] owns everything a running application needs: the graphics
//! device, the input source, the resource registry, the runtime scene, the
//! animation scheduler and the post-processing chain. The application drives
//! it by calling [`Engine::next_frame`] until it returns `false`.
//!
//! # Frame order
//!
//! 1. Poll input and dispatch it to the [`EventListener`]. A quit request
//!    ends the frame right after dispatch and `next_frame` returns `false`.
//! 2. Measure the time since the previous frame (zero on the first one).
//! 3. Advance animations, then call [`EventListener::on_frame`].
//! 4. Clear the first post-processor's target (or the display) with the
//!    background color and render the scene root through the camera.
//! 5. Run each post-processor into the next one's target, the last into the
//!    display.
//! 6. Present, and log whatever errors the device collected.

use cgmath::{Deg, InnerSpace, Matrix4, Vector3, Vector4};
use instant::Instant;
use slotmap::SlotMap;

use crate::{
    animation::{Animation, Axis, Easing, RotationAnimation, Scheduler, TranslationAnimation},
    camera::Camera,
    config::EngineConfig,
    data_structures::{
        instance::Instance,
        scene_graph::{Group, GroupId, InstanceId, NodeRef, Scene},
    },
    device::{GraphicsDevice, RenderTarget},
    error::{Error, Result},
    input::{EventSource, InputEvent, KeyCode},
    postprocess::{Postprocessor, PostprocessorId},
    render::{Frame, RenderState},
    resources::Registry,
};

/// Application hooks. Every method defaults to doing nothing.
///
/// While a hook runs the listener is detached from the engine, so it may
/// freely call back into `engine`, including replacing or removing the
/// listener.
pub trait EventListener {
    fn on_quit(&mut self, _engine: &mut Engine) {}

    fn on_key_press(&mut self, _engine: &mut Engine, _key: KeyCode) {}

    fn on_key_release(&mut self, _engine: &mut Engine, _key: KeyCode) {}

    /// Called once per frame after animations advanced, `dt` in seconds.
    fn on_frame(&mut self, _engine: &mut Engine, _dt: f32) {}
}

pub struct Engine {
    device: Box<dyn GraphicsDevice>,
    events: Box<dyn EventSource>,
    listener: Option<Box<dyn EventListener>>,
    // set when the listener slot was written while a hook ran
    listener_replaced: bool,
    registry: Registry,
    scene: Scene,
    camera: Option<Camera>,
    scene_root: Option<NodeRef>,
    animations: Scheduler,
    postprocessors: SlotMap<PostprocessorId, Box<dyn Postprocessor>>,
    chain: Vec<PostprocessorId>,
    background_color: [f32; 3],
    light_direction: Vector3<f32>,
    light_intensity: f32,
    ambient_intensity: f32,
    last_frame: Option<Instant>,
    pending: Vec<InputEvent>,
}

impl Engine {
    /// Builds an engine on top of an existing device and input source and
    /// loads `config.assets`, if set.
    pub fn new(
        device: Box<dyn GraphicsDevice>,
        events: Box<dyn EventSource>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let mut engine = Self {
            device,
            events,
            listener: None,
            listener_replaced: false,
            registry: Registry::new(),
            scene: Scene::new(),
            camera: None,
            scene_root: None,
            animations: Scheduler::new(),
            postprocessors: SlotMap::with_key(),
            chain: Vec::new(),
            background_color: config.background_color,
            light_direction: Vector3::unit_z(),
            light_intensity: config.light_intensity,
            ambient_intensity: config.ambient_intensity,
            last_frame: None,
            pending: Vec::new(),
        };
        engine.set_light_direction(Vector3::from(config.light_direction))?;
        if let Some(assets) = &config.assets {
            engine.load_directory(assets)?;
        }
        log::info!(
            "engine ready: {} resources, display {:?}",
            engine.registry.len(),
            engine.device.display_size()
        );
        Ok(engine)
    }

    /// Opens a window as described by `config` and renders into it with
    /// wgpu.
    #[cfg(feature = "backend_wgpu")]
    pub fn open(config: &EngineConfig) -> anyhow::Result<Self> {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        }
        let display = crate::display::Display::open(config)?;
        let device = futures::executor::block_on(crate::device::wgpu::WgpuDevice::new(
            display.window(),
            config.width,
            config.height,
        ))?;
        Ok(Self::new(Box::new(device), Box::new(display), config)?)
    }

    pub fn device_mut(&mut self) -> &mut dyn GraphicsDevice {
        &mut *self.device
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Loads every recognized file in `dir` into the registry.
    pub fn load_directory(&mut self, dir: impl AsRef<std::path::Path>) -> Result<()> {
        self.registry.load_directory(dir.as_ref(), &mut *self.device)
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// Adds an empty group to the scene.
    pub fn create_group(&mut self) -> GroupId {
        self.scene.add_group(Group::new())
    }

    /// Adds an instance of `renderable` with the identity transform.
    pub fn create_instance(&mut self, renderable: impl Into<NodeRef>) -> InstanceId {
        self.scene.add_instance(Instance::new(renderable))
    }

    pub fn set_event_listener(&mut self, listener: Option<Box<dyn EventListener>>) {
        self.listener = listener;
        self.listener_replaced = true;
    }

    pub fn background_color(&self) -> [f32; 3] {
        self.background_color
    }

    pub fn set_background_color(&mut self, r: f32, g: f32, b: f32) {
        self.background_color = [r, g, b];
    }

    /// Direction towards the light in world space, normalized.
    pub fn light_direction(&self) -> Vector3<f32> {
        self.light_direction
    }

    pub fn set_light_direction(&mut self, direction: Vector3<f32>) -> Result<()> {
        let length = direction.magnitude();
        if !(length > 0.0) || !length.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "light direction {:?} has no length",
                direction
            )));
        }
        self.light_direction = direction / length;
        Ok(())
    }

    pub fn light_intensity(&self) -> f32 {
        self.light_intensity
    }

    pub fn set_light_intensity(&mut self, intensity: f32) {
        self.light_intensity = intensity;
    }

    pub fn ambient_intensity(&self) -> f32 {
        self.ambient_intensity
    }

    pub fn set_ambient_intensity(&mut self, intensity: f32) {
        self.ambient_intensity = intensity;
    }

    pub fn scene_root(&self) -> Option<NodeRef> {
        self.scene_root
    }

    /// Sets the node drawn every frame. Nothing is drawn without a camera.
    pub fn set_scene_root(&mut self, root: Option<NodeRef>) {
        self.scene_root = root;
    }

    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    pub fn camera_mut(&mut self) -> Option<&mut Camera> {
        self.camera.as_mut()
    }

    pub fn set_camera(&mut self, camera: Option<Camera>) {
        self.camera = camera;
    }

    pub fn animations(&self) -> &Scheduler {
        &self.animations
    }

    /// Schedules a custom animation.
    pub fn add_animation(&mut self, animation: Box<dyn Animation>) {
        self.animations.add(animation);
    }

    /// Moves `instance` to `target` over `duration` seconds with cubic easing.
    pub fn move_animated(
        &mut self,
        instance: InstanceId,
        target: Vector3<f32>,
        duration: f32,
    ) -> Result<()> {
        self.move_animated_with(instance, target, duration, Easing::Cubic)
    }

    pub fn move_animated_with(
        &mut self,
        instance: InstanceId,
        target: Vector3<f32>,
        duration: f32,
        easing: Easing,
    ) -> Result<()> {
        let animation = TranslationAnimation::new(&self.scene, instance, target, duration, easing)?;
        self.animations.add(Box::new(animation));
        Ok(())
    }

    /// Moves `instance` by `velocity` units per second until cancelled.
    pub fn move_animated_continuous(
        &mut self,
        instance: InstanceId,
        velocity: Vector3<f32>,
    ) -> Result<()> {
        let animation = TranslationAnimation::continuous(&self.scene, instance, velocity)?;
        self.animations.add(Box::new(animation));
        Ok(())
    }

    /// Rotates `instance` by `angle` degrees around `axis` over `duration`
    /// seconds with cubic easing.
    pub fn rotate_animated(
        &mut self,
        instance: InstanceId,
        axis: Axis,
        angle: f32,
        duration: f32,
    ) -> Result<()> {
        self.rotate_animated_with(instance, axis, angle, duration, Easing::Cubic)
    }

    pub fn rotate_animated_with(
        &mut self,
        instance: InstanceId,
        axis: Axis,
        angle: f32,
        duration: f32,
        easing: Easing,
    ) -> Result<()> {
        let animation =
            RotationAnimation::new(&self.scene, instance, axis, angle, duration, easing)?;
        self.animations.add(Box::new(animation));
        Ok(())
    }

    /// Rotates `instance` around `axis` by `rate` degrees per second until
    /// cancelled.
    pub fn rotate_animated_continuous(
        &mut self,
        instance: InstanceId,
        axis: Axis,
        rate: f32,
    ) -> Result<()> {
        let animation = RotationAnimation::continuous(&self.scene, instance, axis, rate)?;
        self.animations.add(Box::new(animation));
        Ok(())
    }

    /// Stops every animation of `instance`, leaving it where it is.
    pub fn cancel_animations(&mut self, instance: InstanceId) {
        self.animations.cancel(instance);
    }

    /// Hands a post-processor to the engine and appends it to the chain.
    pub fn insert_postprocessor(&mut self, postprocessor: Box<dyn Postprocessor>) -> PostprocessorId {
        let id = self.postprocessors.insert(postprocessor);
        self.chain.push(id);
        id
    }

    /// Moves `id` to the end of the chain. A post-processor appears in the
    /// chain at most once.
    pub fn add_postprocessor(&mut self, id: PostprocessorId) -> Result<()> {
        if !self.postprocessors.contains_key(id) {
            return Err(Error::InvalidArgument(format!(
                "unknown postprocessor {:?}",
                id
            )));
        }
        self.chain.retain(|p| *p != id);
        self.chain.push(id);
        Ok(())
    }

    /// Takes `id` out of the chain. The engine keeps owning it.
    pub fn remove_postprocessor(&mut self, id: PostprocessorId) {
        self.chain.retain(|p| *p != id);
    }

    /// Takes `id` out of the chain and gives up ownership. The caller is
    /// responsible for releasing it.
    pub fn take_postprocessor(&mut self, id: PostprocessorId) -> Option<Box<dyn Postprocessor>> {
        self.remove_postprocessor(id);
        self.postprocessors.remove(id)
    }

    pub fn postprocessor_chain(&self) -> &[PostprocessorId] {
        &self.chain
    }

    pub fn postprocessor<P: Postprocessor>(&self, id: PostprocessorId) -> Option<&P> {
        self.postprocessors.get(id)?.as_any().downcast_ref()
    }

    pub fn postprocessor_mut<P: Postprocessor>(&mut self, id: PostprocessorId) -> Option<&mut P> {
        self.postprocessors.get_mut(id)?.as_any_mut().downcast_mut()
    }

    /// Runs one frame. Returns `false` once the user asked to quit.
    pub fn next_frame(&mut self) -> bool {
        self.next_frame_at(Instant::now())
    }

    /// [`Self::next_frame`] with an explicit timestamp.
    pub fn next_frame_at(&mut self, now: Instant) -> bool {
        if !self.dispatch_events() {
            log::info!("quit requested");
            return false;
        }

        let dt = self
            .last_frame
            .map(|last| now.duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last_frame = Some(now);

        self.animations.advance(dt, &mut self.scene);
        self.with_listener(|listener, engine| listener.on_frame(engine, dt));

        self.render_scene();
        self.run_postprocessors();

        if let Err(e) = self.device.present() {
            log::error!("{}", e);
        }
        while let Some(message) = self.device.last_error() {
            log::error!("graphics device: {}", message);
        }
        true
    }

    fn dispatch_events(&mut self) -> bool {
        let mut events = std::mem::take(&mut self.pending);
        self.events.poll(&mut events);
        let mut quit = false;
        for event in events.drain(..) {
            log::trace!("input {:?}", event);
            match event {
                InputEvent::Quit => {
                    quit = true;
                    self.with_listener(|listener, engine| listener.on_quit(engine));
                }
                InputEvent::KeyPress(key) => {
                    self.with_listener(|listener, engine| listener.on_key_press(engine, key));
                }
                InputEvent::KeyRelease(key) => {
                    self.with_listener(|listener, engine| listener.on_key_release(engine, key));
                }
            }
        }
        self.pending = events;
        !quit
    }

    fn with_listener(&mut self, hook: impl FnOnce(&mut dyn EventListener, &mut Engine)) {
        let Some(mut listener) = self.listener.take() else {
            return;
        };
        self.listener_replaced = false;
        hook(&mut *listener, self);
        // the hook may have installed a replacement or removed itself
        if !self.listener_replaced {
            self.listener = Some(listener);
        }
    }

    fn render_scene(&mut self) {
        let target = match self.chain.first() {
            Some(&first) => {
                let Some(postprocessor) = self.postprocessors.get_mut(first) else {
                    return;
                };
                let framebuffer = postprocessor.render_target_mut();
                if let Err(e) = framebuffer.add_depth_buffer(&mut *self.device) {
                    log::error!("could not add depth buffer: {}", e);
                }
                framebuffer.target()
            }
            None => RenderTarget::Display,
        };
        self.device.bind_target(target);
        let [r, g, b] = self.background_color;
        self.device.set_clear_color([r, g, b, 1.0]);
        self.device.clear();

        let (Some(root), Some(camera)) = (self.scene_root, self.camera.as_ref()) else {
            return;
        };
        let view = camera.view_matrix();
        let state = RenderState {
            projection: self.device.clip_space_correction() * camera.projection_matrix(),
            modelview: view,
            light_direction: eye_direction(view, self.light_direction),
            sky_direction: eye_direction(view, Vector3::unit_z()),
            light_intensity: self.light_intensity,
            ambient_intensity: self.ambient_intensity,
        };
        Frame::new(&mut *self.device, &self.registry, &self.scene).render(root, &state);
    }

    fn run_postprocessors(&mut self) {
        for (i, &id) in self.chain.iter().enumerate() {
            let target = self
                .chain
                .get(i + 1)
                .and_then(|next| self.postprocessors.get(*next))
                .map(|next| next.render_target().target())
                .unwrap_or(RenderTarget::Display);
            if let Some(postprocessor) = self.postprocessors.get_mut(id) {
                postprocessor.render_effect(&mut *self.device, target);
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        for (_, postprocessor) in self.postprocessors.drain() {
            postprocessor.release(&mut *self.device);
        }
        self.registry.release(&mut *self.device);
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("resources", &self.registry.len())
            .field("scene_root", &self.scene_root)
            .field("camera", &self.camera)
            .field("animations", &self.animations.len())
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

/// Rotates a world-space direction into eye space and renormalizes it.
fn eye_direction(view: Matrix4<f32>, direction: Vector3<f32>) -> Vector3<f32> {
    let eye = (view * Vector4::new(direction.x, direction.y, direction.z, 0.0)).truncate();
    if eye.magnitude2() > 0.0 {
        eye.normalize()
    } else {
        eye
    }
}

/// Angle helper for listeners that steer a camera by heading.
pub fn heading_vector(heading: f32) -> Vector3<f32> {
    let (sin, cos) = cgmath::Angle::sin_cos(Deg(heading));
    Vector3::new(cos, sin, 0.0)
}
