//! Time-driven transform animation of scene instances.
//!
//! An [`Animation`] is bound to one [`InstanceId`] and rewrites that
//! instance's matrix every time it is advanced. The matrix is a pure function
//! of the animation's progress, which itself depends only on elapsed time,
//! duration and easing:
//!
//! - finite animations run from progress 0 to 1 over their duration, shaped
//!   by [`Easing`]
//! - continuous animations report the elapsed seconds as progress and never
//!   finish, so their parameters are rates per second
//!
//! Several animations may target the same instance; they are not combined,
//! each one overwrites the matrix on its turn.

use cgmath::{Deg, Matrix4, Vector3, Vector4};

use crate::{
    data_structures::scene_graph::{InstanceId, Scene},
    error::{Error, Result},
};

/// Reparameterization of linear progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Easing {
    Linear,
    /// Smoothstep: starts and ends with zero velocity.
    #[default]
    Cubic,
}

impl Easing {
    pub fn apply(self, p: f32) -> f32 {
        match self {
            Easing::Linear => p,
            Easing::Cubic => (3.0 - 2.0 * p) * p * p,
        }
    }
}

/// How long an animation runs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Timing {
    /// Runs for the given number of seconds.
    Finite(f32),
    /// Runs until cancelled.
    Continuous,
}

impl Timing {
    /// Negative durations mean continuous.
    pub fn from_seconds(duration: f32) -> Self {
        if duration < 0.0 {
            Timing::Continuous
        } else {
            Timing::Finite(duration)
        }
    }
}

/// Elapsed time bookkeeping shared by every animation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Clock {
    timing: Timing,
    elapsed: f32,
    easing: Easing,
}

impl Clock {
    pub fn new(timing: Timing, easing: Easing) -> Self {
        Self {
            timing,
            elapsed: 0.0,
            easing,
        }
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn easing(&self) -> Easing {
        self.easing
    }

    /// Eased progress in `[0, 1]` for finite clocks, elapsed seconds for
    /// continuous ones. A zero duration is complete from the start.
    pub fn progress(&self) -> f32 {
        match self.timing {
            Timing::Finite(duration) if duration <= 0.0 => 1.0,
            Timing::Finite(duration) => self.easing.apply(self.elapsed / duration),
            Timing::Continuous => self.elapsed,
        }
    }

    pub fn advance(&mut self, dt: f32) {
        self.elapsed += dt;
        if let Timing::Finite(duration) = self.timing {
            self.elapsed = self.elapsed.min(duration);
        }
    }

    pub fn has_finished(&self) -> bool {
        match self.timing {
            Timing::Finite(duration) => self.elapsed >= duration,
            Timing::Continuous => false,
        }
    }
}

/// A motion policy bound to one instance.
pub trait Animation {
    fn instance(&self) -> InstanceId;

    fn clock(&self) -> &Clock;

    fn clock_mut(&mut self) -> &mut Clock;

    /// The instance matrix at `progress`.
    fn compute_matrix(&self, progress: f32) -> Matrix4<f32>;

    fn progress(&self) -> f32 {
        self.clock().progress()
    }

    fn has_finished(&self) -> bool {
        self.clock().has_finished()
    }

    /// Moves time forward by `dt` seconds and writes the resulting matrix to
    /// the bound instance. Does nothing to the scene if the instance is gone.
    fn advance(&mut self, dt: f32, scene: &mut Scene) {
        self.clock_mut().advance(dt);
        let matrix = self.compute_matrix(self.progress());
        if let Some(instance) = scene.instance_mut(self.instance()) {
            instance.set_matrix(matrix);
        }
    }
}

fn base_matrix(scene: &Scene, instance: InstanceId) -> Result<Matrix4<f32>> {
    scene
        .instance(instance)
        .map(|i| i.matrix())
        .ok_or_else(|| Error::InvalidArgument(format!("instance {:?} is not in the scene", instance)))
}

/// Moves an instance in world space.
#[derive(Clone, Debug, PartialEq)]
pub struct TranslationAnimation {
    instance: InstanceId,
    clock: Clock,
    base: Matrix4<f32>,
    movement: Vector3<f32>,
}

impl TranslationAnimation {
    /// Moves the instance from where it is now to `target` over `duration`
    /// seconds.
    pub fn new(
        scene: &Scene,
        instance: InstanceId,
        target: Vector3<f32>,
        duration: f32,
        easing: Easing,
    ) -> Result<Self> {
        if duration < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "negative animation duration {}",
                duration
            )));
        }
        let base = base_matrix(scene, instance)?;
        Ok(Self {
            instance,
            clock: Clock::new(Timing::Finite(duration), easing),
            base,
            movement: target - base.w.truncate(),
        })
    }

    /// Moves the instance with a constant `velocity` (units per second) until
    /// cancelled.
    pub fn continuous(scene: &Scene, instance: InstanceId, velocity: Vector3<f32>) -> Result<Self> {
        let base = base_matrix(scene, instance)?;
        Ok(Self {
            instance,
            clock: Clock::new(Timing::Continuous, Easing::Linear),
            base,
            movement: velocity,
        })
    }
}

impl Animation for TranslationAnimation {
    fn instance(&self) -> InstanceId {
        self.instance
    }

    fn clock(&self) -> &Clock {
        &self.clock
    }

    fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    fn compute_matrix(&self, progress: f32) -> Matrix4<f32> {
        Matrix4::from_translation(self.movement * progress) * self.base
    }
}

/// One of the three principal axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn rotation(self, angle: Deg<f32>) -> Matrix4<f32> {
        match self {
            Axis::X => Matrix4::from_angle_x(angle),
            Axis::Y => Matrix4::from_angle_y(angle),
            Axis::Z => Matrix4::from_angle_z(angle),
        }
    }
}

impl TryFrom<char> for Axis {
    type Error = Error;

    fn try_from(c: char) -> Result<Self> {
        match c {
            'X' | 'x' => Ok(Axis::X),
            'Y' | 'y' => Ok(Axis::Y),
            'Z' | 'z' => Ok(Axis::Z),
            other => Err(Error::InvalidArgument(format!(
                "{:?} is not a principal axis",
                other
            ))),
        }
    }
}

/// Spins an instance in place around a principal axis through its origin.
#[derive(Clone, Debug, PartialEq)]
pub struct RotationAnimation {
    instance: InstanceId,
    clock: Clock,
    axis: Axis,
    angle: f32,
    base_translation: Matrix4<f32>,
    base_rotation: Matrix4<f32>,
}

impl RotationAnimation {
    /// Rotates by `angle` degrees over `duration` seconds.
    pub fn new(
        scene: &Scene,
        instance: InstanceId,
        axis: Axis,
        angle: f32,
        duration: f32,
        easing: Easing,
    ) -> Result<Self> {
        if duration < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "negative animation duration {}",
                duration
            )));
        }
        Self::build(scene, instance, axis, angle, Clock::new(Timing::Finite(duration), easing))
    }

    /// Rotates at `rate` degrees per second until cancelled.
    pub fn continuous(scene: &Scene, instance: InstanceId, axis: Axis, rate: f32) -> Result<Self> {
        Self::build(scene, instance, axis, rate, Clock::new(Timing::Continuous, Easing::Linear))
    }

    fn build(
        scene: &Scene,
        instance: InstanceId,
        axis: Axis,
        angle: f32,
        clock: Clock,
    ) -> Result<Self> {
        let mut base_rotation = base_matrix(scene, instance)?;
        let translation = base_rotation.w.truncate();
        base_rotation.w = Vector4::new(0.0, 0.0, 0.0, base_rotation.w.w);
        Ok(Self {
            instance,
            clock,
            axis,
            angle,
            base_translation: Matrix4::from_translation(translation),
            base_rotation,
        })
    }
}

impl Animation for RotationAnimation {
    fn instance(&self) -> InstanceId {
        self.instance
    }

    fn clock(&self) -> &Clock {
        &self.clock
    }

    fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    fn compute_matrix(&self, progress: f32) -> Matrix4<f32> {
        self.base_translation * self.axis.rotation(Deg(self.angle * progress)) * self.base_rotation
    }
}

/// The set of running animations, advanced once per frame in insertion
/// order.
#[derive(Default)]
pub struct Scheduler {
    active: Vec<Box<dyn Animation>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, animation: Box<dyn Animation>) {
        self.active.push(animation);
    }

    /// Advances every animation by `dt` and drops the ones that finished.
    pub fn advance(&mut self, dt: f32, scene: &mut Scene) {
        for animation in self.active.iter_mut() {
            animation.advance(dt, scene);
        }
        self.active.retain(|animation| !animation.has_finished());
    }

    /// Drops every animation bound to `instance`.
    pub fn cancel(&mut self, instance: InstanceId) {
        self.active.retain(|animation| animation.instance() != instance);
    }

    pub fn is_animating(&self, instance: InstanceId) -> bool {
        self.active.iter().any(|a| a.instance() == instance)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("active", &self.active.len())
            .finish()
    }
}
