//! Camera model producing view and projection matrices.
//!
//! The camera looks along its local +X axis with +Z up. `heading` turns it
//! counter-clockwise around world Z (0 looks towards world +X), `pitch` tilts
//! it up and `roll` banks it around the viewing direction. All angles are in
//! degrees.
//!
//! Both matrices are recomputed by the setter that changes their inputs, so
//! the getters are plain reads.

use cgmath::{Deg, Matrix4, Point3, Vector3};

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    position: Point3<f32>,
    heading: f32,
    pitch: f32,
    roll: f32,
    field_of_view: f32,
    aspect_ratio: f32,
    near_clip: f32,
    far_clip: f32,
    view: Matrix4<f32>,
    projection: Matrix4<f32>,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    /// A camera at the origin looking towards +X with a 60° vertical field of
    /// view, 4:3 aspect and a 0.1..100 depth range.
    pub fn new() -> Self {
        let mut camera = Self {
            position: Point3::new(0.0, 0.0, 0.0),
            heading: 0.0,
            pitch: 0.0,
            roll: 0.0,
            field_of_view: 60.0,
            aspect_ratio: 4.0 / 3.0,
            near_clip: 0.1,
            far_clip: 100.0,
            view: Matrix4::from_scale(1.0),
            projection: Matrix4::from_scale(1.0),
        };
        camera.update_view();
        camera.update_projection();
        camera
    }

    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    pub fn set_position(&mut self, position: Point3<f32>) {
        self.position = position;
        self.update_view();
    }

    pub fn heading(&self) -> f32 {
        self.heading
    }

    pub fn set_heading(&mut self, heading: f32) {
        self.heading = heading;
        self.update_view();
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch;
        self.update_view();
    }

    pub fn roll(&self) -> f32 {
        self.roll
    }

    pub fn set_roll(&mut self, roll: f32) {
        self.roll = roll;
        self.update_view();
    }

    /// Turns the camera towards `target` by setting heading and pitch. Roll
    /// is kept.
    pub fn look_at(&mut self, target: Point3<f32>) {
        let delta = target - self.position;
        self.heading = delta.y.atan2(delta.x).to_degrees();
        self.pitch = delta.z.atan2(delta.x.hypot(delta.y)).to_degrees();
        self.update_view();
    }

    pub fn field_of_view(&self) -> f32 {
        self.field_of_view
    }

    /// Vertical field of view in degrees.
    pub fn set_field_of_view(&mut self, fov: f32) {
        self.field_of_view = fov;
        self.update_projection();
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
        self.update_projection();
    }

    pub fn depth_range(&self) -> (f32, f32) {
        (self.near_clip, self.far_clip)
    }

    pub fn set_depth_range(&mut self, near_clip: f32, far_clip: f32) {
        self.near_clip = near_clip;
        self.far_clip = far_clip;
        self.update_projection();
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        self.view
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        self.projection
    }

    fn update_view(&mut self) {
        // +X forward, +Z up camera space to -Z forward, +Y up eye space
        let orientation = Matrix4::from_angle_x(Deg(-90.0)) * Matrix4::from_angle_z(Deg(90.0));
        self.view = orientation
            * Matrix4::from_angle_x(Deg(self.roll))
            * Matrix4::from_angle_y(Deg(self.pitch))
            * Matrix4::from_angle_z(Deg(-self.heading))
            * Matrix4::from_translation(-Vector3::new(
                self.position.x,
                self.position.y,
                self.position.z,
            ));
    }

    fn update_projection(&mut self) {
        let near_height = 2.0 * self.near_clip * (self.field_of_view.to_radians() / 2.0).tan();
        let near_width = near_height * self.aspect_ratio;
        let depth = self.far_clip - self.near_clip;
        #[rustfmt::skip]
        let projection = Matrix4::new(
            2.0 * self.near_clip / near_width, 0.0, 0.0, 0.0,
            0.0, 2.0 * self.near_clip / near_height, 0.0, 0.0,
            0.0, 0.0, -(self.far_clip + self.near_clip) / depth, -1.0,
            0.0, 0.0, -2.0 * self.far_clip * self.near_clip / depth, 0.0,
        );
        self.projection = projection;
    }
}
