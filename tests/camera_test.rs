use approx::assert_relative_eq;
use bloom_ngin::camera::Camera;
use cgmath::{Point3, Vector4};

fn eye(camera: &Camera, x: f32, y: f32, z: f32) -> Vector4<f32> {
    camera.view_matrix() * Vector4::new(x, y, z, 1.0)
}

#[test]
fn default_camera_looks_along_positive_x_with_z_up() {
    let camera = Camera::new();
    assert_relative_eq!(eye(&camera, 5.0, 0.0, 0.0), Vector4::new(0.0, 0.0, -5.0, 1.0), epsilon = 1e-5);
    assert_relative_eq!(eye(&camera, 0.0, 0.0, 2.0), Vector4::new(0.0, 2.0, 0.0, 1.0), epsilon = 1e-5);
    // +Y is to the left
    assert_relative_eq!(eye(&camera, 0.0, 3.0, 0.0), Vector4::new(-3.0, 0.0, 0.0, 1.0), epsilon = 1e-5);
}

#[test]
fn heading_turns_counter_clockwise() {
    let mut camera = Camera::new();
    camera.set_heading(90.0);
    assert_relative_eq!(eye(&camera, 0.0, 5.0, 0.0), Vector4::new(0.0, 0.0, -5.0, 1.0), epsilon = 1e-5);
}

#[test]
fn position_is_subtracted_before_rotating() {
    let mut camera = Camera::new();
    camera.set_position(Point3::new(10.0, -2.0, 1.0));
    assert_relative_eq!(eye(&camera, 14.0, -2.0, 1.0), Vector4::new(0.0, 0.0, -4.0, 1.0), epsilon = 1e-5);
}

#[test]
fn positive_pitch_looks_up() {
    let mut camera = Camera::new();
    camera.set_pitch(90.0);
    assert_relative_eq!(eye(&camera, 0.0, 0.0, 5.0), Vector4::new(0.0, 0.0, -5.0, 1.0), epsilon = 1e-5);
}

#[test]
fn look_at_points_the_camera_at_the_target() {
    let mut camera = Camera::new();
    camera.set_position(Point3::new(1.0, 1.0, 0.0));
    camera.look_at(Point3::new(1.0, 4.0, 3.0));
    assert_relative_eq!(camera.heading(), 90.0, epsilon = 1e-4);
    assert_relative_eq!(camera.pitch(), 45.0, epsilon = 1e-4);
    let target = eye(&camera, 1.0, 4.0, 3.0);
    assert_relative_eq!(target.x, 0.0, epsilon = 1e-4);
    assert_relative_eq!(target.y, 0.0, epsilon = 1e-4);
    assert!(target.z < 0.0);
}

#[test]
fn projection_maps_the_depth_range_to_clip_space() {
    let mut camera = Camera::new();
    camera.set_depth_range(1.0, 10.0);
    camera.set_aspect_ratio(2.0);
    camera.set_field_of_view(90.0);
    let projection = camera.projection_matrix();

    let near = projection * Vector4::new(0.0, 0.0, -1.0, 1.0);
    let far = projection * Vector4::new(0.0, 0.0, -10.0, 1.0);
    assert_relative_eq!(near.z / near.w, -1.0, epsilon = 1e-5);
    assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);

    // the top edge of a 90 degree frustum at distance 1
    let top = projection * Vector4::new(0.0, 1.0, -1.0, 1.0);
    assert_relative_eq!(top.y / top.w, 1.0, epsilon = 1e-5);
    // twice as wide as tall
    let right = projection * Vector4::new(2.0, 0.0, -1.0, 1.0);
    assert_relative_eq!(right.x / right.w, 1.0, epsilon = 1e-5);
}

#[test]
fn setters_round_trip() {
    let mut camera = Camera::default();
    camera.set_roll(15.0);
    camera.set_depth_range(0.5, 50.0);
    assert_eq!(camera.roll(), 15.0);
    assert_eq!(camera.depth_range(), (0.5, 50.0));
    assert_eq!(camera.field_of_view(), 60.0);
    assert_relative_eq!(camera.aspect_ratio(), 4.0 / 3.0);
}

#[test]
fn world_x_axis_is_straight_ahead() {
    let camera = Camera::new();
    assert_relative_eq!(eye(&camera, 1.0, 0.0, 0.0), Vector4::new(0.0, 0.0, -1.0, 1.0), epsilon = 1e-5);
}
