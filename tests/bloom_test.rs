use approx::assert_relative_eq;
use bloom_ngin::{
    device::{
        RenderTarget, Uniform,
        headless::{Command, HeadlessDevice},
    },
    error::Error,
    postprocess::{
        Postprocessor,
        bloom::{Bloom, KERNEL_SIZE, gaussian_kernel},
    },
};

use crate::common::test_utils::init_logger;

mod common;

fn bloom() -> (HeadlessDevice, Bloom) {
    init_logger();
    let mut device = HeadlessDevice::new(320, 200);
    let bloom = Bloom::new(&mut device, 320, 200).unwrap();
    (device, bloom)
}

#[test]
fn creates_three_float_targets_two_programs_and_a_quad() {
    let (device, bloom) = bloom();
    assert_eq!(device.live_framebuffers(), 3);
    assert_eq!(device.live_textures(), 3);
    assert_eq!(device.live_programs(), 2);
    assert_eq!(device.live_meshes(), 1);

    let target = bloom.render_target();
    assert!(target.is_float());
    assert_eq!((target.width(), target.height()), (320, 200));
    assert!(!target.has_depth_buffer());

    assert_relative_eq!(bloom.radius(), 5.0);
    assert_relative_eq!(bloom.scaling(), 1.0);
    assert_relative_eq!(bloom.strength(), 0.3);
}

#[test]
fn zero_sized_bloom_is_rejected() {
    let mut device = HeadlessDevice::default();
    assert!(matches!(
        Bloom::new(&mut device, 0, 100),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn kernel_weights_sum_to_one() {
    for radius in [0.5, 2.0, 5.0, 20.0] {
        let factors = gaussian_kernel(radius).unwrap();
        assert_eq!(factors.len(), KERNEL_SIZE);
        assert_relative_eq!(factors.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
    }
}

#[test]
fn invalid_radius_keeps_the_previous_kernel() {
    let (_device, mut bloom) = bloom();
    bloom.set_radius(2.0).unwrap();
    let before = *bloom.factors();

    assert!(bloom.set_radius(0.0).is_err());
    assert_relative_eq!(bloom.radius(), 2.0);
    assert_eq!(*bloom.factors(), before);
}

#[test]
fn effect_runs_two_blur_passes_then_combines_into_the_target() {
    let (mut device, mut bloom) = bloom();
    bloom.set_strength(0.6);
    device.take_commands();

    bloom.render_effect(&mut device, RenderTarget::Display);
    let commands = device.take_commands();

    let targets: Vec<RenderTarget> = commands
        .iter()
        .filter_map(|c| match c {
            Command::Draw { target, .. } => Some(*target),
            _ => None,
        })
        .collect();
    assert_eq!(targets.len(), 3);
    assert_ne!(targets[0], bloom.render_target().target());
    assert_ne!(targets[1], targets[0]);
    assert_eq!(targets[2], RenderTarget::Display);

    // every tap is uploaded for both blur directions
    let taps = commands
        .iter()
        .filter(|c| matches!(c, Command::SetUniform(_, name, _) if name.starts_with("factors[")))
        .count();
    assert_eq!(taps, 2 * KERNEL_SIZE);

    let deltas: Vec<[f32; 2]> = commands
        .iter()
        .filter_map(|c| match c {
            Command::SetUniform(_, name, Uniform::Vec2(d)) if name == "delta" => Some(*d),
            _ => None,
        })
        .collect();
    assert_eq!(deltas.len(), 2);
    assert_relative_eq!(deltas[0][0], 1.0 / 320.0);
    assert_relative_eq!(deltas[0][1], 0.0);
    assert_relative_eq!(deltas[1][0], 0.0);
    assert_relative_eq!(deltas[1][1], 1.0 / 200.0);

    assert!(commands.contains(&Command::SetUniform(
        bloom_program(&commands, 2),
        "strength".to_string(),
        Uniform::Float(0.6)
    )));

    // the blurred image is not left bound to the second unit
    assert_eq!(commands.last(), Some(&Command::BindTexture(1, None)));
    assert_eq!(device.bound_texture(1), None);
}

/// The program of the `n`th draw.
fn bloom_program(commands: &[Command], n: usize) -> bloom_ngin::device::ProgramId {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::Draw { program, .. } => *program,
            _ => None,
        })
        .nth(n)
        .unwrap()
}

#[test]
fn scaling_spreads_the_taps() {
    let (mut device, mut bloom) = bloom();
    bloom.set_scaling(2.0);
    device.take_commands();
    bloom.render_effect(&mut device, RenderTarget::Display);
    let delta = device.take_commands().into_iter().find_map(|c| match c {
        Command::SetUniform(_, name, Uniform::Vec2(d)) if name == "delta" => Some(d),
        _ => None,
    });
    assert_relative_eq!(delta.unwrap()[0], 2.0 / 320.0);
}

#[test]
fn release_frees_every_gpu_object() {
    let (mut device, bloom) = bloom();
    bloom.release(&mut device);
    assert_eq!(device.live_framebuffers(), 0);
    assert_eq!(device.live_textures(), 0);
    assert_eq!(device.live_programs(), 0);
    assert_eq!(device.live_meshes(), 0);
}

#[test]
fn failed_setup_deletes_what_was_already_created() {
    init_logger();
    for label in ["bloom blur", "bloom combine"] {
        let mut device = HeadlessDevice::new(320, 200);
        device.reject_program(label);
        let err = Bloom::new(&mut device, 320, 200).unwrap_err();
        assert!(matches!(err, Error::LinkFailure { .. }), "{label}: {err}");
        assert_eq!(device.live_framebuffers(), 0, "{label}");
        assert_eq!(device.live_textures(), 0, "{label}");
        assert_eq!(device.live_programs(), 0, "{label}");
        assert_eq!(device.live_meshes(), 0, "{label}");
    }
}
