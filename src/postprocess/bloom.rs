//! Bloom: blends a blurred copy of the image over itself so that bright
//! areas glow into their surroundings.
//!
//! Three passes over three floating point framebuffers of the same size:
//!
//! 1. `scene` is blurred horizontally into `hblur`
//! 2. `hblur` is blurred vertically into `vblur`
//! 3. `scene` and `vblur` are mixed into the output target
//!
//! Both blur passes use the same normalized 19-tap Gaussian kernel.

use std::any::Any;

use crate::{
    data_structures::framebuffer::Framebuffer,
    device::{
        FramebufferId, GraphicsDevice, MeshId, PixelFormat, ProgramId, RenderTarget, TextureId,
        Uniform,
    },
    error::{Error, Result},
    postprocess::{FULLSCREEN_VERTEX_SHADER, Postprocessor, fullscreen_quad},
    resources::{Shader, Texture},
};

/// Number of blur taps, centered on the sampled pixel.
pub const KERNEL_SIZE: usize = 19;

const BLUR_FRAGMENT_SHADER: &str = include_str!("shaders/blur.frag");
const COMBINE_FRAGMENT_SHADER: &str = include_str!("shaders/combine.frag");

/// Gaussian weights with standard deviation `radius` for the taps -9..=9,
/// normalized to sum to one so brightness is preserved.
pub fn gaussian_kernel(radius: f32) -> Result<[f32; KERNEL_SIZE]> {
    if !(radius > 0.0) || !radius.is_finite() {
        return Err(Error::InvalidArgument(format!(
            "blur radius must be positive, got {}",
            radius
        )));
    }
    let half = (KERNEL_SIZE / 2) as i32;
    let denominator = 2.0 * radius * radius;
    let mut factors = [0.0; KERNEL_SIZE];
    for (factor, i) in factors.iter_mut().zip(-half..=half) {
        *factor = (-((i * i) as f32) / denominator).exp();
    }
    let sum: f32 = factors.iter().sum();
    factors.iter_mut().for_each(|f| *f /= sum);
    Ok(factors)
}

#[derive(Debug)]
pub struct Bloom {
    scene: Framebuffer,
    hblur: Framebuffer,
    vblur: Framebuffer,
    blur_shader: Shader,
    combine_shader: Shader,
    quad: MeshId,
    radius: f32,
    factors: [f32; KERNEL_SIZE],
    scaling: f32,
    strength: f32,
}

impl Bloom {
    /// Creates a bloom stage for images of `width` x `height` pixels with
    /// radius 5, scaling 1 and strength 0.3.
    ///
    /// On failure every device object created so far is deleted again.
    pub fn new(device: &mut dyn GraphicsDevice, width: u32, height: u32) -> Result<Self> {
        let mut created = Created::default();
        let bloom = Self::create(device, width, height, &mut created);
        if bloom.is_err() {
            created.release(device);
        }
        bloom
    }

    fn create(
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
        created: &mut Created,
    ) -> Result<Self> {
        let radius = 5.0;
        let factors = gaussian_kernel(radius)?;

        let scene = created.framebuffer(float_target(device, width, height)?);
        let hblur = created.framebuffer(float_target(device, width, height)?);
        let vblur = created.framebuffer(float_target(device, width, height)?);

        let blur_shader = created.shader(Shader::from_stages(
            device,
            "bloom blur",
            FULLSCREEN_VERTEX_SHADER,
            BLUR_FRAGMENT_SHADER,
        )?);
        blur_shader.set_uniform(device, "source", Uniform::Int(0));

        let combine_shader = created.shader(Shader::from_stages(
            device,
            "bloom combine",
            FULLSCREEN_VERTEX_SHADER,
            COMBINE_FRAGMENT_SHADER,
        )?);
        combine_shader.set_uniform(device, "source", Uniform::Int(0));
        combine_shader.set_uniform(device, "blurred", Uniform::Int(1));

        let quad = fullscreen_quad(device, "bloom quad")?;

        Ok(Self {
            scene,
            hblur,
            vblur,
            blur_shader,
            combine_shader,
            quad,
            radius,
            factors,
            scaling: 1.0,
            strength: 0.3,
        })
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Sets the standard deviation of the blur, in (scaled) pixels.
    pub fn set_radius(&mut self, radius: f32) -> Result<()> {
        self.factors = gaussian_kernel(radius)?;
        self.radius = radius;
        Ok(())
    }

    pub fn factors(&self) -> &[f32; KERNEL_SIZE] {
        &self.factors
    }

    pub fn scaling(&self) -> f32 {
        self.scaling
    }

    /// Multiplies the distance between taps. Values above one spread the
    /// glow further with the same number of samples, at the cost of visible
    /// banding.
    pub fn set_scaling(&mut self, scaling: f32) {
        self.scaling = scaling;
    }

    pub fn strength(&self) -> f32 {
        self.strength
    }

    /// Mix factor of the blurred image: 0 shows the scene unchanged, 1 only
    /// the blur.
    pub fn set_strength(&mut self, strength: f32) {
        self.strength = strength;
    }

    fn blur_pass(
        &self,
        device: &mut dyn GraphicsDevice,
        source: &Framebuffer,
        destination: &Framebuffer,
        delta: [f32; 2],
    ) {
        self.blur_shader.bind(device);
        self.blur_shader.set_uniform(device, "delta", Uniform::Vec2(delta));
        for (i, factor) in self.factors.iter().enumerate() {
            self.blur_shader
                .set_uniform(device, &format!("factors[{}]", i), *factor);
        }
        source.color_buffer().bind(device, 0);
        destination.bind(device);
        device.draw(self.quad);
    }
}

fn float_target(device: &mut dyn GraphicsDevice, width: u32, height: u32) -> Result<Framebuffer> {
    Framebuffer::with_format(device, width, height, PixelFormat::RgbFloat)
}

/// Device objects of a half-built [`Bloom`].
#[derive(Default)]
struct Created {
    framebuffers: Vec<(FramebufferId, TextureId)>,
    programs: Vec<ProgramId>,
}

impl Created {
    fn framebuffer(&mut self, framebuffer: Framebuffer) -> Framebuffer {
        self.framebuffers
            .push((framebuffer.id(), framebuffer.color_buffer().id()));
        framebuffer
    }

    fn shader(&mut self, shader: Shader) -> Shader {
        self.programs.push(shader.program());
        shader
    }

    fn release(self, device: &mut dyn GraphicsDevice) {
        for program in self.programs {
            device.delete_program(program);
        }
        for (framebuffer, color) in self.framebuffers {
            device.delete_framebuffer(framebuffer);
            device.delete_texture(color);
        }
    }
}

impl Postprocessor for Bloom {
    fn render_target(&self) -> &Framebuffer {
        &self.scene
    }

    fn render_target_mut(&mut self) -> &mut Framebuffer {
        &mut self.scene
    }

    fn render_effect(&mut self, device: &mut dyn GraphicsDevice, target: RenderTarget) {
        let width = self.scene.width() as f32;
        let height = self.scene.height() as f32;
        self.blur_pass(device, &self.scene, &self.hblur, [self.scaling / width, 0.0]);
        self.blur_pass(device, &self.hblur, &self.vblur, [0.0, self.scaling / height]);

        self.combine_shader.bind(device);
        self.combine_shader
            .set_uniform(device, "strength", self.strength);
        self.scene.color_buffer().bind(device, 0);
        self.vblur.color_buffer().bind(device, 1);
        device.bind_target(target);
        device.draw(self.quad);
        Texture::unbind(device, 1);
    }

    fn release(&self, device: &mut dyn GraphicsDevice) {
        self.scene.release(device);
        self.hblur.release(device);
        self.vblur.release(device);
        device.delete_program(self.blur_shader.program());
        device.delete_program(self.combine_shader.program());
        device.delete_mesh(self.quad);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_is_symmetric_and_peaks_in_the_middle() {
        let k = gaussian_kernel(3.0).unwrap();
        for i in 0..KERNEL_SIZE / 2 {
            assert!((k[i] - k[KERNEL_SIZE - 1 - i]).abs() < 1e-7);
            assert!(k[i] < k[i + 1]);
        }
    }

    #[test]
    fn non_positive_radius_is_rejected() {
        assert!(matches!(gaussian_kernel(0.0), Err(Error::InvalidArgument(_))));
        assert!(matches!(gaussian_kernel(-1.0), Err(Error::InvalidArgument(_))));
        assert!(matches!(gaussian_kernel(f32::NAN), Err(Error::InvalidArgument(_))));
    }
}
