//! Off-screen render targets.
//!
//! A [`Framebuffer`] owns a color texture of fixed size and, once requested,
//! a depth attachment. Binding one returns the previously bound target so the
//! caller can restore it; there is no hidden global viewport state.

use crate::{
    device::{FramebufferId, GraphicsDevice, PixelFormat, RenderTarget, TextureDesc},
    error::{Error, Result},
    resources::Texture,
};

#[derive(Debug)]
pub struct Framebuffer {
    id: FramebufferId,
    color: Texture,
    has_depth: bool,
}

impl Framebuffer {
    /// Creates a framebuffer with an 8-bit color buffer.
    pub fn new(device: &mut dyn GraphicsDevice, width: u32, height: u32) -> Result<Self> {
        Self::with_format(device, width, height, PixelFormat::Rgb8)
    }

    pub fn with_format(
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidArgument(format!(
                "framebuffer size {}x{} is empty",
                width, height
            )));
        }
        let color = create_color(device, width, height, format)?;
        let id = match device.create_framebuffer(color.id()) {
            Ok(id) => id,
            Err(e) => {
                device.delete_texture(color.id());
                return Err(e);
            }
        };
        Ok(Self {
            id,
            color,
            has_depth: false,
        })
    }

    pub fn id(&self) -> FramebufferId {
        self.id
    }

    pub fn target(&self) -> RenderTarget {
        RenderTarget::Framebuffer(self.id)
    }

    pub fn color_buffer(&self) -> &Texture {
        &self.color
    }

    pub fn width(&self) -> u32 {
        self.color.width()
    }

    pub fn height(&self) -> u32 {
        self.color.height()
    }

    pub fn has_depth_buffer(&self) -> bool {
        self.has_depth
    }

    pub fn is_float(&self) -> bool {
        self.color.format().is_float()
    }

    /// Switches the color buffer between 8-bit and floating point storage.
    /// The contents are lost; a depth attachment is kept.
    pub fn set_float(&mut self, device: &mut dyn GraphicsDevice, float: bool) -> Result<()> {
        if self.is_float() == float {
            return Ok(());
        }
        let format = if float {
            PixelFormat::RgbFloat
        } else {
            PixelFormat::Rgb8
        };
        let color = create_color(device, self.width(), self.height(), format)?;
        let id = match device.create_framebuffer(color.id()) {
            Ok(id) => id,
            Err(e) => {
                device.delete_texture(color.id());
                return Err(e);
            }
        };
        if self.has_depth {
            if let Err(e) = device.attach_depth(id) {
                device.delete_framebuffer(id);
                device.delete_texture(color.id());
                return Err(e);
            }
        }
        self.release(device);
        self.id = id;
        self.color = color;
        Ok(())
    }

    /// Adds a depth attachment. Does nothing if there already is one.
    pub fn add_depth_buffer(&mut self, device: &mut dyn GraphicsDevice) -> Result<()> {
        if self.has_depth {
            return Ok(());
        }
        device.attach_depth(self.id)?;
        self.has_depth = true;
        Ok(())
    }

    /// Directs rendering into this framebuffer. Returns the target to hand
    /// back to [`Self::unbind`].
    pub fn bind(&self, device: &mut dyn GraphicsDevice) -> RenderTarget {
        device.bind_target(self.target())
    }

    /// Restores the target that was bound before [`Self::bind`].
    pub fn unbind(device: &mut dyn GraphicsDevice, saved: RenderTarget) {
        device.bind_target(saved);
    }

    pub fn release(&self, device: &mut dyn GraphicsDevice) {
        device.delete_framebuffer(self.id);
        device.delete_texture(self.color.id());
    }
}

fn create_color(
    device: &mut dyn GraphicsDevice,
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Texture> {
    let desc = TextureDesc {
        width,
        height,
        format,
        wrap: false,
    };
    Texture::from_pixels(device, desc, None)
}
