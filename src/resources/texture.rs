use std::path::Path;

use crate::{
    device::{GraphicsDevice, PixelFormat, TextureDesc, TextureId},
    error::{Error, Result},
    resources::{Registry, Resource, ResourceKind, load_binary},
};

/// A 2D image uploaded to the device.
///
/// The first row of pixel data is addressed by texture coordinate v = 0.
#[derive(Debug)]
pub struct Texture {
    id: TextureId,
    desc: TextureDesc,
}

impl Texture {
    /// Decodes an encoded image (PNG or JPEG). Only 24-bit RGB and 32-bit RGBA
    /// images are accepted.
    pub fn from_bytes(device: &mut dyn GraphicsDevice, bytes: &[u8], label: &str) -> Result<Self> {
        let img = image::load_from_memory(bytes).map_err(|e| Error::load(label, e))?;
        Self::from_image(device, &img, label)
    }

    pub fn from_image(
        device: &mut dyn GraphicsDevice,
        img: &image::DynamicImage,
        label: &str,
    ) -> Result<Self> {
        let (format, pixels) = match img {
            image::DynamicImage::ImageRgb8(rgb) => (PixelFormat::Rgb8, rgb.as_raw().as_slice()),
            image::DynamicImage::ImageRgba8(rgba) => (PixelFormat::Rgba8, rgba.as_raw().as_slice()),
            other => {
                return Err(Error::load(
                    label,
                    format!("don't know how to handle pixel format {:?}", other.color()),
                ));
            }
        };
        let desc = TextureDesc {
            width: img.width(),
            height: img.height(),
            format,
            wrap: true,
        };
        Self::from_pixels(device, desc, Some(pixels))
    }

    /// Creates a texture from raw, tightly packed pixels, or with undefined
    /// contents when `pixels` is `None` (render targets).
    pub fn from_pixels(
        device: &mut dyn GraphicsDevice,
        desc: TextureDesc,
        pixels: Option<&[u8]>,
    ) -> Result<Self> {
        let id = device.create_texture(&desc, pixels)?;
        Ok(Self { id, desc })
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn format(&self) -> PixelFormat {
        self.desc.format
    }

    pub fn wrap(&self) -> bool {
        self.desc.wrap
    }

    pub fn set_wrap(&mut self, device: &mut dyn GraphicsDevice, wrap: bool) {
        self.desc.wrap = wrap;
        device.set_texture_wrap(self.id, wrap);
    }

    pub fn bind(&self, device: &mut dyn GraphicsDevice, unit: u32) {
        device.bind_texture(unit, Some(self.id));
    }

    pub fn unbind(device: &mut dyn GraphicsDevice, unit: u32) {
        device.bind_texture(unit, None);
    }
}

impl Resource for Texture {
    const KIND: ResourceKind = ResourceKind::Texture;

    fn load(path: &Path, _: &Registry, device: &mut dyn GraphicsDevice) -> Result<Self> {
        let bytes = load_binary(path)?;
        Self::from_bytes(device, &bytes, &path.display().to_string())
    }

    fn release(&self, device: &mut dyn GraphicsDevice) {
        device.delete_texture(self.id);
    }

    fn pool(registry: &Registry) -> &Vec<Self> {
        &registry.textures
    }

    fn pool_mut(registry: &mut Registry) -> &mut Vec<Self> {
        &mut registry.textures
    }
}
