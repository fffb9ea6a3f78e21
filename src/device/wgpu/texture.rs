use crate::{
    device::{PixelFormat, TextureDesc},
    error::{Error, Result},
};

#[derive(Clone, Debug)]
pub struct GpuTexture {
    #[allow(unused)]
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub desc: TextureDesc,
}

impl GpuTexture {
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    pub fn format(desc: &TextureDesc) -> wgpu::TextureFormat {
        if desc.format.is_float() {
            wgpu::TextureFormat::Rgba16Float
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        }
    }

    /// Creates a sampled, renderable texture and uploads `pixels` if given.
    /// Three-channel data is widened to RGBA on the way.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        desc: &TextureDesc,
        pixels: Option<&[u8]>,
    ) -> Result<Self> {
        let size = wgpu::Extent3d {
            width: desc.width.max(1),
            height: desc.height.max(1),
            depth_or_array_layers: 1,
        };
        let rgba = match pixels {
            Some(pixels) => Some(to_rgba(desc, pixels)?),
            None => None,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("engine texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::format(desc),
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        if let Some(rgba) = rgba {
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    aspect: wgpu::TextureAspect::All,
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                },
                &rgba,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * desc.width),
                    rows_per_image: Some(desc.height),
                },
                size,
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Self {
            texture,
            view,
            desc: *desc,
        })
    }
}

fn to_rgba(desc: &TextureDesc, pixels: &[u8]) -> Result<Vec<u8>> {
    let count = desc.width as usize * desc.height as usize;
    match desc.format {
        PixelFormat::Rgba8 if pixels.len() == count * 4 => Ok(pixels.to_vec()),
        PixelFormat::Rgb8 if pixels.len() == count * 3 => Ok(pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect()),
        PixelFormat::RgbFloat | PixelFormat::RgbaFloat => Err(Error::Device(String::from(
            "floating point textures can only be rendered to",
        ))),
        format => Err(Error::Device(format!(
            "texture upload of {} bytes, expected {}",
            pixels.len(),
            count * format.bytes_per_pixel()
        ))),
    }
}

/// Depth attachment for a render target of the given size.
pub fn create_depth_view(device: &wgpu::Device, width: u32, height: u32, label: &str) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: GpuTexture::DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[GpuTexture::DEPTH_FORMAT],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

pub fn create_sampler(device: &wgpu::Device, wrap: bool) -> wgpu::Sampler {
    let address_mode = if wrap {
        wgpu::AddressMode::Repeat
    } else {
        wgpu::AddressMode::ClampToEdge
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}
