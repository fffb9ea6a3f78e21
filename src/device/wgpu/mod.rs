//! [`GraphicsDevice`] on top of wgpu.
//!
//! wgpu records work into render passes instead of executing calls one by
//! one, so the device collects what the engine asks for and encodes it all
//! at [`GraphicsDevice::present`]:
//!
//! - `clear` and the first `draw` after a target change open a pass
//! - each `draw` snapshots the current uniform values and texture units
//!   into fresh bind groups, so later `set_uniform` calls don't leak into
//!   it
//! - `present` encodes every pass in order, submits and presents
//!
//! Shaders are GLSL 450 with explicit bindings. Uniforms live in `std140`
//! blocks and are set by member name. A texture named `<name>_tex` samples
//! the unit selected by setting the integer uniform `<name>` (unit 0 by
//! default) through the sampler `<name>_sampler`.

use std::{
    borrow::Cow,
    collections::HashMap,
    iter,
    sync::{Arc, Mutex},
};

use anyhow::anyhow;
use cgmath::Matrix4;
use slotmap::SlotMap;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    device::{
        FramebufferId, GraphicsDevice, MeshId, ProgramId, RenderTarget, TEXTURE_UNITS, TextureDesc,
        TextureId, Uniform, Vertex,
    },
    error::{Error, Result, ShaderStage},
};

mod pipeline;
mod reflect;
mod texture;

use reflect::{Interface, SlotKind};
use texture::GpuTexture;

/// Maps OpenGL clip space depth (-1..1) to wgpu's (0..1).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[derive(Debug)]
struct Program {
    label: String,
    interface: Interface,
    layouts: Vec<wgpu::BindGroupLayout>,
    pipeline_layout: wgpu::PipelineLayout,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    /// Current contents of each uniform block, indexed like `interface.blocks`.
    uniforms: Vec<Vec<u8>>,
    units: HashMap<String, u32>,
}

#[derive(Debug)]
struct GpuMesh {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    count: u32,
}

#[derive(Debug)]
struct GpuFramebuffer {
    color: TextureId,
    depth: Option<wgpu::TextureView>,
}

#[derive(Debug)]
struct DrawCall {
    pipeline: wgpu::RenderPipeline,
    bind_groups: Vec<wgpu::BindGroup>,
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    count: u32,
}

#[derive(Debug)]
struct Pass {
    target: RenderTarget,
    /// `None` renders into the surface texture acquired at present time.
    color: Option<wgpu::TextureView>,
    depth: Option<wgpu::TextureView>,
    clear: Option<[f32; 4]>,
    draws: Vec<DrawCall>,
}

type PipelineKey = (ProgramId, wgpu::TextureFormat, bool);

#[derive(Debug)]
pub struct WgpuDevice {
    #[allow(unused)]
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth: wgpu::TextureView,
    clamp_sampler: wgpu::Sampler,
    repeat_sampler: wgpu::Sampler,
    fallback: GpuTexture,

    programs: SlotMap<ProgramId, Program>,
    textures: SlotMap<TextureId, GpuTexture>,
    meshes: SlotMap<MeshId, GpuMesh>,
    framebuffers: SlotMap<FramebufferId, GpuFramebuffer>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,

    current_program: Option<ProgramId>,
    units: [Option<TextureId>; TEXTURE_UNITS],
    target: RenderTarget,
    clear_color: [f32; 4],
    passes: Vec<Pass>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl WgpuDevice {
    pub async fn new(window: Arc<Window>, width: u32, height: u32) -> anyhow::Result<Self> {
        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| anyhow!("no suitable graphics adapter: {}", e))?;
        log::info!("using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("engine device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
                ..Default::default()
            })
            .await
            .map_err(|e| anyhow!("failed to create device: {}", e))?;

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        device.on_uncaptured_error(Arc::new(move |e: wgpu::Error| {
            if let Ok(mut errors) = sink.lock() {
                errors.push(e.to_string());
            }
        }));

        // Colors are written as computed, without sRGB encoding
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow!("surface is not supported by the adapter"))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth = texture::create_depth_view(&device, config.width, config.height, "display depth");
        let fallback = GpuTexture::new(
            &device,
            &queue,
            &TextureDesc {
                width: 1,
                height: 1,
                format: crate::device::PixelFormat::Rgba8,
                wrap: false,
            },
            Some(&[255, 255, 255, 255]),
        )?;

        Ok(Self {
            clamp_sampler: texture::create_sampler(&device, false),
            repeat_sampler: texture::create_sampler(&device, true),
            window,
            surface,
            device,
            queue,
            config,
            depth,
            fallback,
            programs: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            meshes: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            pipelines: HashMap::new(),
            current_program: None,
            units: [None; TEXTURE_UNITS],
            target: RenderTarget::Display,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            passes: Vec::new(),
            errors,
        })
    }

    fn report(&self, message: String) {
        log::warn!("{}", message);
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(message);
        }
    }

    /// Color view, depth view and color format of `target`.
    fn resolve(
        &self,
        target: RenderTarget,
    ) -> Option<(Option<wgpu::TextureView>, Option<wgpu::TextureView>, wgpu::TextureFormat)> {
        match target {
            RenderTarget::Display => Some((None, Some(self.depth.clone()), self.config.format)),
            RenderTarget::Framebuffer(id) => {
                let framebuffer = self.framebuffers.get(id)?;
                let color = self.textures.get(framebuffer.color)?;
                Some((
                    Some(color.view.clone()),
                    framebuffer.depth.clone(),
                    GpuTexture::format(&color.desc),
                ))
            }
        }
    }

    /// Starts a pass on the bound target. Returns `false` if the target is
    /// gone.
    fn open_pass(&mut self, clear: Option<[f32; 4]>) -> bool {
        let Some((color, depth, _)) = self.resolve(self.target) else {
            self.report(format!("render target {:?} no longer exists", self.target));
            return false;
        };
        self.passes.push(Pass {
            target: self.target,
            color,
            depth,
            clear,
            draws: Vec::new(),
        });
        true
    }

    fn pipeline(&mut self, program: ProgramId, format: wgpu::TextureFormat, depth: bool) -> Option<wgpu::RenderPipeline> {
        let key = (program, format, depth);
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Some(pipeline.clone());
        }
        let p = self.programs.get(program)?;
        let pipeline = pipeline::mk_render_pipeline(
            &self.device,
            &p.label,
            &p.pipeline_layout,
            &p.vertex,
            &p.fragment,
            format,
            depth,
        );
        self.pipelines.insert(key, pipeline.clone());
        Some(pipeline)
    }

    fn bind_groups(&self, program: &Program) -> Vec<wgpu::BindGroup> {
        enum Bound {
            Buffer(wgpu::Buffer),
            View(wgpu::TextureView),
            Sampler(wgpu::Sampler),
        }

        let unit_texture = |name: &str| {
            let unit = program.units.get(name).copied().unwrap_or(0) as usize;
            self.units
                .get(unit)
                .copied()
                .flatten()
                .and_then(|id| self.textures.get(id))
        };

        program
            .layouts
            .iter()
            .enumerate()
            .map(|(group, layout)| {
                let group = group as u32;
                let mut bound: Vec<(u32, Bound)> = Vec::new();
                for (block, data) in program.interface.blocks.iter().zip(&program.uniforms) {
                    if block.group == group {
                        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("uniforms"),
                            contents: data,
                            usage: wgpu::BufferUsages::UNIFORM,
                        });
                        bound.push((block.binding, Bound::Buffer(buffer)));
                    }
                }
                for slot in program.interface.slots.iter().filter(|s| s.group == group) {
                    let texture = unit_texture(&slot.unit_name);
                    let resource = match slot.kind {
                        SlotKind::Texture => {
                            Bound::View(texture.unwrap_or(&self.fallback).view.clone())
                        }
                        SlotKind::Sampler => match texture {
                            Some(t) if t.desc.wrap => Bound::Sampler(self.repeat_sampler.clone()),
                            _ => Bound::Sampler(self.clamp_sampler.clone()),
                        },
                    };
                    bound.push((slot.binding, resource));
                }

                let entries: Vec<wgpu::BindGroupEntry> = bound
                    .iter()
                    .map(|(binding, resource)| wgpu::BindGroupEntry {
                        binding: *binding,
                        resource: match resource {
                            Bound::Buffer(buffer) => buffer.as_entire_binding(),
                            Bound::View(view) => wgpu::BindingResource::TextureView(view),
                            Bound::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                        },
                    })
                    .collect();
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    layout,
                    entries: &entries,
                    label: Some(&program.label),
                })
            })
            .collect()
    }

    fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pass: &Pass,
        surface: Option<&wgpu::TextureView>,
        clear_depth: bool,
    ) {
        let Some(color) = pass.color.as_ref().or(surface) else {
            return;
        };
        let load = match pass.clear {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("engine pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: pass.depth.as_ref().map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: if clear_depth {
                            wgpu::LoadOp::Clear(1.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            ..Default::default()
        });
        for draw in &pass.draws {
            render_pass.set_pipeline(&draw.pipeline);
            for (i, group) in draw.bind_groups.iter().enumerate() {
                render_pass.set_bind_group(i as u32, group, &[]);
            }
            render_pass.set_vertex_buffer(0, draw.vertices.slice(..));
            render_pass.set_index_buffer(draw.indices.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..draw.count, 0, 0..1);
        }
    }
}

impl GraphicsDevice for WgpuDevice {
    fn create_program(&mut self, label: &str, vertex: &str, fragment: &str) -> Result<ProgramId> {
        let vertex_module = reflect::compile(ShaderStage::Vertex, vertex)?;
        let fragment_module = reflect::compile(ShaderStage::Fragment, fragment)?;
        reflect::link(&vertex_module, &fragment_module)?;
        let interface = Interface::reflect(&vertex_module, &fragment_module);

        let layouts = pipeline::bind_group_layouts(&self.device, label, &interface);
        let pipeline_layout = pipeline::mk_pipeline_layout(&self.device, label, &layouts);
        let vertex = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Naga(Cow::Owned(vertex_module)),
        });
        let fragment = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Naga(Cow::Owned(fragment_module)),
        });
        let uniforms = interface
            .blocks
            .iter()
            .map(|b| vec![0; b.size as usize])
            .collect();

        log::debug!("created program {}", label);
        Ok(self.programs.insert(Program {
            label: label.to_string(),
            interface,
            layouts,
            pipeline_layout,
            vertex,
            fragment,
            uniforms,
            units: HashMap::new(),
        }))
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(program).is_some() {
            self.pipelines.retain(|key, _| key.0 != program);
            if self.current_program == Some(program) {
                self.current_program = None;
            }
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        if self.programs.contains_key(program) {
            self.current_program = Some(program);
        } else {
            self.report(format!("use of unknown program {:?}", program));
        }
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: Uniform) {
        let Some(p) = self.programs.get_mut(program) else {
            self.report(format!("uniform {} set on unknown program {:?}", name, program));
            return;
        };
        if let Some((block, offset, bytes)) = p.interface.encode(name, value) {
            if let Some(data) = p.uniforms.get_mut(block) {
                if let Some(dst) = data.get_mut(offset..offset + bytes.len()) {
                    dst.copy_from_slice(&bytes);
                }
            }
            return;
        }
        // Integer uniforms named after a texture select its unit
        if let Uniform::Int(unit) = value {
            if p.interface.slots.iter().any(|s| s.unit_name == name) {
                p.units.insert(name.to_string(), unit.max(0) as u32);
            }
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc, pixels: Option<&[u8]>) -> Result<TextureId> {
        let texture = GpuTexture::new(&self.device, &self.queue, desc, pixels)?;
        Ok(self.textures.insert(texture))
    }

    fn set_texture_wrap(&mut self, texture: TextureId, wrap: bool) {
        if let Some(t) = self.textures.get_mut(texture) {
            t.desc.wrap = wrap;
        }
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.textures.remove(texture).is_some() {
            self.units
                .iter_mut()
                .filter(|unit| **unit == Some(texture))
                .for_each(|unit| *unit = None);
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        match self.units.get_mut(unit as usize) {
            Some(slot) => *slot = texture,
            None => self.report(format!("texture unit {} out of range", unit)),
        }
    }

    fn create_mesh(&mut self, label: &str, vertices: &[Vertex], indices: &[u32]) -> Result<MeshId> {
        // Zero-sized buffers can't be bound; keep one dummy element
        let dummy_vertex = [Vertex::default()];
        let vertex_data = if vertices.is_empty() { &dummy_vertex[..] } else { vertices };
        let index_data = if indices.is_empty() { &[0][..] } else { indices };
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(vertex_data),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(index_data),
            usage: wgpu::BufferUsages::INDEX,
        });
        Ok(self.meshes.insert(GpuMesh {
            vertices: vertex_buffer,
            indices: index_buffer,
            count: indices.len() as u32,
        }))
    }

    fn delete_mesh(&mut self, mesh: MeshId) {
        self.meshes.remove(mesh);
    }

    fn draw(&mut self, mesh: MeshId) {
        let Some(program_id) = self.current_program else {
            self.report(String::from("draw without a program"));
            return;
        };
        let Some(m) = self.meshes.get(mesh) else {
            self.report(format!("draw of unknown mesh {:?}", mesh));
            return;
        };
        if m.count == 0 {
            return;
        }
        let (vertices, indices, count) = (m.vertices.clone(), m.indices.clone(), m.count);

        let Some((_, depth, format)) = self.resolve(self.target) else {
            self.report(format!("render target {:?} no longer exists", self.target));
            return;
        };
        let Some(pipeline) = self.pipeline(program_id, format, depth.is_some()) else {
            return;
        };
        let Some(program) = self.programs.get(program_id) else {
            return;
        };
        let bind_groups = self.bind_groups(program);

        let target = self.target;
        let continues = self.passes.last().is_some_and(|pass| pass.target == target);
        if !continues && !self.open_pass(None) {
            return;
        }
        if let Some(pass) = self.passes.last_mut() {
            pass.draws.push(DrawCall {
                pipeline,
                bind_groups,
                vertices,
                indices,
                count,
            });
        }
    }

    fn create_framebuffer(&mut self, color: TextureId) -> Result<FramebufferId> {
        if !self.textures.contains_key(color) {
            return Err(Error::Device(format!("unknown color texture {:?}", color)));
        }
        Ok(self.framebuffers.insert(GpuFramebuffer { color, depth: None }))
    }

    fn attach_depth(&mut self, framebuffer: FramebufferId) -> Result<()> {
        let fb = self
            .framebuffers
            .get(framebuffer)
            .ok_or_else(|| Error::Device(format!("unknown framebuffer {:?}", framebuffer)))?;
        let color = self
            .textures
            .get(fb.color)
            .ok_or_else(|| Error::Device(String::from("framebuffer lost its color texture")))?;
        let view = texture::create_depth_view(
            &self.device,
            color.desc.width,
            color.desc.height,
            "framebuffer depth",
        );
        if let Some(fb) = self.framebuffers.get_mut(framebuffer) {
            fb.depth = Some(view);
        }
        Ok(())
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.framebuffers.remove(framebuffer).is_some()
            && self.target == RenderTarget::Framebuffer(framebuffer)
        {
            self.target = RenderTarget::Display;
        }
    }

    fn bind_target(&mut self, target: RenderTarget) -> RenderTarget {
        if let RenderTarget::Framebuffer(id) = target {
            if !self.framebuffers.contains_key(id) {
                self.report(format!("bind of unknown framebuffer {:?}", id));
                return self.target;
            }
        }
        std::mem::replace(&mut self.target, target)
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    fn clear(&mut self) {
        let (target, color) = (self.target, self.clear_color);
        match self.passes.last_mut() {
            Some(pass) if pass.target == target && pass.draws.is_empty() => pass.clear = Some(color),
            _ => {
                self.open_pass(Some(color));
            }
        }
    }

    fn present(&mut self) -> Result<()> {
        let passes = std::mem::take(&mut self.passes);
        let frame = match self.surface.get_current_texture() {
            wgpu::CurrentSurfaceTexture::Success(frame)
            | wgpu::CurrentSurfaceTexture::Suboptimal(frame) => frame,
            wgpu::CurrentSurfaceTexture::Lost | wgpu::CurrentSurfaceTexture::Outdated => {
                log::warn!("surface lost, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            e => return Err(Error::Device(format!("{e:?}"))),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        for (pass, clear_depth) in passes.iter().zip(depth_clears(&passes)) {
            self.encode(&mut encoder, pass, Some(&view), clear_depth);
        }
        self.queue.submit(iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn last_error(&mut self) -> Option<String> {
        let mut errors = self.errors.lock().ok()?;
        if errors.is_empty() {
            None
        } else {
            Some(errors.remove(0))
        }
    }

    fn display_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn clip_space_correction(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX
    }
}

/// Whether each pass starts by clearing its depth attachment. Passes that
/// clear their color do, and so does the first display pass of a frame: with
/// post-processing active the engine clears the first framebuffer, never the
/// display.
fn depth_clears(passes: &[Pass]) -> Vec<bool> {
    let mut display_seen = false;
    passes
        .iter()
        .map(|pass| {
            let first_on_display = pass.target == RenderTarget::Display && !display_seen;
            display_seen |= pass.target == RenderTarget::Display;
            pass.clear.is_some() || first_on_display
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use slotmap::KeyData;

    use super::*;

    fn pass(target: RenderTarget, clear: bool) -> Pass {
        Pass {
            target,
            color: None,
            depth: None,
            clear: clear.then_some([0.0; 4]),
            draws: Vec::new(),
        }
    }

    #[test]
    fn display_depth_is_cleared_once_per_frame() {
        let framebuffer = RenderTarget::Framebuffer(FramebufferId::from(KeyData::from_ffi(1)));
        let passes = [
            pass(framebuffer, true),
            pass(framebuffer, false),
            pass(RenderTarget::Display, false),
            pass(RenderTarget::Display, false),
        ];
        assert_eq!(depth_clears(&passes), vec![true, false, true, false]);
    }

    #[test]
    fn cleared_display_passes_clear_their_depth() {
        let passes = [pass(RenderTarget::Display, true), pass(RenderTarget::Display, false)];
        assert_eq!(depth_clears(&passes), vec![true, false]);
    }
}
