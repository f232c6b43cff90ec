use anyhow::{Context, Result};
use image::RgbaImage;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;

use crate::backend::RenderBackend;
use crate::error::RenderError;
use crate::program::{ProgramState, ResourceKind, ResourceSlot};
use crate::types::{GpuPowerPreference, Role, ShaderSources};

use super::context::GpuContext;
use super::pipeline::{BlitPipeline, ProgramPipeline, OUTPUT_FORMAT, QUAD_VERTEX_COUNT};
use super::readback::OutputTarget;
use super::slots::{media_sampler, SlotTexture};

/// [`RenderBackend`] drawing into a winit window through wgpu.
pub struct WgpuBackend {
    context: GpuContext,
    program: ProgramPipeline,
    resources: Vec<ResourceSlot>,
    uniform_buffer: Option<wgpu::Buffer>,
    sampler: wgpu::Sampler,
    slots: [SlotTexture; 2],
    bind_groups: Vec<wgpu::BindGroup>,
    bind_groups_dirty: bool,
    output: OutputTarget,
    blit: BlitPipeline,
    blit_group: wgpu::BindGroup,
}

impl WgpuBackend {
    pub(crate) fn new<T>(
        target: &T,
        size: PhysicalSize<u32>,
        power: GpuPowerPreference,
        program: &ProgramState,
        shaders: &ShaderSources,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, size, power)?;
        let device = &context.device;

        let pipeline = ProgramPipeline::new(device, program, shaders)
            .context("failed to create the shader pipeline")?;

        let uniform_buffer = program
            .resources()
            .iter()
            .any(|slot| matches!(slot.kind, ResourceKind::UniformBlock { .. }))
            .then(|| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("distortio uniforms"),
                    size: u64::from(program.block_size().max(16)),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            });

        let slots = [
            SlotTexture::placeholder(device, &context.queue, Role::Primary),
            SlotTexture::placeholder(device, &context.queue, Role::Distortion),
        ];
        let output = OutputTarget::new(device, OUTPUT_FORMAT, context.config.width, context.config.height);
        let blit = BlitPipeline::new(device, context.surface_format);
        let blit_group = blit.bind(device, &output.view);
        let sampler = media_sampler(device);

        let mut backend = Self {
            context,
            program: pipeline,
            resources: program.resources().to_vec(),
            uniform_buffer,
            sampler,
            slots,
            bind_groups: Vec::new(),
            bind_groups_dirty: true,
            output,
            blit,
            blit_group,
        };
        backend.rebuild_bind_groups();
        Ok(backend)
    }

    /// Reconfigures the surface after it was reported lost or outdated.
    pub(crate) fn reconfigure(&mut self) {
        self.context.reconfigure();
    }

    fn rebuild_bind_groups(&mut self) {
        let device = &self.context.device;
        let groups: Vec<wgpu::BindGroup> = self
            .program
            .group_layouts
            .iter()
            .enumerate()
            .map(|(group, layout)| {
                let entries: Vec<wgpu::BindGroupEntry<'_>> = self
                    .resources
                    .iter()
                    .filter(|slot| slot.group as usize == group)
                    .filter_map(|slot| {
                        let resource = match slot.kind {
                            ResourceKind::UniformBlock { .. } => {
                                self.uniform_buffer.as_ref()?.as_entire_binding()
                            }
                            ResourceKind::Texture(role) => {
                                wgpu::BindingResource::TextureView(&self.slots[role.slot()].view)
                            }
                            ResourceKind::Sampler => wgpu::BindingResource::Sampler(&self.sampler),
                        };
                        Some(wgpu::BindGroupEntry {
                            binding: slot.binding,
                            resource,
                        })
                    })
                    .collect();
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("program bind group {group}")),
                    layout,
                    entries: &entries,
                })
            })
            .collect();
        self.bind_groups = groups;
        self.bind_groups_dirty = false;
    }
}

impl RenderBackend for WgpuBackend {
    fn surface_size(&self) -> (u32, u32) {
        (self.context.config.width, self.context.config.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.context.resize(PhysicalSize::new(width, height));
        self.output = OutputTarget::new(&self.context.device, OUTPUT_FORMAT, width, height);
        self.blit_group = self.blit.bind(&self.context.device, &self.output.view);
    }

    fn max_texture_dimension(&self) -> u32 {
        self.context.max_texture_dimension
    }

    fn replace_slot(&mut self, role: Role, width: u32, height: u32) -> Result<(), RenderError> {
        let max = self.context.max_texture_dimension;
        if width > max || height > max {
            return Err(RenderError::Other(format!(
                "{role} source is {width}x{height}; the GPU limit is {max}"
            )));
        }
        self.slots[role.slot()] = SlotTexture::allocate(&self.context.device, role, width, height);
        self.bind_groups_dirty = true;
        Ok(())
    }

    fn upload_slot(&mut self, role: Role, pixels: &RgbaImage) -> Result<(), RenderError> {
        self.slots[role.slot()].upload(&self.context.queue, pixels)
    }

    fn write_uniforms(&mut self, bytes: &[u8]) {
        if let Some(buffer) = self.uniform_buffer.as_ref() {
            self.context.queue.write_buffer(buffer, 0, bytes);
        }
    }

    fn draw(&mut self) -> Result<(), RenderError> {
        if self.bind_groups_dirty {
            self.rebuild_bind_groups();
        }
        let frame = self.context.surface.get_current_texture()?;
        let surface_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("distortio frame"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("program pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.output.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.program.pipeline);
            for (index, group) in self.bind_groups.iter().enumerate() {
                pass.set_bind_group(index as u32, group, &[]);
            }
            pass.set_vertex_buffer(0, self.program.quad.slice(..));
            pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("present pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &surface_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.blit.pipeline);
            pass.set_bind_group(0, &self.blit_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn read_output(&mut self) -> Result<RgbaImage, RenderError> {
        self.output.read(&self.context.device, &self.context.queue)
    }
}
