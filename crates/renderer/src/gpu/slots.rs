use image::RgbaImage;
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::error::RenderError;
use crate::types::Role;

/// Texture bound for one role, recreated whenever the role's source changes.
pub(crate) struct SlotTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl SlotTexture {
    /// Transparent 1x1 texture standing in for an empty role.
    pub fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue, role: Role) -> Self {
        let texture = device.create_texture_with_data(
            queue,
            &descriptor(role, 1, 1),
            TextureDataOrder::LayerMajor,
            &[0u8; 4],
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width: 1,
            height: 1,
        }
    }

    pub fn allocate(device: &wgpu::Device, role: Role, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&descriptor(role, width, height));
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
        }
    }

    /// Rows are written top-down as decoded; no vertical flip.
    pub fn upload(&self, queue: &wgpu::Queue, pixels: &RgbaImage) -> Result<(), RenderError> {
        if pixels.dimensions() != (self.width, self.height) {
            return Err(RenderError::Other(format!(
                "frame is {}x{} but the slot holds {}x{}",
                pixels.width(),
                pixels.height(),
                self.width,
                self.height
            )));
        }
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * self.width),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }
}

fn descriptor(role: Role, width: u32, height: u32) -> wgpu::TextureDescriptor<'static> {
    wgpu::TextureDescriptor {
        label: Some(match role {
            Role::Primary => "src_img slot",
            Role::Distortion => "dst_img slot",
        }),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    }
}

/// Sampler shared by both slots; texels are sampled unfiltered.
pub(crate) fn media_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&media_sampler_descriptor())
}

fn media_sampler_descriptor() -> wgpu::SamplerDescriptor<'static> {
    wgpu::SamplerDescriptor {
        label: Some("media sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    }
}
