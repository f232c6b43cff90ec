use image::RgbaImage;

use crate::error::RenderError;
use crate::types::Role;

/// GPU operations the engine issues from the frame scheduler.
///
/// Only the scheduler (through [`crate::RenderContext`]) calls these, which
/// keeps every resource mutation on the render thread. The wgpu implementation
/// lives in [`crate::gpu`]; tests substitute a recorder.
pub trait RenderBackend {
    /// Output surface size in physical pixels.
    fn surface_size(&self) -> (u32, u32);

    fn resize(&mut self, width: u32, height: u32);

    /// Largest width or height a slot texture may have.
    fn max_texture_dimension(&self) -> u32;

    /// Reallocates the role's texture at the given size, dropping the old one.
    fn replace_slot(&mut self, role: Role, width: u32, height: u32) -> Result<(), RenderError>;

    /// Writes pixels into the role's current texture; sizes must match.
    fn upload_slot(&mut self, role: Role, pixels: &RgbaImage) -> Result<(), RenderError>;

    fn write_uniforms(&mut self, bytes: &[u8]);

    /// Draws the full-viewport quad and presents it.
    fn draw(&mut self) -> Result<(), RenderError>;

    /// Reads back the retained output of the last draw as RGBA8, top row first.
    fn read_output(&mut self) -> Result<RgbaImage, RenderError>;
}
