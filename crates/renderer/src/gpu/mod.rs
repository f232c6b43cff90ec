//! wgpu implementation of the render backend.
//!
//! - `context` owns the instance, device, and window surface.
//! - `pipeline` turns the linked program into a render pipeline over the
//!   fullscreen quad, plus the blit that presents the offscreen frame.
//! - `slots` holds the two role textures and their uploads.
//! - `readback` owns the retained output frame and reads it back for capture.
//! - `state` ties them together as [`WgpuBackend`].

mod context;
mod pipeline;
mod readback;
mod slots;
mod state;

pub use state::WgpuBackend;
