//! Renderer crate for Distortio, a two-input GPU distortion compositor.
//!
//! The crate compiles a GLSL program once, then redraws a fullscreen quad every
//! display frame while two media inputs feed its textures:
//!
//! ```text
//!   set_source / set_cover ──▶ TextureManager (staged)
//!                                    │
//!   winit redraw ──▶ FrameScheduler::tick ──▶ apply staged swap (paused)
//!                                    │      └▶ refresh live slots
//!                                    │      └▶ uniforms ─▶ draw ─▶ CaptureController
//!   pointer / wheel ──▶ InteractionState ─┘
//! ```
//!
//! [`Compositor`] owns the pieces and is generic over a [`RenderBackend`];
//! [`Renderer`] hosts it in a window with the wgpu backend. Source swaps pause
//! drawing for two ticks so no draw ever samples a texture mid-replacement.

mod backend;
mod capture;
mod engine;
mod error;
mod gpu;
mod interaction;
mod program;
mod scheduler;
mod source;
mod textures;
mod types;
mod uniforms;
mod window;

pub use backend::RenderBackend;
pub use capture::{CaptureArtifact, CaptureController, RecordingSession, RecordingState};
pub use engine::{Compositor, RenderContext};
pub use error::{CaptureError, PipelineError, RenderError, SourceError};
pub use gpu::WgpuBackend;
pub use interaction::{normalize_pointer, InteractionState, PointerEvent, Viewport, WheelEvent};
pub use program::{
    build_program, compile_stage, link, CompiledStage, ProgramState, ResourceKind, ResourceSlot,
    UniformKind, UniformLocation,
};
pub use scheduler::{FrameScheduler, SchedulerState, TickOutcome, SWAP_QUIET_TICKS};
pub use source::{LiveFeed, Source, SourceKind, StillImage};
pub use textures::TextureManager;
pub use types::{
    CaptureSettings, GpuPowerPreference, RecordingFormat, RendererConfig, Role, ShaderSources,
    ShaderStageKind, ROLE_COUNT,
};
pub use uniforms::{UniformBlock, UniformValues};
pub use window::{key_action, wheel_event, KeyAction, Renderer};
