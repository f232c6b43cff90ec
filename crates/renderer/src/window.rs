use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::capture::CaptureArtifact;
use crate::engine::{Compositor, RenderContext};
use crate::error::RenderError;
use crate::gpu::WgpuBackend;
use crate::interaction::{PointerEvent, Viewport, WheelEvent};
use crate::program::build_program;
use crate::scheduler::TickOutcome;
use crate::types::RendererConfig;

/// Keyboard shortcuts understood by the preview window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    CaptureStill,
    ToggleRecording,
    Recenter,
    Exit,
}

pub fn key_action(key: &Key) -> Option<KeyAction> {
    match key {
        Key::Named(NamedKey::Escape) => Some(KeyAction::Exit),
        Key::Character(value) => match value.to_ascii_lowercase().as_str() {
            "s" => Some(KeyAction::CaptureStill),
            "r" => Some(KeyAction::ToggleRecording),
            "c" => Some(KeyAction::Recenter),
            _ => None,
        },
        _ => None,
    }
}

/// Converts winit scroll deltas to pixel deltas where positive `y` scrolls down.
pub fn wheel_event(delta: MouseScrollDelta, line_pixels: f32) -> WheelEvent {
    match delta {
        MouseScrollDelta::LineDelta(x, y) => WheelEvent {
            delta_x: f64::from(-x * line_pixels),
            delta_y: f64::from(-y * line_pixels),
        },
        MouseScrollDelta::PixelDelta(position) => WheelEvent {
            delta_x: -position.x,
            delta_y: -position.y,
        },
    }
}

/// Field order matters: the compositor owns the surface and must drop
/// before the window it was created from.
struct WindowState {
    compositor: Compositor<WgpuBackend>,
    window: Arc<Window>,
}

impl WindowState {
    fn new(window: Arc<Window>, config: &RendererConfig) -> Result<Self> {
        let program = build_program(&config.shaders.vertex, &config.shaders.fragment)?;
        let backend = WgpuBackend::new(
            window.as_ref(),
            window.inner_size(),
            config.power_preference,
            &program,
            &config.shaders,
        )?;
        let mut compositor = Compositor::new(
            RenderContext::new(backend, program),
            config.capture.clone(),
        );
        if let Some(force) = config.force_override {
            compositor.set_force(force);
        }
        Ok(Self { compositor, window })
    }

    fn viewport(&self) -> Viewport {
        let size = self.window.inner_size();
        Viewport::new(f64::from(size.width), f64::from(size.height))
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.compositor.resize(size.width, size.height);
        self.window.request_redraw();
    }
}

/// Entry point for the interactive compositor window.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    /// Opens the window and runs the frame loop until it closes.
    ///
    /// `setup` runs once the GPU pipeline exists and is where sources are
    /// assigned. Every still and recording is handed to `on_artifact`; a
    /// recording still active at exit is finalized first.
    pub fn run<S, A>(self, setup: S, mut on_artifact: A) -> Result<()>
    where
        S: FnOnce(&mut Compositor<WgpuBackend>) -> Result<()>,
        A: FnMut(CaptureArtifact),
    {
        let config = self.config;
        let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
        let window = WindowBuilder::new()
            .with_title(config.title.clone())
            .with_inner_size(PhysicalSize::new(config.surface_size.0, config.surface_size.1))
            .build(&event_loop)
            .map_err(|err| anyhow!("failed to create window: {err}"))?;
        let window = Arc::new(window);

        let mut state =
            WindowState::new(window, &config).context("failed to initialise the compositor")?;
        setup(&mut state.compositor)?;
        state.window.request_redraw();

        let line_pixels = config.wheel_line_pixels;
        let run_result = event_loop.run(move |event, elwt| match event {
            Event::WindowEvent { window_id, event } if window_id == state.window.id() => {
                match event {
                    WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                    WindowEvent::Resized(size) => state.resize(size),
                    WindowEvent::CursorMoved { position, .. } => {
                        let viewport = state.viewport();
                        state.compositor.pointer_moved(
                            PointerEvent {
                                page_x: position.x,
                                page_y: position.y,
                            },
                            viewport,
                        );
                    }
                    WindowEvent::MouseWheel { delta, .. } => {
                        state.compositor.wheel(wheel_event(delta, line_pixels));
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        if event.state != ElementState::Pressed || event.repeat {
                            return;
                        }
                        match key_action(&event.logical_key) {
                            Some(KeyAction::Exit) => elwt.exit(),
                            Some(KeyAction::Recenter) => {
                                state.compositor.recenter();
                                tracing::info!("force recentred");
                            }
                            Some(KeyAction::CaptureStill) => match state.compositor.capture_still() {
                                Ok(artifact) => on_artifact(artifact),
                                Err(err) => tracing::warn!("still capture failed: {err}"),
                            },
                            Some(KeyAction::ToggleRecording) => {
                                if state.compositor.is_recording() {
                                    match state.compositor.stop_recording() {
                                        Ok(Some(artifact)) => on_artifact(artifact),
                                        Ok(None) => {}
                                        Err(err) => tracing::error!("recording failed: {err}"),
                                    }
                                } else if let Err(err) = state.compositor.start_recording() {
                                    tracing::error!("failed to start recording: {err}");
                                }
                            }
                            None => {}
                        }
                    }
                    WindowEvent::RedrawRequested => match state.compositor.tick() {
                        Ok(TickOutcome::Drawn) | Ok(TickOutcome::Paused) => {}
                        Err(RenderError::SurfaceLost) | Err(RenderError::SurfaceOutdated) => {
                            state.compositor.context_mut().backend_mut().reconfigure();
                        }
                        Err(RenderError::OutOfMemory) => {
                            tracing::error!("surface out of memory; exiting");
                            elwt.exit();
                        }
                        Err(RenderError::Timeout) => {
                            tracing::warn!("surface timeout; retrying next frame");
                        }
                        Err(err @ RenderError::SourceRejected { .. }) => {
                            tracing::error!("{err}; keeping the previous input");
                        }
                        Err(err) => tracing::warn!("frame failed: {err}; retrying next frame"),
                    },
                    _ => {}
                }
            }
            Event::AboutToWait => {
                state.window.request_redraw();
                elwt.set_control_flow(ControlFlow::Wait);
            }
            Event::LoopExiting => {
                if state.compositor.is_recording() {
                    match state.compositor.stop_recording() {
                        Ok(Some(artifact)) => on_artifact(artifact),
                        Ok(None) => {}
                        Err(err) => tracing::error!("recording failed during shutdown: {err}"),
                    }
                }
            }
            _ => {}
        });

        run_result.map_err(|err| anyhow!("window event loop error: {err}"))
    }
}
