//! The compositor proper: one render context threaded through the texture
//! manager, frame scheduler, and capture controller.

use crate::backend::RenderBackend;
use crate::capture::{CaptureArtifact, CaptureController};
use crate::error::{CaptureError, RenderError, SourceError};
use crate::interaction::{InteractionState, PointerEvent, Viewport, WheelEvent};
use crate::program::ProgramState;
use crate::scheduler::{FrameScheduler, TickOutcome};
use crate::source::Source;
use crate::textures::TextureManager;
use crate::types::{CaptureSettings, Role};
use crate::uniforms::{UniformBlock, UniformValues};

/// GPU-facing state shared by every component that touches the backend.
pub struct RenderContext<B> {
    backend: B,
    program: ProgramState,
    uniforms: UniformBlock,
    frames_drawn: u64,
    /// Cleared when the output target is reallocated, set by the next draw.
    output_ready: bool,
}

impl<B: RenderBackend> RenderContext<B> {
    pub fn new(backend: B, program: ProgramState) -> Self {
        let uniforms = UniformBlock::new(&program);
        Self {
            backend,
            program,
            uniforms,
            frames_drawn: 0,
            output_ready: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_bundled_shaders(backend: B) -> Result<Self, crate::error::PipelineError> {
        use crate::types::{BUNDLED_FRAGMENT_SHADER, BUNDLED_VERTEX_SHADER};
        let program = crate::program::build_program(BUNDLED_VERTEX_SHADER, BUNDLED_FRAGMENT_SHADER)?;
        Ok(Self::new(backend, program))
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn program(&self) -> &ProgramState {
        &self.program
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Whether the output surface holds a frame rendered at its current size.
    pub fn has_drawn(&self) -> bool {
        self.output_ready
    }

    /// Reallocates the output for a new surface size. Zero-sized requests
    /// (a minimised window) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || self.backend.surface_size() == (width, height) {
            return;
        }
        self.backend.resize(width, height);
        self.output_ready = false;
        tracing::debug!(width, height, "output resized");
    }

    pub fn push_uniforms(&mut self, values: &UniformValues) {
        self.uniforms.write(&self.program, values);
        if !self.uniforms.is_empty() {
            self.backend.write_uniforms(self.uniforms.bytes());
        }
    }

    pub fn draw(&mut self) -> Result<(), RenderError> {
        self.backend.draw()?;
        self.frames_drawn += 1;
        self.output_ready = true;
        Ok(())
    }
}

/// Two-input distortion compositor driven one tick per display frame.
pub struct Compositor<B> {
    ctx: RenderContext<B>,
    textures: TextureManager,
    interaction: InteractionState,
    scheduler: FrameScheduler,
    capture: CaptureController,
}

impl<B: RenderBackend> Compositor<B> {
    pub fn new(ctx: RenderContext<B>, capture: CaptureSettings) -> Self {
        let textures = TextureManager::with_max_dimension(ctx.backend().max_texture_dimension());
        Self {
            ctx,
            textures,
            interaction: InteractionState::new(),
            scheduler: FrameScheduler::new(),
            capture: CaptureController::new(capture),
        }
    }

    pub fn context(&self) -> &RenderContext<B> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut RenderContext<B> {
        &mut self.ctx
    }

    pub fn textures(&self) -> &TextureManager {
        &self.textures
    }

    pub fn interaction(&self) -> &InteractionState {
        &self.interaction
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn set_source(&mut self, role: Role, source: Source) -> Result<(), SourceError> {
        let cover = self.textures.cover(role);
        self.textures.set_source(role, source, cover)
    }

    pub fn set_input(&mut self, role: Role, source: Source, cover: bool) -> Result<(), SourceError> {
        self.textures.set_source(role, source, cover)
    }

    pub fn set_cover(&mut self, role: Role, cover: bool) {
        self.textures.set_cover(role, cover);
    }

    pub fn clear_source(&mut self, role: Role) {
        self.textures.clear_source(role);
    }

    pub fn pointer_moved(&mut self, event: PointerEvent, viewport: Viewport) {
        self.interaction.pointer_moved(event, viewport);
    }

    pub fn wheel(&mut self, event: WheelEvent) {
        self.interaction.wheel(event);
    }

    pub fn set_force(&mut self, value: [f32; 2]) {
        self.interaction.set_force(value);
    }

    pub fn release_force(&mut self) {
        self.interaction.release_force();
    }

    pub fn recenter(&mut self) {
        self.interaction.recenter();
    }

    /// Records the new window size; the next tick applies it.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.scheduler.request_resize(width, height);
    }

    /// Runs one frame callback.
    pub fn tick(&mut self) -> Result<TickOutcome, RenderError> {
        self.scheduler.tick(
            &mut self.ctx,
            &mut self.textures,
            &self.interaction,
            &mut self.capture,
        )
    }

    pub fn capture_still(&mut self) -> Result<CaptureArtifact, CaptureError> {
        self.capture.capture_still(&mut self.ctx)
    }

    pub fn is_recording(&self) -> bool {
        self.capture.is_recording()
    }

    pub fn start_recording(&mut self) -> Result<(), CaptureError> {
        self.capture.start_recording()
    }

    pub fn stop_recording(&mut self) -> Result<Option<CaptureArtifact>, CaptureError> {
        self.capture.stop_recording()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::RecordingBackend;
    use crate::source::testing::{still, SolidFeed};

    fn compositor() -> Compositor<RecordingBackend> {
        let ctx = RenderContext::with_bundled_shaders(RecordingBackend::new(32, 24)).unwrap();
        Compositor::new(ctx, CaptureSettings::default())
    }

    fn settle(compositor: &mut Compositor<RecordingBackend>) {
        while compositor.tick().unwrap() != TickOutcome::Drawn {}
    }

    #[test]
    fn static_source_uploads_once_over_a_hundred_frames() {
        let mut compositor = compositor();
        compositor.set_source(Role::Primary, still(16, 16)).unwrap();
        settle(&mut compositor);
        let uploads = compositor.context().backend().uploads(Role::Primary);
        assert_eq!(uploads, 1);
        for _ in 0..100 {
            assert_eq!(compositor.tick().unwrap(), TickOutcome::Drawn);
        }
        assert_eq!(compositor.context().backend().uploads(Role::Primary), uploads);
    }

    #[test]
    fn live_source_uploads_every_frame_until_replaced() {
        let mut compositor = compositor();
        let (feed, _) = SolidFeed::new(8, 8);
        compositor
            .set_source(Role::Distortion, Source::Video(Box::new(feed)))
            .unwrap();
        settle(&mut compositor);
        let after_first = compositor.context().backend().uploads(Role::Distortion);
        for _ in 0..9 {
            compositor.tick().unwrap();
        }
        assert_eq!(
            compositor.context().backend().uploads(Role::Distortion),
            after_first + 9
        );

        compositor.set_source(Role::Distortion, still(8, 8)).unwrap();
        settle(&mut compositor);
        let settled = compositor.context().backend().uploads(Role::Distortion);
        for _ in 0..20 {
            compositor.tick().unwrap();
        }
        assert_eq!(compositor.context().backend().uploads(Role::Distortion), settled);
    }

    #[test]
    fn cover_toggle_changes_only_the_cover_uniform() {
        let mut compositor = compositor();
        compositor.set_input(Role::Primary, still(10, 20), true).unwrap();
        settle(&mut compositor);
        compositor.set_cover(Role::Primary, false);
        assert_eq!(compositor.tick().unwrap(), TickOutcome::Drawn);

        let snapshots = &compositor.context().backend().uniform_snapshots;
        let before = &snapshots[snapshots.len() - 2];
        let after = &snapshots[snapshots.len() - 1];
        let program = compositor.context().program();
        let cover = program.location("src_cover").unwrap().offset as usize;
        let changed: Vec<usize> = (0..before.len()).filter(|&i| before[i] != after[i]).collect();
        assert!(!changed.is_empty());
        assert!(changed.iter().all(|&i| (cover..cover + 4).contains(&i)));
    }

    #[test]
    fn interaction_reaches_uniforms_on_next_draw() {
        let mut compositor = compositor();
        compositor.tick().unwrap();
        compositor.pointer_moved(
            PointerEvent {
                page_x: 32.0,
                page_y: 0.0,
            },
            Viewport::new(32.0, 24.0),
        );
        compositor.wheel(WheelEvent {
            delta_x: 0.0,
            delta_y: 250.0,
        });
        compositor.tick().unwrap();

        let program = compositor.context().program();
        let bytes = compositor.context().backend().uniform_snapshots.last().unwrap();
        let read = |name: &str| {
            let offset = program.location(name).unwrap().offset as usize;
            [
                f32::from_ne_bytes(bytes[offset..offset + 4].try_into().unwrap()),
                f32::from_ne_bytes(bytes[offset + 4..offset + 8].try_into().unwrap()),
            ]
        };
        assert_eq!(read("mouse"), [1.0, 1.0]);
        assert_eq!(read("wheel"), [0.0, 250.0]);
        assert_eq!(read("size"), [32.0, 24.0]);
        assert_eq!(read("src_size"), [0.0, 0.0]);
    }

    #[test]
    fn still_capture_requires_a_drawn_frame() {
        let mut compositor = compositor();
        assert!(matches!(
            compositor.capture_still(),
            Err(CaptureError::NotReady)
        ));
        compositor.tick().unwrap();
        let artifact = compositor.capture_still().unwrap();
        assert_eq!(artifact.file_name, "distortio.png");
        assert_eq!(artifact.media_type, "image/png");
        let decoded = image::load_from_memory(&artifact.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn repeated_start_and_stop_yield_one_artifact() {
        let mut compositor = compositor();
        compositor.start_recording().unwrap();
        compositor.start_recording().unwrap();
        compositor.tick().unwrap();
        let first = compositor.stop_recording().unwrap();
        let second = compositor.stop_recording().unwrap();
        let artifact = first.expect("first stop finalizes the recording");
        assert_eq!(artifact.file_name, "distortio.gif");
        assert!(second.is_none());
        assert!(!compositor.is_recording());
    }

    #[test]
    fn oversized_source_is_rejected_without_touching_the_slot() {
        let mut backend = RecordingBackend::new(32, 24);
        backend.max_dimension = 64;
        let ctx = RenderContext::with_bundled_shaders(backend).unwrap();
        let mut compositor = Compositor::new(ctx, CaptureSettings::default());
        compositor.set_input(Role::Primary, still(32, 32), false).unwrap();
        settle(&mut compositor);

        let err = compositor
            .set_input(Role::Primary, still(128, 128), true)
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidSource { role: Role::Primary, .. }));
        assert!(!compositor.textures().has_pending());
        assert!(!compositor.textures().cover(Role::Primary));
        assert_eq!(compositor.textures().role_size(Role::Primary), [32.0, 32.0]);
        assert_eq!(compositor.tick().unwrap(), TickOutcome::Drawn);
    }

    #[test]
    fn resize_waits_for_the_next_tick() {
        let mut compositor = compositor();
        compositor.tick().unwrap();
        compositor.resize(64, 48);
        assert_eq!(compositor.context().backend().size, (32, 24));
        assert_eq!(compositor.scheduler().pending_resize(), Some((64, 48)));

        let artifact = compositor.capture_still().unwrap();
        let decoded = image::load_from_memory(&artifact.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));

        assert_eq!(compositor.tick().unwrap(), TickOutcome::Drawn);
        assert_eq!(compositor.context().backend().size, (64, 48));
        assert_eq!(compositor.scheduler().pending_resize(), None);
        let artifact = compositor.capture_still().unwrap();
        let decoded = image::load_from_memory(&artifact.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn still_capture_after_resize_waits_for_a_redraw() {
        let mut compositor = compositor();
        compositor.tick().unwrap();
        compositor.set_source(Role::Primary, still(4, 4)).unwrap();
        compositor.resize(40, 30);
        assert_eq!(compositor.tick().unwrap(), TickOutcome::Paused);
        assert_eq!(compositor.context().backend().size, (40, 30));
        assert!(matches!(
            compositor.capture_still(),
            Err(CaptureError::NotReady)
        ));
        settle(&mut compositor);
        assert!(compositor.capture_still().is_ok());
    }

    #[test]
    fn zero_sized_resize_is_ignored() {
        let mut compositor = compositor();
        compositor.tick().unwrap();
        compositor.resize(0, 0);
        compositor.tick().unwrap();
        assert_eq!(compositor.context().backend().size, (32, 24));
        assert!(compositor.capture_still().is_ok());
    }

    #[test]
    fn stop_without_start_is_a_quiet_no_op() {
        let mut compositor = compositor();
        assert!(compositor.stop_recording().unwrap().is_none());
    }
}
