use crate::backend::RenderBackend;
use crate::capture::CaptureController;
use crate::engine::RenderContext;
use crate::error::RenderError;
use crate::interaction::InteractionState;
use crate::textures::TextureManager;
use crate::types::Role;
use crate::uniforms::UniformValues;

/// Ticks that must pass without a draw around a texture replacement.
pub const SWAP_QUIET_TICKS: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    /// Draws are suspended until `remaining` reaches zero. Each new swap
    /// request gets a fresh `epoch` and restarts the countdown.
    PausedForSwap { epoch: u64, remaining: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Drawn,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickAction {
    Draw,
    Skip,
}

#[derive(Debug)]
pub struct FrameScheduler {
    state: SchedulerState,
    epoch: u64,
    pending_resize: Option<(u32, u32)>,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Running,
            epoch: 0,
            pending_resize: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.state, SchedulerState::PausedForSwap { .. })
    }

    /// Enters (or restarts) the swap pause under a new epoch.
    pub fn request_swap(&mut self) -> u64 {
        self.epoch += 1;
        if let SchedulerState::PausedForSwap { epoch, .. } = self.state {
            tracing::trace!(superseded = epoch, epoch = self.epoch, "swap pause restarted");
        }
        self.state = SchedulerState::PausedForSwap {
            epoch: self.epoch,
            remaining: SWAP_QUIET_TICKS,
        };
        self.epoch
    }

    /// Stages a surface size for the next tick; later requests replace it.
    pub fn request_resize(&mut self, width: u32, height: u32) {
        self.pending_resize = Some((width, height));
    }

    pub fn pending_resize(&self) -> Option<(u32, u32)> {
        self.pending_resize
    }

    fn begin_tick(&mut self) -> TickAction {
        match self.state {
            SchedulerState::Running => TickAction::Draw,
            SchedulerState::PausedForSwap { epoch, remaining: 0 } => {
                tracing::trace!(epoch, "swap pause finished");
                self.state = SchedulerState::Running;
                TickAction::Draw
            }
            SchedulerState::PausedForSwap { epoch, remaining } => {
                self.state = SchedulerState::PausedForSwap {
                    epoch,
                    remaining: remaining - 1,
                };
                TickAction::Skip
            }
        }
    }

    /// One frame callback. Staged source changes start a pause; the first
    /// paused tick binds them, and drawing resumes once the pause drains.
    /// A staged source the backend refuses surfaces as
    /// [`RenderError::SourceRejected`] from that paused tick.
    pub fn tick<B: RenderBackend>(
        &mut self,
        ctx: &mut RenderContext<B>,
        textures: &mut TextureManager,
        interaction: &InteractionState,
        capture: &mut CaptureController,
    ) -> Result<TickOutcome, RenderError> {
        if let Some((width, height)) = self.pending_resize.take() {
            ctx.resize(width, height);
        }
        if textures.has_pending() {
            self.request_swap();
        }

        if self.begin_tick() == TickAction::Skip {
            if textures.has_pending() {
                textures.apply_pending(ctx)?;
            }
            return Ok(TickOutcome::Paused);
        }

        textures.refresh_live_slots(ctx);
        let (width, height) = ctx.backend().surface_size();
        ctx.push_uniforms(&UniformValues {
            size: [width as f32, height as f32],
            src_size: textures.role_size(Role::Primary),
            dst_size: textures.role_size(Role::Distortion),
            mouse: interaction.pointer(),
            wheel: interaction.force(),
            src_cover: textures.bound_cover(Role::Primary),
            dst_cover: textures.bound_cover(Role::Distortion),
        });
        ctx.draw()?;

        if let Err(err) = capture.record_frame(ctx) {
            tracing::warn!("failed to capture recording frame: {err}");
        }
        Ok(TickOutcome::Drawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{Call, RecordingBackend};
    use crate::source::testing::still;
    use crate::types::CaptureSettings;

    struct Rig {
        ctx: RenderContext<RecordingBackend>,
        textures: TextureManager,
        interaction: InteractionState,
        capture: CaptureController,
        scheduler: FrameScheduler,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                ctx: RenderContext::with_bundled_shaders(RecordingBackend::new(16, 16)).unwrap(),
                textures: TextureManager::new(),
                interaction: InteractionState::new(),
                capture: CaptureController::new(CaptureSettings::default()),
                scheduler: FrameScheduler::new(),
            }
        }

        fn tick(&mut self) -> TickOutcome {
            self.scheduler
                .tick(
                    &mut self.ctx,
                    &mut self.textures,
                    &self.interaction,
                    &mut self.capture,
                )
                .unwrap()
        }
    }

    #[test]
    fn running_scheduler_draws_every_tick() {
        let mut rig = Rig::new();
        for _ in 0..5 {
            assert_eq!(rig.tick(), TickOutcome::Drawn);
        }
        assert_eq!(rig.ctx.backend().draws(), 5);
    }

    #[test]
    fn swap_skips_exactly_two_ticks() {
        let mut rig = Rig::new();
        rig.tick();
        rig.textures.set_source(Role::Primary, still(4, 4), true).unwrap();
        assert_eq!(rig.tick(), TickOutcome::Paused);
        assert_eq!(rig.tick(), TickOutcome::Paused);
        assert_eq!(rig.tick(), TickOutcome::Drawn);
        assert_eq!(rig.ctx.backend().draws(), 2);
    }

    #[test]
    fn no_draws_while_paused() {
        let mut rig = Rig::new();
        rig.tick();
        let drawn = rig.ctx.backend().draws();
        rig.scheduler.request_swap();
        while rig.scheduler.is_paused() {
            let before = rig.ctx.backend().draws();
            if rig.tick() == TickOutcome::Paused {
                assert_eq!(rig.ctx.backend().draws(), before);
            }
        }
        assert_eq!(rig.ctx.backend().draws(), drawn + 1);
    }

    #[test]
    fn overlapping_swaps_restart_the_pause() {
        let mut rig = Rig::new();
        let first = rig.scheduler.request_swap();
        assert_eq!(rig.tick(), TickOutcome::Paused);
        let second = rig.scheduler.request_swap();
        assert!(second > first);
        assert_eq!(rig.tick(), TickOutcome::Paused);
        assert_eq!(rig.tick(), TickOutcome::Paused);
        assert_eq!(rig.tick(), TickOutcome::Drawn);
        assert_eq!(
            rig.scheduler.state(),
            SchedulerState::Running,
        );
    }

    #[test]
    fn source_staged_mid_pause_is_bound_before_resuming() {
        let mut rig = Rig::new();
        rig.textures.set_source(Role::Primary, still(2, 2), true).unwrap();
        assert_eq!(rig.tick(), TickOutcome::Paused);
        rig.textures
            .set_source(Role::Distortion, still(3, 3), true)
            .unwrap();
        assert_eq!(rig.tick(), TickOutcome::Paused);
        assert_eq!(rig.tick(), TickOutcome::Paused);
        assert_eq!(rig.tick(), TickOutcome::Drawn);
        assert_eq!(rig.textures.role_size(Role::Distortion), [3.0, 3.0]);
        assert_eq!(rig.ctx.backend().uploads(Role::Primary), 1);
        assert_eq!(rig.ctx.backend().uploads(Role::Distortion), 1);
    }

    #[test]
    fn refused_bind_is_reported_and_leaves_the_slot_alone() {
        let mut rig = Rig::new();
        rig.ctx.backend_mut().max_dimension = 64;
        rig.textures
            .set_source(Role::Primary, still(128, 128), false)
            .unwrap();

        let result = rig.scheduler.tick(
            &mut rig.ctx,
            &mut rig.textures,
            &rig.interaction,
            &mut rig.capture,
        );
        assert!(matches!(
            result,
            Err(RenderError::SourceRejected { role: Role::Primary, .. })
        ));
        assert!(!rig.textures.has_pending());
        assert!(rig.textures.source(Role::Primary).is_none());
        assert!(rig.textures.cover(Role::Primary));
        assert_eq!(rig.textures.role_size(Role::Primary), [0.0, 0.0]);

        assert_eq!(rig.tick(), TickOutcome::Paused);
        assert_eq!(rig.tick(), TickOutcome::Drawn);
    }

    #[test]
    fn staged_resize_is_applied_before_drawing() {
        let mut rig = Rig::new();
        rig.scheduler.request_resize(20, 10);
        rig.scheduler.request_resize(24, 12);
        assert!(rig.ctx.backend().calls.is_empty());
        assert_eq!(rig.tick(), TickOutcome::Drawn);
        let calls = rig.ctx.backend_mut().take_calls();
        assert_eq!(calls.first(), Some(&Call::Resize(24, 12)));
        assert_eq!(calls.last(), Some(&Call::Draw));
        assert_eq!(calls.iter().filter(|call| matches!(call, Call::Resize(..))).count(), 1);
    }

    #[test]
    fn draw_failure_is_reported_to_the_caller() {
        let mut rig = Rig::new();
        rig.ctx.backend_mut().fail_draws = true;
        let result = rig.scheduler.tick(
            &mut rig.ctx,
            &mut rig.textures,
            &rig.interaction,
            &mut rig.capture,
        );
        assert_eq!(result, Err(RenderError::Timeout));
        assert!(!rig.ctx.has_drawn());
    }
}
