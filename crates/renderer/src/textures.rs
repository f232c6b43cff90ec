use image::RgbaImage;

use crate::backend::RenderBackend;
use crate::engine::RenderContext;
use crate::error::{RenderError, SourceError};
use crate::source::Source;
use crate::types::{Role, ROLE_COUNT};

/// Assignment accepted by [`TextureManager::set_source`] but not yet bound.
enum PendingChange {
    /// `cover` takes effect together with the source.
    Assign {
        source: Source,
        dimensions: (u32, u32),
        cover: bool,
    },
    Clear,
}

struct RoleSlot {
    source: Option<Source>,
    /// Native size of the bound source; `None` while the role is empty.
    dimensions: Option<(u32, u32)>,
    cover: bool,
    size_mismatch_reported: bool,
}

impl Default for RoleSlot {
    fn default() -> Self {
        Self {
            source: None,
            dimensions: None,
            cover: true,
            size_mismatch_reported: false,
        }
    }
}

/// Owns the two texture slots and decides when each one is uploaded.
///
/// Assignments are validated immediately but staged; the frame scheduler
/// binds them during a swap pause by calling [`TextureManager::apply_pending`].
/// Static images are uploaded once at that point, live feeds on every
/// [`TextureManager::refresh_live_slots`].
pub struct TextureManager {
    slots: [RoleSlot; ROLE_COUNT],
    pending: [Option<PendingChange>; ROLE_COUNT],
    max_dimension: u32,
}

impl Default for TextureManager {
    fn default() -> Self {
        Self::with_max_dimension(u32::MAX)
    }
}

impl TextureManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager that rejects sources wider or taller than `max_dimension`.
    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            slots: Default::default(),
            pending: Default::default(),
            max_dimension,
        }
    }

    /// Stages `source` for `role`. A source without readable, non-empty
    /// dimensions, or one larger than the texture limit, is rejected and the
    /// slot keeps whatever it had, cover flag included.
    pub fn set_source(&mut self, role: Role, source: Source, cover: bool) -> Result<(), SourceError> {
        let dimensions = source
            .validated_dimensions()
            .map_err(|reason| SourceError::InvalidSource { role, reason })?;
        let (width, height) = dimensions;
        if width > self.max_dimension || height > self.max_dimension {
            return Err(SourceError::InvalidSource {
                role,
                reason: format!(
                    "{width}x{height} exceeds the GPU texture limit of {}",
                    self.max_dimension
                ),
            });
        }
        tracing::debug!(
            %role,
            kind = %source.kind(),
            width,
            height,
            cover,
            "staged source"
        );
        self.pending[role.slot()] = Some(PendingChange::Assign {
            source,
            dimensions,
            cover,
        });
        Ok(())
    }

    /// Updates the aspect-fit flag only; the bound texture is untouched.
    pub fn set_cover(&mut self, role: Role, cover: bool) {
        self.slots[role.slot()].cover = cover;
        if let Some(PendingChange::Assign { cover: staged, .. }) = &mut self.pending[role.slot()] {
            *staged = cover;
        }
    }

    pub fn clear_source(&mut self, role: Role) {
        tracing::debug!(%role, "staged source clear");
        self.pending[role.slot()] = Some(PendingChange::Clear);
    }

    pub fn has_pending(&self) -> bool {
        self.pending.iter().any(Option::is_some)
    }

    /// Cover flag the role will draw with once staged changes are bound.
    pub fn cover(&self, role: Role) -> bool {
        match &self.pending[role.slot()] {
            Some(PendingChange::Assign { cover, .. }) => *cover,
            _ => self.slots[role.slot()].cover,
        }
    }

    /// Cover flag of the bound source, as pushed to the `*_cover` uniform.
    pub fn bound_cover(&self, role: Role) -> bool {
        self.slots[role.slot()].cover
    }

    /// Size pushed as the role's `*_size` uniform; `(0, 0)` while empty.
    pub fn role_size(&self, role: Role) -> [f32; 2] {
        match self.slots[role.slot()].dimensions {
            Some((width, height)) => [width as f32, height as f32],
            None => [0.0, 0.0],
        }
    }

    pub fn source(&self, role: Role) -> Option<&Source> {
        self.slots[role.slot()].source.as_ref()
    }

    /// Binds every staged change. Must only run while no draw can observe
    /// the slots, i.e. from a paused scheduler tick.
    ///
    /// A change the backend refuses is dropped and leaves its slot as it
    /// was; the first refusal is returned once every role has been handled.
    pub fn apply_pending<B: RenderBackend>(
        &mut self,
        ctx: &mut RenderContext<B>,
    ) -> Result<(), RenderError> {
        let mut first_error = None;
        for role in Role::ALL {
            let Some(change) = self.pending[role.slot()].take() else {
                continue;
            };
            if let Err(err) = self.bind(ctx, role, change) {
                tracing::warn!(%role, "failed to bind staged source: {err}");
                first_error.get_or_insert(RenderError::SourceRejected {
                    role,
                    reason: err.to_string(),
                });
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn bind<B: RenderBackend>(
        &mut self,
        ctx: &mut RenderContext<B>,
        role: Role,
        change: PendingChange,
    ) -> Result<(), RenderError> {
        let slot = &mut self.slots[role.slot()];
        match change {
            PendingChange::Assign {
                source,
                dimensions,
                cover,
            } => {
                let (width, height) = dimensions;
                ctx.backend_mut().replace_slot(role, width, height)?;
                if let Source::Image(image) = &source {
                    ctx.backend_mut().upload_slot(role, image.pixels())?;
                }
                tracing::debug!(%role, kind = %source.kind(), "bound source");
                slot.source = Some(source);
                slot.dimensions = Some(dimensions);
                slot.cover = cover;
            }
            PendingChange::Clear => {
                ctx.backend_mut().replace_slot(role, 1, 1)?;
                ctx.backend_mut()
                    .upload_slot(role, &RgbaImage::from_pixel(1, 1, image::Rgba([0; 4])))?;
                tracing::debug!(%role, "cleared source");
                slot.source = None;
                slot.dimensions = None;
            }
        }
        slot.size_mismatch_reported = false;
        Ok(())
    }

    /// Uploads the newest frame of every live slot; returns how many were uploaded.
    pub fn refresh_live_slots<B: RenderBackend>(&mut self, ctx: &mut RenderContext<B>) -> usize {
        let mut uploaded = 0;
        for role in Role::ALL {
            let slot = &mut self.slots[role.slot()];
            let feed = match slot.source.as_mut() {
                Some(Source::Video(feed)) | Some(Source::CameraStream(feed)) => feed,
                Some(Source::Image(_)) | None => continue,
            };
            let Some(frame) = feed.latest_frame() else {
                continue;
            };
            if Some(frame.dimensions()) != slot.dimensions {
                if !slot.size_mismatch_reported {
                    tracing::warn!(
                        %role,
                        frame = ?frame.dimensions(),
                        slot = ?slot.dimensions,
                        "live frame size differs from its texture; skipping frames"
                    );
                    slot.size_mismatch_reported = true;
                }
                continue;
            }
            match ctx.backend_mut().upload_slot(role, &frame) {
                Ok(()) => uploaded += 1,
                Err(err) => tracing::warn!(%role, "failed to upload live frame: {err}"),
            }
        }
        uploaded
    }
}
