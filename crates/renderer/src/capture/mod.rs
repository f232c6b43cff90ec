//! Still capture and recording of the output surface.

mod recording;

use std::io::Cursor;
use std::time::Instant;

use image::ImageFormat;

use crate::backend::RenderBackend;
use crate::engine::RenderContext;
use crate::error::CaptureError;
use crate::types::CaptureSettings;

pub use recording::RecordingSession;

/// Encoded output ready to hand to whoever persists or shares it.
#[derive(Debug, Clone)]
pub struct CaptureArtifact {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub media_type: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Inactive,
    Recording,
}

pub struct CaptureController {
    settings: CaptureSettings,
    session: Option<RecordingSession>,
}

impl CaptureController {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            session: None,
        }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn state(&self) -> RecordingState {
        if self.session.is_some() {
            RecordingState::Recording
        } else {
            RecordingState::Inactive
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Reads the retained output and encodes it as PNG.
    pub fn capture_still<B: RenderBackend>(
        &mut self,
        ctx: &mut RenderContext<B>,
    ) -> Result<CaptureArtifact, CaptureError> {
        if !ctx.has_drawn() {
            return Err(CaptureError::NotReady);
        }
        let frame = ctx.backend_mut().read_output()?;
        let mut bytes = Vec::new();
        frame.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        tracing::debug!(
            width = frame.width(),
            height = frame.height(),
            bytes = bytes.len(),
            "captured still frame"
        );
        Ok(CaptureArtifact {
            bytes,
            file_name: format!("{}.png", self.settings.base_name),
            media_type: "image/png",
        })
    }

    /// Starts a session; ignored while one is already running.
    pub fn start_recording(&mut self) -> Result<(), CaptureError> {
        if self.session.is_some() {
            tracing::debug!("recording already active; ignoring start");
            return Ok(());
        }
        self.session = Some(RecordingSession::start(&self.settings)?);
        Ok(())
    }

    /// Finalizes the running session; `None` when nothing was recording.
    pub fn stop_recording(&mut self) -> Result<Option<CaptureArtifact>, CaptureError> {
        match self.session.take() {
            Some(session) => session.finish().map(Some),
            None => {
                tracing::debug!("no active recording; ignoring stop");
                Ok(None)
            }
        }
    }

    /// Feeds the frame just drawn to the active session, honouring its pacing.
    pub fn record_frame<B: RenderBackend>(
        &mut self,
        ctx: &mut RenderContext<B>,
    ) -> Result<(), CaptureError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if !session.wants_frame(Instant::now()) {
            return Ok(());
        }
        let frame = ctx.backend_mut().read_output()?;
        session.push(frame);
        Ok(())
    }
}
