use crate::types::{Role, ShaderStageKind};

/// Failures while turning shader text into a drawable program.
///
/// Both variants are fatal: the compositor refuses to start rather than
/// render with a partial pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{stage} shader failed to compile:\n{diagnostic}")]
    ShaderCompile {
        stage: ShaderStageKind,
        diagnostic: String,
    },
    #[error("shader program failed to link: {0}")]
    ProgramLink(String),
}

/// Rejected source assignment; the role's slot keeps its previous content.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("invalid {role} source: {reason}")]
    InvalidSource { role: Role, reason: String },
}

/// GPU-side failures surfaced by a render backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("output surface was lost")]
    SurfaceLost,
    #[error("output surface is outdated")]
    SurfaceOutdated,
    #[error("timed out acquiring the next surface texture")]
    Timeout,
    #[error("GPU is out of memory")]
    OutOfMemory,
    #[error("surface format {0} cannot be read back as RGBA8")]
    UnsupportedFormat(String),
    #[error("{role} source could not be bound: {reason}")]
    SourceRejected { role: Role, reason: String },
    #[error("frame readback failed: {0}")]
    Readback(String),
    #[error("{0}")]
    Other(String),
}

impl From<wgpu::SurfaceError> for RenderError {
    fn from(value: wgpu::SurfaceError) -> Self {
        match value {
            wgpu::SurfaceError::Lost => RenderError::SurfaceLost,
            wgpu::SurfaceError::Outdated => RenderError::SurfaceOutdated,
            wgpu::SurfaceError::Timeout => RenderError::Timeout,
            wgpu::SurfaceError::OutOfMemory => RenderError::OutOfMemory,
            other => RenderError::Other(format!("surface error: {other:?}")),
        }
    }
}

/// Failures from still capture or recording.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("output surface has not rendered a frame yet")]
    NotReady,
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to encode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("recording encoder failed: {0}")]
    Encoder(String),
    #[error("recording encoder I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
