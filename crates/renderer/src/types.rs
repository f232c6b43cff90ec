use std::fmt;
use std::path::PathBuf;

/// The compositor blends exactly two inputs.
pub const ROLE_COUNT: usize = 2;

/// One of the two media inputs composited by the shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The content being distorted (`src_*` uniforms, texture slot 0).
    Primary,
    /// The content driving the distortion (`dst_*` uniforms, texture slot 1).
    Distortion,
}

impl Role {
    pub const ALL: [Role; ROLE_COUNT] = [Role::Primary, Role::Distortion];

    /// Texture slot index owned by this role.
    pub fn slot(self) -> usize {
        match self {
            Role::Primary => 0,
            Role::Distortion => 1,
        }
    }

    /// Shader-side name of the texture bound to this role.
    pub fn texture_name(self) -> &'static str {
        match self {
            Role::Primary => "src_img",
            Role::Distortion => "dst_img",
        }
    }

    pub(crate) fn from_texture_name(name: &str) -> Option<Self> {
        Role::ALL
            .into_iter()
            .find(|role| role.texture_name() == name)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => f.write_str("primary"),
            Role::Distortion => f.write_str("distortion"),
        }
    }
}

/// Programmable stage a compile diagnostic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStageKind {
    Vertex,
    Fragment,
}

impl ShaderStageKind {
    pub(crate) fn as_naga(self) -> naga::ShaderStage {
        match self {
            ShaderStageKind::Vertex => naga::ShaderStage::Vertex,
            ShaderStageKind::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStageKind::Vertex => f.write_str("vertex"),
            ShaderStageKind::Fragment => f.write_str("fragment"),
        }
    }
}

/// Adapter preference forwarded to wgpu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    #[default]
    Low,
    High,
}

/// Container requested for recorded output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingFormat {
    /// Animated GIF, encoded in-process.
    #[default]
    Gif,
    /// VP9 in WebM, encoded by an `ffmpeg` subprocess.
    Webm,
    /// H.264 in MP4, encoded by an `ffmpeg` subprocess.
    Mp4,
}

impl RecordingFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RecordingFormat::Gif => "gif",
            RecordingFormat::Webm => "webm",
            RecordingFormat::Mp4 => "mp4",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            RecordingFormat::Gif => "image/gif",
            RecordingFormat::Webm => "video/webm",
            RecordingFormat::Mp4 => "video/mp4",
        }
    }

    pub(crate) fn needs_ffmpeg(self) -> bool {
        !matches!(self, RecordingFormat::Gif)
    }
}

impl fmt::Display for RecordingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Knobs for still capture and recording.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    /// Fixed base filename for every artifact; the extension follows content type.
    pub base_name: String,
    pub recording_format: RecordingFormat,
    /// Target frame rate for recordings; frames arriving faster are skipped.
    pub recording_fps: f32,
    /// Frames buffered for the encoder worker before new frames are dropped.
    pub queue_depth: usize,
    /// Executable used for WebM/MP4 recordings.
    pub ffmpeg: PathBuf,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            base_name: "distortio".to_string(),
            recording_format: RecordingFormat::default(),
            recording_fps: 30.0,
            queue_depth: 8,
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

/// Shader text handed to the pipeline at startup.
#[derive(Debug, Clone)]
pub struct ShaderSources {
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSources {
    /// Full-viewport quad vertex shader paired with the stock distortion effect.
    pub fn bundled() -> Self {
        Self {
            vertex: BUNDLED_VERTEX_SHADER.to_string(),
            fragment: BUNDLED_FRAGMENT_SHADER.to_string(),
        }
    }
}

impl Default for ShaderSources {
    fn default() -> Self {
        Self::bundled()
    }
}

pub(crate) const BUNDLED_VERTEX_SHADER: &str = include_str!("../shaders/fullscreen.vert");
pub(crate) const BUNDLED_FRAGMENT_SHADER: &str = include_str!("../shaders/distort.frag");

/// Immutable configuration passed to the renderer at start-up.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window size in physical pixels.
    pub surface_size: (u32, u32),
    pub title: String,
    pub shaders: ShaderSources,
    pub power_preference: GpuPowerPreference,
    pub capture: CaptureSettings,
    /// Pixels credited per wheel "line" when the platform reports line deltas.
    pub wheel_line_pixels: f32,
    /// When set, wheel events are ignored and force is pinned to this value.
    pub force_override: Option<[f32; 2]>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            surface_size: (1280, 720),
            title: "Distortio".to_string(),
            shaders: ShaderSources::default(),
            power_preference: GpuPowerPreference::default(),
            capture: CaptureSettings::default(),
            wheel_line_pixels: 100.0,
            force_override: None,
        }
    }
}
