use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use renderer::{GpuPowerPreference, RecordingFormat};
use serde::{Deserialize, Serialize};

/// Contents of `settings.toml`. Every section and field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub window: WindowSettings,
    pub shaders: ShaderSettings,
    pub input: InputSettings,
    pub capture: CaptureSection,
    pub camera: CameraSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub power_preference: PowerPreference,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Distortio".to_string(),
            power_preference: PowerPreference::Low,
        }
    }
}

/// Optional replacements for the bundled GLSL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderSettings {
    pub vertex: Option<PathBuf>,
    pub fragment: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    pub wheel_line_pixels: f32,
    pub primary_cover: bool,
    pub distortion_cover: bool,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            wheel_line_pixels: 100.0,
            primary_cover: true,
            distortion_cover: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    pub output_dir: Option<PathBuf>,
    pub base_name: String,
    pub recording_format: RecordFormat,
    pub recording_fps: f32,
    pub queue_depth: usize,
    pub ffmpeg: PathBuf,
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            output_dir: None,
            base_name: "distortio".to_string(),
            recording_format: RecordFormat::Gif,
            recording_fps: 30.0,
            queue_depth: 8,
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Capture device; platform default when unset.
    pub device: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device: None,
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PowerPreference {
    Low,
    High,
}

impl From<PowerPreference> for GpuPowerPreference {
    fn from(value: PowerPreference) -> Self {
        match value {
            PowerPreference::Low => GpuPowerPreference::Low,
            PowerPreference::High => GpuPowerPreference::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    Gif,
    Webm,
    Mp4,
}

impl From<RecordFormat> for RecordingFormat {
    fn from(value: RecordFormat) -> Self {
        match value {
            RecordFormat::Gif => RecordingFormat::Gif,
            RecordFormat::Webm => RecordingFormat::Webm,
            RecordFormat::Mp4 => RecordingFormat::Mp4,
        }
    }
}

impl Settings {
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings at {}", path.display()))?;
            let settings: Self = toml::from_str(&contents)
                .with_context(|| format!("failed to parse settings at {}", path.display()))?;
            Ok(settings)
        } else {
            tracing::debug!(path = %path.display(), "no settings file; using defaults");
            Ok(Self::default())
        }
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("settings path has no parent: {}", path.display()))?;
        fs::create_dir_all(dir).with_context(|| {
            format!(
                "failed to prepare directory for settings at {}",
                dir.display()
            )
        })?;
        fs::write(path, self.to_toml()?)
            .with_context(|| format!("failed to write settings to {}", path.display()))?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize settings to TOML")
    }
}
