use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use renderer::{
    CaptureArtifact, CaptureSettings, Renderer, RendererConfig, Role, ShaderSources,
};
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::config::Settings;
use crate::media::{open_source, parse_source_arg, SourceArg};
use crate::paths::AppPaths;

pub fn run(args: RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let settings_path = args
        .config
        .clone()
        .unwrap_or_else(|| paths.settings_file());
    let settings = Settings::load_or_default(&settings_path)?;
    tracing::debug!(
        config = %paths.config_dir().display(),
        data = %paths.data_dir().display(),
        settings = %settings_path.display(),
        "resolved distortio paths"
    );

    let config = build_renderer_config(&args, &settings)?;
    let output_dir = resolve_output_dir(&args, &settings, &paths);
    let covers = [
        (Role::Primary, !args.primary_fill && settings.input.primary_cover),
        (
            Role::Distortion,
            !args.distortion_fill && settings.input.distortion_cover,
        ),
    ];
    let inputs = [
        (Role::Primary, args.primary.as_deref().map(parse_source_arg).transpose()?),
        (
            Role::Distortion,
            args.distortion.as_deref().map(parse_source_arg).transpose()?,
        ),
    ];
    if inputs.iter().all(|(_, arg)| arg.is_none()) {
        tracing::warn!("no --primary or --distortion given; the shader will sample empty inputs");
    }

    tracing::info!(
        width = config.surface_size.0,
        height = config.surface_size.1,
        format = %config.capture.recording_format,
        output = %output_dir.display(),
        "starting distortio"
    );

    Renderer::new(config).run(
        |compositor| {
            for ((role, arg), (_, cover)) in inputs.iter().zip(covers) {
                let Some(arg) = arg else {
                    continue;
                };
                let source = open_source(arg, &settings)
                    .with_context(|| format!("failed to open {role} source"))?;
                compositor
                    .set_input(*role, source, cover)
                    .with_context(|| format!("{role} source rejected"))?;
                log_assignment(*role, arg, cover);
            }
            Ok(())
        },
        |artifact| {
            if let Err(err) = write_artifact(&output_dir, &artifact) {
                tracing::error!("failed to save {}: {err:#}", artifact.file_name);
            }
        },
    )
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Layers command-line flags over the settings file.
pub fn build_renderer_config(args: &RunArgs, settings: &Settings) -> Result<RendererConfig> {
    let mut shaders = ShaderSources::bundled();
    if let Some(path) = args.vertex.as_ref().or(settings.shaders.vertex.as_ref()) {
        shaders.vertex = read_shader(path)?;
    }
    if let Some(path) = args.fragment.as_ref().or(settings.shaders.fragment.as_ref()) {
        shaders.fragment = read_shader(path)?;
    }

    let capture = CaptureSettings {
        base_name: settings.capture.base_name.clone(),
        recording_format: args
            .record_format
            .unwrap_or(settings.capture.recording_format)
            .into(),
        recording_fps: args.record_fps.unwrap_or(settings.capture.recording_fps),
        queue_depth: settings.capture.queue_depth,
        ffmpeg: settings.capture.ffmpeg.clone(),
    };

    Ok(RendererConfig {
        surface_size: args
            .size
            .unwrap_or((settings.window.width, settings.window.height)),
        title: settings.window.title.clone(),
        shaders,
        power_preference: args
            .gpu_power
            .unwrap_or(settings.window.power_preference)
            .into(),
        capture,
        wheel_line_pixels: settings.input.wheel_line_pixels,
        force_override: args.force,
    })
}

fn resolve_output_dir(args: &RunArgs, settings: &Settings, paths: &AppPaths) -> PathBuf {
    args.output_dir
        .clone()
        .or_else(|| settings.capture.output_dir.clone())
        .unwrap_or_else(|| paths.captures_dir())
}

fn read_shader(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read shader {}", path.display()))
}

fn log_assignment(role: Role, arg: &SourceArg, cover: bool) {
    let fill = if cover { "cover" } else { "contain" };
    match arg {
        SourceArg::Image(path) | SourceArg::Video(path) => {
            tracing::info!(%role, path = %path.display(), fill, "input assigned");
        }
        SourceArg::Camera(device) => {
            tracing::info!(%role, device = ?device, fill, "camera assigned");
        }
    }
}

/// Saves a capture under `dir`, replacing any earlier artifact of the same name.
pub fn write_artifact(dir: &Path, artifact: &CaptureArtifact) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create capture directory {}", dir.display()))?;
    let path = dir.join(&artifact.file_name);
    fs::write(&path, &artifact.bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        bytes = artifact.bytes.len(),
        media_type = artifact.media_type,
        "capture saved"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordFormat;
    use renderer::{GpuPowerPreference, RecordingFormat};
    use tempfile::TempDir;

    #[test]
    fn flags_override_settings() {
        let mut settings = Settings::default();
        settings.window.width = 800;
        settings.capture.recording_fps = 12.0;
        let args = RunArgs {
            size: Some((320, 200)),
            force: Some([0.0, 350.0]),
            record_format: Some(RecordFormat::Mp4),
            ..RunArgs::default()
        };

        let config = build_renderer_config(&args, &settings).unwrap();
        assert_eq!(config.surface_size, (320, 200));
        assert_eq!(config.force_override, Some([0.0, 350.0]));
        assert_eq!(config.capture.recording_format, RecordingFormat::Mp4);
        assert_eq!(config.capture.recording_fps, 12.0);
        assert_eq!(config.power_preference, GpuPowerPreference::Low);
    }

    #[test]
    fn settings_fill_in_when_flags_are_absent() {
        let settings = Settings::default();
        let config = build_renderer_config(&RunArgs::default(), &settings).unwrap();
        assert_eq!(config.surface_size, (1280, 720));
        assert_eq!(config.capture.base_name, "distortio");
        assert_eq!(config.force_override, None);
        assert_eq!(
            config.shaders.fragment,
            ShaderSources::bundled().fragment
        );
    }

    #[test]
    fn shader_files_replace_bundled_sources() {
        let dir = TempDir::new().unwrap();
        let fragment = dir.path().join("custom.frag");
        fs::write(&fragment, "#version 450\nvoid main() {}\n").unwrap();
        let args = RunArgs {
            fragment: Some(fragment),
            ..RunArgs::default()
        };

        let config = build_renderer_config(&args, &Settings::default()).unwrap();
        assert!(config.shaders.fragment.contains("void main()"));
        assert_eq!(config.shaders.vertex, ShaderSources::bundled().vertex);
    }

    #[test]
    fn missing_shader_file_is_an_error() {
        let args = RunArgs {
            vertex: Some(PathBuf::from("/no/such/shader.vert")),
            ..RunArgs::default()
        };
        assert!(build_renderer_config(&args, &Settings::default()).is_err());
    }

    #[test]
    fn artifacts_overwrite_the_fixed_filename() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("captures");
        let first = CaptureArtifact {
            bytes: vec![1, 2, 3],
            file_name: "distortio.png".into(),
            media_type: "image/png",
        };
        let second = CaptureArtifact {
            bytes: vec![9],
            ..first.clone()
        };

        let path = write_artifact(&target, &first).unwrap();
        write_artifact(&target, &second).unwrap();
        assert_eq!(path, target.join("distortio.png"));
        assert_eq!(fs::read(&path).unwrap(), vec![9]);
    }
}
