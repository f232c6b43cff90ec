use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use anyhow::{anyhow, bail, Context, Result};
use image::RgbaImage;
use renderer::{LiveFeed, Source, StillImage};

use crate::config::{CameraSettings, Settings};

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "mkv", "avi", "m4v"];

/// Media named on the command line, before anything is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceArg {
    Image(PathBuf),
    Video(PathBuf),
    /// `camera` or `camera:DEVICE`.
    Camera(Option<String>),
}

pub fn parse_source_arg(value: &str) -> Result<SourceArg> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("source must not be empty");
    }
    if trimmed == "camera" {
        return Ok(SourceArg::Camera(None));
    }
    if let Some(device) = trimmed.strip_prefix("camera:") {
        let device = device.trim();
        return Ok(SourceArg::Camera(
            (!device.is_empty()).then(|| device.to_string()),
        ));
    }

    let path = PathBuf::from(trimmed);
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| anyhow!("cannot tell the media type of '{trimmed}' without an extension"))?;

    if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        Ok(SourceArg::Video(path))
    } else if image::ImageFormat::from_extension(&extension).is_some() {
        Ok(SourceArg::Image(path))
    } else {
        bail!("unsupported media extension '.{extension}' for '{trimmed}'")
    }
}

pub fn open_source(arg: &SourceArg, settings: &Settings) -> Result<Source> {
    let ffmpeg = settings.capture.ffmpeg.as_path();
    match arg {
        SourceArg::Image(path) => {
            let decoded = image::open(path)
                .with_context(|| format!("failed to decode image {}", path.display()))?;
            let still = StillImage::from(decoded);
            tracing::info!(
                path = %path.display(),
                width = still.dimensions().0,
                height = still.dimensions().1,
                "loaded image"
            );
            Ok(Source::Image(still))
        }
        SourceArg::Video(path) => {
            if !path.exists() {
                bail!("video {} does not exist", path.display());
            }
            let feed = FfmpegFeed::video(ffmpeg, path)?;
            Ok(Source::Video(Box::new(feed)))
        }
        SourceArg::Camera(device) => {
            let feed = FfmpegFeed::camera(ffmpeg, device.as_deref(), &settings.camera)?;
            Ok(Source::CameraStream(Box::new(feed)))
        }
    }
}

type LatestFrame = Arc<Mutex<Option<Arc<RgbaImage>>>>;

/// Decodes a video file or camera through an `ffmpeg` child emitting raw RGBA.
///
/// A reader thread keeps only the newest frame; older ones are overwritten.
pub struct FfmpegFeed {
    dimensions: (u32, u32),
    latest: LatestFrame,
    child: Child,
    reader: Option<JoinHandle<()>>,
}

impl FfmpegFeed {
    pub fn video(ffmpeg: &Path, path: &Path) -> Result<Self> {
        let dimensions = probe_dimensions(ffmpeg, path)?;
        tracing::info!(
            path = %path.display(),
            width = dimensions.0,
            height = dimensions.1,
            "opening video"
        );
        Self::spawn(video_command(ffmpeg, path), dimensions)
    }

    /// `device` from the command line wins over `[camera] device`.
    pub fn camera(ffmpeg: &Path, device: Option<&str>, settings: &CameraSettings) -> Result<Self> {
        let (command, device) = camera_command(ffmpeg, device, settings)?;
        tracing::info!(
            %device,
            width = settings.width,
            height = settings.height,
            "opening camera"
        );
        Self::spawn(command, (settings.width, settings.height))
    }

    fn spawn(mut command: Command, dimensions: (u32, u32)) -> Result<Self> {
        command
            .args(["-f", "rawvideo", "-pix_fmt", "rgba", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        let mut child = command
            .spawn()
            .context("failed to start ffmpeg; is it installed and on PATH?")?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("ffmpeg stdout was not captured"))?;

        let latest: LatestFrame = Arc::new(Mutex::new(None));
        let shared = latest.clone();
        let reader = std::thread::Builder::new()
            .name("distortio-decoder".into())
            .spawn(move || read_frames(stdout, dimensions, shared))
            .context("failed to spawn decoder thread")?;

        Ok(Self {
            dimensions,
            latest,
            child,
            reader: Some(reader),
        })
    }
}

impl LiveFeed for FfmpegFeed {
    fn dimensions(&self) -> Option<(u32, u32)> {
        Some(self.dimensions)
    }

    fn latest_frame(&mut self) -> Option<Arc<RgbaImage>> {
        lock(&self.latest).clone()
    }
}

impl Drop for FfmpegFeed {
    fn drop(&mut self) {
        if let Err(err) = self.child.kill() {
            if err.kind() != ErrorKind::InvalidInput {
                tracing::debug!("failed to stop ffmpeg: {err}");
            }
        }
        let _ = self.child.wait();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

fn lock(latest: &LatestFrame) -> MutexGuard<'_, Option<Arc<RgbaImage>>> {
    latest
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_frames(mut stdout: ChildStdout, (width, height): (u32, u32), latest: LatestFrame) {
    let frame_len = width as usize * height as usize * 4;
    let mut decoded = 0u64;
    loop {
        let mut buffer = vec![0u8; frame_len];
        if let Err(err) = stdout.read_exact(&mut buffer) {
            if err.kind() != ErrorKind::UnexpectedEof {
                tracing::warn!("decoder stream failed: {err}");
            }
            break;
        }
        let Some(frame) = RgbaImage::from_raw(width, height, buffer) else {
            break;
        };
        *lock(&latest) = Some(Arc::new(frame));
        decoded += 1;
    }
    tracing::debug!(frames = decoded, "decoder stream ended");
}

/// Frames come out in stored orientation so they match the probed size.
fn video_command(ffmpeg: &Path, path: &Path) -> Command {
    let mut command = Command::new(ffmpeg);
    command
        .args(["-hide_banner", "-loglevel", "error", "-noautorotate"])
        .args(["-stream_loop", "-1", "-re", "-i"])
        .arg(path);
    command
}

fn camera_command(
    ffmpeg: &Path,
    requested: Option<&str>,
    settings: &CameraSettings,
) -> Result<(Command, String)> {
    if settings.width == 0 || settings.height == 0 {
        bail!("camera size must be non-zero");
    }
    let device = requested.or(settings.device.as_deref());
    let fps = settings.fps.max(1).to_string();
    let size = format!("{}x{}", settings.width, settings.height);

    let mut command = Command::new(ffmpeg);
    command.args(["-hide_banner", "-loglevel", "error"]);
    let device = if cfg!(target_os = "macos") {
        command.args(["-f", "avfoundation", "-framerate", &fps, "-video_size", &size]);
        device.unwrap_or("0").to_string()
    } else if cfg!(target_os = "windows") {
        let name = device.ok_or_else(|| {
            anyhow!("a camera name is required on Windows; pass --primary camera:NAME or set [camera] device")
        })?;
        command.args(["-f", "dshow", "-framerate", &fps]);
        format!("video={name}")
    } else {
        command.args(["-f", "v4l2", "-framerate", &fps, "-video_size", &size]);
        device.unwrap_or("/dev/video0").to_string()
    };
    command.arg("-i").arg(&device).args([
        "-vf",
        &format!("scale={}:{}", settings.width, settings.height),
    ]);
    Ok((command, device))
}

/// `ffprobe` living next to the configured `ffmpeg`, or the one on PATH.
fn ffprobe_for(ffmpeg: &Path) -> PathBuf {
    match ffmpeg.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join("ffprobe"),
        _ => PathBuf::from("ffprobe"),
    }
}

fn probe_dimensions(ffmpeg: &Path, path: &Path) -> Result<(u32, u32)> {
    let ffprobe = ffprobe_for(ffmpeg);
    let output = Command::new(&ffprobe)
        .args(["-v", "error", "-select_streams", "v:0"])
        .args(["-show_entries", "stream=width,height", "-of", "csv=s=x:p=0"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("failed to run {}", ffprobe.display()))?;
    if !output.status.success() {
        bail!(
            "ffprobe could not read {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
        .with_context(|| format!("no video stream found in {}", path.display()))
}

fn parse_probe_output(stdout: &str) -> Result<(u32, u32)> {
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| anyhow!("ffprobe returned no stream dimensions"))?;
    let (width, height) = line
        .split_once('x')
        .ok_or_else(|| anyhow!("unexpected ffprobe output '{line}'"))?;
    let width: u32 = width.trim().parse().context("invalid probed width")?;
    let height: u32 = height
        .trim()
        .trim_end_matches('x')
        .parse()
        .context("invalid probed height")?;
    if width == 0 || height == 0 {
        bail!("video reports empty dimensions {width}x{height}");
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sources_are_classified_by_extension() {
        assert_eq!(
            parse_source_arg("shots/photo.JPG").unwrap(),
            SourceArg::Image(PathBuf::from("shots/photo.JPG"))
        );
        assert_eq!(
            parse_source_arg("clip.webm").unwrap(),
            SourceArg::Video(PathBuf::from("clip.webm"))
        );
        assert_eq!(parse_source_arg("camera").unwrap(), SourceArg::Camera(None));
        assert_eq!(
            parse_source_arg("camera:/dev/video2").unwrap(),
            SourceArg::Camera(Some("/dev/video2".into()))
        );
        assert_eq!(parse_source_arg("camera:").unwrap(), SourceArg::Camera(None));
    }

    #[test]
    fn unknown_or_missing_extensions_are_rejected() {
        assert!(parse_source_arg("notes.txt").is_err());
        assert!(parse_source_arg("README").is_err());
        assert!(parse_source_arg("   ").is_err());
    }

    #[test]
    fn probe_output_is_parsed() {
        assert_eq!(parse_probe_output("1920x1080\n").unwrap(), (1920, 1080));
        assert_eq!(parse_probe_output("\n640x480x\n").unwrap(), (640, 480));
        assert!(parse_probe_output("").is_err());
        assert!(parse_probe_output("0x480").is_err());
    }

    #[test]
    fn ffprobe_sits_next_to_ffmpeg() {
        assert_eq!(ffprobe_for(Path::new("ffmpeg")), PathBuf::from("ffprobe"));
        assert_eq!(
            ffprobe_for(Path::new("/opt/ff/bin/ffmpeg")),
            PathBuf::from("/opt/ff/bin/ffprobe")
        );
    }

    #[test]
    fn images_open_as_still_sources() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tile.png");
        RgbaImage::from_pixel(6, 4, image::Rgba([1, 2, 3, 255]))
            .save(&path)
            .unwrap();

        let source = open_source(&SourceArg::Image(path), &Settings::default()).unwrap();
        assert!(!source.is_live());
        assert_eq!(source.dimensions(), Some((6, 4)));
    }

    fn args(command: &Command) -> Vec<String> {
        command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn video_frames_keep_their_stored_orientation() {
        let command = video_command(Path::new("ffmpeg"), Path::new("clip.mp4"));
        let args = args(&command);
        let rotate = args.iter().position(|arg| arg == "-noautorotate").unwrap();
        let input = args.iter().position(|arg| arg == "-i").unwrap();
        assert!(rotate < input);
        assert_eq!(args.last().map(String::as_str), Some("clip.mp4"));
    }

    #[test]
    fn camera_device_falls_back_to_settings() {
        let settings = CameraSettings {
            device: Some("/dev/video7".into()),
            ..CameraSettings::default()
        };
        let (_, device) = camera_command(Path::new("ffmpeg"), None, &settings).unwrap();
        let (command, flagged) =
            camera_command(Path::new("ffmpeg"), Some("/dev/video2"), &settings).unwrap();
        if cfg!(target_os = "windows") {
            assert_eq!(device, "video=/dev/video7");
            assert_eq!(flagged, "video=/dev/video2");
        } else {
            assert_eq!(device, "/dev/video7");
            assert_eq!(flagged, "/dev/video2");
        }
        assert!(args(&command).contains(&flagged));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn camera_uses_platform_default_when_nothing_is_set() {
        let (command, device) =
            camera_command(Path::new("ffmpeg"), None, &CameraSettings::default()).unwrap();
        assert_eq!(device, "/dev/video0");
        let args = args(&command);
        assert!(args.windows(2).any(|pair| pair == ["-f", "v4l2"]));
        assert!(args.contains(&"scale=1280:720".to_string()));
    }

    #[test]
    fn zero_sized_camera_is_rejected() {
        let settings = CameraSettings {
            width: 0,
            ..CameraSettings::default()
        };
        assert!(camera_command(Path::new("ffmpeg"), None, &settings).is_err());
    }

    #[test]
    fn missing_video_fails_before_spawning_ffmpeg() {
        let arg = SourceArg::Video(PathBuf::from("/definitely/not/here.mp4"));
        assert!(open_source(&arg, &Settings::default()).is_err());
    }
}
