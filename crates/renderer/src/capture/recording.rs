use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, RgbaImage};

use super::CaptureArtifact;
use crate::error::CaptureError;
use crate::types::{CaptureSettings, RecordingFormat};

/// A running recording: frames go to a worker thread that owns the encoder.
pub struct RecordingSession {
    sender: Option<Sender<RgbaImage>>,
    worker: Option<JoinHandle<Result<Vec<u8>, CaptureError>>>,
    format: RecordingFormat,
    base_name: String,
    interval: Duration,
    last_frame: Option<Instant>,
    frame_size: Option<(u32, u32)>,
    accepted: u64,
    dropped: u64,
}

impl RecordingSession {
    pub fn start(settings: &CaptureSettings) -> Result<Self, CaptureError> {
        let fps = if settings.recording_fps.is_finite() && settings.recording_fps > 0.0 {
            settings.recording_fps
        } else {
            tracing::warn!(fps = settings.recording_fps, "invalid recording fps; using 30");
            30.0
        };
        let format = negotiate_format(settings.recording_format, &settings.ffmpeg);
        let (sender, receiver) = crossbeam_channel::bounded(settings.queue_depth.max(1));
        let ffmpeg = settings.ffmpeg.clone();
        let worker = thread::Builder::new()
            .name("distortio-recorder".to_string())
            .spawn(move || match format {
                RecordingFormat::Gif => encode_gif(receiver, fps),
                RecordingFormat::Webm | RecordingFormat::Mp4 => {
                    encode_ffmpeg(receiver, fps, &ffmpeg, format)
                }
            })?;
        tracing::info!(%format, fps, "recording started");
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            format,
            base_name: settings.base_name.clone(),
            interval: Duration::from_secs_f64(1.0 / f64::from(fps)),
            last_frame: None,
            frame_size: None,
            accepted: 0,
            dropped: 0,
        })
    }

    pub fn format(&self) -> RecordingFormat {
        self.format
    }

    /// The first frame is always wanted; later ones once the interval has passed.
    pub fn wants_frame(&self, now: Instant) -> bool {
        match self.last_frame {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    /// Queues a frame without blocking; drops it if the encoder is behind
    /// or its size differs from the first frame.
    pub fn push(&mut self, frame: RgbaImage) {
        self.push_at(frame, Instant::now());
    }

    pub(crate) fn push_at(&mut self, frame: RgbaImage, now: Instant) {
        let size = frame.dimensions();
        match self.frame_size {
            None => self.frame_size = Some(size),
            Some(expected) if expected != size => {
                tracing::debug!(?expected, actual = ?size, "dropping resized recording frame");
                self.dropped += 1;
                return;
            }
            Some(_) => {}
        }
        let Some(sender) = self.sender.as_ref() else {
            return;
        };
        match sender.try_send(frame) {
            Ok(()) => {
                self.accepted += 1;
                self.last_frame = Some(now);
            }
            Err(TrySendError::Full(_)) => {
                tracing::trace!("recording queue full; dropping frame");
                self.dropped += 1;
            }
            Err(TrySendError::Disconnected(_)) => {
                // The worker bailed; `finish` reports why.
                self.sender = None;
            }
        }
    }

    pub fn accepted_frames(&self) -> u64 {
        self.accepted
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    /// Closes the queue, waits for the encoder, and returns the artifact.
    pub fn finish(mut self) -> Result<CaptureArtifact, CaptureError> {
        drop(self.sender.take());
        let bytes = match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| CaptureError::Encoder("recording worker panicked".to_string()))??,
            None => Vec::new(),
        };
        if self.accepted == 0 {
            tracing::warn!("recording stopped before any frame was captured");
        }
        tracing::info!(
            format = %self.format,
            frames = self.accepted,
            dropped = self.dropped,
            bytes = bytes.len(),
            "recording finished"
        );
        Ok(CaptureArtifact {
            bytes,
            file_name: format!("{}.{}", self.base_name, self.format.extension()),
            media_type: self.format.media_type(),
        })
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn negotiate_format(requested: RecordingFormat, ffmpeg: &Path) -> RecordingFormat {
    if !requested.needs_ffmpeg() || ffmpeg_available(ffmpeg) {
        return requested;
    }
    tracing::warn!(
        %requested,
        ffmpeg = %ffmpeg.display(),
        "ffmpeg not found; recording as gif instead"
    );
    RecordingFormat::Gif
}

fn ffmpeg_available(ffmpeg: &Path) -> bool {
    Command::new(ffmpeg)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn frame_delay(fps: f32) -> Delay {
    Delay::from_numer_denom_ms(1000, fps.round().max(1.0) as u32)
}

fn encode_gif(frames: Receiver<RgbaImage>, fps: f32) -> Result<Vec<u8>, CaptureError> {
    let mut bytes = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut bytes, 10);
        encoder.set_repeat(Repeat::Infinite)?;
        let delay = frame_delay(fps);
        for frame in frames.iter() {
            encoder.encode_frame(Frame::from_parts(frame, 0, 0, delay))?;
        }
    }
    Ok(bytes)
}

fn encode_ffmpeg(
    frames: Receiver<RgbaImage>,
    fps: f32,
    ffmpeg: &Path,
    format: RecordingFormat,
) -> Result<Vec<u8>, CaptureError> {
    let Ok(first) = frames.recv() else {
        return Ok(Vec::new());
    };
    let (width, height) = first.dimensions();
    let output = scratch_path(format);
    let mut command = Command::new(ffmpeg);
    command
        .args(["-hide_banner", "-loglevel", "error", "-y"])
        .args(["-f", "rawvideo", "-pix_fmt", "rgba"])
        .arg("-s")
        .arg(format!("{width}x{height}"))
        .arg("-r")
        .arg(format!("{fps}"))
        .args(["-i", "-"]);
    match format {
        RecordingFormat::Webm => {
            command.args([
                "-c:v",
                "libvpx-vp9",
                "-b:v",
                "0",
                "-crf",
                "32",
                "-deadline",
                "realtime",
            ]);
        }
        _ => {
            command.args([
                "-vf",
                "scale=trunc(iw/2)*2:trunc(ih/2)*2",
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
            ]);
        }
    }
    command
        .arg(&output)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let mut child = command.spawn()?;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| CaptureError::Encoder("ffmpeg stdin unavailable".to_string()))?;
    // Writes fail once ffmpeg has exited; its status and stderr say why.
    let mut write_error = stdin.write_all(first.as_raw()).err();
    if write_error.is_none() {
        for frame in frames.iter() {
            if let Err(err) = stdin.write_all(frame.as_raw()) {
                write_error = Some(err);
                break;
            }
        }
    }
    drop(stdin);
    drop(frames);

    let result = child.wait_with_output();
    let finished = match result {
        Ok(result) if !result.status.success() => Err(CaptureError::Encoder(format!(
            "ffmpeg exited with {}: {}",
            result.status,
            String::from_utf8_lossy(&result.stderr).trim()
        ))),
        Ok(_) => match write_error {
            Some(err) => Err(CaptureError::Io(err)),
            None => fs::read(&output).map_err(CaptureError::from),
        },
        Err(err) => Err(CaptureError::Io(err)),
    };
    let _ = fs::remove_file(&output);
    finished
}

fn scratch_path(format: RecordingFormat) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    std::env::temp_dir().join(format!(
        "distortio-{}-{stamp}.{}",
        std::process::id(),
        format.extension()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, image::Rgba([255, 0, 0, 255]))
    }

    fn gif_settings() -> CaptureSettings {
        CaptureSettings {
            recording_fps: 10.0,
            ..CaptureSettings::default()
        }
    }

    #[test]
    fn pacing_admits_first_frame_then_waits_for_interval() {
        let mut session = RecordingSession::start(&gif_settings()).unwrap();
        let start = Instant::now();
        assert!(session.wants_frame(start));
        session.push_at(frame(4, 4), start);
        assert!(!session.wants_frame(start + Duration::from_millis(50)));
        assert!(session.wants_frame(start + Duration::from_millis(101)));
        session.finish().unwrap();
    }

    #[test]
    fn resized_frames_are_dropped() {
        let mut session = RecordingSession::start(&gif_settings()).unwrap();
        let now = Instant::now();
        session.push_at(frame(4, 4), now);
        session.push_at(frame(5, 4), now);
        session.push_at(frame(4, 4), now);
        assert_eq!(session.accepted_frames(), 2);
        assert_eq!(session.dropped_frames(), 1);
        let artifact = session.finish().unwrap();
        assert!(artifact.bytes.starts_with(b"GIF89a"));
    }

    #[cfg(unix)]
    #[test]
    fn early_ffmpeg_exit_reports_its_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("ffmpeg");
        fs::write(
            &script,
            "#!/bin/sh\n\
             if [ \"$1\" = \"-version\" ]; then echo 'ffmpeg version test'; exit 0; fi\n\
             echo \"Unknown encoder 'libvpx-vp9'\" >&2\n\
             exit 1\n",
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let settings = CaptureSettings {
            recording_format: RecordingFormat::Webm,
            ffmpeg: script,
            ..CaptureSettings::default()
        };
        let mut session = RecordingSession::start(&settings).unwrap();
        assert_eq!(session.format(), RecordingFormat::Webm);
        let now = Instant::now();
        for _ in 0..3 {
            session.push_at(frame(512, 512), now);
        }

        let err = session.finish().unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, CaptureError::Encoder(_)), "{message}");
        assert!(message.contains("Unknown encoder 'libvpx-vp9'"), "{message}");
    }

    #[test]
    fn missing_ffmpeg_falls_back_to_gif() {
        let settings = CaptureSettings {
            recording_format: RecordingFormat::Webm,
            ffmpeg: PathBuf::from("/nonexistent/distortio-ffmpeg"),
            ..CaptureSettings::default()
        };
        let session = RecordingSession::start(&settings).unwrap();
        assert_eq!(session.format(), RecordingFormat::Gif);
        let artifact = session.finish().unwrap();
        assert_eq!(artifact.file_name, "distortio.gif");
        assert_eq!(artifact.media_type, "image/gif");
    }
}
