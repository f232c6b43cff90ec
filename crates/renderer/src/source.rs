use std::fmt;
use std::sync::Arc;

use image::RgbaImage;

/// A media feed whose pixels change without being reassigned.
///
/// Implementations decode on their own schedule; the compositor only ever
/// asks for whatever frame is newest when it is about to draw.
pub trait LiveFeed {
    /// Native frame size, known before the first frame arrives.
    fn dimensions(&self) -> Option<(u32, u32)>;
    /// Most recently decoded frame, if any has arrived yet.
    fn latest_frame(&mut self) -> Option<Arc<RgbaImage>>;
}

/// Decoded still image, immutable once loaded.
#[derive(Clone)]
pub struct StillImage {
    pixels: Arc<RgbaImage>,
}

impl StillImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

impl From<image::DynamicImage> for StillImage {
    fn from(value: image::DynamicImage) -> Self {
        Self::new(value.into_rgba8())
    }
}

/// Visual media assigned to a role.
pub enum Source {
    Image(StillImage),
    Video(Box<dyn LiveFeed>),
    CameraStream(Box<dyn LiveFeed>),
}

/// Variant tag of a [`Source`], handy for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Image,
    Video,
    CameraStream,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Image => f.write_str("image"),
            SourceKind::Video => f.write_str("video"),
            SourceKind::CameraStream => f.write_str("camera"),
        }
    }
}

impl Source {
    pub fn kind(&self) -> SourceKind {
        match self {
            Source::Image(_) => SourceKind::Image,
            Source::Video(_) => SourceKind::Video,
            Source::CameraStream(_) => SourceKind::CameraStream,
        }
    }

    /// Live sources must be re-uploaded every frame.
    pub fn is_live(&self) -> bool {
        match self {
            Source::Image(_) => false,
            Source::Video(_) | Source::CameraStream(_) => true,
        }
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Source::Image(image) => Some(image.dimensions()),
            Source::Video(feed) | Source::CameraStream(feed) => feed.dimensions(),
        }
    }

    /// Readable, non-empty dimensions or a reason why not.
    pub(crate) fn validated_dimensions(&self) -> Result<(u32, u32), String> {
        match self.dimensions() {
            None => Err(format!("{} source has no readable dimensions", self.kind())),
            Some((width, height)) if width == 0 || height == 0 => Err(format!(
                "{} source has empty dimensions {width}x{height}",
                self.kind()
            )),
            Some(dimensions) => Ok(dimensions),
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("kind", &self.kind())
            .field("dimensions", &self.dimensions())
            .finish()
    }
}
