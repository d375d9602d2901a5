use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use thiserror::Error;

// ---------------------------------------------------------------------------
// VideoFrame
// ---------------------------------------------------------------------------

/// One decoded frame in straight RGBA8, row-major, no padding.
///
/// Dimensions are always non-zero and match the pixel buffer.
#[derive(Clone, PartialEq)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl VideoFrame {
    /// Wrap raw pixels. Returns `None` when either side is zero or the
    /// buffer length does not match `width * height * 4`.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 || data.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            data: data.into(),
        })
    }

    /// A frame filled with a single color. `None` for a zero-sized frame.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Option<Self> {
        let data: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self::from_rgba(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// VideoSource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlaybackError {
    #[error("playback could not start: {0}")]
    StartFailed(String),

    #[error("source has been released")]
    Released,
}

/// Decodable video content backing one item.
///
/// Sources are shared between the scene and a running export, so every
/// method takes `&self` and implementations use interior mutability.
pub trait VideoSource: Send + Sync {
    /// Seek to time zero and start (or keep) playing.
    fn restart(&self) -> Result<(), PlaybackError>;

    /// Stop advancing. The last decoded frame stays available.
    fn pause(&self);

    /// Most recent decoded frame, if any has been produced yet.
    fn current_frame(&self) -> Option<VideoFrame>;

    /// Free the platform resources behind this source.
    fn release(&self);

    /// Pixel size the source will be drawn at. Sources that decode may use
    /// it on the next [`Self::restart`]; the default ignores it.
    fn set_render_size(&self, _width: u32, _height: u32) {}
}

// ---------------------------------------------------------------------------
// MediaHandle
// ---------------------------------------------------------------------------

/// Releases the wrapped source when the last reference goes away.
struct SourceOwner {
    source: Arc<dyn VideoSource>,
}

impl Drop for SourceOwner {
    fn drop(&mut self) {
        self.source.release();
    }
}

/// Exclusive owner of an item's video source.
///
/// The source is released exactly once, after the handle and every
/// [`SourceRef`] taken from it are gone. An export holding a `SourceRef`
/// therefore keeps the source alive even if the item or the whole scene is
/// dropped mid-run.
pub struct MediaHandle {
    owner: Arc<SourceOwner>,
}

impl MediaHandle {
    pub fn new(source: Arc<dyn VideoSource>) -> Self {
        Self {
            owner: Arc::new(SourceOwner { source }),
        }
    }

    pub fn from_source<S: VideoSource + 'static>(source: S) -> Self {
        Self::new(Arc::new(source))
    }

    /// Shared access to the live source for an export snapshot.
    pub fn source(&self) -> SourceRef {
        SourceRef {
            owner: Arc::clone(&self.owner),
        }
    }
}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaHandle").finish_non_exhaustive()
    }
}

/// A shared reference to a [`MediaHandle`]'s source that defers its release.
#[derive(Clone)]
pub struct SourceRef {
    owner: Arc<SourceOwner>,
}

impl Deref for SourceRef {
    type Target = dyn VideoSource;

    fn deref(&self) -> &Self::Target {
        &*self.owner.source
    }
}

impl fmt::Debug for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRef").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
