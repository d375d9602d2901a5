use collage_core::media::VideoFrame;
use collage_core::types::Rect;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba, RgbaImage};

/// Offscreen RGBA8 frame the export loop paints into.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    image: RgbaImage,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Packed RGBA8 rows, ready to be piped to an encoder.
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Fill every pixel with `rgba`.
    pub fn clear(&mut self, rgba: [u8; 4]) {
        for px in self.image.pixels_mut() {
            *px = Rgba(rgba);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.image.get_pixel(x, y).0
    }

    /// Stretch `frame` over `dest` (in buffer pixels) with nearest-neighbour
    /// sampling and composite it over the current contents. Parts of `dest`
    /// outside the buffer are clipped; empty rects are skipped.
    pub fn draw_scaled(&mut self, frame: &VideoFrame, dest: Rect) {
        let x0 = dest.x.round();
        let y0 = dest.y.round();
        let width = dest.right().round() - x0;
        let height = dest.bottom().round() - y0;
        if !(width >= 1.0 && height >= 1.0) {
            return;
        }
        let offscreen = x0 >= self.width() as f64
            || y0 >= self.height() as f64
            || x0 + width <= 0.0
            || y0 + height <= 0.0;
        if offscreen {
            return;
        }

        let Some(src) =
            ImageBuffer::<Rgba<u8>, &[u8]>::from_raw(frame.width(), frame.height(), frame.data())
        else {
            tracing::warn!(?frame, "skipping malformed video frame");
            return;
        };
        if src.width() == 0 || src.height() == 0 {
            return;
        }

        let scaled = imageops::resize(&src, width as u32, height as u32, FilterType::Nearest);
        imageops::overlay(&mut self.image, &scaled, x0 as i64, y0 as i64);
    }
}
