use std::path::Path;

use image::{GrayImage, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("failed to decode screenshot: {0}")]
    Decode(#[from] image::ImageError),
    #[error("{what} {width}x{height} too small for {needed}")]
    TooSmall {
        what: &'static str,
        width: u32,
        height: u32,
        needed: String,
    },
}

/// Pixels to trim from each edge of a screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insets {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// An immutable RGB capture of the game viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Decode screenshot bytes (JPEG or PNG) into a frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        Ok(Self::new(image::load_from_memory(bytes)?.to_rgb8()))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// `(height, width, channels)`, the row-major observation shape.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height() as usize, self.width() as usize, 3)
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn trim(&self, insets: &Insets) -> Result<Frame, FrameError> {
        let w = self.width();
        let h = self.height();
        if insets.left.saturating_add(insets.right) >= w
            || insets.top.saturating_add(insets.bottom) >= h
        {
            return Err(FrameError::TooSmall {
                what: "screenshot",
                width: w,
                height: h,
                needed: format!("{insets:?}"),
            });
        }
        self.crop(&Region {
            x: insets.left,
            y: insets.top,
            width: w - insets.left - insets.right,
            height: h - insets.top - insets.bottom,
        })
    }

    pub fn crop(&self, region: &Region) -> Result<Frame, FrameError> {
        if region.x.saturating_add(region.width) > self.width()
            || region.y.saturating_add(region.height) > self.height()
        {
            return Err(FrameError::TooSmall {
                what: "frame",
                width: self.width(),
                height: self.height(),
                needed: format!("{region:?}"),
            });
        }
        let view = image::imageops::crop_imm(
            &self.image,
            region.x,
            region.y,
            region.width,
            region.height,
        );
        Ok(Frame::new(view.to_image()))
    }

    pub fn to_gray(&self) -> GrayImage {
        image::imageops::grayscale(&self.image)
    }

    pub fn to_png(&self) -> Result<Vec<u8>, FrameError> {
        let mut buf = std::io::Cursor::new(Vec::new());
        self.image.write_to(&mut buf, ImageFormat::Png)?;
        Ok(buf.into_inner())
    }

    pub fn save(&self, path: &Path) -> Result<(), FrameError> {
        self.image.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(w: u32, h: u32) -> Frame {
        Frame::new(RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 0])
        }))
    }

    #[test]
    fn trim_matches_default_viewport() {
        let frame = gradient(700, 475);
        let obs = frame
            .trim(&Insets {
                top: 0,
                bottom: 75,
                left: 76,
                right: 90,
            })
            .unwrap();
        assert_eq!(obs.shape(), (400, 534, 3));
        assert_eq!(obs.image().get_pixel(0, 0), &Rgb([76, 0, 0]));
    }

    #[test]
    fn crop_out_of_bounds_fails() {
        let frame = gradient(100, 50);
        let err = frame.crop(&Region {
            x: 90,
            y: 0,
            width: 20,
            height: 10,
        });
        assert!(matches!(err, Err(FrameError::TooSmall { .. })));
    }

    #[test]
    fn huge_offsets_fail_instead_of_overflowing() {
        let frame = gradient(100, 50);
        let region = Region {
            x: u32::MAX,
            y: 0,
            width: 10,
            height: 10,
        };
        assert!(matches!(frame.crop(&region), Err(FrameError::TooSmall { .. })));
        let insets = Insets {
            top: 0,
            bottom: 0,
            left: u32::MAX,
            right: 1,
        };
        assert!(matches!(frame.trim(&insets), Err(FrameError::TooSmall { .. })));
    }

    #[test]
    fn png_bytes_decode_back() {
        let frame = gradient(32, 16);
        let bytes = frame.to_png().unwrap();
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        assert!(matches!(
            Frame::decode(b"definitely not an image"),
            Err(FrameError::Decode(_))
        ));
    }
}
