//! Decoded component planes and the packed output image.

use std::path::Path;

use image::{ImageResult, Rgba, RgbaImage};

/// One channel as produced by the JPEG2000 engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentPlane {
    /// Plane width in samples
    pub width: u32,
    /// Plane height in samples
    pub height: u32,
    /// Bits per sample
    pub precision: u32,
    pub signed: bool,
    /// Horizontal replication factor
    pub dx: u32,
    /// Vertical replication factor
    pub dy: u32,
    /// Row-major samples, `width * height` of them
    pub samples: Vec<i32>,
}

impl ComponentPlane {
    /// Unsigned 8-bit plane without subsampling, handy for building test images.
    pub fn unsigned8(width: u32, height: u32, samples: Vec<i32>) -> Self {
        Self {
            width,
            height,
            precision: 8,
            signed: false,
            dx: 1,
            dy: 1,
            samples,
        }
    }
}

/// A decoded image as packed 32-bit pixels.
///
/// Each pixel is `0xAARRGGBB`, row-major without padding. Colour channels
/// are meant to be read as premultiplied by alpha.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedImage {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl PackedImage {
    /// Wrap a pixel buffer.
    ///
    /// Returns `None` unless `pixels.len()` is exactly `width * height`.
    pub fn new(width: u32, height: u32, pixels: Vec<u32>) -> Option<Self> {
        if pixels.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    /// All-zero image of the given size.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub(crate) fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> Vec<u32> {
        self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Convert to an RGBA image, channel values copied as they are.
    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let p = self.pixels[y as usize * self.width as usize + x as usize];
            Rgba([(p >> 16) as u8, (p >> 8) as u8, p as u8, (p >> 24) as u8])
        })
    }

    /// Write the image as a PNG file.
    pub fn save_png(&self, path: &Path) -> ImageResult<()> {
        self.to_rgba_image()
            .save_with_format(path, image::ImageFormat::Png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_lookup_is_row_major() {
        let image = PackedImage::new(2, 2, vec![1, 2, 3, 4]).unwrap();
        assert_eq!(image.pixel(1, 0), Some(2));
        assert_eq!(image.pixel(0, 1), Some(3));
        assert_eq!(image.pixel(2, 0), None);
    }

    #[test]
    fn test_new_rejects_mismatched_buffer() {
        assert!(PackedImage::new(2, 2, vec![0; 3]).is_none());
        assert!(PackedImage::new(2, 2, vec![0; 5]).is_none());
        assert!(PackedImage::new(0, 7, Vec::new()).is_some());
    }

    #[test]
    fn test_blank_converts_at_full_size() {
        let rgba = PackedImage::blank(3, 2).to_rgba_image();
        assert_eq!(rgba.dimensions(), (3, 2));
        assert!(rgba.pixels().all(|p| p == &Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn test_to_rgba_image_unpacks_argb() {
        let image = PackedImage::new(1, 1, vec![0x80_0A_14_1E]).unwrap();
        let rgba = image.to_rgba_image();
        assert_eq!(rgba.get_pixel(0, 0), &Rgba([0x0A, 0x14, 0x1E, 0x80]));
    }

    #[test]
    fn test_save_png_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        PackedImage::new(2, 1, vec![0xFF_FF_00_00, 0xFF_00_FF_00])
            .unwrap()
            .save_png(&path)
            .unwrap();
        let loaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(loaded.get_pixel(1, 0), &Rgba([0, 0xFF, 0, 0xFF]));
    }
}
