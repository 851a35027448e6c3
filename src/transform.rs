//! Decoded-image transformations.
//!
//! A transformation contributes its fingerprint to the memory-cache key,
//! so two requests that differ only in transformations never share a
//! cached value. Transformations run on transform-safe pixel formats
//! only; the resolver guarantees that before decode.

use crate::decode::DecodedImage;
use crate::error::Result;
use image::DynamicImage;

/// One post-decode image transformation.
pub trait Transformation: Send + Sync {
  /// Stable fingerprint of this transformation and its parameters.
  fn cache_key(&self) -> String;

  fn apply(&self, image: DecodedImage) -> Result<DecodedImage>;
}

/// Converts the image to grayscale, preserving the pixel format.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrayscaleTransformation;

impl Transformation for GrayscaleTransformation {
  fn cache_key(&self) -> String {
    "grayscale".to_string()
  }

  fn apply(&self, image: DecodedImage) -> Result<DecodedImage> {
    let format = image.format();
    let gray = image.into_pixels().grayscale();
    Ok(DecodedImage::from_pixels(gray, format))
  }
}

/// Masks everything outside the largest inscribed circle to transparent.
#[derive(Debug, Clone, Copy, Default)]
pub struct CircleCropTransformation;

impl Transformation for CircleCropTransformation {
  fn cache_key(&self) -> String {
    "circle_crop".to_string()
  }

  fn apply(&self, image: DecodedImage) -> Result<DecodedImage> {
    let format = image.format();
    let mut rgba = image.into_pixels().to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
      return Ok(DecodedImage::from_pixels(DynamicImage::ImageRgba8(rgba), format));
    }

    let cx = f64::from(width - 1) / 2.0;
    let cy = f64::from(height - 1) / 2.0;
    let radius = f64::from(width.min(height)) / 2.0;
    let radius_sq = radius * radius;

    for (x, y, pixel) in rgba.enumerate_pixels_mut() {
      let dx = f64::from(x) - cx;
      let dy = f64::from(y) - cy;
      if dx * dx + dy * dy > radius_sq {
        pixel.0[3] = 0;
      }
    }

    Ok(DecodedImage::from_pixels(DynamicImage::ImageRgba8(rgba), format))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::format::PixelFormat;
  use image::{Rgba, RgbaImage};

  fn red_square(side: u32) -> DecodedImage {
    let pixels = DynamicImage::ImageRgba8(RgbaImage::from_pixel(side, side, Rgba([255, 0, 0, 255])));
    DecodedImage::from_pixels(pixels, PixelFormat::Rgba8888)
  }

  #[test]
  fn grayscale_preserves_dimensions_and_format() {
    let out = GrayscaleTransformation.apply(red_square(4)).unwrap();
    assert_eq!((out.width(), out.height()), (4, 4));
    assert_eq!(out.format(), PixelFormat::Rgba8888);

    let rgba = out.pixels().to_rgba8();
    let pixel = rgba.get_pixel(0, 0);
    assert_eq!(pixel.0[0], pixel.0[1]);
    assert_eq!(pixel.0[1], pixel.0[2]);
  }

  #[test]
  fn circle_crop_clears_corners_keeps_center() {
    let out = CircleCropTransformation.apply(red_square(9)).unwrap();
    let rgba = out.pixels().to_rgba8();

    assert_eq!(rgba.get_pixel(0, 0).0[3], 0, "corner outside circle");
    assert_eq!(rgba.get_pixel(4, 4).0[3], 255, "center inside circle");
  }

  #[test]
  fn cache_keys_are_stable() {
    assert_eq!(GrayscaleTransformation.cache_key(), "grayscale");
    assert_eq!(CircleCropTransformation.cache_key(), "circle_crop");
  }
}
