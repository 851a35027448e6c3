//! Decoding boundary: turns fetched bytes into displayable images.
//!
//! Specific decoder implementations are collaborators behind the
//! [`Decoder`] trait; [`ImageCrateDecoder`] is the default, built on the
//! `image` crate. It enforces decode limits, downsamples to the target
//! size honoring the resolved scale mode, and converts pixels to the
//! nearest representation of the resolved format.

use crate::error::{DecodeError, Error, Result};
use crate::format::PixelFormat;
use crate::options::Options;
use crate::size::Scale;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

/// A decoded in-memory image tagged with its resolved pixel format.
#[derive(Debug, Clone)]
pub struct DecodedImage {
  pixels: DynamicImage,
  format: PixelFormat,
}

impl DecodedImage {
  /// Wraps decoded pixels, converting them to `format`'s representation.
  pub fn from_pixels(pixels: DynamicImage, format: PixelFormat) -> Self {
    let pixels = match format {
      PixelFormat::Rgba8888 | PixelFormat::Hardware => DynamicImage::ImageRgba8(pixels.to_rgba8()),
      // 16-bit packing is a platform allocation concern; the pipeline
      // carries the opaque 8-bit representation.
      PixelFormat::Rgb565 => DynamicImage::ImageRgb8(pixels.to_rgb8()),
      PixelFormat::Alpha8 => DynamicImage::ImageLuma8(pixels.to_luma8()),
      PixelFormat::RgbaF16 => DynamicImage::ImageRgba32F(pixels.to_rgba32f()),
    };
    Self { pixels, format }
  }

  /// A uniform (all-zero) image, useful for placeholders and tests.
  pub fn solid(width: u32, height: u32, format: PixelFormat) -> Self {
    Self::from_pixels(DynamicImage::new_rgba8(width, height), format)
  }

  pub fn width(&self) -> u32 {
    self.pixels.width()
  }

  pub fn height(&self) -> u32 {
    self.pixels.height()
  }

  pub fn format(&self) -> PixelFormat {
    self.format
  }

  pub fn pixels(&self) -> &DynamicImage {
    &self.pixels
  }

  pub fn into_pixels(self) -> DynamicImage {
    self.pixels
  }

  /// CPU-side byte footprint, used for memory-cache accounting.
  pub fn byte_size(&self) -> usize {
    self.pixels.as_bytes().len()
  }
}

/// Result of a decode: the image plus whether it was downsampled.
#[derive(Debug, Clone)]
pub struct Decoded {
  pub image: DecodedImage,
  pub is_sampled: bool,
}

/// Decoder collaborator boundary.
pub trait Decoder: Send + Sync {
  /// Decodes `bytes` into an image honoring the resolved options.
  ///
  /// `mime` is a hint; implementations fall back to content sniffing.
  fn decode(&self, bytes: &[u8], mime: Option<&str>, options: &Options) -> Result<Decoded>;
}

/// Default decoder over the `image` crate.
#[derive(Debug, Clone)]
pub struct ImageCrateDecoder {
  /// Maximum number of decoded pixels (width * height). `0` disables the limit.
  max_pixels: u64,
  /// Maximum allowed width or height for a decoded image. `0` disables the limit.
  max_dimension: u32,
}

impl Default for ImageCrateDecoder {
  fn default() -> Self {
    Self {
      max_pixels: 100_000_000,
      max_dimension: 32768,
    }
  }
}

impl ImageCrateDecoder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_max_pixels(mut self, max: u64) -> Self {
    self.max_pixels = max;
    self
  }

  pub fn with_max_dimension(mut self, max: u32) -> Self {
    self.max_dimension = max;
    self
  }

  fn check_limits(&self, width: u32, height: u32) -> Result<()> {
    let too_wide = self.max_dimension > 0 && (width > self.max_dimension || height > self.max_dimension);
    let too_many = self.max_pixels > 0 && u64::from(width) * u64::from(height) > self.max_pixels;
    if too_wide || too_many {
      return Err(Error::Decode(DecodeError::TooLarge { width, height }));
    }
    Ok(())
  }
}

impl Decoder for ImageCrateDecoder {
  fn decode(&self, bytes: &[u8], mime: Option<&str>, options: &Options) -> Result<Decoded> {
    let hinted = mime
      .and_then(image::ImageFormat::from_mime_type)
      .and_then(|format| image::load_from_memory_with_format(bytes, format).ok());
    let pixels = match hinted {
      Some(pixels) => pixels,
      // The hint was absent or wrong; sniff the container instead.
      None => image::load_from_memory(bytes).map_err(|err| match err {
        image::ImageError::Unsupported(_) => Error::Decode(DecodeError::Unrecognized {
          mime: mime.map(|m| m.to_string()),
        }),
        other => Error::Decode(DecodeError::DecodeFailed {
          reason: other.to_string(),
        }),
      })?,
    };

    let (width, height) = pixels.dimensions();
    self.check_limits(width, height)?;

    let (pixels, is_sampled) = scale_to_target(pixels, options);
    Ok(Decoded {
      image: DecodedImage::from_pixels(pixels, options.format()),
      is_sampled,
    })
  }
}

/// Scales decoded pixels into the target size.
///
/// Inexact sizing only ever downsamples; exact sizing also upscales so
/// the output matches the target. Undefined axes leave their intrinsic
/// extent untouched.
fn scale_to_target(pixels: DynamicImage, options: &Options) -> (DynamicImage, bool) {
  let size = options.size();
  let (width, height) = pixels.dimensions();
  if width == 0 || height == 0 {
    return (pixels, false);
  }

  let width_ratio = size.width.pixels().map(|t| f64::from(t) / f64::from(width));
  let height_ratio = size.height.pixels().map(|t| f64::from(t) / f64::from(height));

  let factor = match options.scale() {
    Scale::Fit => match (width_ratio, height_ratio) {
      (Some(w), Some(h)) => w.min(h),
      (Some(w), None) => w,
      (None, Some(h)) => h,
      (None, None) => return (pixels, false),
    },
    // Undefined axes force Fit at resolve time, so Fill sees both.
    Scale::Fill => match (width_ratio, height_ratio) {
      (Some(w), Some(h)) => w.max(h),
      _ => return (pixels, false),
    },
  };

  let exact = !options.allow_inexact_size() && size.is_fully_specified();
  if factor >= 1.0 && !exact {
    return (pixels, false);
  }

  let scaled = match (options.scale(), size.width.pixels(), size.height.pixels()) {
    (Scale::Fill, Some(tw), Some(th)) => pixels.resize_to_fill(tw, th, FilterType::Triangle),
    _ => {
      let new_width = ((f64::from(width) * factor).round() as u32).max(1);
      let new_height = ((f64::from(height) * factor).round() as u32).max(1);
      if (new_width, new_height) == (width, height) {
        return (pixels, false);
      }
      pixels.resize_exact(new_width, new_height, FilterType::Triangle)
    }
  };

  let sampled = scaled.dimensions() != (width, height);
  (scaled, sampled)
}
