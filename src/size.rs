//! Target size value types.

/// One axis of a requested target size.
///
/// `Undefined` means the caller did not constrain this axis; the decoded
/// image keeps its intrinsic extent there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
  /// Exact pixel count for this axis.
  Pixels(u32),
  /// No constraint on this axis.
  Undefined,
}

impl Dimension {
  /// Returns the pixel count, or `None` for an undefined axis.
  pub fn pixels(self) -> Option<u32> {
    match self {
      Dimension::Pixels(px) => Some(px),
      Dimension::Undefined => None,
    }
  }

  pub fn is_defined(self) -> bool {
    matches!(self, Dimension::Pixels(_))
  }
}

/// Requested target size for a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
  pub width: Dimension,
  pub height: Dimension,
}

impl Size {
  /// The unconstrained size: the image is decoded at its intrinsic extent.
  pub const ORIGINAL: Size = Size {
    width: Dimension::Undefined,
    height: Dimension::Undefined,
  };

  /// A fully specified pixel size.
  pub fn new(width: u32, height: u32) -> Self {
    Self {
      width: Dimension::Pixels(width),
      height: Dimension::Pixels(height),
    }
  }

  /// Whether both axes carry an exact pixel count.
  pub fn is_fully_specified(&self) -> bool {
    self.width.is_defined() && self.height.is_defined()
  }

  /// Total pixel count when both axes are defined.
  pub fn pixel_count(&self) -> Option<u64> {
    match (self.width.pixels(), self.height.pixels()) {
      (Some(w), Some(h)) => Some(u64::from(w) * u64::from(h)),
      _ => None,
    }
  }
}

impl Default for Size {
  fn default() -> Self {
    Size::ORIGINAL
  }
}

/// How a decoded image is scaled into the target size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scale {
  /// Scale so the whole image fits inside the target (letterbox).
  #[default]
  Fit,
  /// Scale so the image covers the target (crop overflow).
  Fill,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn original_size_has_no_defined_axis() {
    assert!(!Size::ORIGINAL.is_fully_specified());
    assert_eq!(Size::ORIGINAL.pixel_count(), None);
  }

  #[test]
  fn pixel_count_multiplies_axes() {
    assert_eq!(Size::new(100, 50).pixel_count(), Some(5000));
  }

  #[test]
  fn partially_specified_size_is_not_full() {
    let size = Size {
      width: Dimension::Pixels(10),
      height: Dimension::Undefined,
    };
    assert!(!size.is_fully_specified());
    assert_eq!(size.width.pixels(), Some(10));
  }
}
