//! Display target boundary.

use crate::decode::DecodedImage;
use crate::error::Error;
use crate::fetch::Provenance;
use std::sync::Arc;

/// Attachment state of a display target.
///
/// Hardware bitmaps cannot render on a non-accelerated surface, so the
/// eligibility policy consults this per request — attachment state is
/// mutable across a cache entry's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
  /// Not currently attached to a rendering surface.
  Detached,
  /// Attached to a surface.
  Attached { hardware_accelerated: bool },
}

/// Receiver of a request's terminal result.
pub trait Target: Send + Sync {
  /// The request started; a placeholder may be shown.
  fn on_start(&self) {}

  /// The request produced an image.
  fn on_success(&self, _image: &Arc<DecodedImage>, _provenance: Provenance) {}

  /// The request terminated with an error.
  fn on_error(&self, _error: &Error) {}

  /// Current attachment state, consulted by the hardware policy.
  fn state(&self) -> TargetState {
    TargetState::Detached
  }
}
