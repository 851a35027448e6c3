//! Hardware-bitmap eligibility policy.
//!
//! Hardware bitmaps are a scarce, allocation-context-sensitive resource:
//! they require an accelerated rendering surface and, on the default
//! allocator, a main-thread allocation below a pixel budget. Eligibility
//! is therefore re-validated per request, including when reusing cached
//! decode output, because target attachment state is mutable across the
//! cache's lifetime.

use crate::cache::memory::CachedValue;
use crate::format::PixelFormat;
use crate::mainthread;
use crate::request::ImageRequest;
use crate::size::Size;
use crate::target::TargetState;
use std::sync::Arc;

/// Platform capability service deciding whether a hardware allocation is
/// currently permitted.
pub trait HardwareAllocator: Send + Sync {
  /// Whether a hardware bitmap of `size` may be allocated from the
  /// designated main thread.
  fn allow_main_thread(&self, size: Size) -> bool;

  /// Whether hardware bitmaps may be allocated from worker threads.
  fn allow_worker_thread(&self) -> bool;
}

/// Conservative default allocator.
///
/// Permits hardware allocation only on the designated main thread and
/// only for fully specified sizes within the pixel budget. Embedders
/// with platform knowledge substitute their own implementation.
#[derive(Debug, Clone)]
pub struct DefaultHardwareAllocator {
  max_pixels: u64,
}

impl Default for DefaultHardwareAllocator {
  fn default() -> Self {
    Self {
      max_pixels: 16_000_000,
    }
  }
}

impl DefaultHardwareAllocator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
    self.max_pixels = max_pixels;
    self
  }
}

impl HardwareAllocator for DefaultHardwareAllocator {
  fn allow_main_thread(&self, size: Size) -> bool {
    size.pixel_count().is_some_and(|pixels| pixels <= self.max_pixels)
  }

  fn allow_worker_thread(&self) -> bool {
    false
  }
}

/// Per-request hardware eligibility decisions.
#[derive(Clone)]
pub struct HardwarePolicy {
  allocator: Arc<dyn HardwareAllocator>,
}

impl Default for HardwarePolicy {
  fn default() -> Self {
    Self::new(Arc::new(DefaultHardwareAllocator::default()))
  }
}

impl HardwarePolicy {
  pub fn new(allocator: Arc<dyn HardwareAllocator>) -> Self {
    Self { allocator }
  }

  pub fn allocator(&self) -> &Arc<dyn HardwareAllocator> {
    &self.allocator
  }

  /// Whether `format` is legal for this request's target.
  ///
  /// Software formats are always eligible. A hardware format requires
  /// the request to allow hardware bitmaps and the target to not be
  /// attached to a non-accelerated surface.
  pub fn is_eligible(&self, request: &ImageRequest, format: PixelFormat) -> bool {
    if !format.is_hardware() {
      return true;
    }
    if !request.allow_hardware {
      return false;
    }
    match request.target.as_ref().map(|target| target.state()) {
      Some(TargetState::Attached {
        hardware_accelerated: false,
      }) => false,
      _ => true,
    }
  }

  /// Whether a hardware bitmap of `size` may actually be allocated for
  /// this request in the current execution context.
  pub fn can_allocate(&self, request: &ImageRequest, size: Size) -> bool {
    if !self.is_eligible(request, request.format) {
      return false;
    }
    if mainthread::is_main_thread() {
      self.allocator.allow_main_thread(size)
    } else {
      self.allocator.allow_worker_thread()
    }
  }

  /// Whether a previously cached decode result may be returned for a
  /// new request without violating hardware constraints.
  pub fn is_cached_value_reusable(&self, request: &ImageRequest, value: &CachedValue) -> bool {
    self.is_eligible(request, value.image.format())
  }
}
