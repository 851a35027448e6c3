//! Options resolution: normalizes a raw request into immutable options.
//!
//! Runs on the latency-sensitive request path, so every decision here is
//! a pure, non-blocking function of the request, the resolved size, and
//! two collaborators (connectivity, hardware policy). Every deviation
//! from the raw request is materialized into the resolved options —
//! downstream stages never re-derive policy.

use crate::format::PixelFormat;
use crate::hardware::HardwarePolicy;
use crate::options::{CachePolicy, Options};
use crate::request::ImageRequest;
use crate::size::{Scale, Size};
use std::sync::Arc;

/// Connectivity collaborator.
pub trait NetworkObserver: Send + Sync {
  fn is_online(&self) -> bool;
}

/// Default observer for hosts without connectivity tracking.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl NetworkObserver for AlwaysOnline {
  fn is_online(&self) -> bool {
    true
  }
}

/// Resolves requests into [`Options`].
#[derive(Clone)]
pub struct OptionsResolver {
  connectivity: Arc<dyn NetworkObserver>,
  hardware: HardwarePolicy,
}

impl Default for OptionsResolver {
  fn default() -> Self {
    Self::new(Arc::new(AlwaysOnline), HardwarePolicy::default())
  }
}

impl OptionsResolver {
  pub fn new(connectivity: Arc<dyn NetworkObserver>, hardware: HardwarePolicy) -> Self {
    Self {
      connectivity,
      hardware,
    }
  }

  pub fn hardware(&self) -> &HardwarePolicy {
    &self.hardware
  }

  /// Resolves `request` against the final target `size`.
  ///
  /// Decision rules, in order, each independent:
  /// 1. pixel-format fallback (transform allowlist, hardware allocation),
  /// 2. offline network-policy override,
  /// 3. scale resolution for undefined dimensions,
  /// 4. RGB565 eligibility.
  pub fn resolve(&self, request: &ImageRequest, size: Size) -> Options {
    let mut format = request.format;
    if !request.transformations.is_empty() && !format.supports_transformations() {
      log::debug!(
        "format {:?} is not transform-safe; falling back to Rgba8888",
        format
      );
      format = PixelFormat::Rgba8888;
    }
    if format.is_hardware() && !self.hardware.can_allocate(request, size) {
      log::debug!("hardware bitmap not allocatable; falling back to Rgba8888");
      format = PixelFormat::Rgba8888;
    }

    let network_cache_policy = if self.connectivity.is_online() {
      request.network_cache_policy
    } else {
      // Offline: no network attempt may be made, regardless of request
      // configuration.
      CachePolicy::DISABLED
    };

    let scale = if size.is_fully_specified() {
      request.scale
    } else {
      // Undefined dimensions cannot support fill-to-crop semantics.
      Scale::Fit
    };

    let allow_rgb565 =
      request.allow_rgb565 && request.transformations.is_empty() && format != PixelFormat::Alpha8;

    Options::new(size)
      .with_scale(scale)
      .with_allow_inexact_size(request.allow_inexact_size)
      .with_disk_cache_key(request.disk_cache_key.clone())
      .with_memory_cache_policy(request.memory_cache_policy)
      .with_disk_cache_policy(request.disk_cache_policy)
      .with_network_cache_policy(network_cache_policy)
      .with_extras(request.extras.clone())
      .with_format(format)
      .with_allow_rgb565(allow_rgb565)
      .with_headers(request.headers.clone())
  }

  /// Downgrades a hardware format when the current execution context
  /// cannot allocate one.
  ///
  /// Idempotent, and does not re-validate transform eligibility — that
  /// was settled at resolve time.
  pub fn adjust_for_worker_thread(&self, options: Options) -> Options {
    if options.format().is_hardware() && !self.hardware.allocator().allow_worker_thread() {
      options.with_format(PixelFormat::Rgba8888)
    } else {
      options
    }
  }
}
