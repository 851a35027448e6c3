//! Resolved, immutable per-request options.
//!
//! An [`Options`] value is produced once per request by the
//! [`crate::resolver`] and owned by the fetch/decode operation it
//! configures. It is never mutated; every `with_*` method returns a new
//! copy. Deviations the resolver makes from the raw request (format
//! fallbacks, disabled RGB565, offline network policy) are materialized
//! here so downstream stages never re-derive them.

use crate::extras::{ExtraKey, Extras};
use crate::fetch::call::Headers;
use crate::format::PixelFormat;
use crate::size::{Scale, Size};

/// Read/write switches for one cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
  pub read: bool,
  pub write: bool,
}

impl CachePolicy {
  pub const ENABLED: CachePolicy = CachePolicy {
    read: true,
    write: true,
  };
  pub const READ_ONLY: CachePolicy = CachePolicy {
    read: true,
    write: false,
  };
  pub const WRITE_ONLY: CachePolicy = CachePolicy {
    read: false,
    write: true,
  };
  pub const DISABLED: CachePolicy = CachePolicy {
    read: false,
    write: false,
  };
}

impl Default for CachePolicy {
  fn default() -> Self {
    CachePolicy::ENABLED
  }
}

/// Typed extras keys materialized by the resolver.
pub mod keys {
  use super::*;

  /// Resolved pixel format for the decode stage.
  pub static FORMAT: ExtraKey<PixelFormat> = ExtraKey::new("imagepipe.format");
  /// Effective RGB565 permission after eligibility checks.
  pub static ALLOW_RGB565: ExtraKey<bool> = ExtraKey::new("imagepipe.allow_rgb565");
  /// Request headers forwarded to the transport.
  pub static HEADERS: ExtraKey<Headers> = ExtraKey::new("imagepipe.headers");
}

/// Immutable resolved options for a single fetch/decode operation.
#[derive(Debug, Clone)]
pub struct Options {
  size: Size,
  scale: Scale,
  allow_inexact_size: bool,
  disk_cache_key: Option<String>,
  memory_cache_policy: CachePolicy,
  disk_cache_policy: CachePolicy,
  network_cache_policy: CachePolicy,
  extras: Extras,
}

impl Options {
  pub fn new(size: Size) -> Self {
    Self {
      size,
      scale: Scale::Fit,
      allow_inexact_size: true,
      disk_cache_key: None,
      memory_cache_policy: CachePolicy::ENABLED,
      disk_cache_policy: CachePolicy::ENABLED,
      network_cache_policy: CachePolicy::ENABLED,
      extras: Extras::new(),
    }
  }

  pub fn size(&self) -> Size {
    self.size
  }

  pub fn scale(&self) -> Scale {
    self.scale
  }

  pub fn allow_inexact_size(&self) -> bool {
    self.allow_inexact_size
  }

  /// Override for the disk-cache key; the canonical source URL is used
  /// when absent.
  pub fn disk_cache_key(&self) -> Option<&str> {
    self.disk_cache_key.as_deref()
  }

  pub fn memory_cache_policy(&self) -> CachePolicy {
    self.memory_cache_policy
  }

  pub fn disk_cache_policy(&self) -> CachePolicy {
    self.disk_cache_policy
  }

  pub fn network_cache_policy(&self) -> CachePolicy {
    self.network_cache_policy
  }

  pub fn extras(&self) -> &Extras {
    &self.extras
  }

  /// Resolved pixel format; defaults to the universal 32-bit format.
  pub fn format(&self) -> PixelFormat {
    self.extras.get(&keys::FORMAT).unwrap_or_default()
  }

  /// Effective RGB565 permission.
  pub fn allow_rgb565(&self) -> bool {
    self.extras.get(&keys::ALLOW_RGB565).unwrap_or(false)
  }

  /// Headers forwarded to the transport.
  pub fn headers(&self) -> Headers {
    self.extras.get(&keys::HEADERS).unwrap_or_default()
  }

  pub fn with_scale(mut self, scale: Scale) -> Self {
    self.scale = scale;
    self
  }

  pub fn with_allow_inexact_size(mut self, allow: bool) -> Self {
    self.allow_inexact_size = allow;
    self
  }

  pub fn with_disk_cache_key(mut self, key: Option<String>) -> Self {
    self.disk_cache_key = key;
    self
  }

  pub fn with_memory_cache_policy(mut self, policy: CachePolicy) -> Self {
    self.memory_cache_policy = policy;
    self
  }

  pub fn with_disk_cache_policy(mut self, policy: CachePolicy) -> Self {
    self.disk_cache_policy = policy;
    self
  }

  pub fn with_network_cache_policy(mut self, policy: CachePolicy) -> Self {
    self.network_cache_policy = policy;
    self
  }

  pub fn with_extras(mut self, extras: Extras) -> Self {
    self.extras = extras;
    self
  }

  pub fn with_format(mut self, format: PixelFormat) -> Self {
    self.extras = self.extras.with(&keys::FORMAT, format);
    self
  }

  pub fn with_allow_rgb565(mut self, allow: bool) -> Self {
    self.extras = self.extras.with(&keys::ALLOW_RGB565, allow);
    self
  }

  pub fn with_headers(mut self, headers: Headers) -> Self {
    self.extras = self.extras.with(&keys::HEADERS, headers);
    self
  }
}
