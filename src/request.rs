//! Image requests: the user-facing description of what to load.

use crate::extras::Extras;
use crate::fetch::call::Headers;
use crate::format::PixelFormat;
use crate::lifecycle::Lifecycle;
use crate::options::CachePolicy;
use crate::size::{Scale, Size};
use crate::target::Target;
use crate::transform::Transformation;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

/// A reference to an image, before and after mapper normalization.
#[derive(Debug, Clone)]
pub enum ImageSource {
  /// A generic URI string; mappers rewrite these into richer forms.
  Uri(String),
  /// A parsed network URL.
  Url(Url),
  /// A local file path.
  File(PathBuf),
  /// Raw in-memory bytes.
  Bytes(Arc<Vec<u8>>),
}

impl ImageSource {
  /// Canonical identity string, used for cache keys.
  pub fn identity(&self) -> String {
    match self {
      ImageSource::Uri(uri) => uri.clone(),
      ImageSource::Url(url) => url.to_string(),
      ImageSource::File(path) => path.to_string_lossy().into_owned(),
      ImageSource::Bytes(bytes) => {
        let mut hasher = Sha256::new();
        hasher.update(bytes.as_slice());
        let mut identity = String::with_capacity(70);
        identity.push_str("bytes:");
        for byte in hasher.finalize() {
          identity.push_str(&format!("{byte:02x}"));
        }
        identity
      }
    }
  }
}

impl From<&str> for ImageSource {
  fn from(value: &str) -> Self {
    ImageSource::Uri(value.to_string())
  }
}

impl From<String> for ImageSource {
  fn from(value: String) -> Self {
    ImageSource::Uri(value)
  }
}

impl From<Url> for ImageSource {
  fn from(value: Url) -> Self {
    ImageSource::Url(value)
  }
}

impl From<PathBuf> for ImageSource {
  fn from(value: PathBuf) -> Self {
    ImageSource::File(value)
  }
}

/// A single image-loading request.
///
/// Constructed with [`ImageRequest::new`] and refined with `with_*`
/// methods; the raw request stays user-shaped and is normalized into
/// immutable [`crate::options::Options`] by the resolver.
#[derive(Clone)]
pub struct ImageRequest {
  pub source: ImageSource,
  pub size: Size,
  pub scale: Scale,
  pub allow_inexact_size: bool,
  pub format: PixelFormat,
  pub allow_hardware: bool,
  pub allow_rgb565: bool,
  pub memory_cache_policy: CachePolicy,
  pub disk_cache_policy: CachePolicy,
  pub network_cache_policy: CachePolicy,
  pub disk_cache_key: Option<String>,
  pub transformations: Vec<Arc<dyn Transformation>>,
  pub headers: Headers,
  pub extras: Extras,
  pub target: Option<Arc<dyn Target>>,
  pub lifecycle: Option<Arc<dyn Lifecycle>>,
}

impl ImageRequest {
  pub fn new(source: impl Into<ImageSource>) -> Self {
    Self {
      source: source.into(),
      size: Size::ORIGINAL,
      scale: Scale::Fit,
      allow_inexact_size: true,
      format: PixelFormat::Rgba8888,
      allow_hardware: true,
      allow_rgb565: false,
      memory_cache_policy: CachePolicy::ENABLED,
      disk_cache_policy: CachePolicy::ENABLED,
      network_cache_policy: CachePolicy::ENABLED,
      disk_cache_key: None,
      transformations: Vec::new(),
      headers: Headers::new(),
      extras: Extras::new(),
      target: None,
      lifecycle: None,
    }
  }

  pub fn with_size(mut self, size: Size) -> Self {
    self.size = size;
    self
  }

  pub fn with_scale(mut self, scale: Scale) -> Self {
    self.scale = scale;
    self
  }

  pub fn with_exact_size(mut self) -> Self {
    self.allow_inexact_size = false;
    self
  }

  pub fn with_format(mut self, format: PixelFormat) -> Self {
    self.format = format;
    self
  }

  pub fn with_allow_hardware(mut self, allow: bool) -> Self {
    self.allow_hardware = allow;
    self
  }

  pub fn with_allow_rgb565(mut self, allow: bool) -> Self {
    self.allow_rgb565 = allow;
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

  pub fn with_disk_cache_key(mut self, key: impl Into<String>) -> Self {
    self.disk_cache_key = Some(key.into());
    self
  }

  pub fn with_transformation(mut self, transformation: Arc<dyn Transformation>) -> Self {
    self.transformations.push(transformation);
    self
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.add(name, value);
    self
  }

  pub fn with_extras(mut self, extras: Extras) -> Self {
    self.extras = extras;
    self
  }

  pub fn with_target(mut self, target: Arc<dyn Target>) -> Self {
    self.target = Some(target);
    self
  }

  pub fn with_lifecycle(mut self, lifecycle: Arc<dyn Lifecycle>) -> Self {
    self.lifecycle = Some(lifecycle);
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_allow_everything_at_original_size() {
    let request = ImageRequest::new("https://example.com/a.png");
    assert_eq!(request.size, Size::ORIGINAL);
    assert!(request.allow_hardware);
    assert!(!request.allow_rgb565);
    assert_eq!(request.network_cache_policy, CachePolicy::ENABLED);
    assert!(matches!(request.source, ImageSource::Uri(_)));
  }

  #[test]
  fn identity_distinguishes_source_kinds() {
    let uri = ImageSource::Uri("file:///tmp/a.png".to_string());
    let file = ImageSource::File(PathBuf::from("/tmp/a.png"));
    assert_ne!(uri.identity(), file.identity());
  }

  #[test]
  fn byte_sources_share_identity_by_content() {
    let a = ImageSource::Bytes(Arc::new(vec![1, 2, 3]));
    let b = ImageSource::Bytes(Arc::new(vec![1, 2, 3]));
    let c = ImageSource::Bytes(Arc::new(vec![9, 9, 9]));
    assert_eq!(a.identity(), b.identity());
    assert_ne!(a.identity(), c.identity());
  }
}
