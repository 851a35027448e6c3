//! Transport boundary: the abstract call factory and its default
//! `ureq`-backed implementation.
//!
//! The pipeline never talks to an HTTP client directly; it hands a
//! [`HttpRequest`] (URL, headers, cache-control directive) to a
//! [`CallFactory`] and receives a complete [`HttpResponse`]. The
//! response reports whether it was served from a transport-level cache
//! so provenance can be tagged correctly.

use crate::error::{Error, Result};
use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

/// Default User-Agent string used by the default caller
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36 imagepipe/0.1";

const MAX_REDIRECTS: usize = 10;

/// Ordered list of HTTP header name/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
  pub fn new() -> Self {
    Self::default()
  }

  /// Appends a header, keeping any existing values under the same name.
  pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
    self.0.push((name.into(), value.into()));
  }

  /// Replaces every value under `name` with a single value.
  pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    self.0.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
    self.0.push((name, value.into()));
  }

  /// First value under `name`, compared case-insensitively.
  pub fn get(&self, name: &str) -> Option<&str> {
    self
      .0
      .iter()
      .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
      .map(|(_, value)| value.as_str())
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn into_pairs(self) -> Vec<(String, String)> {
    self.0
  }
}

impl From<Vec<(String, String)>> for Headers {
  fn from(pairs: Vec<(String, String)>) -> Self {
    Self(pairs)
  }
}

/// Cache-control directive handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheControl {
  /// Bypass any transport-level cache when reading.
  pub no_cache: bool,
  /// Forbid the transport from storing the response.
  pub no_store: bool,
  /// Serve only from the transport-level cache; no network I/O.
  pub only_if_cached: bool,
}

impl CacheControl {
  /// Default transport caching.
  pub const DEFAULT: CacheControl = CacheControl {
    no_cache: false,
    no_store: false,
    only_if_cached: false,
  };

  /// Bypass the transport cache but allow it to store the response.
  pub const FORCE_NETWORK: CacheControl = CacheControl {
    no_cache: true,
    no_store: false,
    only_if_cached: false,
  };

  /// Bypass the transport cache and forbid storing the response.
  pub const FORCE_NETWORK_NO_STORE: CacheControl = CacheControl {
    no_cache: true,
    no_store: true,
    only_if_cached: false,
  };

  /// Serve from the transport cache only; never touch the network.
  pub const TRANSPORT_CACHE_ONLY: CacheControl = CacheControl {
    no_cache: false,
    no_store: false,
    only_if_cached: true,
  };

  /// Renders the directive as a `Cache-Control` header value.
  pub fn header_value(&self) -> Option<String> {
    let mut parts = Vec::new();
    if self.no_cache {
      parts.push("no-cache");
    }
    if self.no_store {
      parts.push("no-store");
    }
    if self.only_if_cached {
      parts.push("only-if-cached");
    }
    if parts.is_empty() {
      None
    } else {
      Some(parts.join(", "))
    }
  }
}

/// One request handed to the transport.
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub url: String,
  pub headers: Headers,
  pub cache_control: CacheControl,
}

/// One complete response from the transport.
#[derive(Debug)]
pub struct HttpResponse {
  pub status: u16,
  pub headers: Headers,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  /// Whether the transport served this from its own cache rather than
  /// performing real network I/O.
  pub from_cache: bool,
  /// Unix millis at which the request was sent.
  pub sent_at: u64,
  /// Unix millis at which the response was received.
  pub received_at: u64,
}

impl HttpResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Abstract capability of executing an HTTP call.
///
/// Implementations must be `Send + Sync` so a single factory can serve
/// every concurrent request.
pub trait CallFactory: Send + Sync {
  fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

pub(crate) fn now_millis() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis() as u64)
    .unwrap_or(0)
}

/// Default transport over `ureq`.
///
/// `ureq` maintains no response cache, so `only-if-cached` requests are
/// answered with a synthetic 504 without touching the network, and
/// `from_cache` is always `false` for real responses.
#[derive(Debug, Clone)]
pub struct UreqCaller {
  timeout: Duration,
  user_agent: String,
  max_size: usize,
}

impl UreqCaller {
  pub fn new() -> Self {
    Self::default()
  }

  /// Set the request timeout
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// Set the User-Agent header
  pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
    self.user_agent = user_agent.into();
    self
  }

  /// Set the maximum response size in bytes
  pub fn with_max_size(mut self, max_size: usize) -> Self {
    self.max_size = max_size;
    self
  }
}

impl Default for UreqCaller {
  fn default() -> Self {
    Self {
      timeout: Duration::from_secs(30),
      user_agent: DEFAULT_USER_AGENT.to_string(),
      max_size: 50 * 1024 * 1024,
    }
  }
}

impl CallFactory for UreqCaller {
  fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
    let sent_at = now_millis();

    if request.cache_control.only_if_cached {
      // No transport cache to satisfy this from.
      return Ok(HttpResponse {
        status: 504,
        headers: Headers::new(),
        content_type: None,
        body: Vec::new(),
        from_cache: false,
        sent_at,
        received_at: now_millis(),
      });
    }

    let config = ureq::Agent::config_builder()
      .timeout_global(Some(self.timeout))
      .build();
    let agent: ureq::Agent = config.into();

    let mut current = request.url.clone();
    for _ in 0..MAX_REDIRECTS {
      let mut call = agent.get(&current).header("User-Agent", &self.user_agent);
      for (name, value) in request.headers.iter() {
        call = call.header(name, value);
      }
      if let Some(directive) = request.cache_control.header_value() {
        call = call.header("Cache-Control", &directive);
      }

      let mut response = call
        .call()
        .map_err(|e| Error::Io(io::Error::other(e.to_string())))?;

      let status = response.status().as_u16();
      if (300..400).contains(&status) {
        if let Some(location) = response.headers().get("location").and_then(|h| h.to_str().ok()) {
          current = Url::parse(&current)
            .ok()
            .and_then(|base| base.join(location).ok())
            .map(|u| u.to_string())
            .unwrap_or_else(|| location.to_string());
          continue;
        }
      }

      let mut headers = Headers::new();
      for (name, value) in response.headers() {
        if let Ok(value) = value.to_str() {
          headers.add(name.as_str(), value);
        }
      }
      let content_type = headers.get("content-type").map(|s| s.to_string());

      let body = response
        .body_mut()
        .with_config()
        .limit(self.max_size as u64)
        .read_to_vec()
        .map_err(|e| Error::Io(e.into_io()))?;

      return Ok(HttpResponse {
        status,
        headers,
        content_type,
        body,
        from_cache: false,
        sent_at,
        received_at: now_millis(),
      });
    }

    Err(Error::Io(io::Error::other("too many redirects")))
  }
}
