//! Error types for the image pipeline
//!
//! This module provides error types for all pipeline stages:
//! - Transport errors (HTTP status failures)
//! - Cache errors (corruption, editor conflicts)
//! - Decode errors (unsupported or oversized input)
//! - Request configuration and execution-context violations
//!
//! All errors use the `thiserror` crate for minimal boilerplate and
//! proper error trait implementations.

use thiserror::Error;

/// Result type alias for pipeline operations
///
/// This is a convenience type that uses our Error type as the error variant.
///
/// # Examples
///
/// ```
/// use imagepipe::Result;
///
/// fn resolve_reference(reference: &str) -> Result<()> {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the image pipeline
///
/// This enum covers all possible errors that can occur while resolving,
/// fetching, caching, or decoding an image. Each variant either wraps a
/// more specific error type for that subsystem or names a terminal
/// condition of the request itself.
#[derive(Error, Debug)]
pub enum Error {
  /// Transport-level failure with a typed HTTP status
  #[error("HTTP error: {0}")]
  Http(#[from] HttpError),

  /// Disk or memory cache failure
  #[error("Cache error: {0}")]
  Cache(#[from] CacheError),

  /// Image decoding failure
  #[error("Decode error: {0}")]
  Decode(#[from] DecodeError),

  /// The request disables every data source it could be served from.
  ///
  /// Raised when both the disk-read and network-read cache policies are
  /// disabled: there is nowhere to obtain bytes from, so the request
  /// fails deterministically instead of hitting the transport.
  #[error("No available data source: disk and network reads are both disabled")]
  NoDataSource,

  /// Blocking network I/O was attempted from the designated main thread
  #[error("Network fetch attempted on the main thread")]
  NetworkOnMainThread,

  /// No configured fetcher accepted the (mapped) source reference
  #[error("Unsupported image source: {0}")]
  UnsupportedSource(String),

  /// The request was cancelled before completion
  #[error("Request cancelled")]
  Cancelled,

  /// I/O error (file reading, network, etc.)
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  /// Generic error for miscellaneous issues
  #[error("{0}")]
  Other(String),
}

/// A non-success transport response.
///
/// The response body is always released before this error is raised.
#[derive(Error, Debug, Clone)]
#[error("HTTP {status} for '{url}'")]
pub struct HttpError {
  /// HTTP status code of the failed response
  pub status: u16,
  /// URL the request was issued against
  pub url: String,
}

/// Errors that occur while reading or writing cache entries
///
/// Corrupt entries are never silently served: the entry is removed and
/// the error propagates so the caller can re-fetch.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
  /// Entry metadata failed to parse
  #[error("Corrupt cache metadata: {reason}")]
  CorruptMetadata { reason: String },

  /// Entry data stream was missing or unreadable after commit
  #[error("Corrupt cache entry for key '{key}': {reason}")]
  CorruptEntry { key: String, reason: String },

  /// Editor committed without a data stream
  #[error("Cache editor for key '{key}' committed without data")]
  EmptyEditor { key: String },
}

/// Errors that occur during image decoding
#[derive(Error, Debug, Clone)]
pub enum DecodeError {
  /// Input bytes are not a recognized image format
  #[error("Unrecognized image data{}", .mime.as_deref().map(|m| format!(" (content type '{m}')")).unwrap_or_default())]
  Unrecognized { mime: Option<String> },

  /// The decoder rejected the input
  #[error("Failed to decode image: {reason}")]
  DecodeFailed { reason: String },

  /// Decoded dimensions exceed the configured limits
  #[error("Image too large: {width}x{height} exceeds decode limits")]
  TooLarge { width: u32, height: u32 },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn http_error_display_contains_status_and_url() {
    let error = HttpError {
      status: 404,
      url: "https://example.com/img.png".to_string(),
    };
    let display = format!("{}", error);
    assert!(display.contains("404"));
    assert!(display.contains("example.com"));
  }

  #[test]
  fn cache_error_corrupt_metadata() {
    let error = CacheError::CorruptMetadata {
      reason: "header count mismatch".to_string(),
    };
    assert!(format!("{}", error).contains("header count mismatch"));
  }

  #[test]
  fn decode_error_unrecognized_with_mime() {
    let error = DecodeError::Unrecognized {
      mime: Some("text/html".to_string()),
    };
    assert!(format!("{}", error).contains("text/html"));

    let error = DecodeError::Unrecognized { mime: None };
    assert!(format!("{}", error).contains("Unrecognized"));
  }

  #[test]
  fn error_from_http_error() {
    let http = HttpError {
      status: 500,
      url: "https://example.com".to_string(),
    };
    let error: Error = http.into();
    assert!(matches!(error, Error::Http(_)));
  }

  #[test]
  fn error_from_io_error() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let error: Error = io_error.into();
    assert!(matches!(error, Error::Io(_)));
  }

  #[test]
  fn no_data_source_names_both_policies() {
    let display = format!("{}", Error::NoDataSource);
    assert!(display.contains("disk"));
    assert!(display.contains("network"));
  }

  #[test]
  fn error_trait_implemented() {
    let error = Error::Cancelled;
    let _: &dyn std::error::Error = &error;
  }
}
