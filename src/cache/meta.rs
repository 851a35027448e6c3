//! Metadata sidecar record stored next to each disk-cache entry.
//!
//! The record captures when the request was sent, when the response was
//! received, and the response headers in their original order, using a
//! line-oriented text layout:
//!
//! ```text
//! <sent-timestamp-millis>
//! <received-timestamp-millis>
//! <header-count>
//! name: value        (repeated header-count times)
//! ```
//!
//! Round-trips are exact and order-preserving; a header count that does
//! not match the number of header lines is treated as corruption.

use crate::error::CacheError;

/// Side-channel record for one disk-cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntryMetadata {
  /// Unix millis at which the originating request was sent.
  pub sent_at: u64,
  /// Unix millis at which the response was received.
  pub received_at: u64,
  /// Response headers, order-preserving.
  pub headers: Vec<(String, String)>,
}

impl EntryMetadata {
  pub fn new(sent_at: u64, received_at: u64, headers: Vec<(String, String)>) -> Self {
    Self {
      sent_at,
      received_at,
      headers,
    }
  }

  /// First header value under `name`, compared case-insensitively.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(key, _)| key.eq_ignore_ascii_case(name))
      .map(|(_, value)| value.as_str())
  }

  /// Content-Type header, if the response carried one.
  pub fn content_type(&self) -> Option<&str> {
    self.header("content-type")
  }

  /// Serializes the record into the line-oriented sidecar layout.
  pub fn to_bytes(&self) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(&self.sent_at.to_string());
    out.push('\n');
    out.push_str(&self.received_at.to_string());
    out.push('\n');
    out.push_str(&self.headers.len().to_string());
    out.push('\n');
    for (name, value) in &self.headers {
      out.push_str(name);
      out.push_str(": ");
      out.push_str(value);
      out.push('\n');
    }
    out.into_bytes()
  }

  /// Parses a sidecar record, verifying the declared header count.
  pub fn parse(bytes: &[u8]) -> Result<Self, CacheError> {
    let text = std::str::from_utf8(bytes).map_err(|_| CacheError::CorruptMetadata {
      reason: "metadata is not valid UTF-8".to_string(),
    })?;

    let mut lines = text.lines();
    let sent_at = parse_u64_line(lines.next(), "sent timestamp")?;
    let received_at = parse_u64_line(lines.next(), "received timestamp")?;
    let count = parse_u64_line(lines.next(), "header count")? as usize;

    let mut headers = Vec::with_capacity(count);
    for index in 0..count {
      let line = lines.next().ok_or_else(|| CacheError::CorruptMetadata {
        reason: format!("expected {count} headers, found {index}"),
      })?;
      let (name, value) = line.split_once(':').ok_or_else(|| CacheError::CorruptMetadata {
        reason: format!("malformed header line: {line:?}"),
      })?;
      headers.push((name.to_string(), value.strip_prefix(' ').unwrap_or(value).to_string()));
    }

    if lines.next().is_some() {
      return Err(CacheError::CorruptMetadata {
        reason: format!("trailing lines after {count} declared headers"),
      });
    }

    Ok(Self {
      sent_at,
      received_at,
      headers,
    })
  }
}

fn parse_u64_line(line: Option<&str>, what: &str) -> Result<u64, CacheError> {
  let line = line.ok_or_else(|| CacheError::CorruptMetadata {
    reason: format!("missing {what} line"),
  })?;
  line.trim().parse::<u64>().map_err(|_| CacheError::CorruptMetadata {
    reason: format!("invalid {what}: {line:?}"),
  })
}
