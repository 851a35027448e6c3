//! Fetcher for inline `data:` URIs (base64 or percent-encoded).

use crate::error::{Error, Result};
use crate::fetch::{FetchResult, Fetcher, FetcherFactory, Provenance, SourceResult};
use crate::lifecycle::CancellationToken;
use crate::options::Options;
use crate::request::ImageSource;
use base64::Engine;
use std::sync::Arc;

/// Builds [`Fetcher`]s for `data:` URIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataUriFetcherFactory;

impl FetcherFactory for DataUriFetcherFactory {
  fn create(&self, source: &ImageSource, _options: &Options) -> Option<Box<dyn Fetcher>> {
    let ImageSource::Uri(uri) = source else {
      return None;
    };
    if !uri.starts_with("data:") {
      return None;
    }
    Some(Box::new(DataUriFetcher { uri: uri.clone() }))
  }
}

struct DataUriFetcher {
  uri: String,
}

impl Fetcher for DataUriFetcher {
  fn fetch(&self, token: &CancellationToken) -> Result<FetchResult> {
    token.check()?;
    let (bytes, mime) = decode_data_uri(&self.uri)?;
    Ok(FetchResult::Source(SourceResult {
      bytes: Arc::new(bytes),
      mime,
      provenance: Provenance::Memory,
    }))
  }
}

fn invalid(reason: impl Into<String>) -> Error {
  Error::UnsupportedSource(format!("invalid data URI: {}", reason.into()))
}

/// Decodes a `data:` URI into bytes and an optional media type.
fn decode_data_uri(uri: &str) -> Result<(Vec<u8>, Option<String>)> {
  let rest = uri
    .strip_prefix("data:")
    .ok_or_else(|| invalid("missing data: prefix"))?;
  let comma = rest.find(',').ok_or_else(|| invalid("missing comma"))?;

  let header = &rest[..comma];
  let payload = &rest[comma + 1..];

  let is_base64 = header.ends_with(";base64");
  let media_type = header
    .split(';')
    .next()
    .filter(|s| !s.is_empty() && s.contains('/'))
    .map(|s| s.to_string());

  let bytes = if is_base64 {
    base64::engine::general_purpose::STANDARD
      .decode(payload)
      .map_err(|e| invalid(format!("bad base64: {e}")))?
  } else {
    percent_decode(payload)?
  };

  Ok((bytes, media_type))
}

fn percent_decode(input: &str) -> Result<Vec<u8>> {
  let bytes = input.as_bytes();
  let mut out = Vec::with_capacity(bytes.len());
  let mut i = 0;

  while i < bytes.len() {
    match bytes[i] {
      b'%' => {
        if i + 2 >= bytes.len() {
          return Err(invalid("incomplete percent-escape"));
        }
        let hi = (bytes[i + 1] as char).to_digit(16);
        let lo = (bytes[i + 2] as char).to_digit(16);
        match (hi, lo) {
          (Some(hi), Some(lo)) => {
            out.push(((hi << 4) | lo) as u8);
            i += 3;
          }
          _ => return Err(invalid("invalid percent-escape")),
        }
      }
      b'+' => {
        out.push(b' ');
        i += 1;
      }
      other => {
        out.push(other);
        i += 1;
      }
    }
  }

  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn base64_payload_decodes_with_media_type() {
    let (bytes, mime) = decode_data_uri("data:image/png;base64,aGVsbG8=").unwrap();
    assert_eq!(bytes, b"hello");
    assert_eq!(mime.as_deref(), Some("image/png"));
  }

  #[test]
  fn percent_payload_decodes() {
    let (bytes, mime) = decode_data_uri("data:text/plain,hello%20world").unwrap();
    assert_eq!(bytes, b"hello world");
    assert_eq!(mime.as_deref(), Some("text/plain"));
  }

  #[test]
  fn missing_media_type_is_none() {
    let (bytes, mime) = decode_data_uri("data:,hello").unwrap();
    assert_eq!(bytes, b"hello");
    assert_eq!(mime, None);
  }

  #[test]
  fn missing_comma_is_invalid() {
    assert!(decode_data_uri("data:image/png;base64").is_err());
  }

  #[test]
  fn factory_claims_only_data_uris() {
    let options = Options::new(crate::size::Size::ORIGINAL);
    assert!(
      DataUriFetcherFactory
        .create(&ImageSource::Uri("data:,x".into()), &options)
        .is_some()
    );
    assert!(
      DataUriFetcherFactory
        .create(&ImageSource::Uri("https://example.com".into()), &options)
        .is_none()
    );
  }

  #[test]
  fn fetch_reports_memory_provenance() {
    let options = Options::new(crate::size::Size::ORIGINAL);
    let fetcher = DataUriFetcherFactory
      .create(&ImageSource::Uri("data:image/png;base64,aGk=".into()), &options)
      .unwrap();
    match fetcher.fetch(&CancellationToken::new()).unwrap() {
      FetchResult::Source(source) => {
        assert_eq!(source.provenance, Provenance::Memory);
        assert_eq!(source.bytes.as_slice(), b"hi");
      }
      FetchResult::Image(_) => panic!("expected bytes"),
    }
  }
}
