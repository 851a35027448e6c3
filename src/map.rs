//! Mapper chain: normalizes heterogeneous source references.
//!
//! Each mapper either claims a reference and rewrites it into another
//! reference type (never into bytes), or declines with `None`. The chain
//! applies the first claiming mapper; a reference no mapper claims
//! passes through unchanged to fetcher selection.

use crate::options::Options;
use crate::request::ImageSource;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

/// Scheme reserved for bundled assets; never treated as a file path.
const ASSET_SCHEME: &str = "asset";

/// One reference-rewriting step.
pub trait Mapper: Send + Sync {
  /// Rewrites `source` into another reference, or declines with `None`.
  fn map(&self, source: &ImageSource, options: &Options) -> Option<ImageSource>;
}

/// Ordered first-applicable-wins mapper chain.
#[derive(Clone, Default)]
pub struct MapperChain {
  mappers: Vec<Arc<dyn Mapper>>,
}

impl MapperChain {
  pub fn new(mappers: Vec<Arc<dyn Mapper>>) -> Self {
    Self { mappers }
  }

  pub fn apply(&self, source: &ImageSource, options: &Options) -> ImageSource {
    for mapper in &self.mappers {
      if let Some(mapped) = mapper.map(source, options) {
        return mapped;
      }
    }
    source.clone()
  }
}

/// Extracts the URI scheme, if syntactically present.
fn uri_scheme(uri: &str) -> Option<&str> {
  let (candidate, _) = uri.split_once(':')?;
  let mut chars = candidate.chars();
  let first = chars.next()?;
  if !first.is_ascii_alphabetic() {
    return None;
  }
  if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-')) {
    Some(candidate)
  } else {
    None
  }
}

/// Treats file-like URIs as local file references.
///
/// A URI is a local file iff its scheme is absent or exactly `file`, it
/// is not the reserved asset scheme, its path is absolute, and it has at
/// least one non-empty path segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileUriMapper;

impl Mapper for FileUriMapper {
  fn map(&self, source: &ImageSource, _options: &Options) -> Option<ImageSource> {
    let ImageSource::Uri(uri) = source else {
      return None;
    };

    let path = match uri_scheme(uri) {
      None => uri.as_str(),
      Some(scheme) if scheme.eq_ignore_ascii_case("file") => {
        uri[scheme.len() + 1..].strip_prefix("//")?
      }
      Some(scheme) if scheme.eq_ignore_ascii_case(ASSET_SCHEME) => return None,
      Some(_) => return None,
    };

    if !path.starts_with('/') {
      return None;
    }
    if !path.split('/').any(|segment| !segment.is_empty()) {
      return None;
    }

    Some(ImageSource::File(PathBuf::from(path)))
  }
}

/// Parses `http`/`https` URIs into structured URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpUriMapper;

impl Mapper for HttpUriMapper {
  fn map(&self, source: &ImageSource, _options: &Options) -> Option<ImageSource> {
    let ImageSource::Uri(uri) = source else {
      return None;
    };
    let scheme = uri_scheme(uri)?;
    if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
      return None;
    }
    Url::parse(uri).ok().map(ImageSource::Url)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::size::Size;

  fn options() -> Options {
    Options::new(Size::ORIGINAL)
  }

  fn map_uri(mapper: &dyn Mapper, uri: &str) -> Option<ImageSource> {
    mapper.map(&ImageSource::Uri(uri.to_string()), &options())
  }

  #[test]
  fn absolute_schemeless_path_maps_to_file() {
    let mapped = map_uri(&FileUriMapper, "/data/images/a.png").expect("claimed");
    assert!(matches!(mapped, ImageSource::File(path) if path == PathBuf::from("/data/images/a.png")));
  }

  #[test]
  fn file_scheme_maps_to_file() {
    let mapped = map_uri(&FileUriMapper, "file:///data/a.png").expect("claimed");
    assert!(matches!(mapped, ImageSource::File(path) if path == PathBuf::from("/data/a.png")));
  }

  #[test]
  fn relative_path_is_not_claimed() {
    assert!(map_uri(&FileUriMapper, "images/a.png").is_none());
  }

  #[test]
  fn asset_scheme_is_reserved() {
    assert!(map_uri(&FileUriMapper, "asset:///logo.png").is_none());
  }

  #[test]
  fn other_schemes_are_not_files() {
    assert!(map_uri(&FileUriMapper, "https://example.com/a.png").is_none());
    assert!(map_uri(&FileUriMapper, "data:image/png;base64,AAAA").is_none());
  }

  #[test]
  fn root_only_path_has_no_segment() {
    assert!(map_uri(&FileUriMapper, "/").is_none());
    assert!(map_uri(&FileUriMapper, "file:///").is_none());
  }

  #[test]
  fn drive_letter_uri_is_not_claimed() {
    // "c" parses as a scheme, and it is neither absent nor "file".
    assert!(map_uri(&FileUriMapper, "c:\\images\\a.png").is_none());
  }

  #[test]
  fn http_uris_map_to_urls() {
    let mapped = map_uri(&HttpUriMapper, "https://example.com/a.png").expect("claimed");
    assert!(matches!(mapped, ImageSource::Url(url) if url.as_str() == "https://example.com/a.png"));
  }

  #[test]
  fn http_mapper_declines_non_http() {
    assert!(map_uri(&HttpUriMapper, "file:///a.png").is_none());
    assert!(map_uri(&HttpUriMapper, "/a.png").is_none());
  }

  #[test]
  fn chain_applies_first_claiming_mapper() {
    let chain = MapperChain::new(vec![Arc::new(FileUriMapper), Arc::new(HttpUriMapper)]);

    let file = chain.apply(&ImageSource::Uri("/a.png".to_string()), &options());
    assert!(matches!(file, ImageSource::File(_)));

    let url = chain.apply(&ImageSource::Uri("https://example.com/a.png".to_string()), &options());
    assert!(matches!(url, ImageSource::Url(_)));
  }

  #[test]
  fn unclaimed_reference_passes_through_unchanged() {
    let chain = MapperChain::new(vec![Arc::new(FileUriMapper), Arc::new(HttpUriMapper)]);
    let source = ImageSource::Uri("asset:///logo.png".to_string());
    let mapped = chain.apply(&source, &options());
    assert!(matches!(mapped, ImageSource::Uri(uri) if uri == "asset:///logo.png"));
  }
}
