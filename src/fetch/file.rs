//! Local-source fetchers: files and raw byte buffers.

use crate::error::Result;
use crate::fetch::http::resolve_mime;
use crate::fetch::{FetchResult, Fetcher, FetcherFactory, Provenance, SourceResult};
use crate::lifecycle::CancellationToken;
use crate::options::Options;
use crate::request::ImageSource;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Builds [`Fetcher`]s for local file references.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcherFactory;

impl FetcherFactory for FileFetcherFactory {
  fn create(&self, source: &ImageSource, _options: &Options) -> Option<Box<dyn Fetcher>> {
    let ImageSource::File(path) = source else {
      return None;
    };
    Some(Box::new(FileFetcher { path: path.clone() }))
  }
}

struct FileFetcher {
  path: PathBuf,
}

impl Fetcher for FileFetcher {
  fn fetch(&self, token: &CancellationToken) -> Result<FetchResult> {
    token.check()?;
    let bytes = fs::read(&self.path)?;
    let mime = resolve_mime(&self.path.to_string_lossy(), None);
    Ok(FetchResult::Source(SourceResult {
      bytes: Arc::new(bytes),
      mime,
      provenance: Provenance::Disk,
    }))
  }
}

/// Builds [`Fetcher`]s for in-memory byte sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesFetcherFactory;

impl FetcherFactory for BytesFetcherFactory {
  fn create(&self, source: &ImageSource, _options: &Options) -> Option<Box<dyn Fetcher>> {
    let ImageSource::Bytes(bytes) = source else {
      return None;
    };
    Some(Box::new(BytesFetcher {
      bytes: Arc::clone(bytes),
    }))
  }
}

struct BytesFetcher {
  bytes: Arc<Vec<u8>>,
}

impl Fetcher for BytesFetcher {
  fn fetch(&self, token: &CancellationToken) -> Result<FetchResult> {
    token.check()?;
    Ok(FetchResult::Source(SourceResult {
      bytes: Arc::clone(&self.bytes),
      mime: None,
      provenance: Provenance::Memory,
    }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::Error;
  use crate::size::Size;

  fn options() -> Options {
    Options::new(Size::ORIGINAL)
  }

  fn source_of(result: FetchResult) -> SourceResult {
    match result {
      FetchResult::Source(source) => source,
      FetchResult::Image(_) => panic!("expected a byte source"),
    }
  }

  #[test]
  fn file_fetcher_reads_bytes_with_extension_mime() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("picture.png");
    fs::write(&path, b"file-bytes").unwrap();

    let fetcher = FileFetcherFactory
      .create(&ImageSource::File(path), &options())
      .expect("claims files");
    let source = source_of(fetcher.fetch(&CancellationToken::new()).unwrap());

    assert_eq!(source.bytes.as_slice(), b"file-bytes");
    assert_eq!(source.mime.as_deref(), Some("image/png"));
    assert_eq!(source.provenance, Provenance::Disk);
  }

  #[test]
  fn missing_file_surfaces_io_error() {
    let fetcher = FileFetcherFactory
      .create(&ImageSource::File(PathBuf::from("/nonexistent/x.png")), &options())
      .unwrap();
    let err = fetcher.fetch(&CancellationToken::new()).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
  }

  #[test]
  fn bytes_fetcher_shares_the_buffer() {
    let buffer = Arc::new(b"raw".to_vec());
    let fetcher = BytesFetcherFactory
      .create(&ImageSource::Bytes(Arc::clone(&buffer)), &options())
      .expect("claims byte sources");

    let source = source_of(fetcher.fetch(&CancellationToken::new()).unwrap());
    assert_eq!(source.provenance, Provenance::Memory);
    assert!(Arc::ptr_eq(&source.bytes, &buffer));
  }

  #[test]
  fn factories_decline_foreign_sources() {
    assert!(
      FileFetcherFactory
        .create(&ImageSource::Uri("/a.png".into()), &options())
        .is_none()
    );
    assert!(
      BytesFetcherFactory
        .create(&ImageSource::File(PathBuf::from("/a.png")), &options())
        .is_none()
    );
  }
}
