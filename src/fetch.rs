//! Fetching abstraction
//!
//! A [`Fetcher`] turns a normalized source reference plus resolved
//! options into either raw decodable bytes or an already-decoded image.
//! Fetchers are constructed per request by [`FetcherFactory`]s arranged
//! in an ordered chain: each factory either claims the source or
//! declines with `None`, and the first claim wins.

pub mod call;
pub mod data_uri;
pub mod file;
pub mod http;

pub use call::{CacheControl, CallFactory, Headers, HttpRequest, HttpResponse, UreqCaller};
pub use data_uri::DataUriFetcherFactory;
pub use file::{BytesFetcherFactory, FileFetcherFactory};
pub use http::HttpFetcherFactory;

use crate::decode::DecodedImage;
use crate::error::Result;
use crate::lifecycle::CancellationToken;
use crate::options::Options;
use crate::request::ImageSource;
use std::sync::Arc;

/// Where served bytes (or a served image) ultimately came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
  /// Served from the in-memory cache or an in-memory source.
  Memory,
  /// Served from the disk cache (or a transport-level cache).
  Disk,
  /// Served from real network I/O.
  Network,
}

/// Decodable bytes plus their MIME type and provenance.
#[derive(Debug, Clone)]
pub struct SourceResult {
  pub bytes: Arc<Vec<u8>>,
  pub mime: Option<String>,
  pub provenance: Provenance,
}

/// Outcome of a fetch: bytes for the decode stage, or a finished image.
#[derive(Debug)]
pub enum FetchResult {
  Source(SourceResult),
  Image(DecodedImage),
}

/// Turns a resolved reference + options into a [`FetchResult`].
pub trait Fetcher: Send + Sync {
  fn fetch(&self, token: &CancellationToken) -> Result<FetchResult>;
}

/// Builds a [`Fetcher`] for sources it understands, or declines.
pub trait FetcherFactory: Send + Sync {
  /// Returns `None` when this factory does not handle `source`, letting
  /// the next factory in the chain try.
  fn create(&self, source: &ImageSource, options: &Options) -> Option<Box<dyn Fetcher>>;
}
