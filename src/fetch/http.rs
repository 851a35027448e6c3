//! HTTP fetcher: negotiates between the disk cache and the network.
//!
//! Per fetch the flow is strictly sequential: disk read (when the disk
//! read-policy allows) → network → opportunistic disk write. A disk hit
//! serves provenance=Disk without ever touching the transport. On a
//! miss the transport is invoked with a cache-control directive derived
//! from the read/write policy cross product, the response is persisted
//! into a fresh editor when disk writes are allowed, and the bytes are
//! served either from the reopened snapshot or straight from the
//! response body.

use crate::cache::{DiskCache, EntryMetadata, Snapshot};
use crate::error::{Error, HttpError, Result};
use crate::fetch::call::{CacheControl, CallFactory, HttpRequest, UreqCaller};
use crate::fetch::{FetchResult, Fetcher, FetcherFactory, Provenance, SourceResult};
use crate::lifecycle::CancellationToken;
use crate::mainthread;
use crate::options::Options;
use crate::request::ImageSource;
use std::sync::Arc;
use url::Url;

/// Builds [`Fetcher`]s for `http`/`https` URLs.
#[derive(Clone)]
pub struct HttpFetcherFactory {
  caller: Arc<dyn CallFactory>,
  disk_cache: Option<DiskCache>,
}

impl Default for HttpFetcherFactory {
  fn default() -> Self {
    Self {
      caller: Arc::new(UreqCaller::new()),
      disk_cache: None,
    }
  }
}

impl HttpFetcherFactory {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_call_factory(mut self, caller: Arc<dyn CallFactory>) -> Self {
    self.caller = caller;
    self
  }

  pub fn with_disk_cache(mut self, cache: DiskCache) -> Self {
    self.disk_cache = Some(cache);
    self
  }
}

impl FetcherFactory for HttpFetcherFactory {
  fn create(&self, source: &ImageSource, options: &Options) -> Option<Box<dyn Fetcher>> {
    let ImageSource::Url(url) = source else {
      return None;
    };
    if url.scheme() != "http" && url.scheme() != "https" {
      return None;
    }
    Some(Box::new(HttpFetcher {
      url: url.clone(),
      options: options.clone(),
      caller: Arc::clone(&self.caller),
      disk_cache: self.disk_cache.clone(),
    }))
  }
}

struct HttpFetcher {
  url: Url,
  options: Options,
  caller: Arc<dyn CallFactory>,
  disk_cache: Option<DiskCache>,
}

impl HttpFetcher {
  fn disk_key(&self) -> String {
    self
      .options
      .disk_cache_key()
      .map(str::to_string)
      .unwrap_or_else(|| self.url.to_string())
  }

  fn serve_snapshot(&self, cache: &DiskCache, key: &str, snapshot: Snapshot) -> Result<FetchResult> {
    let metadata = match EntryMetadata::parse(snapshot.metadata()) {
      Ok(metadata) => metadata,
      Err(err) => {
        // A corrupt entry must not be silently served as stale data.
        let _ = cache.remove(key);
        return Err(Error::Cache(err));
      }
    };
    let mime = resolve_mime(self.url.as_str(), metadata.content_type());
    log::debug!("disk cache hit for {}", self.url);
    Ok(FetchResult::Source(SourceResult {
      bytes: snapshot.into_data(),
      mime,
      provenance: Provenance::Disk,
    }))
  }
}

impl Fetcher for HttpFetcher {
  fn fetch(&self, token: &CancellationToken) -> Result<FetchResult> {
    let key = self.disk_key();
    let disk = self.options.disk_cache_policy();
    let network = self.options.network_cache_policy();

    if disk.read {
      if let Some(cache) = &self.disk_cache {
        token.check()?;
        if let Some(snapshot) = cache.snapshot(&key)? {
          return self.serve_snapshot(cache, &key, snapshot);
        }
      }
    }

    if !network.read && !disk.read {
      return Err(Error::NoDataSource);
    }

    // Blocking I/O is forbidden on the main thread. With network reads
    // disabled only a transport-cache lookup happens, which is allowed
    // inline.
    if network.read && mainthread::is_main_thread() {
      return Err(Error::NetworkOnMainThread);
    }
    token.check()?;

    let response = self.caller.execute(&HttpRequest {
      url: self.url.to_string(),
      headers: self.options.headers(),
      cache_control: derive_cache_control(network.read, disk.read, disk.write),
    })?;

    if !response.is_success() {
      let status = response.status;
      drop(response); // release the body before raising
      return Err(Error::Http(HttpError {
        status,
        url: self.url.to_string(),
      }));
    }
    token.check()?;

    let mime = resolve_mime(self.url.as_str(), response.content_type.as_deref());
    let provenance = if response.from_cache {
      Provenance::Disk
    } else {
      Provenance::Network
    };

    if disk.write {
      if let Some(cache) = &self.disk_cache {
        if let Some(mut editor) = cache.edit(&key) {
          let metadata = EntryMetadata::new(
            response.sent_at,
            response.received_at,
            response.headers.clone().into_pairs(),
          );
          if let Err(err) = editor.write_metadata(&metadata.to_bytes()) {
            editor.abort();
            return Err(err);
          }
          if let Err(err) = editor.write_data(&response.body) {
            editor.abort();
            return Err(err);
          }
          if disk.read {
            // Serve the just-committed snapshot so this operation never
            // needs a second network round trip.
            let snapshot = editor.commit_and_open()?;
            return Ok(FetchResult::Source(SourceResult {
              bytes: snapshot.into_data(),
              mime,
              provenance,
            }));
          }
          editor.commit()?;
        }
        // A concurrent writer holds the editor slot: skip the write and
        // serve from the response directly.
      }
    }

    Ok(FetchResult::Source(SourceResult {
      bytes: Arc::new(response.body),
      mime,
      provenance,
    }))
  }
}

/// Derives the transport cache-control directive from the cache policy
/// cross product.
pub(crate) fn derive_cache_control(network_read: bool, disk_read: bool, disk_write: bool) -> CacheControl {
  match (network_read, disk_read) {
    // Both sources readable: default transport caching.
    (true, true) => CacheControl::DEFAULT,
    // Disk read disabled: bypass the transport cache so a real fetch
    // happens; storing stays allowed only while the disk write path is.
    (true, false) => {
      if disk_write {
        CacheControl::FORCE_NETWORK
      } else {
        CacheControl::FORCE_NETWORK_NO_STORE
      }
    }
    // Network read disabled: a transport-cache-only lookup, never real
    // network I/O.
    (false, true) => CacheControl::TRANSPORT_CACHE_ONLY,
    // Both disabled: the fetcher fails with NoDataSource before any
    // call is built; this arm exists for the cross-product contract.
    (false, false) => CacheControl {
      no_cache: false,
      no_store: true,
      only_if_cached: true,
    },
  }
}

/// Resolves the served MIME type from the URL and the transport type.
///
/// An extension-based guess wins when the transport type is absent or
/// the generic `text/plain` fallback; otherwise the transport type is
/// used with any parameter suffix stripped.
pub fn resolve_mime(url: &str, content_type: Option<&str>) -> Option<String> {
  let stripped = content_type
    .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_string())
    .filter(|ct| !ct.is_empty());

  let generic = match stripped.as_deref() {
    None => true,
    Some(ct) => ct.eq_ignore_ascii_case("text/plain"),
  };
  if generic {
    if let Some(guess) = mime_from_url(url) {
      return Some(guess);
    }
  }

  stripped
}

/// Guess a MIME type from the URL's file extension.
fn mime_from_url(url: &str) -> Option<String> {
  let path = url.split(['?', '#']).next().unwrap_or(url);
  let ext = path.rsplit('/').next()?.rsplit_once('.')?.1.to_ascii_lowercase();

  let mime = match ext.as_str() {
    "png" => "image/png",
    "jpg" | "jpeg" => "image/jpeg",
    "gif" => "image/gif",
    "webp" => "image/webp",
    "svg" => "image/svg+xml",
    "ico" => "image/x-icon",
    "bmp" => "image/bmp",
    "avif" => "image/avif",
    "heic" => "image/heic",
    _ => return None,
  };

  Some(mime.to_string())
}
