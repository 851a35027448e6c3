//! Request orchestration: resolve → map → fetch → decode → transform →
//! cache → deliver.
//!
//! `ImageLoader` owns the shared caches and the component chains. Every
//! failure inside the pipeline is caught at this boundary and converted
//! into a terminal error result delivered to the target — nothing below
//! leaks resources on the way out (snapshots and response bodies are
//! scope-owned, editors abort on drop).

use crate::cache::key::MemoryCacheKey;
use crate::cache::memory::{CachedValue, MemoryCache};
use crate::cache::DiskCache;
use crate::decode::{Decoded, DecodedImage, Decoder, ImageCrateDecoder};
use crate::error::{Error, Result};
use crate::fetch::call::{CallFactory, UreqCaller};
use crate::fetch::{
  BytesFetcherFactory, DataUriFetcherFactory, FetchResult, FetcherFactory, FileFetcherFactory,
  HttpFetcherFactory, Provenance,
};
use crate::hardware::{DefaultHardwareAllocator, HardwareAllocator, HardwarePolicy};
use crate::lifecycle::{CancelOnDestroy, CancellationToken, Disposable, Lifecycle, LifecycleObserver};
use crate::mainthread;
use crate::map::{FileUriMapper, HttpUriMapper, Mapper, MapperChain};
use crate::request::ImageRequest;
use crate::resolver::{AlwaysOnline, NetworkObserver, OptionsResolver};
use std::sync::Arc;
use std::thread;

const DEFAULT_MEMORY_CACHE_BYTES: usize = 64 * 1024 * 1024;

/// Terminal success: the decoded image and how it was obtained.
#[derive(Clone)]
pub struct ImageResponse {
  pub image: Arc<DecodedImage>,
  pub provenance: Provenance,
  pub is_sampled: bool,
  pub memory_cache_key: Option<MemoryCacheKey>,
}

/// Terminal failure delivered to the caller and the target.
pub struct ErrorResponse {
  pub error: Error,
}

/// Terminal result of one request.
pub enum ImageResult {
  Success(ImageResponse),
  Error(ErrorResponse),
}

impl ImageResult {
  pub fn is_success(&self) -> bool {
    matches!(self, ImageResult::Success(_))
  }

  pub fn response(&self) -> Option<&ImageResponse> {
    match self {
      ImageResult::Success(response) => Some(response),
      ImageResult::Error(_) => None,
    }
  }

  pub fn error(&self) -> Option<&Error> {
    match self {
      ImageResult::Success(_) => None,
      ImageResult::Error(response) => Some(&response.error),
    }
  }
}

/// Shared image loader; clones share caches and component chains.
#[derive(Clone)]
pub struct ImageLoader {
  inner: Arc<LoaderInner>,
}

struct LoaderInner {
  resolver: OptionsResolver,
  hardware: HardwarePolicy,
  mappers: MapperChain,
  factories: Vec<Arc<dyn FetcherFactory>>,
  decoder: Arc<dyn Decoder>,
  memory_cache: Arc<MemoryCache>,
  disk_cache: Option<DiskCache>,
}

/// Configures and builds an [`ImageLoader`].
pub struct ImageLoaderBuilder {
  connectivity: Arc<dyn NetworkObserver>,
  hardware_allocator: Arc<dyn HardwareAllocator>,
  call_factory: Arc<dyn CallFactory>,
  disk_cache: Option<DiskCache>,
  memory_cache_bytes: usize,
  decoder: Arc<dyn Decoder>,
  mappers: Vec<Arc<dyn Mapper>>,
  factories: Vec<Arc<dyn FetcherFactory>>,
}

impl Default for ImageLoaderBuilder {
  fn default() -> Self {
    Self {
      connectivity: Arc::new(AlwaysOnline),
      hardware_allocator: Arc::new(DefaultHardwareAllocator::default()),
      call_factory: Arc::new(UreqCaller::new()),
      disk_cache: None,
      memory_cache_bytes: DEFAULT_MEMORY_CACHE_BYTES,
      decoder: Arc::new(ImageCrateDecoder::new()),
      mappers: Vec::new(),
      factories: Vec::new(),
    }
  }
}

impl ImageLoaderBuilder {
  pub fn with_connectivity(mut self, observer: Arc<dyn NetworkObserver>) -> Self {
    self.connectivity = observer;
    self
  }

  pub fn with_hardware_allocator(mut self, allocator: Arc<dyn HardwareAllocator>) -> Self {
    self.hardware_allocator = allocator;
    self
  }

  pub fn with_call_factory(mut self, caller: Arc<dyn CallFactory>) -> Self {
    self.call_factory = caller;
    self
  }

  pub fn with_disk_cache(mut self, cache: DiskCache) -> Self {
    self.disk_cache = Some(cache);
    self
  }

  pub fn with_memory_cache_bytes(mut self, bytes: usize) -> Self {
    self.memory_cache_bytes = bytes;
    self
  }

  pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
    self.decoder = decoder;
    self
  }

  /// Prepends a mapper; custom mappers run before the defaults.
  pub fn with_mapper(mut self, mapper: Arc<dyn Mapper>) -> Self {
    self.mappers.push(mapper);
    self
  }

  /// Prepends a fetcher factory; custom factories are tried first.
  pub fn with_fetcher_factory(mut self, factory: Arc<dyn FetcherFactory>) -> Self {
    self.factories.push(factory);
    self
  }

  pub fn build(self) -> ImageLoader {
    let hardware = HardwarePolicy::new(self.hardware_allocator);
    let resolver = OptionsResolver::new(self.connectivity, hardware.clone());

    let mut mappers = self.mappers;
    mappers.push(Arc::new(FileUriMapper));
    mappers.push(Arc::new(HttpUriMapper));

    let mut http_factory = HttpFetcherFactory::new().with_call_factory(self.call_factory);
    if let Some(cache) = self.disk_cache.clone() {
      http_factory = http_factory.with_disk_cache(cache);
    }

    let mut factories = self.factories;
    factories.push(Arc::new(http_factory));
    factories.push(Arc::new(FileFetcherFactory));
    factories.push(Arc::new(DataUriFetcherFactory));
    factories.push(Arc::new(BytesFetcherFactory));

    ImageLoader {
      inner: Arc::new(LoaderInner {
        resolver,
        hardware,
        mappers: MapperChain::new(mappers),
        factories,
        decoder: self.decoder,
        memory_cache: Arc::new(MemoryCache::new(self.memory_cache_bytes)),
        disk_cache: self.disk_cache,
      }),
    }
  }
}

impl Default for ImageLoader {
  fn default() -> Self {
    Self::builder().build()
  }
}

impl ImageLoader {
  pub fn builder() -> ImageLoaderBuilder {
    ImageLoaderBuilder::default()
  }

  pub fn new() -> Self {
    Self::default()
  }

  pub fn memory_cache(&self) -> &Arc<MemoryCache> {
    &self.inner.memory_cache
  }

  pub fn disk_cache(&self) -> Option<&DiskCache> {
    self.inner.disk_cache.as_ref()
  }

  /// Executes a request on the calling thread, delivering the terminal
  /// result to the request's target and returning it.
  pub fn execute(&self, request: ImageRequest) -> ImageResult {
    self.execute_with_token(request, CancellationToken::new())
  }

  /// Dispatches a request onto a worker thread.
  ///
  /// The returned [`Disposable`] cancels the request; cancellation is
  /// also bound to the request's lifecycle for its duration.
  pub fn enqueue(&self, request: ImageRequest) -> Disposable {
    let token = CancellationToken::new();
    let loader = self.clone();
    let worker_token = token.clone();
    let handle = thread::spawn(move || {
      let _ = loader.execute_with_token(request, worker_token);
    });
    Disposable::new(token, handle)
  }

  fn execute_with_token(&self, request: ImageRequest, token: CancellationToken) -> ImageResult {
    let subscription: Option<(Arc<dyn Lifecycle>, Arc<dyn LifecycleObserver>)> =
      request.lifecycle.clone().map(|lifecycle| {
        let observer: Arc<dyn LifecycleObserver> = Arc::new(CancelOnDestroy::new(token.clone()));
        lifecycle.subscribe(Arc::clone(&observer));
        (lifecycle, observer)
      });

    if let Some(target) = &request.target {
      target.on_start();
    }

    let outcome = self.run(&request, &token);

    // Unsubscribe on every exit path, success or failure.
    if let Some((lifecycle, observer)) = subscription {
      lifecycle.unsubscribe(&observer);
    }

    match outcome {
      Ok(response) => {
        if let Some(target) = &request.target {
          target.on_success(&response.image, response.provenance);
        }
        ImageResult::Success(response)
      }
      Err(error) => {
        log::warn!("request for {} failed: {error}", request.source.identity());
        if let Some(target) = &request.target {
          target.on_error(&error);
        }
        ImageResult::Error(ErrorResponse { error })
      }
    }
  }

  fn run(&self, request: &ImageRequest, token: &CancellationToken) -> Result<ImageResponse> {
    let inner = &self.inner;
    token.check()?;

    let mut options = inner.resolver.resolve(request, request.size);
    if !mainthread::is_main_thread() {
      options = inner.resolver.adjust_for_worker_thread(options);
    }

    let mapped = inner.mappers.apply(&request.source, &options);

    let memory_policy = options.memory_cache_policy();
    let memory_cache_key = if memory_policy.read || memory_policy.write {
      let transformations = request
        .transformations
        .iter()
        .map(|transformation| transformation.cache_key())
        .collect();
      Some(MemoryCacheKey::new(
        mapped.identity(),
        transformations,
        options.size(),
        options.scale(),
      ))
    } else {
      None
    };

    if memory_policy.read {
      if let Some(key) = &memory_cache_key {
        if let Some(value) = inner.memory_cache.get(key) {
          // Hardware eligibility is re-validated per request: the target
          // or its attachment state may have changed since the insert.
          if inner.hardware.is_cached_value_reusable(request, &value) {
            log::debug!("memory cache hit for {}", key.source());
            return Ok(ImageResponse {
              image: value.image,
              provenance: Provenance::Memory,
              is_sampled: value.is_sampled,
              memory_cache_key: memory_cache_key.clone(),
            });
          }
        }
      }
    }
    token.check()?;

    let fetcher = inner
      .factories
      .iter()
      .find_map(|factory| factory.create(&mapped, &options))
      .ok_or_else(|| Error::UnsupportedSource(mapped.identity()))?;

    let (mut decoded, provenance) = match fetcher.fetch(token)? {
      FetchResult::Image(image) => (
        Decoded {
          image,
          is_sampled: false,
        },
        Provenance::Memory,
      ),
      FetchResult::Source(source) => {
        token.check()?;
        let decoded = inner
          .decoder
          .decode(&source.bytes, source.mime.as_deref(), &options)?;
        (decoded, source.provenance)
      }
    };

    for transformation in &request.transformations {
      token.check()?;
      decoded.image = transformation.apply(decoded.image)?;
    }

    let image = Arc::new(decoded.image);
    if memory_policy.write {
      if let Some(key) = memory_cache_key.clone() {
        inner
          .memory_cache
          .put(key, CachedValue::new(Arc::clone(&image), decoded.is_sampled));
      }
    }

    Ok(ImageResponse {
      image,
      provenance,
      is_sampled: decoded.is_sampled,
      memory_cache_key,
    })
  }
}
