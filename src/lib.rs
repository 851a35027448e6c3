//! imagepipe: an image-loading pipeline with two-tier caching.
//!
//! Given a reference to an image (network URL, file path, data URI, raw
//! bytes), the pipeline resolves it to bytes, decodes them into an
//! in-memory image, optionally transforms it, and delivers it to a
//! display target — caching decoded results in memory and fetched bytes
//! on disk along the way.
//!
//! # Example
//!
//! ```rust,no_run
//! use imagepipe::loader::ImageLoader;
//! use imagepipe::request::ImageRequest;
//! use imagepipe::size::Size;
//!
//! let loader = ImageLoader::new();
//! let request = ImageRequest::new("https://example.com/photo.png").with_size(Size::new(256, 256));
//! let result = loader.execute(request);
//! if let Some(response) = result.response() {
//!     println!("{}x{}", response.image.width(), response.image.height());
//! }
//! ```

pub mod cache;
pub mod decode;
pub mod error;
pub mod extras;
pub mod fetch;
pub mod format;
pub mod hardware;
pub mod lifecycle;
pub mod loader;
pub mod mainthread;
pub mod map;
pub mod options;
pub mod request;
pub mod resolver;
pub mod size;
pub mod target;
pub mod transform;

pub use error::{Error, Result};
pub use loader::{ImageLoader, ImageResponse, ImageResult};
pub use request::{ImageRequest, ImageSource};
