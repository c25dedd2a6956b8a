//! Voice model acquisition and local caching.
//!
//! A [`ModelCatalog`] maps language codes to [`ModelDescriptor`]s. The
//! [`ModelCache`] makes sure every file a descriptor lists is present under
//! the cache root and returns the path of the primary `.onnx` artifact.
//!
//! # Cache Layout
//!
//! ```text
//! ~/.cache/robocrew/tts/
//! └── en/
//!     └── en_GB-southern_english_female-low/
//!         ├── en_GB-southern_english_female-low.onnx        # primary artifact
//!         └── en_GB-southern_english_female-low.onnx.json   # voice config
//! ```
//!
//! A file counts as downloaded only when it exists with a non-zero size.
//! Transfers are written to `<file>.part` and renamed into place once every
//! byte is on disk, so an interrupted run never leaves a truncated model
//! behind the final name.
//!
//! # Example
//!
//! ```rust,no_run
//! use robovoice::cache::{CacheSettingsBuilder, HttpSource, ModelCache, ModelCatalog};
//!
//! let settings = CacheSettingsBuilder::default()
//!     .root("/tmp/voices")
//!     .build()?;
//! let source = HttpSource::new(&settings.user_agent)?;
//! let cache = ModelCache::new(ModelCatalog::builtin(), settings, source);
//! let onnx = cache.ensure_model("pl")?;
//! println!("{}", onnx.display());
//! # Ok::<(), robovoice::BoxError>(())
//! ```

pub mod catalog;
pub mod download;
pub mod manager;
pub mod source;

pub use catalog::{CatalogError, ModelCatalog, ModelDescriptor, RequiredFile, PRIMARY_SUFFIX};
pub use download::DownloadProgress;
pub use manager::{
    default_cache_root, CacheError, CacheSettings, CacheSettingsBuilder, ModelCache,
};
#[cfg(feature = "http")]
pub use source::HttpSource;
pub use source::{DownloadError, ModelSource, RemoteFile, TrustedHosts};
