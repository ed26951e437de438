//! Asset Loader Module
//!
//! Consumers that load expensive values (decoded images, parsed files, ...)
//! through a cache, computing each one only when it is not already cached.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use crate::cache::{Cache, CacheBuilder, ExpireBasis};
use crate::error::{CacheError, Result};

// == Public Constants ==
/// How long an unused asset stays cached by default
pub const DEFAULT_ASSET_TTL: Duration = Duration::from_secs(7 * 60);

/// Builds a cache with the asset defaults: entries expire after
/// [`DEFAULT_ASSET_TTL`] without access and are then deleted.
pub fn default_asset_cache<T>() -> Result<Cache<T>>
where
    T: Send + Sync + 'static,
{
    asset_cache_builder().build()
}

/// The builder behind [`default_asset_cache`], for further tuning.
pub fn asset_cache_builder<T>() -> CacheBuilder<T> {
    CacheBuilder::new()
        .name("assets")
        .expire_after(DEFAULT_ASSET_TTL)
        .expire_basis(ExpireBasis::SinceLastAccess)
        .delete_on_expire(true)
}

// == Asset Loader ==
/// A loader that caches what it loads.
///
/// Implementors provide [`cache`](Self::cache), [`load`](Self::load) and
/// [`fallback`](Self::fallback); the lookup methods are derived.
pub trait AssetLoader: Send + Sync {
    type Asset: Send + Sync + 'static;

    /// The cache assets are stored in.
    fn cache(&self) -> &Cache<Self::Asset>;

    /// Produces the asset at `path`. Only called on a cache miss.
    fn load(&self, path: &str) -> anyhow::Result<Self::Asset>;

    /// Returned by [`get_cached`](Self::get_cached) when nothing is cached.
    fn fallback(&self) -> Arc<Self::Asset>;

    /// Returns the asset cached under `path`, loading it on a miss.
    fn get_cached_or_load(&self, path: &str) -> Result<Arc<Self::Asset>> {
        self.get_cached_or_load_as(path, path)
    }

    /// Returns the asset cached under `name`, loading it from `path` on a miss.
    fn get_cached_or_load_as(&self, path: &str, name: &str) -> Result<Arc<Self::Asset>> {
        self.cache().try_get_or_insert_with(name, || {
            let asset = self.load(path).map_err(|e| CacheError::Load {
                name: name.to_string(),
                message: format!("{:#}", e),
            })?;
            info!(cache = self.cache().name(), "Cached asset '{}'", name);
            Ok(asset)
        })
    }

    /// Returns the asset cached under `name`, caching `asset` first on a miss.
    fn get_cached_or_insert(&self, asset: Self::Asset, name: &str) -> Arc<Self::Asset> {
        self.cache().get_or_insert_with(name, || asset)
    }

    /// Returns the asset cached under `name`, or the fallback.
    fn get_cached(&self, name: &str) -> Arc<Self::Asset> {
        self.cache().get(name).unwrap_or_else(|| self.fallback())
    }

    /// Caches `asset` under `name`, replacing any previous one.
    fn store(&self, asset: Self::Asset, name: &str) {
        self.cache().add(name, asset);
        info!(cache = self.cache().name(), "Cached asset '{}'", name);
    }
}

// == File Loader ==
/// Loads raw file contents, resolved against a root directory.
pub struct FileLoader {
    root: PathBuf,
    cache: Cache<Vec<u8>>,
    fallback: Arc<Vec<u8>>,
}

impl FileLoader {
    /// Creates a loader reading below `root`, caching into `cache`.
    pub fn new(root: impl Into<PathBuf>, cache: Cache<Vec<u8>>) -> Self {
        Self {
            root: root.into(),
            cache,
            fallback: Arc::new(Vec::new()),
        }
    }

    /// Creates a loader with [`default_asset_cache`].
    pub fn with_default_cache(root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::new(root, default_asset_cache()?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetLoader for FileLoader {
    type Asset = Vec<u8>;

    fn cache(&self) -> &Cache<Vec<u8>> {
        &self.cache
    }

    fn load(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let full = self.root.join(path);
        let bytes = std::fs::read(&full).with_context(|| format!("reading {}", full.display()))?;
        Ok(bytes)
    }

    fn fallback(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.fallback)
    }
}
