//! Rendered image cache.
//!
//! Rendering a hazard array to PNG means reading the array (or a pyramid
//! level) from storage and colorizing it. Map clients request the same tiles
//! over and over while panning, so rendered images are cached in an LRU with
//! size-based eviction.
//!
//! # Cache Key
//!
//! Every rendering parameter is part of the key, including the access tier:
//! an image rendered for one tier is never served to another.
//!
//! # Reset
//!
//! [`CachingRequester`] is the process-wide computation component. Its
//! [`Requester::reset`] clears the cache and then resets the wrapped engine.

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ComputeError;

use super::image::{ImageRequest, TileCoord};
use super::request::RequestKind;
use super::Requester;

/// Default cache capacity: 64MB
pub const DEFAULT_IMAGE_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
const DEFAULT_MAX_ENTRIES: usize = 10_000;

// =============================================================================
// Cache Key
// =============================================================================

/// Cache key for rendered images.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageCacheKey {
    pub resource: Arc<str>,
    pub tile: Option<TileCoord>,
    pub colormap: Option<String>,
    pub scenario_id: Option<String>,
    pub year: i32,
    pub group_ids: Vec<String>,

    // f64 bit patterns, so the key can be hashed
    pub min_value: Option<u64>,
    pub max_value: Option<u64>,
}

impl From<&ImageRequest> for ImageCacheKey {
    fn from(request: &ImageRequest) -> Self {
        Self {
            resource: request.resource.as_str().into(),
            tile: request.tile,
            colormap: request.colormap.clone(),
            scenario_id: request.scenario_id.clone(),
            year: request.year,
            group_ids: request.group_ids.clone(),
            min_value: request.min_value.map(f64::to_bits),
            max_value: request.max_value.map(f64::to_bits),
        }
    }
}

// =============================================================================
// Image Cache
// =============================================================================

/// LRU cache for rendered images with size-based capacity.
///
/// Thread-safe; shared across requests inside the [`CachingRequester`].
pub struct ImageCache {
    cache: RwLock<LruCache<ImageCacheKey, Bytes>>,

    /// Maximum total size in bytes
    max_size: usize,

    /// Current total size in bytes
    current_size: RwLock<usize>,
}

impl ImageCache {
    /// Create a new image cache with default capacity (64MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_IMAGE_CACHE_CAPACITY)
    }

    /// Create a new image cache with the specified capacity in bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a new image cache with specified capacity and maximum entries.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(entries)),
            max_size,
            current_size: RwLock::new(0),
        }
    }

    /// Get an image, marking it as recently used.
    pub async fn get(&self, key: &ImageCacheKey) -> Option<Bytes> {
        let mut cache = self.cache.write().await;
        cache.get(key).cloned()
    }

    /// Check if an image is cached without updating LRU order.
    pub async fn contains(&self, key: &ImageCacheKey) -> bool {
        let cache = self.cache.read().await;
        cache.contains(key)
    }

    /// Store an image, evicting least-recently-used entries while over capacity.
    ///
    /// Images larger than the whole cache are not stored.
    pub async fn put(&self, key: ImageCacheKey, data: Bytes) {
        let data_size = data.len();
        if data_size > self.max_size {
            return;
        }

        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        if let Some(old_data) = cache.peek(&key) {
            *current_size = current_size.saturating_sub(old_data.len());
        }

        // LRU entry-count eviction is silent, so account for it here
        if let Some((evicted_key, evicted_data)) = cache.push(key, data) {
            if cache.peek(&evicted_key).is_none() {
                *current_size = current_size.saturating_sub(evicted_data.len());
            }
        }
        *current_size += data_size;

        while *current_size > self.max_size {
            match cache.pop_lru() {
                Some((_, evicted_data)) => {
                    *current_size = current_size.saturating_sub(evicted_data.len());
                }
                None => break,
            }
        }
    }

    /// Clear all entries.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;
        cache.clear();
        *current_size = 0;
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Current total size of cached images in bytes.
    pub async fn size(&self) -> usize {
        *self.current_size.read().await
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Caching Requester
// =============================================================================

/// A [`Requester`] that caches rendered images of the wrapped requester.
///
/// JSON requests are passed through untouched.
pub struct CachingRequester<R: Requester> {
    inner: R,
    cache: ImageCache,
}

impl<R: Requester> CachingRequester<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: ImageCache::new(),
        }
    }

    /// Wrap `inner` with a cache of `capacity` bytes.
    pub fn with_cache_capacity(inner: R, capacity: usize) -> Self {
        Self {
            inner,
            cache: ImageCache::with_capacity(capacity),
        }
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<R: Requester> Requester for CachingRequester<R> {
    async fn get(
        &self,
        kind: RequestKind,
        request: Map<String, Value>,
    ) -> Result<String, ComputeError> {
        self.inner.get(kind, request).await
    }

    async fn get_image(&self, request: &ImageRequest) -> Result<Bytes, ComputeError> {
        let key = ImageCacheKey::from(request);
        if let Some(data) = self.cache.get(&key).await {
            debug!(resource = %request.resource, "Image cache hit");
            return Ok(data);
        }

        let data = self.inner.get_image(request).await?;
        self.cache.put(key, data.clone()).await;
        Ok(data)
    }

    async fn reset(&self) -> Result<(), ComputeError> {
        self.cache.clear().await;
        self.inner.reset().await
    }
}

// =============================================================================
// Tests
// =============================================================================
