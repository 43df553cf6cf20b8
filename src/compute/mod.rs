//! Computation component contract.
//!
//! The gateway does not compute hazard indicators or render images itself.
//! It talks to a risk engine through the [`Requester`] trait, which exposes
//! the two narrow operations the HTTP layer needs plus a reset hook:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │        CachingRequester (images)        │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     RemoteRequester (engine over HTTP)  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`Requester`]: the computation contract (JSON requests, image rendering, reset)
//! - [`RequestKind`] / [`RequestEnvelope`]: typed request dispatch selected by route
//! - [`ComputationResult`]: engine response with the "has any results" rule
//! - [`ImageRequest`] / [`TileCoord`]: whole-array and tiled image rendering parameters
//! - [`CachingRequester`] / [`ImageCache`]: LRU cache for rendered images
//! - [`RemoteRequester`]: reqwest client for an upstream engine process

mod cache;
mod image;
mod remote;
mod request;

pub use cache::{
    CachingRequester, ImageCache, ImageCacheKey, DEFAULT_IMAGE_CACHE_CAPACITY,
};
pub use image::{ImageRequest, TileCoord};
pub use remote::{RemoteRequester, DEFAULT_ENGINE_TIMEOUT};
pub use request::{ComputationResult, RequestEnvelope, RequestKind, RESULT_COLLECTIONS};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::ComputeError;

/// The computation component the gateway forwards to.
///
/// Implementations are long-lived, process-wide instances shared across
/// requests, so they must be safe to call concurrently. Any memoization or
/// cache eviction they perform is their own concern.
#[async_trait]
pub trait Requester: Send + Sync + 'static {
    /// Execute a JSON request of the given kind.
    ///
    /// Returns the engine's raw JSON text. The gateway parses it.
    async fn get(&self, kind: RequestKind, request: Map<String, Value>)
        -> Result<String, ComputeError>;

    /// Render a whole-array image or a single tile as PNG bytes.
    async fn get_image(&self, request: &ImageRequest) -> Result<Bytes, ComputeError>;

    /// Drop all cached and singleton state.
    async fn reset(&self) -> Result<(), ComputeError>;
}
