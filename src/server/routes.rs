//! Router configuration for the physical-risk gateway.
//!
//! This module defines the HTTP routes and applies middleware for token
//! refresh, CORS and tracing.
//!
//! # Route Structure
//!
//! ```text
//! /                                              - Welcome message
//! /health                                        - Health check
//! /api/token                                     - Issue token (POST)
//! /api/get_hazard_data                           - JSON dispatch (POST)
//! /api/get_hazard_data_availability              - JSON dispatch (POST)
//! /api/get_asset_exposure                        - JSON dispatch (POST)
//! /api/get_asset_impact                          - JSON dispatch (POST)
//! /api/images/{resource}.{format}                - Whole-array image
//! /api/tiles/{resource}/{z}/{x}/{y}.{format}     - Map tile
//! /api/reset                                     - Reset engine state
//! /api/logout, /api/profile                      - Session (POST)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use physrisk_gateway::compute::RemoteRequester;
//! use physrisk_gateway::server::{auth::TokenIssuer, create_router, RouterConfig};
//!
//! let requester = RemoteRequester::new(engine_url, DEFAULT_ENGINE_TIMEOUT)?;
//! let issuer = TokenIssuer::new("jwt-secret").with_test_user_key("key");
//!
//! let router = create_router(requester, issuer, RouterConfig::new());
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    middleware,
    routing::{get, post, MethodRouter},
    Router,
};
use bytes::Bytes;
use http::HeaderValue;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use super::auth::{Access, TokenIssuer};
use super::handlers::{
    dispatch, health_handler, home_handler, image_handler, logout_handler, profile_handler,
    reset_handler, tile_handler, token_handler, AppState, GatewayError,
};
use super::refresh::refresh_middleware;
use crate::compute::{RequestKind, Requester};

// =============================================================================
// Router Configuration
// =============================================================================

/// Default request body limit for the JSON query endpoints (256 MB).
///
/// Asset portfolios can be large, so this sits well above axum's 2 MB default.
pub const DEFAULT_MAX_BODY_SIZE: usize = 256 * 1024 * 1024;

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = mirror any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,

    /// Request body limit for the JSON query endpoints, in bytes
    pub max_body_size: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Create a new router configuration.
    ///
    /// By default:
    /// - CORS allows any origin, method and header, with credentials
    /// - Tracing is enabled
    /// - Query bodies up to [`DEFAULT_MAX_BODY_SIZE`] are accepted
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            enable_tracing: true,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Set the request body limit for the JSON query endpoints.
    pub fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// # Arguments
///
/// * `requester` - The computation component all requests are forwarded to
/// * `issuer` - Token issuance and verification
/// * `config` - Router configuration
pub fn create_router<R: Requester>(
    requester: R,
    issuer: TokenIssuer,
    config: RouterConfig,
) -> Router {
    let app_state = AppState::new(requester, issuer.clone());

    let mut api = Router::new().route("/token", post(token_handler));
    for kind in RequestKind::ALL {
        api = api.route(&kind.route(), dispatch_route::<R>(kind, config.max_body_size));
    }

    // {filename} captures "{resource}.{format}" and "{y}.{format}"; the
    // extension is split off in the handlers
    let api = api
        .route("/images/{filename}", get(image_handler::<R>))
        .route(
            "/tiles/{resource}/{z}/{x}/{filename}",
            get(tile_handler::<R>),
        )
        .route("/reset", get(reset_handler::<R>))
        .route("/logout", post(logout_handler))
        .route("/profile", post(profile_handler))
        .layer(middleware::from_fn_with_state(issuer, refresh_middleware));

    let router = Router::new()
        .route("/", get(home_handler))
        .route("/health", get(health_handler))
        .nest("/api", api)
        .with_state(app_state)
        .layer(build_cors_layer(&config));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// POST route dispatching JSON bodies as `kind`.
///
/// A body that cannot be buffered (including one over `max_body_size`) is
/// answered like any other invalid request.
fn dispatch_route<R: Requester>(
    kind: RequestKind,
    max_body_size: usize,
) -> MethodRouter<AppState<R>> {
    post(
        move |State(state): State<AppState<R>>,
              Access(access): Access,
              body: Result<Bytes, BytesRejection>| async move {
            match body {
                Ok(body) => dispatch(state, kind, access, body).await,
                Err(e) => {
                    warn!(request = %kind, error = %e, "Cannot read request body");
                    Err(GatewayError::InvalidRequest)
                }
            }
        },
    )
    .layer(DefaultBodyLimit::max(max_body_size))
}

/// Build the CORS layer based on configuration.
///
/// Credentials are always allowed, so wildcards are expressed by mirroring
/// the request.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(AllowOrigin::mirror_request()),
        Some(origins) => {
            let parsed_origins: Vec<HeaderValue> =
                origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
