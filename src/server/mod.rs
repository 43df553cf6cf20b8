//! HTTP server layer for the physical-risk gateway.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │        POST /api/get_*      GET /api/images, /api/tiles         │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │    auth     │  │        routes           │  │
//! │  │ (dispatch)  │  │ (JWT tiers) │  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! │                   ┌─────────────┐                               │
//! │                   │   refresh   │                               │
//! │                   │ (renewal)   │                               │
//! │                   └─────────────┘                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod handlers;
pub mod refresh;
pub mod routes;

pub use auth::{
    bearer_token, Access, AccessClaim, AuthError, Claims, Identity, TokenIssuer,
    DEFAULT_ACCESS_TIER, ELEVATED_ACCESS_TIER,
};
pub use handlers::{
    dispatch, health_handler, home_handler, image_handler, logout_handler, profile_handler,
    reset_handler, tile_handler, token_handler, AppState, ErrorResponse, GatewayError,
    HealthResponse, ImageQueryParams, TilePathParams, TokenRequest, TokenResponse,
};
pub use refresh::refresh_middleware;
pub use routes::{create_router, RouterConfig, DEFAULT_MAX_BODY_SIZE};
