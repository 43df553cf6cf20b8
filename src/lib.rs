//! # physrisk-gateway
//!
//! An HTTP gateway in front of a physical-risk analytics engine.
//!
//! The gateway authenticates callers, resolves each caller's data-access tier
//! and forwards hazard, exposure and impact queries and image/tile rendering
//! requests to the engine. It holds no data of its own.
//!
//! ## Features
//!
//! - **Typed dispatch**: Four JSON request kinds bound to their routes
//! - **Fail-open access tiers**: Missing or invalid tokens downgrade to the default tier
//! - **JWT tokens**: HS256 access tokens with sliding renewal
//! - **Image caching**: Rendered images and tiles cached by request parameters
//!
//! ## Architecture
//!
//! - [`compute`] - Requester abstraction, engine client and image cache
//! - [`server`] - Axum-based HTTP server, handlers and JWT auth
//! - [`config`] - CLI and configuration types
//! - [`error`] - Computation error types
//!
//! ## Example
//!
//! ```rust,no_run
//! use physrisk_gateway::{create_router, CachingRequester, RemoteRequester, RouterConfig, TokenIssuer};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = RemoteRequester::new(
//!         "http://localhost:9000".parse().unwrap(),
//!         Duration::from_secs(120),
//!     )
//!     .unwrap();
//!     let issuer = TokenIssuer::new("jwt-secret").with_test_user_key("letmein");
//!
//!     let router = create_router(CachingRequester::new(engine), issuer, RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod compute;
pub mod config;
pub mod error;
pub mod server;

// Re-export commonly used types
pub use compute::{
    CachingRequester, ComputationResult, ImageCache, ImageRequest, RemoteRequester,
    RequestEnvelope, RequestKind, Requester, TileCoord,
};
pub use config::Config;
pub use error::ComputeError;
pub use server::{
    create_router, AccessClaim, AppState, AuthError, Claims, ErrorResponse, GatewayError,
    RouterConfig, TokenIssuer,
};
