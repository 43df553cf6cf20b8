//! HTTP request handlers for the physical-risk gateway.
//!
//! # Endpoints
//!
//! - `POST /api/token` - Exchange test account credentials for a token
//! - `POST /api/get_hazard_data` (and the other request kinds) - JSON dispatch
//! - `GET /api/images/{resource}.{format}` - Whole-array image
//! - `GET /api/tiles/{resource}/{z}/{x}/{y}.{format}` - Map tile
//! - `GET /api/reset` - Reset the computation component
//! - `POST /api/logout`, `POST /api/profile` - Session endpoints
//! - `GET /`, `GET /health` - Welcome message and health check

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRef, Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::compute::{
    ComputationResult, ImageRequest, RequestEnvelope, RequestKind, Requester, TileCoord,
};
use crate::error::ComputeError;

use super::auth::{Access, AccessClaim, AuthError, Identity, TokenIssuer, CREDENTIAL_COOKIES};

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<R: Requester> {
    /// The computation component all requests are forwarded to
    pub requester: Arc<R>,

    /// Token issuance and verification
    pub issuer: TokenIssuer,
}

impl<R: Requester> AppState<R> {
    pub fn new(requester: R, issuer: TokenIssuer) -> Self {
        Self {
            requester: Arc::new(requester),
            issuer,
        }
    }
}

impl<R: Requester> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            requester: Arc::clone(&self.requester),
            issuer: self.issuer.clone(),
        }
    }
}

impl<R: Requester> FromRef<AppState<R>> for TokenIssuer {
    fn from_ref(state: &AppState<R>) -> Self {
        state.issuer.clone()
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Credentials posted to the token endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

/// Path parameters for tile requests.
///
/// Extracted from: `/tiles/{resource}/{z}/{x}/{filename}`
/// where filename is `{y}.{format}`
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    /// Array resource in the engine's catalog
    pub resource: String,

    /// Zoom level
    pub z: u32,

    /// Tile column
    pub x: u32,

    /// Tile row with format extension (e.g., "5.png")
    pub filename: String,
}

impl TilePathParams {
    /// Parse the Y coordinate from the filename, ignoring any extension.
    pub fn y(&self) -> Result<u32, std::num::ParseIntError> {
        let (y, _format) = split_format(&self.filename);
        y.parse()
    }
}

/// Query parameters shared by the image and tile endpoints.
///
/// Values are kept as strings so parse failures can name the parameter.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageQueryParams {
    /// Lower bound of the color scale
    #[serde(default)]
    pub min_value: Option<String>,

    /// Upper bound of the color scale
    #[serde(default)]
    pub max_value: Option<String>,

    /// Color map name
    #[serde(default)]
    pub colormap: Option<String>,

    /// Scenario identifier
    #[serde(default)]
    pub scenario_id: Option<String>,

    /// Scenario year (required)
    #[serde(default)]
    pub year: Option<String>,
}

impl ImageQueryParams {
    /// Build an image request for `resource` at the caller's tier.
    pub fn into_image_request(
        self,
        resource: impl Into<String>,
        tile: Option<TileCoord>,
        access: AccessClaim,
    ) -> Result<ImageRequest, GatewayError> {
        let year_arg = self
            .year
            .as_deref()
            .ok_or(GatewayError::MissingParameter { name: "year" })?;
        let year = year_arg
            .trim()
            .parse::<i32>()
            .map_err(|e| GatewayError::InvalidParameter {
                name: "year",
                message: e.to_string(),
            })?;

        let min_value = parse_bound("minValue", self.min_value.as_deref())?;
        let max_value = parse_bound("maxValue", self.max_value.as_deref())?;

        Ok(ImageRequest::new(resource, year, access)
            .with_tile(tile)
            .with_colormap(self.colormap)
            .with_scenario(self.scenario_id)
            .with_value_range(min_value, max_value))
    }
}

fn parse_bound(name: &'static str, value: Option<&str>) -> Result<Option<f64>, GatewayError> {
    value
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| GatewayError::InvalidParameter {
                    name,
                    message: e.to_string(),
                })
        })
        .transpose()
}

/// Split `name.format` at the last dot. The format is optional.
fn split_format(filename: &str) -> (&str, Option<&str>) {
    match filename.rsplit_once('.') {
        Some((name, format)) if !name.is_empty() => (name, Some(format)),
        _ => (filename, None),
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_request")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Issued token.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Errors surfaced by the gateway handlers.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Body could not be decoded, forwarded or its result parsed
    #[error("Invalid request")]
    InvalidRequest,

    /// Well-formed request that matched no data
    #[error("No results found")]
    NoResults,

    #[error("Missing required parameter: {name}")]
    MissingParameter { name: &'static str },

    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: &'static str, message: String },

    /// Image rendering failed in the computation component
    #[error("Image rendering failed: {0}")]
    Render(ComputeError),

    /// Computation component could not be reset
    #[error("Reset failed: {0}")]
    Reset(ComputeError),
}

/// Convert GatewayError to HTTP response.
///
/// - 5xx errors are logged at ERROR level
/// - 404s at DEBUG (common and expected)
/// - other 4xx at WARN
///
/// Computation errors never reach the response body.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            GatewayError::InvalidRequest => (
                StatusCode::BAD_REQUEST,
                "invalid_request",
                self.to_string(),
            ),
            GatewayError::NoResults => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            GatewayError::MissingParameter { .. } => (
                StatusCode::BAD_REQUEST,
                "missing_parameter",
                self.to_string(),
            ),
            GatewayError::InvalidParameter { .. } => (
                StatusCode::BAD_REQUEST,
                "invalid_parameter",
                self.to_string(),
            ),
            GatewayError::Render(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "render_error",
                "Failed to render image".to_string(),
            ),
            GatewayError::Reset(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "reset_error",
                "Failed to reset computation component".to_string(),
            ),
        };

        // Log errors based on severity
        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                self
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);

        (status, Json(error_response)).into_response()
    }
}

/// Internal failure of a dispatched request; logged, never returned.
#[derive(Debug, Error)]
enum DispatchFailure {
    #[error("malformed request body: {0}")]
    Decode(serde_json::Error),

    #[error(transparent)]
    Compute(#[from] ComputeError),

    #[error("malformed engine response: {0}")]
    Parse(serde_json::Error),
}

impl DispatchFailure {
    fn is_transient(&self) -> bool {
        matches!(self, DispatchFailure::Compute(e) if e.is_transient())
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Welcome message.
///
/// `GET /`
pub async fn home_handler() -> Json<Value> {
    Json(json!({ "message": "Hello World!" }))
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Issue an access token for the test account.
///
/// # Endpoint
///
/// `POST /api/token` with `{"email": "...", "password": "..."}`
///
/// # Response
///
/// - `200 OK`: `{"access_token": "<jwt>"}`
/// - `401 Unauthorized`: any other credentials, or an unreadable body
pub async fn token_handler(
    State(issuer): State<TokenIssuer>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AuthError> {
    let credentials = match payload {
        Ok(Json(credentials)) => credentials,
        Err(rejection) => {
            debug!(error = %rejection, "Unreadable token request");
            TokenRequest::default()
        }
    };

    let access_token = issuer
        .issue_for_credentials(credentials.email.as_deref(), credentials.password.as_deref())?;

    Ok(Json(TokenResponse { access_token }))
}

/// Dispatch a JSON request of the given kind to the computation component.
///
/// The caller's access tier replaces any `group_ids` in the body.
///
/// # Response
///
/// - `200 OK`: the computation result, unchanged
/// - `400 Bad Request`: body, forwarding or result parsing failed
/// - `404 Not Found`: no result collection is populated
pub async fn dispatch<R: Requester>(
    state: AppState<R>,
    kind: RequestKind,
    access: AccessClaim,
    body: Bytes,
) -> Result<Json<Value>, GatewayError> {
    debug!(request = %kind, access = %access, "Dispatching request");

    let result = match forward(state.requester.as_ref(), kind, access, &body).await {
        Ok(result) => result,
        Err(e) => {
            error!(
                request = %kind,
                transient = e.is_transient(),
                error = %e,
                "Invalid '{}' request",
                kind
            );
            return Err(GatewayError::InvalidRequest);
        }
    };

    if !result.has_results() {
        info!(request = %kind, "No results returned");
        return Err(GatewayError::NoResults);
    }

    Ok(Json(result.into_value()))
}

async fn forward<R: Requester>(
    requester: &R,
    kind: RequestKind,
    access: AccessClaim,
    body: &[u8],
) -> Result<ComputationResult, DispatchFailure> {
    let mut envelope = RequestEnvelope::from_slice(kind, body).map_err(DispatchFailure::Decode)?;
    envelope.set_group_ids(access);

    let (kind, request) = envelope.into_parts();
    let raw = requester.get(kind, request).await?;

    ComputationResult::parse(&raw).map_err(DispatchFailure::Parse)
}

/// Render a whole array to PNG.
///
/// # Endpoint
///
/// `GET /api/images/{resource}.{format}`
///
/// # Query Parameters
///
/// - `year`: Scenario year (required)
/// - `minValue`, `maxValue`: Color scale bounds (optional)
/// - `colormap`: Color map name (optional)
/// - `scenarioId`: Scenario identifier (optional)
///
/// # Response
///
/// - `200 OK`: PNG image with `Content-Type: image/png`
/// - `400 Bad Request`: Missing or invalid query parameters
/// - `500 Internal Server Error`: Rendering failed
pub async fn image_handler<R: Requester>(
    State(state): State<AppState<R>>,
    Access(access): Access,
    Path(filename): Path<String>,
    query: Result<Query<ImageQueryParams>, QueryRejection>,
) -> Result<Response, GatewayError> {
    let (resource, _format) = split_format(&filename);
    let Query(query) = query.map_err(|e| GatewayError::InvalidParameter {
        name: "query",
        message: e.body_text(),
    })?;

    let request = query.into_image_request(resource, None, access)?;
    render(state, request).await
}

/// Render one tile of an array's pyramid to PNG.
///
/// # Endpoint
///
/// `GET /api/tiles/{resource}/{z}/{x}/{y}.{format}`
///
/// Takes the same query parameters as [`image_handler`]. A zero coordinate
/// renders the whole array instead of a tile.
pub async fn tile_handler<R: Requester>(
    State(state): State<AppState<R>>,
    Access(access): Access,
    path: Result<Path<TilePathParams>, PathRejection>,
    query: Result<Query<ImageQueryParams>, QueryRejection>,
) -> Result<Response, GatewayError> {
    let Path(params) = path.map_err(|e| GatewayError::InvalidParameter {
        name: "path",
        message: e.body_text(),
    })?;
    let y = params.y().map_err(|e| GatewayError::InvalidParameter {
        name: "y",
        message: e.to_string(),
    })?;
    let Query(query) = query.map_err(|e| GatewayError::InvalidParameter {
        name: "query",
        message: e.body_text(),
    })?;

    let tile = TileCoord::from_parts(Some(params.x), Some(y), Some(params.z));
    let request = query.into_image_request(params.resource, tile, access)?;
    render(state, request).await
}

async fn render<R: Requester>(
    state: AppState<R>,
    request: ImageRequest,
) -> Result<Response, GatewayError> {
    info!(
        resource = %request.resource,
        tiled = request.is_tiled(),
        "Creating raster image"
    );

    let image = state.requester.get_image(&request).await.map_err(|e| {
        warn!(
            resource = %request.resource,
            transient = e.is_transient(),
            "Image rendering failed"
        );
        GatewayError::Render(e)
    })?;

    Ok(([(header::CONTENT_TYPE, "image/png")], image).into_response())
}

/// Clear cached state in the computation component.
///
/// `GET /api/reset`
pub async fn reset_handler<R: Requester>(
    State(state): State<AppState<R>>,
) -> Result<Json<&'static str>, GatewayError> {
    state.requester.reset().await.map_err(GatewayError::Reset)?;
    info!("Computation component reset");
    Ok(Json("Reset successful"))
}

/// End the session by clearing credential cookies. Always succeeds.
///
/// `POST /api/logout`
pub async fn logout_handler(jar: CookieJar) -> (CookieJar, Json<Value>) {
    let jar = CREDENTIAL_COOKIES.iter().fold(jar, |jar, name| {
        let mut cookie = Cookie::build((*name, "")).path("/").build();
        cookie.make_removal();
        jar.add(cookie)
    });

    (jar, Json(json!({ "msg": "logout successful" })))
}

/// Identity of the caller.
///
/// `POST /api/profile`; answers 401 without a valid token.
pub async fn profile_handler(Identity(claims): Identity) -> Json<Value> {
    Json(json!({ "id": claims.sub }))
}

// =============================================================================
// Tests
// =============================================================================
