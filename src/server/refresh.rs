//! Sliding token renewal.
//!
//! After every non-`OPTIONS` request, a bearer token that expires within the
//! refresh window is re-issued and merged into the JSON response under
//! `access_token`:
//!
//! ```text
//! {"items": [...]}  ->  {"items": [...], "access_token": "<new jwt>"}
//! ```
//!
//! Responses that are not JSON objects (arrays, strings, images) are returned
//! unchanged and the renewal is dropped. Failures never affect the response.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::auth::{bearer_token, AuthError, TokenIssuer};

/// Field the renewed token is merged under.
pub const REFRESHED_TOKEN_FIELD: &str = "access_token";

/// Middleware renewing bearer tokens that are about to expire.
///
/// # Example
///
/// ```ignore
/// use axum::{middleware, Router};
///
/// let app = Router::new()
///     .route("/api/get_hazard_data", post(handler))
///     .layer(middleware::from_fn_with_state(issuer, refresh_middleware));
/// ```
pub async fn refresh_middleware(
    State(issuer): State<TokenIssuer>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let token = bearer_token(request.headers());
    let response = next.run(request).await;

    let Some(token) = token else {
        return response;
    };

    let refreshed = match issuer.refresh_if_expiring(&token) {
        Ok(Some(refreshed)) => refreshed,
        Ok(None) => return response,
        Err(AuthError::Expired) => {
            info!("Signature has expired");
            return response;
        }
        Err(e) => {
            warn!(error = %e, "Cannot refresh JWT");
            return response;
        }
    };

    attach_token(response, refreshed).await
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

/// Merge `token` into a JSON object response body.
async fn attach_token(response: Response, token: String) -> Response {
    if !is_json(response.headers()) {
        debug!("Response is not JSON, dropping refreshed token");
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            // The stream is consumed; status and headers are all that is left
            error!(
                status = %parts.status,
                error = %e,
                "Cannot read response body for token refresh, body dropped"
            );
            parts.headers.remove(header::CONTENT_LENGTH);
            return Response::from_parts(parts, Body::empty());
        }
    };

    let mut fields = match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(fields)) => fields,
        _ => {
            debug!("Response is not a JSON object, dropping refreshed token");
            return Response::from_parts(parts, Body::from(bytes));
        }
    };

    // A token issued by the handler itself takes precedence
    fields
        .entry(REFRESHED_TOKEN_FIELD)
        .or_insert(Value::String(token));

    match serde_json::to_vec(&Value::Object(fields)) {
        Ok(merged) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(merged))
        }
        Err(e) => {
            warn!(error = %e, "Cannot serialize refreshed response");
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}
