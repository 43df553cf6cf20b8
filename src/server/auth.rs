//! JWT access tokens and access-tier resolution.
//!
//! Tokens are HS256-signed JWTs carrying the caller's identity (`sub`) and
//! data-access tier (`data_access`):
//!
//! ```text
//! {"sub": "test", "data_access": "osc", "iat": 1735689600, "exp": 1735690500, "type": "access"}
//! ```
//!
//! # Fail-open access resolution
//!
//! Data and image endpoints never reject a caller because of its token. A
//! missing, expired, malformed or forged token resolves to the default tier;
//! only the tier of data served changes. This is a trust-boundary decision:
//! the engine, not the gateway, enforces what each tier may see.
//!
//! Only `/api/token` (bad credentials) and `/api/profile` (no valid identity)
//! answer 401.
//!
//! # Token locations
//!
//! The bearer token is read from `Authorization: Bearer <token>`, falling back
//! to the `access_token_cookie` cookie.
//!
//! # Example
//!
//! ```rust
//! use physrisk_gateway::server::auth::TokenIssuer;
//!
//! let issuer = TokenIssuer::new("jwt-signing-secret").with_test_user_key("letmein");
//!
//! let token = issuer.issue_for_credentials(Some("test"), Some("letmein")).unwrap();
//! assert_eq!(issuer.resolve_access(Some(&token)).as_str(), "osc");
//!
//! // No token, or a bad one, is not an error
//! assert_eq!(issuer.resolve_access(None).as_str(), "public");
//! assert_eq!(issuer.resolve_access(Some("garbage")).as_str(), "public");
//! ```

use std::convert::Infallible;
use std::fmt;
use std::time::Duration;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, get_current_timestamp, Algorithm, DecodingKey,
    EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::handlers::ErrorResponse;

// =============================================================================
// Constants
// =============================================================================

/// The only account that can obtain a token.
pub const TEST_ACCOUNT: &str = "test";

/// Tier for callers without a usable token.
pub const DEFAULT_ACCESS_TIER: &str = "public";

/// Tier granted to tokens issued by `/api/token`.
pub const ELEVATED_ACCESS_TIER: &str = "osc";

/// Default access token lifetime (15 minutes).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

/// Tokens expiring within this window are renewed (30 minutes).
pub const DEFAULT_REFRESH_WINDOW: Duration = Duration::from_secs(30 * 60);

/// Cookie the access token may be carried in.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token_cookie";

/// Cookies cleared on logout.
pub const CREDENTIAL_COOKIES: [&str; 4] = [
    ACCESS_TOKEN_COOKIE,
    "refresh_token_cookie",
    "csrf_access_token",
    "csrf_refresh_token",
];

const ACCESS_TOKEN_TYPE: &str = "access";

// =============================================================================
// Types
// =============================================================================

/// Authentication error types.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// No bearer token on a request that needs one
    #[error("Missing access token")]
    MissingToken,

    /// Token signature has expired
    #[error("Signature has expired")]
    Expired,

    /// Token is malformed or its signature does not verify
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Wrong account or password at token issuance
    #[error("Wrong email or password")]
    InvalidCredentials,

    /// Token could not be signed
    #[error("Token signing failed: {0}")]
    Signing(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AuthError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "missing_token",
                self.to_string(),
            ),
            AuthError::Expired => (
                StatusCode::UNAUTHORIZED,
                "token_expired",
                self.to_string(),
            ),
            // Decoder detail stays in the log
            AuthError::InvalidToken(_) => (
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "Invalid token".to_string(),
            ),
            AuthError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                self.to_string(),
            ),
            AuthError::Signing(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "token_error",
                "Could not issue token".to_string(),
            ),
        };

        match &self {
            AuthError::Signing(_) => {
                tracing::error!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Token error: {}",
                    self
                );
            }
            AuthError::InvalidToken(_) | AuthError::InvalidCredentials => {
                warn!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Authentication failed: {}",
                    self
                );
            }
            _ => {
                debug!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Authentication failed: {}",
                    self
                );
            }
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

/// JWT claim set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity (account identifier)
    pub sub: String,

    /// Data-access tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_access: Option<String>,

    /// Issued at (Unix epoch seconds)
    #[serde(default)]
    pub iat: u64,

    /// Expiry (Unix epoch seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,

    #[serde(rename = "type", default = "access_token_type")]
    pub token_type: String,
}

fn access_token_type() -> String {
    ACCESS_TOKEN_TYPE.to_string()
}

/// A caller's data-visibility tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessClaim(String);

impl AccessClaim {
    pub fn new(tier: impl Into<String>) -> Self {
        Self(tier.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<AccessClaim> for String {
    fn from(claim: AccessClaim) -> Self {
        claim.0
    }
}

// =============================================================================
// Token Issuer
// =============================================================================

/// Issues and verifies access tokens and resolves access tiers.
///
/// Stateless: nothing about issued tokens is stored server-side.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,

    /// Lifetime of newly issued tokens
    ttl: Duration,

    /// Renew tokens expiring within this window
    refresh_window: Duration,

    /// Password of the test account; `None` rejects every login
    test_user_key: Option<String>,

    default_tier: String,
    elevated_tier: String,
}

impl TokenIssuer {
    /// Create an issuer signing with the given HMAC secret.
    ///
    /// By default:
    /// - Tokens live 15 minutes
    /// - Tokens expiring within 30 minutes are refreshed
    /// - No test account password is set (all logins fail)
    /// - Default tier is `public`, issued tier is `osc`
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl: DEFAULT_TOKEN_TTL,
            refresh_window: DEFAULT_REFRESH_WINDOW,
            test_user_key: None,
            default_tier: DEFAULT_ACCESS_TIER.to_string(),
            elevated_tier: ELEVATED_ACCESS_TIER.to_string(),
        }
    }

    /// Set the token lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the window before expiry in which tokens are renewed.
    pub fn with_refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    /// Set the test account password.
    pub fn with_test_user_key(mut self, key: impl Into<String>) -> Self {
        self.test_user_key = Some(key.into());
        self
    }

    /// Set the tier used when no valid tier claim is available.
    pub fn with_default_tier(mut self, tier: impl Into<String>) -> Self {
        self.default_tier = tier.into();
        self
    }

    /// Set the tier granted by the token endpoint.
    pub fn with_elevated_tier(mut self, tier: impl Into<String>) -> Self {
        self.elevated_tier = tier.into();
        self
    }

    pub fn default_tier(&self) -> AccessClaim {
        AccessClaim::new(self.default_tier.as_str())
    }

    /// Exchange the test account credentials for a token.
    ///
    /// Fails with [`AuthError::InvalidCredentials`] for any other pair.
    pub fn issue_for_credentials(
        &self,
        email: Option<&str>,
        password: Option<&str>,
    ) -> Result<String, AuthError> {
        let accepted = match (&self.test_user_key, email, password) {
            (Some(expected), Some(email), Some(password)) => {
                let password_ok: bool = password.as_bytes().ct_eq(expected.as_bytes()).into();
                email == TEST_ACCOUNT && password_ok
            }
            _ => false,
        };

        if !accepted {
            return Err(AuthError::InvalidCredentials);
        }

        info!(account = TEST_ACCOUNT, "Issuing access token");
        self.issue(TEST_ACCOUNT, Some(&self.elevated_tier))
    }

    /// Issue a token expiring after the configured lifetime.
    pub fn issue(&self, subject: &str, data_access: Option<&str>) -> Result<String, AuthError> {
        let exp = get_current_timestamp().saturating_add(self.ttl.as_secs());
        self.issue_with_expiry(subject, data_access, Some(exp))
    }

    /// Issue a token with an explicit expiry (`None` never expires).
    pub fn issue_with_expiry(
        &self,
        subject: &str,
        data_access: Option<&str>,
        exp: Option<u64>,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            sub: subject.to_string(),
            data_access: data_access.map(str::to_string),
            iat: get_current_timestamp(),
            exp,
            token_type: access_token_type(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Verify a token's signature and expiry.
    ///
    /// Tokens without an `exp` claim are accepted as non-expiring.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.required_spec_claims.clear();

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }

    /// Resolve the caller's access tier from an optional bearer token.
    ///
    /// Never fails: anything short of a valid token carrying a tier claim
    /// yields the default tier.
    pub fn resolve_access(&self, token: Option<&str>) -> AccessClaim {
        let Some(token) = token else {
            debug!("No JWT, using default access tier");
            return self.default_tier();
        };

        match self.verify(token) {
            Ok(claims) => match claims.data_access {
                Some(tier) if !tier.is_empty() => AccessClaim::new(tier),
                _ => self.default_tier(),
            },
            Err(AuthError::Expired) => {
                info!("Signature has expired");
                self.default_tier()
            }
            Err(e) => {
                warn!(error = %e, "No valid JWT, using default access tier");
                self.default_tier()
            }
        }
    }

    /// Renew a token that expires within the refresh window.
    ///
    /// Returns `Ok(None)` when the token has no expiry or is not yet due.
    /// The new token keeps the identity and tier of the old one.
    pub fn refresh_if_expiring(&self, token: &str) -> Result<Option<String>, AuthError> {
        let claims = self.verify(token)?;
        let Some(exp) = claims.exp else {
            return Ok(None);
        };

        let target = get_current_timestamp().saturating_add(self.refresh_window.as_secs());
        if target <= exp {
            return Ok(None);
        }

        debug!(subject = %claims.sub, "Refreshing expiring token");
        self.issue(&claims.sub, claims.data_access.as_deref()).map(Some)
    }
}

/// Read the bearer token from the request headers.
///
/// Checks `Authorization: Bearer`, then the access token cookie.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(ACCESS_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

// =============================================================================
// Axum Extractors
// =============================================================================

/// The resolved access tier of the caller.
///
/// Never rejects; see [`TokenIssuer::resolve_access`].
#[derive(Debug, Clone)]
pub struct Access(pub AccessClaim);

impl<S> FromRequestParts<S> for Access
where
    TokenIssuer: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let issuer = TokenIssuer::from_ref(state);
        let token = bearer_token(&parts.headers);
        Ok(Access(issuer.resolve_access(token.as_deref())))
    }
}

/// The verified claims of the caller. Rejects with 401.
#[derive(Debug, Clone)]
pub struct Identity(pub Claims);

impl<S> FromRequestParts<S> for Identity
where
    TokenIssuer: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let issuer = TokenIssuer::from_ref(state);
        let token = bearer_token(&parts.headers).ok_or(AuthError::MissingToken)?;
        issuer.verify(&token).map(Identity)
    }
}

// =============================================================================
// Tests
// =============================================================================
