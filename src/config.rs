//! Configuration management for the physical-risk gateway.
//!
//! This module provides a configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `PHYSRISK_` prefix
//! - An optional `credentials.env` file loaded before parsing
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use physrisk_gateway::config::{load_credentials_file, Config};
//!
//! load_credentials_file()?;
//! let config = Config::parse();
//! println!("Listening on {}", config.bind_address());
//! ```
//!
//! # Environment Variables
//!
//! - `PHYSRISK_HOST` - Server bind address (default: 0.0.0.0)
//! - `PHYSRISK_PORT` - Server port (default: 8000)
//! - `PHYSRISK_MAX_BODY_SIZE` - Request body limit in bytes for queries (default: 256MB)
//! - `PHYSRISK_ENGINE_URL` - Base URL of the risk engine (required)
//! - `PHYSRISK_ENGINE_TIMEOUT` - Engine request timeout in seconds (default: 120)
//! - `PHYSRISK_JWT_SECRET` - HMAC secret for signing tokens (required)
//! - `OSC_TEST_USER_KEY` - Password of the test account
//! - `PHYSRISK_TOKEN_TTL` - Token lifetime in seconds (default: 900)
//! - `PHYSRISK_REFRESH_WINDOW` - Renew tokens expiring within this many seconds (default: 1800)
//! - `PHYSRISK_DEFAULT_ACCESS_TIER` - Tier for anonymous callers (default: public)
//! - `PHYSRISK_ELEVATED_ACCESS_TIER` - Tier granted by /api/token (default: osc)
//! - `PHYSRISK_CACHE_IMAGES` - Image cache size in bytes, 0 disables (default: 64MB)
//! - `PHYSRISK_CORS_ORIGINS` - Allowed CORS origins, comma-separated
//! - `CREDENTIAL_DOTENV_DIR` - Directory holding `credentials.env`

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::compute::{DEFAULT_ENGINE_TIMEOUT, DEFAULT_IMAGE_CACHE_CAPACITY};
use crate::server::auth::{
    DEFAULT_ACCESS_TIER, DEFAULT_REFRESH_WINDOW, DEFAULT_TOKEN_TTL, ELEVATED_ACCESS_TIER,
};
use crate::server::routes::DEFAULT_MAX_BODY_SIZE;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8000;

/// Environment variable naming the directory of the credentials file.
pub const CREDENTIALS_DIR_ENV: &str = "CREDENTIAL_DOTENV_DIR";

/// Credentials file name.
pub const CREDENTIALS_FILE: &str = "credentials.env";

// =============================================================================
// CLI Arguments
// =============================================================================

/// physrisk-gateway - An HTTP gateway for physical-risk analytics.
///
/// Forwards hazard, exposure and impact queries and image requests to a risk
/// engine, filtering data by the caller's access tier.
#[derive(Parser, Debug, Clone)]
#[command(name = "physrisk-gateway")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "PHYSRISK_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PHYSRISK_PORT")]
    pub port: u16,

    /// Largest accepted request body in bytes for the JSON query endpoints.
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_SIZE, env = "PHYSRISK_MAX_BODY_SIZE")]
    pub max_body_size: usize,

    // =========================================================================
    // Engine Configuration
    // =========================================================================
    /// Base URL of the risk engine (e.g. http://localhost:9000).
    #[arg(long, env = "PHYSRISK_ENGINE_URL")]
    pub engine_url: String,

    /// Engine request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_ENGINE_TIMEOUT.as_secs(), env = "PHYSRISK_ENGINE_TIMEOUT")]
    pub engine_timeout: u64,

    /// Image cache size in bytes (0 disables caching).
    #[arg(long, default_value_t = DEFAULT_IMAGE_CACHE_CAPACITY, env = "PHYSRISK_CACHE_IMAGES")]
    pub cache_images: usize,

    // =========================================================================
    // Authentication Configuration
    // =========================================================================
    /// HMAC secret for signing access tokens.
    #[arg(long, env = "PHYSRISK_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Password of the test account.
    ///
    /// If not provided, the token endpoint rejects all credentials.
    #[arg(long, env = "OSC_TEST_USER_KEY", hide_env_values = true)]
    pub test_user_key: Option<String>,

    /// Access token lifetime in seconds.
    #[arg(long, default_value_t = DEFAULT_TOKEN_TTL.as_secs(), env = "PHYSRISK_TOKEN_TTL")]
    pub token_ttl: u64,

    /// Renew tokens expiring within this many seconds.
    #[arg(long, default_value_t = DEFAULT_REFRESH_WINDOW.as_secs(), env = "PHYSRISK_REFRESH_WINDOW")]
    pub refresh_window: u64,

    /// Access tier for callers without a valid token.
    #[arg(long, default_value = DEFAULT_ACCESS_TIER, env = "PHYSRISK_DEFAULT_ACCESS_TIER")]
    pub default_access_tier: String,

    /// Access tier granted to tokens from /api/token.
    #[arg(long, default_value = ELEVATED_ACCESS_TIER, env = "PHYSRISK_ELEVATED_ACCESS_TIER")]
    pub elevated_access_tier: String,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, any origin is allowed.
    #[arg(long, env = "PHYSRISK_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.engine_url()?;

        match self.jwt_secret.as_deref() {
            None | Some("") => {
                return Err(
                    "No token signing secret provided. Set --jwt-secret or PHYSRISK_JWT_SECRET"
                        .to_string(),
                );
            }
            Some(_) => {}
        }

        if self.engine_timeout == 0 {
            return Err("engine_timeout must be greater than 0".to_string());
        }
        if self.token_ttl == 0 {
            return Err("token_ttl must be greater than 0".to_string());
        }
        if self.max_body_size == 0 {
            return Err("max_body_size must be greater than 0".to_string());
        }

        if self.default_access_tier.trim().is_empty() {
            return Err("default_access_tier must not be empty".to_string());
        }
        if self.elevated_access_tier.trim().is_empty() {
            return Err("elevated_access_tier must not be empty".to_string());
        }

        Ok(())
    }

    /// Parse the engine base URL.
    pub fn engine_url(&self) -> Result<Url, String> {
        if self.engine_url.is_empty() {
            return Err(
                "Engine URL is required. Set --engine-url or PHYSRISK_ENGINE_URL".to_string(),
            );
        }

        let url = Url::parse(&self.engine_url)
            .map_err(|e| format!("Invalid engine URL '{}': {}", self.engine_url, e))?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(format!(
                "Engine URL must use http or https, got '{}'",
                scheme
            )),
        }
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl)
    }

    pub fn refresh_window(&self) -> Duration {
        Duration::from_secs(self.refresh_window)
    }

    /// Get the signing secret, empty if not set (call validate() first).
    pub fn jwt_secret_or_empty(&self) -> &str {
        self.jwt_secret.as_deref().unwrap_or("")
    }
}

// =============================================================================
// Credentials File
// =============================================================================

/// Location of the credentials file.
///
/// `$CREDENTIAL_DOTENV_DIR/credentials.env`, or `./credentials.env`.
pub fn credentials_path() -> PathBuf {
    credentials_path_in(env::var_os(CREDENTIALS_DIR_ENV).map(PathBuf::from))
}

fn credentials_path_in(dir: Option<PathBuf>) -> PathBuf {
    dir.unwrap_or_else(|| PathBuf::from(".")).join(CREDENTIALS_FILE)
}

/// Load the credentials file into the environment, if present.
///
/// Values in the file override variables already set. Returns the path that
/// was loaded.
pub fn load_credentials_file() -> Result<Option<PathBuf>, dotenvy::Error> {
    load_credentials_from(&credentials_path())
}

fn load_credentials_from(path: &Path) -> Result<Option<PathBuf>, dotenvy::Error> {
    if !path.is_file() {
        return Ok(None);
    }

    dotenvy::from_path_override(path)?;
    Ok(Some(path.to_path_buf()))
}

// =============================================================================
// Tests
// =============================================================================
