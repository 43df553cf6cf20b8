//! physrisk-gateway - An HTTP gateway for physical-risk analytics.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use physrisk_gateway::{
    config::{load_credentials_file, Config},
    create_router, CachingRequester, RemoteRequester, RouterConfig, TokenIssuer,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Credentials must be in the environment before clap reads it
    let credentials = load_credentials_file();

    let config = Config::parse();
    init_logging(config.verbose);

    match credentials {
        Ok(Some(path)) => info!("Loaded credentials from {}", path.display()),
        Ok(None) => {}
        Err(e) => {
            error!("Failed to load credentials file: {}", e);
            return ExitCode::FAILURE;
        }
    }

    run_serve(config).await
}

// =============================================================================
// Serve
// =============================================================================

async fn run_serve(config: Config) -> ExitCode {
    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let engine_url = match config.engine_url() {
        Ok(url) => url,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("physrisk-gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Engine: {}", engine_url);
    info!("  Engine timeout: {}s", config.engine_timeout);
    info!("  Max request body: {} bytes", config.max_body_size);
    info!(
        "  Access tiers: default '{}', elevated '{}'",
        config.default_access_tier, config.elevated_access_tier
    );
    info!(
        "  Tokens: {}s lifetime, renewed within {}s of expiry",
        config.token_ttl, config.refresh_window
    );
    if config.test_user_key.is_none() {
        warn!("  Test account: DISABLED - OSC_TEST_USER_KEY is not set");
        warn!("                /api/token will reject all credentials");
    }
    if config.cache_images > 0 {
        info!("  Image cache: {}MB", config.cache_images / (1024 * 1024));
    } else {
        info!("  Image cache: disabled");
    }

    let engine = match RemoteRequester::new(engine_url, config.engine_timeout()) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to create engine client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let issuer = build_token_issuer(&config);
    let router_config = build_router_config(&config);

    let router = if config.cache_images > 0 {
        let requester = CachingRequester::with_cache_capacity(engine, config.cache_images);
        create_router(requester, issuer, router_config)
    } else {
        create_router(engine, issuer, router_config)
    };

    // Bind and serve
    let addr = config.bind_address();

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "physrisk_gateway=debug,tower_http=debug"
    } else {
        "physrisk_gateway=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the TokenIssuer from the application Config.
fn build_token_issuer(config: &Config) -> TokenIssuer {
    let mut issuer = TokenIssuer::new(config.jwt_secret_or_empty())
        .with_ttl(config.token_ttl())
        .with_refresh_window(config.refresh_window())
        .with_default_tier(config.default_access_tier.as_str())
        .with_elevated_tier(config.elevated_access_tier.as_str());

    if let Some(ref key) = config.test_user_key {
        issuer = issuer.with_test_user_key(key.as_str());
    }

    issuer
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new();

    // Apply CORS origins
    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    // Apply tracing setting
    router_config
        .with_max_body_size(config.max_body_size)
        .with_tracing(!config.no_tracing)
}
