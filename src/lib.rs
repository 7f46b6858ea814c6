//! cookie-relay - Cookie-backed session bridge for a bearer-token API
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Layer (Axum)                       │
//! │  - Session / refresh endpoints                              │
//! │  - Same-origin /api proxy                                   │
//! │  - Pages resolving the current user                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Relay                                 │
//! │  - Cookie -> bearer credential                              │
//! │  - Backend / same-origin targets                            │
//! │  - Failure classification                                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Upstream API (external)                   │
//! │  - Issues and validates access / refresh tokens             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `auth`: cookie codec, session and refresh endpoints, current user
//! - `relay`: authenticated outbound requests
//! - `api`: proxy, pages and metrics routes
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod relay;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Read-only after startup; nothing request-specific lives here.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Session cookie policy
    pub cookies: Arc<auth::CookieSettings>,

    /// Relay for authenticated upstream calls
    pub relay: Arc<relay::Relay>,

    /// HTTP client for direct upstream calls
    pub http_client: Arc<reqwest::Client>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or the HTTP client
    /// cannot be built
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");
        config.validate()?;

        // Redirects are handed back to the browser, never followed here.
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("cookie-relay/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(config.backend.timeout_seconds))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let cookies = auth::CookieSettings::from_config(&config);
        let relay = relay::Relay::new(http_client.clone(), &config);

        tracing::info!(
            backend = %config.backend.origin(),
            secure_cookies = cookies.secure,
            "Application state initialized successfully"
        );

        Ok(Self {
            config: Arc::new(config),
            cookies: Arc::new(cookies),
            relay: Arc::new(relay),
            http_client: Arc::new(http_client),
        })
    }
}

/// Request bodies larger than this are rejected before reaching a handler
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(auth::auth_router(&state.config))
        .merge(api::pages_router(&state.config.auth.login_path))
        .merge(api::proxy_router())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
        .merge(api::metrics_router())
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::{HeaderValue, Method, header};
    use tower_http::cors::{AllowOrigin, CorsLayer};

    if !server.production {
        return CorsLayer::permissive();
    }

    let Some(public_origin) = server.public_origin.as_deref() else {
        // Same-origin only.
        return CorsLayer::new();
    };

    match HeaderValue::from_str(public_origin.trim_end_matches('/')) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin))
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %public_origin,
                "Failed to parse CORS origin; denying cross-origin requests"
            );
            CorsLayer::new()
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
