//! Cookie-backed browser sessions
//!
//! Handles:
//! - Session cookie placement and removal
//! - Access-token refresh
//! - Current-user resolution for pages

pub mod cookie;
mod current_user;
mod refresh;
mod session;

use axum::{Router, routing::post};

use crate::AppState;
use crate::config::AppConfig;

pub use cookie::{CookieAttributes, CookieSettings, TokenKind};
pub use current_user::{AuthRejection, CurrentUser, RenderScope, User};
pub use refresh::{RefreshResponse, TokenEnvelope};
pub use session::{EstablishRequest, SessionResponse};

/// Path of the session endpoint
pub const SESSION_ROUTE: &str = "/api/auth/session";

/// Create authentication router
///
/// Routes:
/// - POST /api/auth/session - Store access token cookie
/// - DELETE /api/auth/session - Clear session cookies
/// - POST {cookies.refresh_path} - Renew access token
///
/// The refresh route lives at the refresh cookie's path so the browser
/// sends that cookie to it and to nothing else.
pub fn auth_router(config: &AppConfig) -> Router<AppState> {
    Router::new()
        .route(
            SESSION_ROUTE,
            post(session::establish).delete(session::terminate),
        )
        .route(&config.cookies.refresh_path, post(refresh::refresh))
}
