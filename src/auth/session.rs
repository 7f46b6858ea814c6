//! Session endpoint
//!
//! Places the access token obtained by a client-side login flow into the
//! access-token cookie, and deletes it on logout. The token's authenticity
//! is not checked here; whoever issued it owns that.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use super::cookie::TokenKind;
use crate::AppState;
use crate::error::AppError;
use crate::metrics::SESSION_EVENTS_TOTAL;

/// POST /api/auth/session body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstablishRequest {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub remember_me: Option<bool>,
}

/// `{ "success": true }`
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub success: bool,
}

/// POST /api/auth/session
///
/// 400 without a cookie when `accessToken` is missing or empty; otherwise
/// writes the cookie for 900 s, or 604800 s with `rememberMe`.
pub async fn establish(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<EstablishRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<SessionResponse>), AppError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected session body");
        AppError::Validation("Invalid request body".to_string())
    })?;

    let access_token = request
        .access_token
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| AppError::Validation("accessToken is required".to_string()))?;

    let remember_me = request.remember_me.unwrap_or(false);
    let max_age = state.cookies.access_lifetime(remember_me);
    let jar = jar.add(state.cookies.access_cookie(&access_token, max_age));

    SESSION_EVENTS_TOTAL.with_label_values(&["established"]).inc();
    tracing::info!(remember_me, max_age, "Session cookie established");

    Ok((jar, Json(SessionResponse { success: true })))
}

/// DELETE /api/auth/session
///
/// Always 200. Deletes the access-token cookie, and the refresh-token
/// cookie when this server owns it, whether or not they were ever set.
pub async fn terminate(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<SessionResponse>) {
    let mut jar = jar.add(state.cookies.removal(TokenKind::Access));
    if state.cookies.owns_refresh_cookie {
        jar = jar.add(state.cookies.removal(TokenKind::Refresh));
    }

    SESSION_EVENTS_TOTAL.with_label_values(&["terminated"]).inc();
    tracing::info!("Session cookies cleared");

    (jar, Json(SessionResponse { success: true }))
}
