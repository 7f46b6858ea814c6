//! Refresh endpoint
//!
//! Trades the refresh cookie for a new access token. The upstream call is
//! made directly: the relay would need the very access token that is being
//! renewed.

use axum::{
    Json,
    extract::State,
    http::{HeaderName, StatusCode, header},
    response::AppendHeaders,
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;
use serde::Serialize;
use serde_json::Value;

use super::cookie::{CookieSettings, TokenKind};
use crate::AppState;
use crate::error::AppError;
use crate::metrics::REFRESH_TOTAL;
use crate::relay::{Inbound, RelayError};

const REFRESH_FAILED_MESSAGE: &str = "Failed to refresh token";

/// Where the upstream put the new access token
///
/// Upstream payloads may or may not be wrapped in a `data` envelope.
/// A flat `accessToken` is looked for first, `data.accessToken` second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEnvelope {
    Flat(String),
    Nested(String),
}

impl TokenEnvelope {
    pub fn decode(body: &Value) -> Option<Self> {
        token_at(body.get("accessToken"))
            .map(TokenEnvelope::Flat)
            .or_else(|| {
                token_at(body.get("data").and_then(|data| data.get("accessToken")))
                    .map(TokenEnvelope::Nested)
            })
    }

    pub fn into_token(self) -> String {
        match self {
            TokenEnvelope::Flat(token) | TokenEnvelope::Nested(token) => token,
        }
    }
}

fn token_at(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(ToOwned::to_owned)
}

/// Successful refresh body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    pub access_token: String,
}

struct RenewedSession {
    access_token: String,
    /// Ready-to-send `Set-Cookie` values
    rotated_refresh: Vec<String>,
}

/// Sent outside the jar so upstream's value reaches the browser unencoded
type RotatedCookies = AppendHeaders<Vec<(HeaderName, String)>>;

/// POST {refresh path}
///
/// Forwards the browser's cookies and origin to the upstream refresh route
/// and writes the renewed access-token cookie. A 401 from upstream also
/// deletes the access-token cookie.
pub async fn refresh(
    State(state): State<AppState>,
    inbound: Inbound,
    jar: CookieJar,
) -> Result<(CookieJar, RotatedCookies, Json<RefreshResponse>), (CookieJar, AppError)> {
    let cookies = &state.cookies;

    match exchange_refresh_cookie(&state, &inbound).await {
        Ok(renewed) => {
            let access = cookies.access_cookie(&renewed.access_token, cookies.access_max_age);
            let jar = jar.add(access);
            let rotated = renewed
                .rotated_refresh
                .into_iter()
                .map(|cookie| (header::SET_COOKIE, cookie))
                .collect();

            REFRESH_TOTAL.with_label_values(&["success"]).inc();
            tracing::info!("Access token refreshed");

            Ok((
                jar,
                AppendHeaders(rotated),
                Json(RefreshResponse {
                    success: true,
                    access_token: renewed.access_token,
                }),
            ))
        }
        Err(error) => {
            let unauthorized = match &error {
                AppError::Unauthorized => true,
                AppError::Upstream { status, .. } => *status == StatusCode::UNAUTHORIZED,
                _ => false,
            };
            REFRESH_TOTAL
                .with_label_values(&[if unauthorized { "unauthorized" } else { "failed" }])
                .inc();

            if unauthorized {
                tracing::info!("Refresh rejected; clearing access token cookie");
                Err((jar.add(cookies.removal(TokenKind::Access)), error))
            } else {
                tracing::warn!(%error, "Refresh failed");
                Err((jar, error))
            }
        }
    }
}

async fn exchange_refresh_cookie(
    state: &AppState,
    inbound: &Inbound,
) -> Result<RenewedSession, AppError> {
    let refresh_name = &state.cookies.refresh_name;
    if inbound.cookie(refresh_name).is_none() {
        return Err(AppError::Unauthorized);
    }

    let backend = &state.config.backend;
    let url = format!("{}{}", backend.origin(), backend.refresh_path);

    let mut request = state
        .http_client
        .post(url)
        .header(header::ORIGIN, inbound.origin_or_own())
        .header(header::CACHE_CONTROL, "no-store");
    if let Some(cookie) = inbound.cookie_header() {
        request = request.header(header::COOKIE, cookie);
    }

    let response = request.send().await.map_err(RelayError::from)?;
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Upstream {
            status,
            message: REFRESH_FAILED_MESSAGE.to_string(),
        });
    }

    let rotated_refresh = rotated_refresh_cookies(response.headers(), &state.cookies);
    let body: Value = response
        .json()
        .await
        .map_err(|_| AppError::MissingAccessToken)?;
    let access_token = TokenEnvelope::decode(&body)
        .ok_or(AppError::MissingAccessToken)?
        .into_token();

    Ok(RenewedSession {
        access_token,
        rotated_refresh,
    })
}

/// Upstream `Set-Cookie` headers re-issuing the refresh cookie, rebuilt
/// with our own refresh-cookie attributes
///
/// The value is kept in upstream's wire form and rendered unencoded.
fn rotated_refresh_cookies(
    headers: &header::HeaderMap,
    settings: &CookieSettings,
) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|raw| Cookie::parse(raw).ok())
        .filter(|cookie| cookie.name() == settings.refresh_name)
        .map(|cookie| {
            let max_age = cookie.max_age().map(|age| age.whole_seconds());
            settings.refresh_cookie(cookie.value(), max_age).to_string()
        })
        .collect()
}
