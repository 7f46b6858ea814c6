//! Same-origin API proxy
//!
//! Every `/api/*` call not answered locally is relayed to the upstream API
//! with the browser's session attached, and the upstream answer is handed
//! back as-is. This is what the relay's same-origin target resolves to.

use axum::{
    Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderName, Method, Uri, header},
    response::{IntoResponse, Response},
    routing::any,
};

use crate::AppState;
use crate::error::AppError;
use crate::relay::{CachePolicy, Inbound, RequestOptions, RequestTarget};

/// Request headers passed on to the upstream API
///
/// `Authorization` is rebuilt by the relay from the session.
const FORWARDED_REQUEST_HEADERS: [HeaderName; 4] = [
    header::ACCEPT,
    header::ACCEPT_LANGUAGE,
    header::CONTENT_TYPE,
    header::IF_NONE_MATCH,
];

/// Response headers passed back to the browser
const FORWARDED_RESPONSE_HEADERS: [HeaderName; 6] = [
    header::CACHE_CONTROL,
    header::CONTENT_TYPE,
    header::ETAG,
    header::LOCATION,
    header::SET_COOKIE,
    header::WWW_AUTHENTICATE,
];

/// Create proxy router
///
/// Routes:
/// - ANY /api/*path - Relay to upstream
pub fn proxy_router() -> Router<AppState> {
    Router::new().route("/api/*path", any(forward))
}

async fn forward(
    State(state): State<AppState>,
    inbound: Inbound,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());

    // An explicit bearer (e.g. a retry after refresh) beats the cookie.
    let inbound = match bearer_token(&headers) {
        Some(token) => inbound.with_access_token(token),
        None => inbound,
    };

    let mut options = RequestOptions::get()
        .with_method(method)
        .with_headers(select_headers(&headers, &FORWARDED_REQUEST_HEADERS))
        .with_cache(CachePolicy::NoStore);
    if !body.is_empty() {
        options = options.with_body(body);
    }

    let upstream = state
        .relay
        .dispatch(&inbound, path, options, RequestTarget::Backend)
        .await?;

    let status = upstream.status();
    let response_headers = select_headers(upstream.headers(), &FORWARDED_RESPONSE_HEADERS);
    let bytes = upstream
        .bytes()
        .await
        .map_err(crate::relay::RelayError::from)?;

    tracing::debug!(path = %path, status = %status, "Proxied API call");

    let mut response = (status, Body::from(bytes)).into_response();
    response.headers_mut().extend(response_headers);
    Ok(response)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn select_headers(source: &HeaderMap, allowed: &[HeaderName]) -> HeaderMap {
    let mut selected = HeaderMap::new();
    for name in allowed {
        for value in source.get_all(name) {
            selected.append(name.clone(), value.clone());
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn select_headers_keeps_only_allowed_and_repeats() {
        let mut source = HeaderMap::new();
        source.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        source.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));
        source.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        source.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        source.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));

        let selected = select_headers(&source, &FORWARDED_RESPONSE_HEADERS);
        assert_eq!(selected.get_all(header::SET_COOKIE).iter().count(), 2);
        assert!(selected.contains_key(header::CONTENT_TYPE));
        assert!(!selected.contains_key(header::CONNECTION));
        assert!(!selected.contains_key(header::CONTENT_LENGTH));
    }

    #[test]
    fn bearer_token_requires_bearer_scheme() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer fresh"));
        assert_eq!(bearer_token(&headers), Some("fresh"));
    }
}
