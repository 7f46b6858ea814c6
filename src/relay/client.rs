//! Authenticated request relay
//!
//! Attaches the browser's session to outbound calls and classifies what
//! comes back. The relay never refreshes a session on its own; see
//! [`super::retry`] for the bounded wrapper that does.

use axum::body::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use serde::{Serialize, de::DeserializeOwned};

use super::{Inbound, RelayError};
use crate::config::AppConfig;
use crate::metrics::UPSTREAM_REQUESTS_TOTAL;

/// Where a relayed call is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestTarget {
    /// The configured upstream API origin
    #[default]
    Backend,
    /// This server itself, so the call passes through its own routes again
    ///
    /// Resolved from the bind address, never from the inbound `Host`.
    Proxy,
}

impl RequestTarget {
    fn label(self) -> &'static str {
        match self {
            RequestTarget::Backend => "backend",
            RequestTarget::Proxy => "proxy",
        }
    }
}

/// `Cache-Control` sent with a relayed call
///
/// Session-bound responses must not be shared across users, so the
/// default is `no-store`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    #[default]
    NoStore,
    NoCache,
    /// Send no directive and let intermediaries decide
    Default,
}

impl CachePolicy {
    fn directive(self) -> Option<&'static str> {
        match self {
            CachePolicy::NoStore => Some("no-store"),
            CachePolicy::NoCache => Some("no-cache"),
            CachePolicy::Default => None,
        }
    }
}

/// Method, body, headers and cache policy of a relayed call
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Bytes>,
    pub headers: HeaderMap,
    pub cache: CachePolicy,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// JSON body with a matching `Content-Type`
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, RelayError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| RelayError::InvalidRequest(format!("unserializable body: {e}")))?;
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.body = Some(Bytes::from(bytes));
        Ok(self)
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }
}

/// Sends requests on behalf of the browser
///
/// Holds only read-only configuration and a pooled client; it is shared
/// by all requests.
#[derive(Debug, Clone)]
pub struct Relay {
    client: reqwest::Client,
    backend_origin: String,
    proxy_origin: String,
    access_cookie: String,
    refresh_route: String,
}

impl Relay {
    pub fn new(client: reqwest::Client, config: &AppConfig) -> Self {
        Self {
            client,
            backend_origin: config.backend.origin().to_string(),
            proxy_origin: config.server.loopback_origin(),
            access_cookie: config.cookies.access_name.clone(),
            refresh_route: config.cookies.refresh_path.clone(),
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn access_cookie_name(&self) -> &str {
        &self.access_cookie
    }

    /// Path of this server's own refresh endpoint
    pub fn refresh_route(&self) -> &str {
        &self.refresh_route
    }

    /// Origin a call to `target` is sent to
    pub fn base_origin(&self, target: RequestTarget) -> &str {
        match target {
            RequestTarget::Backend => &self.backend_origin,
            RequestTarget::Proxy => &self.proxy_origin,
        }
    }

    /// Send a call carrying the inbound session and return whatever the
    /// target answered, without classifying the status
    pub async fn dispatch(
        &self,
        inbound: &Inbound,
        path: &str,
        options: RequestOptions,
        target: RequestTarget,
    ) -> Result<reqwest::Response, RelayError> {
        if !path.starts_with('/') {
            return Err(RelayError::InvalidRequest(format!(
                "relay path must be relative to the origin root: {path}"
            )));
        }
        let url = format!("{}{}", self.base_origin(target), path);

        let mut headers = options.headers;
        if let Some(token) = inbound.access_token(&self.access_cookie) {
            let bearer = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                RelayError::InvalidRequest("access token is not a valid header value".to_string())
            })?;
            headers.insert(header::AUTHORIZATION, bearer);
        }
        if let Some(cookie) = inbound.cookie_header() {
            let cookie = HeaderValue::from_str(cookie).map_err(|_| {
                RelayError::InvalidRequest("cookie header is not a valid header value".to_string())
            })?;
            headers.insert(header::COOKIE, cookie);
        }
        if let Some(directive) = options.cache.directive() {
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(directive));
        }

        tracing::debug!(
            method = %options.method,
            path = %path,
            target = ?target,
            authenticated = headers.contains_key(header::AUTHORIZATION),
            "Relaying request"
        );

        let mut request = self.client.request(options.method, url).headers(headers);
        if let Some(body) = options.body {
            request = request.body(body);
        }

        match request.send().await {
            Ok(response) => {
                let outcome = status_class(response.status());
                UPSTREAM_REQUESTS_TOTAL
                    .with_label_values(&[target.label(), outcome])
                    .inc();
                Ok(response)
            }
            Err(error) => {
                UPSTREAM_REQUESTS_TOTAL
                    .with_label_values(&[target.label(), "unreachable"])
                    .inc();
                tracing::warn!(%error, path = %path, target = ?target, "Relay target unreachable");
                Err(RelayError::from(error))
            }
        }
    }

    /// Send a call carrying the inbound session; any non-2xx is an error
    ///
    /// 401 becomes [`RelayError::Unauthorized`], any other non-2xx becomes
    /// [`RelayError::RequestFailed`], and transport failures become
    /// [`RelayError::Unreachable`].
    pub async fn fetch_authenticated(
        &self,
        inbound: &Inbound,
        path: &str,
        options: RequestOptions,
        target: RequestTarget,
    ) -> Result<reqwest::Response, RelayError> {
        let response = self.dispatch(inbound, path, options, target).await?;
        classify(path, response)
    }

    /// [`Relay::fetch_authenticated`] followed by a JSON decode of the body
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        inbound: &Inbound,
        path: &str,
        options: RequestOptions,
        target: RequestTarget,
    ) -> Result<T, RelayError> {
        let response = self.fetch_authenticated(inbound, path, options, target).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| RelayError::MalformedUpstreamResponse(format!("{path}: {e}")))
    }
}

fn classify(path: &str, response: reqwest::Response) -> Result<reqwest::Response, RelayError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        tracing::debug!(path = %path, "Upstream rejected session");
        return Err(RelayError::Unauthorized);
    }
    if !status.is_success() {
        tracing::warn!(path = %path, status = %status, "Relayed request failed");
        return Err(RelayError::RequestFailed {
            path: path.to_string(),
            status,
        });
    }
    Ok(response)
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        401 => "unauthorized",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay() -> Relay {
        Relay::new(
            reqwest::Client::new(),
            &crate::config::test_config("http://backend.internal:4000/"),
        )
    }

    #[test]
    fn target_selects_origin() {
        let relay = relay();

        assert_eq!(
            relay.base_origin(RequestTarget::Backend),
            "http://backend.internal:4000"
        );
        assert_eq!(relay.base_origin(RequestTarget::Proxy), "http://127.0.0.1:3000");
        assert_eq!(RequestTarget::default(), RequestTarget::Backend);
    }

    #[test]
    fn default_options_never_cache() {
        let options = RequestOptions::get();
        assert_eq!(options.method, Method::GET);
        assert_eq!(options.cache.directive(), Some("no-store"));
        assert_eq!(CachePolicy::Default.directive(), None);
    }

    #[test]
    fn json_body_sets_content_type() {
        let options = RequestOptions::get()
            .with_method(Method::POST)
            .json(&serde_json::json!({ "title": "note" }))
            .unwrap();
        assert_eq!(
            options.headers.get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(options.body.unwrap(), Bytes::from_static(br#"{"title":"note"}"#));
    }

    #[tokio::test]
    async fn absolute_path_is_rejected_before_io() {
        let err = relay()
            .fetch_authenticated(
                &Inbound::new("http://localhost:3000"),
                "https://evil.example.com/steal",
                RequestOptions::get(),
                RequestTarget::Backend,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidRequest(_)));
    }

    #[test]
    fn status_classes() {
        assert_eq!(status_class(StatusCode::OK), "2xx");
        assert_eq!(status_class(StatusCode::UNAUTHORIZED), "unauthorized");
        assert_eq!(status_class(StatusCode::NOT_FOUND), "4xx");
        assert_eq!(status_class(StatusCode::BAD_GATEWAY), "5xx");
    }
}
