//! What the relay needs to know about the request being served

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use axum_extra::extract::cookie::Cookie;

use crate::AppState;
use crate::config::ServerConfig;

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Credentials and origin of the inbound browser request
///
/// Captured once per request and passed explicitly to every relay call;
/// nothing about it outlives the request.
#[derive(Debug, Clone)]
pub struct Inbound {
    cookie_header: Option<String>,
    origin_header: Option<String>,
    own_origin: String,
    path_and_query: String,
    access_override: Option<String>,
}

impl Inbound {
    /// Context for a request served at `own_origin` (scheme + host)
    pub fn new(own_origin: impl Into<String>) -> Self {
        Self {
            cookie_header: None,
            origin_header: None,
            own_origin: own_origin.into().trim_end_matches('/').to_string(),
            path_and_query: "/".to_string(),
            access_override: None,
        }
    }

    pub fn with_cookie_header(mut self, cookie_header: impl Into<String>) -> Self {
        self.cookie_header = Some(cookie_header.into());
        self
    }

    pub fn with_origin_header(mut self, origin: impl Into<String>) -> Self {
        self.origin_header = Some(origin.into());
        self
    }

    pub fn with_path_and_query(mut self, path_and_query: impl Into<String>) -> Self {
        self.path_and_query = path_and_query.into();
        self
    }

    /// Use `token` as the bearer credential instead of the access cookie
    ///
    /// The forwarded `Cookie` header is left untouched.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_override = Some(token.into());
        self
    }

    pub fn from_parts(parts: &Parts, server: &ServerConfig) -> Self {
        let headers = &parts.headers;
        let own_origin = derive_own_origin(headers, parts, server);

        let mut inbound = Inbound::new(own_origin).with_path_and_query(
            parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| parts.uri.path().to_string()),
        );
        inbound.cookie_header = header_str(headers, header::COOKIE.as_str());
        inbound.origin_header = header_str(headers, header::ORIGIN.as_str());
        inbound
    }

    /// The raw `Cookie` header, exactly as the browser sent it
    pub fn cookie_header(&self) -> Option<&str> {
        self.cookie_header.as_deref()
    }

    /// Value of the cookie called `name`, if present and non-empty
    ///
    /// Values are percent-decoded, matching how `CookieJar` writes them.
    pub fn cookie(&self, name: &str) -> Option<String> {
        let header = self.cookie_header.as_deref()?;
        Cookie::split_parse_encoded(header)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == name)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
    }

    /// Bearer credential for outbound calls
    pub fn access_token(&self, cookie_name: &str) -> Option<String> {
        self.access_override
            .clone()
            .filter(|token| !token.is_empty())
            .or_else(|| self.cookie(cookie_name))
    }

    /// Scheme + host this server was reached on
    pub fn own_origin(&self) -> &str {
        &self.own_origin
    }

    /// The browser's `Origin` header, or our own origin when absent
    pub fn origin_or_own(&self) -> &str {
        self.origin_header.as_deref().unwrap_or(&self.own_origin)
    }

    pub fn path_and_query(&self) -> &str {
        &self.path_and_query
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn derive_own_origin(headers: &HeaderMap, parts: &Parts, server: &ServerConfig) -> String {
    let forwarded = |name: &str| {
        if server.trust_forwarded_headers {
            // Proxies may append; the first entry is the client-facing one.
            header_str(headers, name)
                .and_then(|value| value.split(',').next().map(|v| v.trim().to_string()))
                .filter(|value| !value.is_empty())
        } else {
            None
        }
    };

    let scheme = forwarded(X_FORWARDED_PROTO)
        .or_else(|| parts.uri.scheme_str().map(ToOwned::to_owned))
        .unwrap_or_else(|| server.protocol.to_ascii_lowercase());

    let host = forwarded(X_FORWARDED_HOST)
        .or_else(|| header_str(headers, header::HOST.as_str()))
        .or_else(|| parts.uri.authority().map(|a| a.as_str().to_string()))
        .unwrap_or_else(|| format!("{}:{}", server.host, server.port));

    format!("{scheme}://{host}")
}

#[async_trait]
impl<S> FromRequestParts<S> for Inbound
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        Ok(Inbound::from_parts(parts, &state.config.server))
    }
}
