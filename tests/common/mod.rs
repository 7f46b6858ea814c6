//! Common test utilities for E2E tests
//!
//! `MockBackend` stands in for the upstream API; `TestServer` runs the
//! relay in front of it on a random port.

#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{any, get, post},
};
use cookie_relay::{AppState, config};
use serde_json::json;
use tokio::net::TcpListener;

/// Bearer tokens the mock identity route accepts
pub const VALID_TOKENS: [&str; 2] = ["valid-token", "abc"];

#[derive(Default)]
struct MockState {
    identity_hits: AtomicUsize,
    refresh_hits: AtomicUsize,
    protected_hits: AtomicUsize,
    refresh_origin: Mutex<Option<String>>,
}

/// Upstream API double
pub struct MockBackend {
    pub addr: String,
    state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());

        let app = Router::new()
            .route("/api/auth/me", get(identity))
            .route("/api/auth/refresh", post(refresh))
            .route("/api/protected", get(protected))
            .route("/api/notes", any(echo))
            .route("/api/boom", any(boom))
            .route("/api/always-401", any(always_unauthorized))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn identity_hits(&self) -> usize {
        self.state.identity_hits.load(Ordering::SeqCst)
    }

    pub fn refresh_hits(&self) -> usize {
        self.state.refresh_hits.load(Ordering::SeqCst)
    }

    pub fn protected_hits(&self) -> usize {
        self.state.protected_hits.load(Ordering::SeqCst)
    }

    /// `Origin` header of the last refresh call
    pub fn refresh_origin(&self) -> Option<String> {
        self.state.refresh_origin.lock().unwrap().clone()
    }
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    header_value(headers, header::AUTHORIZATION)
        .and_then(|v| v.strip_prefix("Bearer ").map(ToOwned::to_owned))
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookies = header_value(headers, header::COOKIE)?;
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

async fn identity(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.identity_hits.fetch_add(1, Ordering::SeqCst);
    match bearer(&headers) {
        Some(token) if VALID_TOKENS.contains(&token.as_str()) => Json(json!({
            "data": { "id": 1, "email": "ada@example.com", "name": "Ada Lovelace" }
        }))
        .into_response(),
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

/// Behaviour is selected by the refresh cookie's value
async fn refresh(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.refresh_hits.fetch_add(1, Ordering::SeqCst);
    *state.refresh_origin.lock().unwrap() = header_value(&headers, header::ORIGIN);

    match cookie_value(&headers, "refreshToken").as_deref() {
        Some("flat") => Json(json!({ "accessToken": "abc" })).into_response(),
        Some("nested") => Json(json!({ "data": { "accessToken": "abc" } })).into_response(),
        Some("empty") => Json(json!({ "success": true })).into_response(),
        Some("rotate") => (
            [(
                header::SET_COOKIE,
                "refreshToken=rotated; HttpOnly; Path=/api/auth/refresh; Max-Age=604800",
            )],
            Json(json!({ "accessToken": "abc" })),
        )
            .into_response(),
        Some("broken") => StatusCode::BAD_GATEWAY.into_response(),
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn protected(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.protected_hits.fetch_add(1, Ordering::SeqCst);
    match bearer(&headers).as_deref() {
        Some("abc") => Json(json!({ "items": [1, 2, 3] })).into_response(),
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    Json(json!({
        "method": method.as_str(),
        "path": uri.path_and_query().map(|pq| pq.as_str()),
        "authorization": header_value(&headers, header::AUTHORIZATION),
        "cookie": header_value(&headers, header::COOKIE),
        "cacheControl": header_value(&headers, header::CACHE_CONTROL),
        "contentType": header_value(&headers, header::CONTENT_TYPE),
        "body": String::from_utf8_lossy(&body),
    }))
    .into_response()
}

async fn boom() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response()
}

async fn always_unauthorized() -> Response {
    StatusCode::UNAUTHORIZED.into_response()
}

/// Relay configuration pointing at `backend_url`
pub fn test_config(backend_url: &str) -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            protocol: "http".to_string(),
            production: false,
            trust_forwarded_headers: false,
            public_origin: None,
        },
        backend: config::BackendConfig {
            base_url: backend_url.to_string(),
            identity_path: "/api/auth/me".to_string(),
            refresh_path: "/api/auth/refresh".to_string(),
            timeout_seconds: 5,
        },
        cookies: config::CookieConfig {
            access_name: "accessToken".to_string(),
            refresh_name: "refreshToken".to_string(),
            domain: None,
            access_max_age: 900,
            remember_me_max_age: 604_800,
            refresh_max_age: 604_800,
            refresh_path: "/api/auth/refresh".to_string(),
            owns_refresh_cookie: true,
        },
        auth: config::AuthConfig {
            login_path: "/login".to_string(),
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Relay in front of `backend_url` with the default test configuration
    pub async fn new(backend_url: &str) -> Self {
        Self::with_config(test_config(backend_url)).await
    }

    pub async fn with_config(mut config: config::AppConfig) -> Self {
        // Bind first so the relay's loopback origin carries the real port.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = listener.local_addr().unwrap();
        config.server.port = local.port();
        let addr = format!("http://{local}");

        let state = AppState::new(config).unwrap();

        // Redirects are asserted on, never followed.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        let app = cookie_relay::build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }
}

/// All `Set-Cookie` values of a response
pub fn set_cookies(response: &reqwest::Response) -> Vec<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
        .collect()
}

/// The `Set-Cookie` value for cookie `name`
pub fn set_cookie_for(response: &reqwest::Response, name: &str) -> Option<String> {
    set_cookies(response)
        .into_iter()
        .find(|cookie| cookie.starts_with(&format!("{name}=")))
}
