//! E2E tests for the same-origin API proxy

mod common;

use common::{MockBackend, TestServer};
use serde_json::{Value, json};

#[tokio::test]
async fn test_proxy_turns_cookie_into_bearer() {
    let backend = MockBackend::start().await;
    let server = TestServer::new(&backend.addr).await;

    let response = server
        .client
        .get(server.url("/api/notes?page=2"))
        .header("Cookie", "accessToken=abc")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["method"], json!("GET"));
    assert_eq!(body["path"], json!("/api/notes?page=2"));
    assert_eq!(body["authorization"], json!("Bearer abc"));
    assert_eq!(body["cookie"], json!("accessToken=abc"));
    assert_eq!(body["cacheControl"], json!("no-store"));
}

#[tokio::test]
async fn test_proxy_forwards_method_and_body() {
    let backend = MockBackend::start().await;
    let server = TestServer::new(&backend.addr).await;

    let response = server
        .client
        .put(server.url("/api/notes"))
        .header("Cookie", "accessToken=abc")
        .json(&json!({ "title": "draft" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["method"], json!("PUT"));
    assert_eq!(body["contentType"], json!("application/json"));
    assert_eq!(body["body"], json!(r#"{"title":"draft"}"#));
}

#[tokio::test]
async fn test_proxy_prefers_explicit_bearer_over_cookie() {
    let backend = MockBackend::start().await;
    let server = TestServer::new(&backend.addr).await;

    let response = server
        .client
        .get(server.url("/api/notes"))
        .header("Cookie", "accessToken=stale")
        .header("Authorization", "Bearer fresh")
        .send()
        .await
        .unwrap();

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["authorization"], json!("Bearer fresh"));
}

#[tokio::test]
async fn test_proxy_passes_upstream_errors_through() {
    let backend = MockBackend::start().await;
    let server = TestServer::new(&backend.addr).await;

    let response = server
        .client
        .get(server.url("/api/boom"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    assert_eq!(response.text().await.unwrap(), "upstream exploded");

    let response = server
        .client
        .get(server.url("/api/always-401"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_proxy_with_unreachable_upstream() {
    let server = TestServer::new("http://127.0.0.1:9").await;

    let response = server
        .client
        .get(server.url("/api/notes"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn test_session_route_is_not_proxied() {
    let backend = MockBackend::start().await;
    let server = TestServer::new(&backend.addr).await;

    let response = server
        .client
        .post(server.url("/api/auth/session"))
        .json(&json!({ "accessToken": "abc" }))
        .send()
        .await
        .unwrap();

    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "success": true }));
}

#[tokio::test]
async fn test_token_with_reserved_characters_survives_the_cookie() {
    let backend = MockBackend::start().await;
    let server = TestServer::new(&backend.addr).await;
    let token = "abc/def+ghi==";

    let response = server
        .client
        .post(server.url("/api/auth/session"))
        .json(&json!({ "accessToken": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Send back exactly the name=value pair the browser would store.
    let set_cookie = common::set_cookie_for(&response, "accessToken").expect("access cookie");
    let pair = set_cookie.split(';').next().unwrap().to_string();

    let response = server
        .client
        .get(server.url("/api/notes"))
        .header("Cookie", pair)
        .send()
        .await
        .unwrap();

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["authorization"], json!(format!("Bearer {token}")));
}
