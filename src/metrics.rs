//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Relay Metrics
    pub static ref UPSTREAM_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("cookie_relay_upstream_requests_total", "Total number of relayed upstream requests"),
        &["target", "outcome"]
    ).expect("metric can be created");

    // Session Metrics
    pub static ref SESSION_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("cookie_relay_session_events_total", "Total number of session cookie writes"),
        &["event"]
    ).expect("metric can be created");
    pub static ref REFRESH_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("cookie_relay_refresh_total", "Total number of refresh attempts"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref IDENTITY_LOOKUPS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("cookie_relay_identity_lookups_total", "Total number of current-user lookups sent upstream"),
        &["result"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("cookie_relay_errors_total", "Total number of error responses"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(UPSTREAM_REQUESTS_TOTAL.clone()))
        .expect("UPSTREAM_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(SESSION_EVENTS_TOTAL.clone()))
        .expect("SESSION_EVENTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(REFRESH_TOTAL.clone()))
        .expect("REFRESH_TOTAL can be registered");
    REGISTRY
        .register(Box::new(IDENTITY_LOOKUPS_TOTAL.clone()))
        .expect("IDENTITY_LOOKUPS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
