//! API layer
//!
//! HTTP handlers for:
//! - Same-origin API proxy
//! - Server-rendered pages
//! - Metrics (Prometheus)

pub mod metrics;
mod pages;
mod proxy;

pub use metrics::metrics_router;
pub use pages::pages_router;
pub use proxy::proxy_router;
