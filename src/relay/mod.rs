//! Authenticated request relay
//!
//! Carries the browser's cookie session to the upstream API (or back to
//! this server) as a bearer credential.

mod client;
mod error;
mod inbound;
pub mod retry;

pub use client::{CachePolicy, Relay, RequestOptions, RequestTarget};
pub use error::RelayError;
pub use inbound::Inbound;
pub use retry::{Renewed, fetch_with_refresh};
