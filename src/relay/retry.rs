//! Bounded refresh-and-retry
//!
//! Opt-in wrapper for call sites that want one automatic renewal. The
//! relay itself never retries.

use http::Method;
use serde_json::Value;

use super::{Inbound, Relay, RelayError, RequestOptions, RequestTarget};
use crate::auth::TokenEnvelope;

/// Response of a call that may have renewed the session on the way
#[derive(Debug)]
pub struct Renewed {
    pub response: reqwest::Response,
    /// Set when a refresh happened; the caller should write it to the
    /// access-token cookie
    pub renewed_access_token: Option<String>,
}

impl Relay {
    /// Ask this server's refresh endpoint for a new access token
    ///
    /// Goes through the same-origin target so the inbound cookies, including
    /// the refresh cookie when the browser sent it, reach the endpoint.
    pub async fn refresh_session(&self, inbound: &Inbound) -> Result<String, RelayError> {
        let options = RequestOptions::get().with_method(Method::POST);
        let body: Value = self
            .fetch_json(inbound, self.refresh_route(), options, RequestTarget::Proxy)
            .await?;

        TokenEnvelope::decode(&body)
            .map(TokenEnvelope::into_token)
            .ok_or_else(|| {
                RelayError::MalformedUpstreamResponse(
                    "refresh response carried no access token".to_string(),
                )
            })
    }
}

/// [`Relay::fetch_authenticated`] with at most one refresh and one retry
///
/// Only `Unauthorized` triggers the refresh. A second `Unauthorized`, or a
/// failed refresh, is returned as-is.
pub async fn fetch_with_refresh(
    relay: &Relay,
    inbound: &Inbound,
    path: &str,
    options: RequestOptions,
    target: RequestTarget,
) -> Result<Renewed, RelayError> {
    match relay
        .fetch_authenticated(inbound, path, options.clone(), target)
        .await
    {
        Err(RelayError::Unauthorized) => {}
        other => {
            return other.map(|response| Renewed {
                response,
                renewed_access_token: None,
            });
        }
    }

    tracing::debug!(path = %path, "Session rejected; refreshing once before retrying");
    let token = relay.refresh_session(inbound).await?;

    let renewed = inbound.clone().with_access_token(token.clone());
    let response = relay
        .fetch_authenticated(&renewed, path, options, target)
        .await?;

    Ok(Renewed {
        response,
        renewed_access_token: Some(token),
    })
}
