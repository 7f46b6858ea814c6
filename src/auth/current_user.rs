//! Current-user resolution for page handlers
//!
//! The identity lookup is memoized in a [`RenderScope`] stored in the
//! request's extensions, so every component of one render shares a single
//! upstream call. Nothing is cached beyond the request.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::OnceCell;

use crate::AppState;
use crate::error::AppError;
use crate::metrics::IDENTITY_LOOKUPS_TOTAL;
use crate::relay::{Inbound, Relay, RelayError, RequestOptions, RequestTarget};

/// Authenticated identity as reported by the upstream API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Remaining profile fields, kept verbatim
    #[serde(flatten)]
    pub profile: serde_json::Map<String, serde_json::Value>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}

/// Identity body: `{ "data": User }`, or a bare user
#[derive(Deserialize)]
#[serde(untagged)]
enum IdentityEnvelope {
    Wrapped { data: User },
    Bare(User),
}

impl IdentityEnvelope {
    fn into_user(self) -> User {
        match self {
            IdentityEnvelope::Wrapped { data } => data,
            IdentityEnvelope::Bare(user) => user,
        }
    }
}

/// Why a page could not get its user
#[derive(Debug)]
pub enum AuthRejection {
    /// Session rejected; the browser is sent to the login surface
    Redirect { location: String },
    /// Anything else, surfaced unchanged
    Failed(RelayError),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            AuthRejection::Redirect { location } => Redirect::temporary(&location).into_response(),
            AuthRejection::Failed(error) => AppError::Relay(error).into_response(),
        }
    }
}

/// Per-request context for resolving the current user
///
/// Cloning shares the memo, so concurrent lookups from the same render
/// collapse onto one upstream call and observe one outcome.
#[derive(Clone)]
pub struct RenderScope {
    relay: Arc<Relay>,
    inbound: Inbound,
    identity_path: String,
    login_path: String,
    user: Arc<OnceCell<Result<User, RelayError>>>,
}

impl RenderScope {
    pub fn new(
        relay: Arc<Relay>,
        inbound: Inbound,
        identity_path: impl Into<String>,
        login_path: impl Into<String>,
    ) -> Self {
        Self {
            relay,
            inbound,
            identity_path: identity_path.into(),
            login_path: login_path.into(),
            user: Arc::new(OnceCell::new()),
        }
    }

    /// Scope for the request in `parts`, created on first use
    pub fn for_request(parts: &mut Parts, state: &AppState) -> Self {
        if let Some(scope) = parts.extensions.get::<RenderScope>() {
            return scope.clone();
        }

        let scope = RenderScope::new(
            state.relay.clone(),
            Inbound::from_parts(parts, &state.config.server),
            state.config.backend.identity_path.clone(),
            state.config.auth.login_path.clone(),
        );
        parts.extensions.insert(scope.clone());
        scope
    }

    pub fn inbound(&self) -> &Inbound {
        &self.inbound
    }

    /// The current user, fetched at most once for this scope
    pub async fn current_user(&self) -> Result<User, RelayError> {
        self.user
            .get_or_init(|| fetch_identity(&self.relay, &self.inbound, &self.identity_path))
            .await
            .clone()
    }

    /// The current user, or a redirect to login when the session is rejected
    ///
    /// Handlers propagate the rejection with `?`, so nothing after the call
    /// runs for an unauthenticated request.
    pub async fn require_authenticated_user(&self) -> Result<User, AuthRejection> {
        match self.current_user().await {
            Ok(user) => Ok(user),
            Err(RelayError::Unauthorized) => Err(AuthRejection::Redirect {
                location: self.login_location(),
            }),
            Err(error) => Err(AuthRejection::Failed(error)),
        }
    }

    fn login_location(&self) -> String {
        format!(
            "{}?next={}",
            self.login_path,
            urlencoding::encode(self.inbound.path_and_query())
        )
    }
}

async fn fetch_identity(
    relay: &Relay,
    inbound: &Inbound,
    identity_path: &str,
) -> Result<User, RelayError> {
    let result = relay
        .fetch_json::<IdentityEnvelope>(
            inbound,
            identity_path,
            RequestOptions::get(),
            RequestTarget::Proxy,
        )
        .await
        .map(IdentityEnvelope::into_user);

    let label = match &result {
        Ok(_) => "ok",
        Err(error) => error.kind(),
    };
    IDENTITY_LOOKUPS_TOTAL.with_label_values(&[label]).inc();
    result
}

#[async_trait]
impl<S> FromRequestParts<S> for RenderScope
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        Ok(RenderScope::for_request(parts, &state))
    }
}

/// Extractor for pages that require a signed-in user
///
/// An unauthenticated request never reaches the handler; it is answered
/// with a redirect to the login surface.
///
/// # Usage
/// ```ignore
/// async fn handler(CurrentUser(user): CurrentUser) -> impl IntoResponse {
///     format!("Hello, {}", user.display_name())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let scope = RenderScope::for_request(parts, &state);
        scope.require_authenticated_user().await.map(CurrentUser)
    }
}
