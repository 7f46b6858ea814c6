//! Server-rendered pages
//!
//! Just enough surface to host the login redirect target and one page that
//! needs the signed-in user.

use axum::{
    Router,
    response::{Html, IntoResponse},
    routing::get,
};

use crate::AppState;
use crate::auth::{AuthRejection, CurrentUser, RenderScope, User};

/// Create pages router
///
/// Routes:
/// - GET / - Signed-in home
/// - GET /account - Account summary
/// - GET /login - Login page
pub fn pages_router(login_path: &str) -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/account", get(account))
        .route(login_path, get(login_page))
}

// =============================================================================
// Login Page
// =============================================================================

/// GET /login
///
/// The sign-in flow itself runs in the browser against the identity
/// provider and ends with POST /api/auth/session.
async fn login_page() -> impl IntoResponse {
    Html(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8" /><title>Sign in</title></head>
<body>
  <h1>Sign in</h1>
  <p>Your session has ended. Please sign in again.</p>
</body>
</html>"#,
    )
}

// =============================================================================
// Home
// =============================================================================

/// GET /
///
/// Header and greeting each ask for the user independently; the render
/// scope answers both from one upstream lookup.
async fn home(scope: RenderScope) -> Result<Html<String>, AuthRejection> {
    let (header_user, greeting_user) = tokio::join!(
        scope.require_authenticated_user(),
        scope.require_authenticated_user()
    );

    Ok(Html(render_home(&header_user?, &greeting_user?)))
}

fn render_home(header_user: &User, greeting_user: &User) -> String {
    let account =
        html_escape::encode_text(header_user.email.as_deref().unwrap_or(&header_user.id));
    let name = html_escape::encode_text(greeting_user.display_name());

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8" /><title>Home</title></head>
<body>
  <header>Signed in as {account}</header>
  <main><h1>Welcome back, {name}</h1></main>
</body>
</html>"#
    )
}

// =============================================================================
// Account
// =============================================================================

/// GET /account
async fn account(CurrentUser(user): CurrentUser) -> Html<String> {
    let id = html_escape::encode_text(&user.id);
    let email = html_escape::encode_text(user.email.as_deref().unwrap_or("-"));
    let name = html_escape::encode_text(user.display_name());

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8" /><title>Account</title></head>
<body>
  <h1>{name}</h1>
  <dl><dt>ID</dt><dd>{id}</dd><dt>Email</dt><dd>{email}</dd></dl>
</body>
</html>"#
    ))
}
