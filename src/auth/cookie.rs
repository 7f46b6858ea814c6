//! Session cookie codec
//!
//! Pure builders for the access-token and refresh-token cookie attributes.
//! Nothing here reads a request or touches the network.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::config::AppConfig;

/// Which half of the session a cookie carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Complete attribute set for one session cookie
///
/// `max_age == 0` means the browser must delete the cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieAttributes {
    pub name: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    pub path: String,
    pub max_age: i64,
    pub domain: Option<String>,
}

impl CookieAttributes {
    /// Build the `Set-Cookie` value carrying `value` with these attributes
    pub fn to_cookie(&self, value: impl Into<String>) -> Cookie<'static> {
        let mut builder = Cookie::build((self.name.clone(), value.into()))
            .http_only(self.http_only)
            .secure(self.secure)
            .same_site(self.same_site)
            .path(self.path.clone())
            .max_age(Duration::seconds(self.max_age));
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        builder.build()
    }
}

/// Read-only cookie policy derived from configuration
///
/// Both cookies are always `HttpOnly`: the access token is never made
/// readable from page scripts.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub access_name: String,
    pub refresh_name: String,
    pub refresh_path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub access_max_age: i64,
    pub remember_me_max_age: i64,
    pub refresh_max_age: i64,
    pub owns_refresh_cookie: bool,
}

impl CookieSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            access_name: config.cookies.access_name.clone(),
            refresh_name: config.cookies.refresh_name.clone(),
            refresh_path: config.cookies.refresh_path.clone(),
            domain: config
                .cookies
                .domain
                .as_deref()
                .map(str::trim)
                .filter(|domain| !domain.is_empty())
                .map(ToOwned::to_owned),
            secure: config.should_use_secure_cookies(),
            access_max_age: config.cookies.access_max_age,
            remember_me_max_age: config.cookies.remember_me_max_age,
            refresh_max_age: config.cookies.refresh_max_age,
            owns_refresh_cookie: config.cookies.owns_refresh_cookie,
        }
    }

    /// Attribute set for `kind` living `max_age` seconds
    pub fn attributes(&self, kind: TokenKind, max_age: i64) -> CookieAttributes {
        let (name, path) = match kind {
            TokenKind::Access => (self.access_name.clone(), "/".to_string()),
            TokenKind::Refresh => (self.refresh_name.clone(), self.refresh_path.clone()),
        };

        CookieAttributes {
            name,
            http_only: true,
            secure: self.secure,
            same_site: SameSite::Lax,
            path,
            max_age: max_age.max(0),
            domain: self.domain.clone(),
        }
    }

    /// Access-token lifetime for a login with or without "remember me"
    pub fn access_lifetime(&self, remember_me: bool) -> i64 {
        if remember_me {
            self.remember_me_max_age
        } else {
            self.access_max_age
        }
    }

    pub fn access_cookie(&self, token: &str, max_age: i64) -> Cookie<'static> {
        self.attributes(TokenKind::Access, max_age).to_cookie(token)
    }

    /// Refresh cookie carrying `token` exactly as upstream issued it
    ///
    /// An empty token or a non-positive lifetime deletes the cookie.
    pub fn refresh_cookie(&self, token: &str, max_age: Option<i64>) -> Cookie<'static> {
        let max_age = match max_age {
            _ if token.is_empty() => 0,
            Some(seconds) if seconds <= 0 => 0,
            _ => self.refresh_max_age,
        };
        self.attributes(TokenKind::Refresh, max_age).to_cookie(token)
    }

    /// Zero max-age cookie deleting `kind`
    pub fn removal(&self, kind: TokenKind) -> Cookie<'static> {
        self.attributes(kind, 0).to_cookie(String::new())
    }
}
