//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub cookies: CookieConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 3000)
    pub port: u16,
    /// Protocol the front end is served over ("http" or "https")
    pub protocol: String,
    /// Production deployment; controls the `Secure` cookie attribute
    #[serde(default)]
    pub production: bool,
    /// Honour `X-Forwarded-Proto` / `X-Forwarded-Host` when deriving our own origin
    #[serde(default)]
    pub trust_forwarded_headers: bool,
    /// Front-end origin allowed to call us cross-origin in production
    #[serde(default)]
    pub public_origin: Option<String>,
}

/// Upstream API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Upstream API origin (e.g., "https://api.example.com")
    pub base_url: String,
    /// Path answering "who is the current user"
    pub identity_path: String,
    /// Path minting a new access token from the refresh cookie
    pub refresh_path: String,
    /// Outbound request timeout in seconds
    pub timeout_seconds: u64,
}

impl ServerConfig {
    /// Origin this process answers on, for calls it makes to itself
    ///
    /// Built from the bind address only; request headers never select it.
    pub fn loopback_origin(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" => "127.0.0.1",
            "::" | "[::]" => "[::1]",
            host => host,
        };
        if host.contains(':') && !host.starts_with('[') {
            format!("http://[{host}]:{}", self.port)
        } else {
            format!("http://{host}:{}", self.port)
        }
    }
}

impl BackendConfig {
    /// Base URL without a trailing slash
    pub fn origin(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    /// Access-token cookie name
    pub access_name: String,
    /// Refresh-token cookie name
    pub refresh_name: String,
    /// Optional `Domain` attribute override
    pub domain: Option<String>,
    /// Default access-token lifetime in seconds (default: 900)
    pub access_max_age: i64,
    /// Access-token lifetime with "remember me" (default: 604800)
    pub remember_me_max_age: i64,
    /// Refresh-token lifetime in seconds (default: 604800)
    pub refresh_max_age: i64,
    /// Path the refresh cookie is scoped to
    pub refresh_path: String,
    /// Clear the refresh cookie on logout as well
    #[serde(default = "default_owns_refresh_cookie")]
    pub owns_refresh_cookie: bool,
}

fn default_owns_refresh_cookie() -> bool {
    true
}

/// Front-end authentication surface
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Where unauthenticated page requests are sent
    pub login_path: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (COOKIE_RELAY__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.protocol", "http")?
            .set_default("server.production", false)?
            .set_default("server.trust_forwarded_headers", false)?
            .set_default("backend.identity_path", "/api/auth/me")?
            .set_default("backend.refresh_path", "/api/auth/refresh")?
            .set_default("backend.timeout_seconds", 30)?
            .set_default("cookies.access_name", "accessToken")?
            .set_default("cookies.refresh_name", "refreshToken")?
            .set_default("cookies.access_max_age", 900)?
            .set_default("cookies.remember_me_max_age", 604_800)?
            .set_default("cookies.refresh_max_age", 604_800)?
            .set_default("cookies.refresh_path", "/api/auth/refresh")?
            .set_default("cookies.owns_refresh_cookie", true)?
            .set_default("auth.login_path", "/login")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("COOKIE_RELAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.production
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        let backend = url::Url::parse(&self.backend.base_url).map_err(|e| {
            AppError::Config(format!("backend.base_url is not a valid URL: {e}"))
        })?;
        if !matches!(backend.scheme(), "http" | "https") {
            return Err(AppError::Config(
                "backend.base_url must use http or https".to_string(),
            ));
        }

        for (key, path) in [
            ("backend.identity_path", &self.backend.identity_path),
            ("backend.refresh_path", &self.backend.refresh_path),
            ("cookies.refresh_path", &self.cookies.refresh_path),
            ("auth.login_path", &self.auth.login_path),
        ] {
            if !path.starts_with('/') {
                return Err(AppError::Config(format!("{key} must start with '/'")));
            }
        }

        for (key, max_age) in [
            ("cookies.access_max_age", self.cookies.access_max_age),
            ("cookies.remember_me_max_age", self.cookies.remember_me_max_age),
            ("cookies.refresh_max_age", self.cookies.refresh_max_age),
        ] {
            if max_age <= 0 {
                return Err(AppError::Config(format!("{key} must be greater than 0")));
            }
        }

        if self.cookies.refresh_path == crate::auth::SESSION_ROUTE {
            return Err(AppError::Config(format!(
                "cookies.refresh_path must not be {}",
                crate::auth::SESSION_ROUTE
            )));
        }

        let access = self.cookies.access_name.trim();
        let refresh = self.cookies.refresh_name.trim();
        if access.is_empty() || refresh.is_empty() {
            return Err(AppError::Config("cookie names must not be empty".to_string()));
        }
        if access == refresh {
            return Err(AppError::Config(
                "cookies.access_name and cookies.refresh_name must differ".to_string(),
            ));
        }

        if self.server.production {
            if !self.server.protocol.eq_ignore_ascii_case("https") {
                return Err(AppError::Config(
                    "server.protocol must be https in production".to_string(),
                ));
            }
        } else {
            tracing::warn!(
                protocol = %self.server.protocol,
                "Using insecure session cookies for local development"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config(backend_url: &str) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            protocol: "http".to_string(),
            production: false,
            trust_forwarded_headers: false,
            public_origin: None,
        },
        backend: BackendConfig {
            base_url: backend_url.to_string(),
            identity_path: "/api/auth/me".to_string(),
            refresh_path: "/api/auth/refresh".to_string(),
            timeout_seconds: 5,
        },
        cookies: CookieConfig {
            access_name: "accessToken".to_string(),
            refresh_name: "refreshToken".to_string(),
            domain: None,
            access_max_age: 900,
            remember_me_max_age: 604_800,
            refresh_max_age: 604_800,
            refresh_path: "/api/auth/refresh".to_string(),
            owns_refresh_cookie: true,
        },
        auth: AuthConfig {
            login_path: "/login".to_string(),
        },
        logging: LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}
