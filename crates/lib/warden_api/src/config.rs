//! API server configuration.

use std::str::FromStr;
use std::time::Duration;

use warden_core::auth::{AuthSettings, DEFAULT_ACCESS_TOKEN_TTL, DEFAULT_REFRESH_TOKEN_TTL};
use warden_core::auth::password::DEFAULT_COST;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Redis URL for the shared cache; `None` uses the in-process store.
    pub redis_url: Option<String>,
    /// Run every cache in nil-store mode.
    pub cache_disabled: bool,
    /// PEM private key the signing algorithm is derived from.
    pub jwt_private_key_path: Option<String>,
    pub access_token_ttl_secs: u64,
    pub refresh_token_ttl_secs: u64,
    pub bcrypt_cost: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3100".into(),
            pg_connection_url: "postgres://localhost:5432/warden".into(),
            redis_url: None,
            cache_disabled: false,
            jwt_private_key_path: None,
            access_token_ttl_secs: DEFAULT_ACCESS_TOKEN_TTL.as_secs(),
            refresh_token_ttl_secs: DEFAULT_REFRESH_TOKEN_TTL.as_secs(),
            bcrypt_cost: DEFAULT_COST,
        }
    }
}

fn parsed<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                 | Default                             |
    /// |--------------------------|-------------------------------------|
    /// | `BIND_ADDR`              | `127.0.0.1:3100`                    |
    /// | `DATABASE_URL`           | `postgres://localhost:5432/warden`  |
    /// | `REDIS_URL`              | unset (in-process cache)            |
    /// | `CACHE_DISABLED`         | `0`                                 |
    /// | `JWT_PRIVATE_KEY_PATH`   | unset (required by the server)      |
    /// | `ACCESS_TOKEN_TTL_SECS`  | `900`                               |
    /// | `REFRESH_TOKEN_TTL_SECS` | `604800`                            |
    /// | `BCRYPT_COST`            | `10`                                |
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// [`ApiConfig::from_env`] over any variable source. Blank and
    /// unparsable values fall back to the default.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let text = |name: &str| var(name).filter(|v| !v.trim().is_empty());
        Self {
            bind_addr: text("BIND_ADDR").unwrap_or(d.bind_addr),
            pg_connection_url: text("DATABASE_URL").unwrap_or(d.pg_connection_url),
            redis_url: text("REDIS_URL"),
            cache_disabled: text("CACHE_DISABLED").is_some_and(|v| v == "1" || v == "true"),
            jwt_private_key_path: text("JWT_PRIVATE_KEY_PATH"),
            access_token_ttl_secs: parsed(text("ACCESS_TOKEN_TTL_SECS"))
                .unwrap_or(d.access_token_ttl_secs),
            refresh_token_ttl_secs: parsed(text("REFRESH_TOKEN_TTL_SECS"))
                .unwrap_or(d.refresh_token_ttl_secs),
            bcrypt_cost: parsed(text("BCRYPT_COST")).unwrap_or(d.bcrypt_cost),
        }
    }

    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            access_token_ttl: Duration::from_secs(self.access_token_ttl_secs),
            refresh_token_ttl: Duration::from_secs(self.refresh_token_ttl_secs),
            bcrypt_cost: self.bcrypt_cost,
            ..AuthSettings::default()
        }
    }
}
