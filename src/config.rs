use std::net::SocketAddr;

use anyhow::{Context, Result};
use chrono::Duration;

/// Server settings, read from the environment (after `.env` has been loaded).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub session_secret: String,
    pub session_ttl: Duration,
    pub oauth_provider: String,
    /// Enables `POST /api/auth/callback` when set.
    pub auth_callback_secret: Option<String>,
}

const DEFAULT_SESSION_TTL_SECS: i64 = 30 * 24 * 60 * 60;

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3000".to_string());
        let session_ttl = match get("SESSION_TTL_SECS") {
            Some(s) => s.parse::<i64>().with_context(|| format!("SESSION_TTL_SECS={s:?} is not a number"))?,
            None => DEFAULT_SESSION_TTL_SECS,
        };
        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| "sqlite://todos.db".to_string()),
            bind_addr: bind_addr.parse().with_context(|| format!("BIND_ADDR={bind_addr:?} is not a socket address"))?,
            session_secret: get("SESSION_SECRET").filter(|s| !s.is_empty()).context("SESSION_SECRET must be set")?,
            session_ttl: Duration::seconds(session_ttl),
            oauth_provider: get("OAUTH_PROVIDER").unwrap_or_else(|| "google".to_string()),
            auth_callback_secret: get("AUTH_CALLBACK_SECRET").filter(|s| !s.is_empty()),
        })
    }
}
