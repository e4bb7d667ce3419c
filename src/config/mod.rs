//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:3003";
const DEFAULT_CLIENT_ORIGIN: &str = "http://localhost:5173";
const DEFAULT_HISTORY_RETRY_LIMIT: u32 = 3;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Shared HS256 secret for identity tokens
    pub jwt_secret: String,
    /// Allowed client origins for CORS, comma-separated
    pub client_origin: String,

    /// Match history service; results are not stored when unset
    pub match_history_url: Option<String>,
    /// AI opponent service; single-player rooms are refused when unset
    pub ai_upstream_url: Option<String>,
    /// Attempts per stored match result
    pub history_retry_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // A bare PORT wins over SERVER_ADDR
        let server_addr = match var("PORT") {
            Some(port) => format!("0.0.0.0:{port}"),
            None => var("SERVER_ADDR").unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string()),
        };
        let optional = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let history_retry_limit = match var("HISTORY_RETRY_LIMIT") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidNumber("HISTORY_RETRY_LIMIT"))?,
            None => DEFAULT_HISTORY_RETRY_LIMIT,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            jwt_secret: optional("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,
            client_origin: var("CLIENT_ORIGIN").unwrap_or_else(|| DEFAULT_CLIENT_ORIGIN.to_string()),

            match_history_url: optional("MATCH_HISTORY_URL"),
            ai_upstream_url: optional("AI_UPSTREAM_URL"),
            history_retry_limit,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid number in environment variable: {0}")]
    InvalidNumber(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_with_only_the_secret_set() {
        let config = load(&[("JWT_SECRET", "s")]).unwrap();
        assert_eq!(config.server_addr.port(), 3003);
        assert_eq!(config.client_origin, DEFAULT_CLIENT_ORIGIN);
        assert_eq!(config.history_retry_limit, 3);
        assert!(config.match_history_url.is_none());
        assert!(config.ai_upstream_url.is_none());
    }

    #[test]
    fn port_overrides_server_addr() {
        let config = load(&[
            ("JWT_SECRET", "s"),
            ("PORT", "9000"),
            ("SERVER_ADDR", "127.0.0.1:1"),
        ])
        .unwrap();
        assert_eq!(config.server_addr.port(), 9000);
    }

    #[test]
    fn bad_values_are_reported() {
        assert!(matches!(load(&[]), Err(ConfigError::Missing("JWT_SECRET"))));
        assert!(matches!(
            load(&[("JWT_SECRET", "s"), ("HISTORY_RETRY_LIMIT", "0")]),
            Err(ConfigError::InvalidNumber(_))
        ));
        assert!(matches!(
            load(&[("JWT_SECRET", "s"), ("SERVER_ADDR", "nowhere")]),
            Err(ConfigError::InvalidAddress)
        ));
    }
}
