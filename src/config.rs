//! Application configuration, read once from the environment (and `.env`).

use std::{fmt::Display, str::FromStr};

/// Value shipped in the repository; refused in production.
pub const DEFAULT_SESSION_SECRET: &str = "default-session-secret-change-in-production";

lazy_static::lazy_static! {
    pub static ref CONFIG: AppConfig = AppConfig::from_env();
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub log_level: Option<String>,
    pub log_dir: String,
    pub session_secret: String,
    pub session_ttl_days: i64,
    pub secure_cookies: bool,
    pub media_root: String,
    pub site_name: String,
    pub max_body_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8001,
            environment: "development".to_string(),
            log_level: None,
            log_dir: "logs".to_string(),
            session_secret: DEFAULT_SESSION_SECRET.to_string(),
            session_ttl_days: 14,
            secure_cookies: false,
            media_root: "media".to_string(),
            site_name: "BlogHub".to_string(),
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_or("HOST", defaults.host),
            port: parse_or("PORT", defaults.port),
            environment: env_or("ENVIRONMENT", defaults.environment),
            log_level: std::env::var("LOG_LEVEL").ok(),
            log_dir: env_or("LOG_DIR", defaults.log_dir),
            session_secret: env_or("SESSION_SECRET", defaults.session_secret),
            session_ttl_days: parse_or("SESSION_TTL_DAYS", defaults.session_ttl_days),
            secure_cookies: parse_or("SECURE_COOKIES", defaults.secure_cookies),
            media_root: env_or("MEDIA_ROOT", defaults.media_root),
            site_name: env_or("SITE_NAME", defaults.site_name),
            max_body_bytes: parse_or("MAX_BODY_BYTES", defaults.max_body_bytes),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Production must not run with the published default secret.
    pub fn has_insecure_secret(&self) -> bool {
        self.session_secret.is_empty() || self.session_secret == DEFAULT_SESSION_SECRET
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            tracing::warn!("Invalid {key} value {raw:?}: {e}; using default {default}");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_development() {
        let config = AppConfig::default();
        assert!(!config.is_production());
        assert!(config.has_insecure_secret());
        assert_eq!(config.bind_addr(), "127.0.0.1:8001");
        assert_eq!(config.session_ttl_days, 14);
    }

    #[test]
    fn test_custom_secret_is_not_insecure() {
        let config = AppConfig {
            session_secret: "a-long-random-value".to_string(),
            ..AppConfig::default()
        };
        assert!(!config.has_insecure_secret());
    }

    #[test]
    fn test_parse_or_falls_back_on_missing_key() {
        let port: u16 = parse_or("BLOGHUB_TEST_UNSET_PORT", 4242);
        assert_eq!(port, 4242);
    }
}
