//! Configuration loader for the ingest jobs.
//!
//! Everything comes from the environment; `Config::from_env` is the single
//! place that reads it so the binaries never touch `std::env` directly.
//! Placeholder values left over from setup templates (`YOUR_..._HERE`) are
//! treated as absent.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime configuration shared by all ingest binaries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Document-store connection string. Absent ⇒ publishers run dry.
    pub database_url: Option<String>,
    /// Enables the ticketing adapter. Absent ⇒ that adapter yields nothing.
    pub ticketmaster_api_key: Option<String>,
    /// Webhook verify token; owned by the chatbot collaborator.
    pub webhook_verify_token: Option<String>,
    /// Chatbot collaborator credentials, recognized but unused here.
    pub gemini_api_key: Option<String>,
    pub page_access_token: Option<String>,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Config, ConfigError> {
        let cfg = Config {
            database_url: env_opt("DATABASE_URL"),
            ticketmaster_api_key: env_opt("TICKETMASTER_API_KEY"),
            webhook_verify_token: env_opt("TOKEN"),
            gemini_api_key: env_opt("GEMINI_API_KEY"),
            page_access_token: env_opt("PAGE_ACCESS_TOKEN"),
        };
        validate(&cfg)?;
        Ok(cfg)
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|v| sanitize(&v))
}

/// Empty strings and setup-template placeholders count as unset.
fn sanitize(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with("YOUR_") || trimmed.ends_with("_HERE") {
        return None;
    }
    Some(trimmed.to_string())
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if let Some(url) = &cfg.database_url {
        if !url.contains(':') {
            return Err(ConfigError::Invalid(format!(
                "DATABASE_URL does not look like a connection string: {url}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_drops_placeholders() {
        assert_eq!(sanitize("  "), None);
        assert_eq!(sanitize("YOUR_API_KEY"), None);
        assert_eq!(sanitize("PASTE_KEY_HERE"), None);
        assert_eq!(sanitize(" real-value "), Some("real-value".to_string()));
    }

    #[test]
    fn validate_rejects_bare_database_url() {
        let cfg = Config {
            database_url: Some("not-a-url".into()),
            ..Config::default()
        };
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("DATABASE_URL")),
        }
    }

    #[test]
    fn validate_accepts_sqlite_url() {
        let cfg = Config {
            database_url: Some("sqlite://data/goodrec.db".into()),
            ..Config::default()
        };
        validate(&cfg).unwrap();
    }
}
