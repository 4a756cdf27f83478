use std::{env, net::IpAddr};

use chrono::Duration;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Runtime settings for the API server, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub database_url: String,
    pub environment: String,
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
    pub cors_allowed_origin: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = parse_var("HOST", "127.0.0.1")?;
        let port = parse_var("PORT", "8000")?;
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let access_minutes: i64 = parse_var("JWT_ACCESS_MINUTES", "60")?;
        let refresh_days: i64 = parse_var("JWT_REFRESH_DAYS", "1")?;

        Ok(Self {
            host,
            port,
            database_url,
            environment: current_environment(),
            access_token_lifetime: Duration::minutes(access_minutes),
            refresh_token_lifetime: Duration::days(refresh_days),
            cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN")
                .ok()
                .filter(|origin| !origin.is_empty()),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Refuses configurations that would issue unusable credentials.
pub fn validate_production_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.access_token_lifetime <= Duration::zero() {
        return Err(ConfigError::Invalid {
            key: "JWT_ACCESS_MINUTES",
            value: config.access_token_lifetime.num_minutes().to_string(),
        });
    }

    if config.refresh_token_lifetime <= config.access_token_lifetime {
        return Err(ConfigError::Invalid {
            key: "JWT_REFRESH_DAYS",
            value: config.refresh_token_lifetime.num_days().to_string(),
        });
    }

    if config.is_production() && config.cors_allowed_origin.is_none() {
        warn!("CORS_ALLOWED_ORIGIN not set in production; allowing any origin");
    }

    Ok(())
}

fn current_environment() -> String {
    env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string())
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid { key, value })
}
