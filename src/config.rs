// config.rs
use std::{env, fmt::Display, str::FromStr};

use tracing::info;

use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub port: u16,
    pub max_connections: u32,
    pub vote_retry_limit: u32,
    pub limits: PollLimits,
}

/// Bounds on the option list of a new poll. No upper bound unless configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollLimits {
    pub min_options: usize,
    pub max_options: Option<usize>,
}

impl Default for PollLimits {
    fn default() -> Self {
        Self {
            min_options: 1,
            max_options: None,
        }
    }
}

impl PollLimits {
    fn check(self) -> Result<Self> {
        if self.min_options == 0 {
            return Err(AppError::Config("MIN_POLL_OPTIONS must be at least 1".to_string()));
        }
        if let Some(max) = self.max_options {
            if self.min_options > max {
                return Err(AppError::Config(format!(
                    "MIN_POLL_OPTIONS ({}) exceeds MAX_POLL_OPTIONS ({max})",
                    self.min_options
                )));
            }
        }
        Ok(self)
    }
}

impl Config {
    /// Reads the process environment, after merging a `.env` file if one exists.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL must be set".to_string()))?;

        let limits = PollLimits {
            min_options: try_load("MIN_POLL_OPTIONS", "1")?,
            max_options: try_load_optional("MAX_POLL_OPTIONS")?,
        }
        .check()?;

        let vote_retry_limit = check_retry_limit(try_load("VOTE_RETRY_LIMIT", "3")?)?;

        Ok(Self {
            database_url,
            bind_addr: try_load("BIND_ADDR", "0.0.0.0")?,
            port: try_load("PORT", "3030")?,
            max_connections: try_load("DB_MAX_CONNECTIONS", "5")?,
            vote_retry_limit,
            limits,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Attempts per vote transaction, counting the first one.
fn check_retry_limit(attempts: u32) -> Result<u32> {
    if attempts == 0 {
        return Err(AppError::Config("VOTE_RETRY_LIMIT must be at least 1".to_string()));
    }
    Ok(attempts)
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| AppError::Config(format!("Invalid {key} value {raw:?}: {e}")))
}

fn try_load_optional<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| AppError::Config(format!("Invalid {key} value {raw:?}: {e}"))),
        Err(_) => {
            info!("{key} not set, no limit");
            Ok(None)
        }
    }
}
