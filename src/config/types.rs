use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::error::{HarnessError, Result};

/// Connection parameters for a PostgreSQL instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: String,
}

impl DbConfig {
    /// Build the libpq keyword/value connection string for this config
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={} sslmode={}",
            self.host, self.port, self.user, self.password, self.database, self.ssl_mode
        )
    }

    /// Same as [`DbConfig::connection_string`] with the password replaced by `***`
    pub fn masked_connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password=*** dbname={} sslmode={}",
            self.host, self.port, self.user, self.database, self.ssl_mode
        )
    }

    /// Translate this config into sqlx connect options.
    ///
    /// Fails only when the TLS mode is not one libpq understands.
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        let ssl_mode =
            PgSslMode::from_str(&self.ssl_mode).map_err(|source| HarnessError::Connection {
                target: self.masked_connection_string(),
                source,
            })?;

        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(ssl_mode))
    }
}

/// Which backend a run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Containerized,
    Existing,
}

impl RunMode {
    pub fn from_flag(use_existing_db: bool) -> Self {
        if use_existing_db {
            RunMode::Existing
        } else {
            RunMode::Containerized
        }
    }

    /// Read the mode from `USE_EXISTING_DB`, defaulting to containerized
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = lookup(crate::constants::ENV_USE_EXISTING_DB)
            .map(|value| parse_truthy(&value))
            .unwrap_or(false);
        Self::from_flag(enabled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Containerized => "containerized",
            RunMode::Existing => "existing",
        }
    }
}

fn parse_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

/// Settings for the ephemeral PostgreSQL container
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub readiness_message: String,
    pub readiness_occurrences: usize,
    pub startup_timeout: Duration,
    pub container_name: Option<String>,
}

impl ContainerSpec {
    /// Environment passed to the official postgres image
    pub fn environment(&self) -> Vec<String> {
        vec![
            format!("POSTGRES_DB={}", self.database),
            format!("POSTGRES_USER={}", self.user),
            format!("POSTGRES_PASSWORD={}", self.password),
        ]
    }
}
