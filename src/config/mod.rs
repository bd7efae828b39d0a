pub mod defaults;
pub mod types;


pub use types::*;

use crate::constants::*;

impl DbConfig {
    /// Load the existing-database config from the process environment.
    ///
    /// Reads `.env` first. Host, user, password and database name can be
    /// overridden; port and TLS mode are fixed.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the existing-database config from an arbitrary variable lookup.
    /// Unset and empty values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            host: get(ENV_DB_HOST, DEFAULT_DB_HOST),
            port: EXISTING_DB_PORT,
            user: get(ENV_DB_USER, DEFAULT_DB_USER),
            password: get(ENV_DB_PASSWORD, DEFAULT_DB_PASSWORD),
            database: get(ENV_DB_NAME, DEFAULT_DB_NAME),
            ssl_mode: DEFAULT_SSL_MODE.to_string(),
        }
    }
}
