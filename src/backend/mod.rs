//! Pluggable database backends.
//!
//! A backend knows how to obtain a live connection to some PostgreSQL instance
//! and how to release whatever it provisioned for that. The scenario driver is
//! generic over [`DatabaseBackend`] so the same checks run against a throwaway
//! container or an operator-managed database.

mod containerized;
mod existing;

pub use containerized::ContainerizedBackend;
pub use existing::ExistingBackend;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::config::{DbConfig, RunMode};
use crate::error::Result;

#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    /// Obtain a live, pinged connection pool.
    ///
    /// Call at most once per backend. Even when this fails the caller must
    /// still call [`DatabaseBackend::cleanup`].
    async fn connect(&mut self) -> Result<PgPool>;

    /// Release anything this backend provisioned.
    async fn cleanup(&mut self) -> Result<()>;

    /// Connection config in use, once known
    fn connection_config(&self) -> Option<&DbConfig>;

    /// Short label for log and error messages
    fn describe(&self) -> &'static str;

    /// libpq keyword/value connection string for the held config.
    ///
    /// Before the config is known every field renders empty.
    fn build_connection_string(&self) -> String {
        match self.connection_config() {
            Some(config) => config.connection_string(),
            None => DbConfig {
                host: String::new(),
                port: 0,
                user: String::new(),
                password: String::new(),
                database: String::new(),
                ssl_mode: String::new(),
            }
            .connection_string(),
        }
    }

    fn generate_scoped_table_name(&self, prefix: &str) -> String {
        crate::naming::generate_scoped_table_name(prefix)
    }
}

/// Either backend, chosen at runtime from a [`RunMode`]
pub enum AnyBackend {
    Containerized(ContainerizedBackend),
    Existing(ExistingBackend),
}

impl AnyBackend {
    /// Build the backend for `mode`; existing mode reads its config from the environment
    pub fn for_mode(mode: RunMode) -> Self {
        match mode {
            RunMode::Containerized => AnyBackend::Containerized(ContainerizedBackend::new()),
            RunMode::Existing => AnyBackend::Existing(ExistingBackend::new(DbConfig::from_env())),
        }
    }

    fn inner(&self) -> &dyn DatabaseBackend {
        match self {
            AnyBackend::Containerized(backend) => backend,
            AnyBackend::Existing(backend) => backend,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn DatabaseBackend {
        match self {
            AnyBackend::Containerized(backend) => backend,
            AnyBackend::Existing(backend) => backend,
        }
    }
}

#[async_trait]
impl DatabaseBackend for AnyBackend {
    async fn connect(&mut self) -> Result<PgPool> {
        self.inner_mut().connect().await
    }

    async fn cleanup(&mut self) -> Result<()> {
        self.inner_mut().cleanup().await
    }

    fn connection_config(&self) -> Option<&DbConfig> {
        self.inner().connection_config()
    }

    fn describe(&self) -> &'static str {
        self.inner().describe()
    }
}
