use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use super::DatabaseBackend;
use crate::config::DbConfig;
use crate::db::connect_and_ping;
use crate::error::Result;

/// A database the operator already runs. Never torn down by the harness.
#[derive(Debug, Clone)]
pub struct ExistingBackend {
    config: DbConfig,
}

impl ExistingBackend {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DatabaseBackend for ExistingBackend {
    async fn connect(&mut self) -> Result<PgPool> {
        connect_and_ping(&self.config, self.describe()).await
    }

    async fn cleanup(&mut self) -> Result<()> {
        // The instance belongs to the operator; only our tables are dropped, elsewhere
        debug!("Leaving existing database at {} running", self.config.host);
        Ok(())
    }

    fn connection_config(&self) -> Option<&DbConfig> {
        Some(&self.config)
    }

    fn describe(&self) -> &'static str {
        "existing database"
    }
}
