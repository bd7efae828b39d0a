use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};

use super::DatabaseBackend;
use crate::config::{ContainerSpec, DbConfig};
use crate::db::connect_and_ping;
use crate::docker::{DockerManager, PostgresContainer};
use crate::error::{HarnessError, Result};

/// A PostgreSQL instance started in Docker for the duration of one run
pub struct ContainerizedBackend {
    spec: ContainerSpec,
    docker: Option<DockerManager>,
    container: Option<PostgresContainer>,
    config: Option<DbConfig>,
}

impl ContainerizedBackend {
    pub fn new() -> Self {
        Self::with_spec(ContainerSpec::default())
    }

    pub fn with_spec(spec: ContainerSpec) -> Self {
        Self {
            spec,
            docker: None,
            container: None,
            config: None,
        }
    }

    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    /// Id of the running container, if one was started
    pub fn container_id(&self) -> Option<&str> {
        self.container.as_ref().map(|c| c.id())
    }

    async fn provision(&mut self) -> Result<DbConfig> {
        let docker = DockerManager::new()
            .await
            .map_err(HarnessError::provisioning)?;

        let container = docker
            .start_postgres(&self.spec)
            .await
            .map_err(HarnessError::provisioning)?;

        let config = container.db_config();
        self.container = Some(container);
        self.docker = Some(docker);
        Ok(config)
    }
}

impl Default for ContainerizedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseBackend for ContainerizedBackend {
    async fn connect(&mut self) -> Result<PgPool> {
        let config = self.provision().await?;
        debug!("Container database config: {}", config.masked_connection_string());
        let config = self.config.insert(config);
        connect_and_ping(config, "containerized database").await
    }

    async fn cleanup(&mut self) -> Result<()> {
        let Some(container) = self.container.take() else {
            return Ok(());
        };
        let id = container.id().to_string();

        let docker = match self.docker.take() {
            Some(docker) => docker,
            None => DockerManager::new()
                .await
                .map_err(|e| HarnessError::Teardown {
                    resource: format!("container {}", id),
                    message: e.to_string(),
                })?,
        };

        container
            .terminate(&docker)
            .await
            .map_err(|e| HarnessError::Teardown {
                resource: format!("container {}", id),
                message: e.to_string(),
            })?;

        info!("Terminated PostgreSQL container {}", id);
        Ok(())
    }

    fn connection_config(&self) -> Option<&DbConfig> {
        self.config.as_ref()
    }

    fn describe(&self) -> &'static str {
        "containerized database"
    }
}
