//! Containerized backend lifecycle outside the full scenario

use anyhow::Result;
use pg_migration_harness::backend::{ContainerizedBackend, DatabaseBackend};
use pg_migration_harness::migration::{cleanup_table, execute_migration};
use pg_migration_harness::scenario::count_rows;

use crate::helpers::docker::{docker_available, with_docker_cleanup};

#[tokio::test]
async fn test_containerized_backend_connect_and_cleanup() -> Result<()> {
    if !docker_available().await {
        return Ok(());
    }

    with_docker_cleanup(async {
        let mut backend = ContainerizedBackend::new();
        assert!(backend.connection_config().is_none());

        let pool = backend.connect().await?;
        assert!(backend.container_id().is_some());

        let dsn = backend.build_connection_string();
        let config = backend.connection_config().expect("config is populated after connect");
        assert!(dsn.starts_with(&format!("host={} port={}", config.host, config.port)));
        assert!(dsn.ends_with("user=testuser password=testpass dbname=testdb sslmode=disable"));
        // Pure function of the held config
        assert_eq!(dsn, backend.build_connection_string());

        let table = backend.generate_scoped_table_name("test_users");
        execute_migration(&pool, &table).await?;
        assert_eq!(count_rows(&pool, &table).await?, 2);
        cleanup_table(&pool, &table).await?;
        pool.close().await;

        backend.cleanup().await?;
        assert!(backend.container_id().is_none());

        // A second cleanup has nothing left to release
        backend.cleanup().await?;

        Ok::<(), anyhow::Error>(())
    })
    .await
}
