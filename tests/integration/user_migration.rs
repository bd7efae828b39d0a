//! End-to-end user migration checks, one per run mode

use anyhow::Result;
use pg_migration_harness::backend::{ContainerizedBackend, DatabaseBackend, ExistingBackend};
use pg_migration_harness::config::{DbConfig, RunMode};
use pg_migration_harness::db::connect_and_ping;
use pg_migration_harness::scenario::{ScenarioOptions, run_migration_scenario};

use crate::helpers::docker::{docker_available, with_docker_cleanup};
use crate::helpers::harness::init_tracing;

#[tokio::test]
async fn test_user_migration_with_containerized_db() -> Result<()> {
    if RunMode::from_env() == RunMode::Existing {
        println!("Skipping containerized DB test when using existing DB");
        return Ok(());
    }
    init_tracing();
    if !docker_available().await {
        return Ok(());
    }

    with_docker_cleanup(async {
        let mut backend = ContainerizedBackend::new();
        let report = run_migration_scenario(&mut backend, &ScenarioOptions::default()).await?;

        assert_eq!(report.backend, "containerized database");
        assert!(report.table_name.starts_with("test_users_"));
        assert_eq!(report.rows_after_migration, 2);
        assert_eq!(report.rows_after_insert, 3);
        assert!(report.migration_duration <= report.total_duration);

        // The container was torn down as part of the scenario
        assert!(backend.container_id().is_none());
        let config = backend
            .connection_config()
            .expect("config is populated after connect");
        assert_eq!(config.user, "testuser");
        assert_eq!(config.database, "testdb");
        assert_eq!(config.ssl_mode, "disable");

        Ok::<(), anyhow::Error>(())
    })
    .await
}

#[tokio::test]
async fn test_user_migration_with_existing_db() -> Result<()> {
    if RunMode::from_env() != RunMode::Existing {
        println!("Skipping existing DB test when using containerized DB");
        return Ok(());
    }
    init_tracing();

    let config = DbConfig::from_env();
    let mut backend = ExistingBackend::new(config.clone());
    let report = run_migration_scenario(&mut backend, &ScenarioOptions::default()).await?;

    assert_eq!(report.backend, "existing database");
    assert_eq!(report.rows_after_migration, 2);
    assert_eq!(report.rows_after_insert, 3);

    // The database itself is still there, and our table is gone
    let pool = connect_and_ping(&config, "existing database").await?;
    let table_exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
        .bind(&report.table_name)
        .fetch_one(&pool)
        .await?;
    assert!(!table_exists, "table {} should be dropped", report.table_name);
    pool.close().await;

    Ok(())
}
