//! Integration tests for the Docker PostgreSQL container manager

use anyhow::Result;
use pg_migration_harness::config::ContainerSpec;
use pg_migration_harness::db::connect_and_ping;
use pg_migration_harness::docker::{
    DockerManager, register_container, registered_containers, unregister_container,
};
use std::time::Duration;
use uuid::Uuid;

use crate::helpers::docker::{docker_available, with_docker_cleanup};

#[tokio::test]
async fn test_postgres_container_lifecycle() -> Result<()> {
    if !docker_available().await {
        return Ok(());
    }

    with_docker_cleanup(async {
        let docker_manager = DockerManager::new().await?;

        let spec = ContainerSpec {
            container_name: Some(format!("harness_test_container_{}", Uuid::new_v4().simple())),
            ..ContainerSpec::default()
        };

        let container = docker_manager.start_postgres(&spec).await?;
        let id = container.id().to_string();
        assert!(registered_containers().contains(&id));

        let config = container.db_config();
        assert_eq!(config.host, docker_manager.published_host());
        assert_eq!(config.user, "testuser");
        assert_eq!(config.password, "testpass");
        assert_eq!(config.database, "testdb");

        let pool = connect_and_ping(&config, "test container").await?;
        let one: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&pool).await?;
        assert_eq!(one, 1);
        pool.close().await;

        container.terminate(&docker_manager).await?;
        assert!(!registered_containers().contains(&id));

        Ok::<(), anyhow::Error>(())
    })
    .await
}

#[tokio::test]
async fn test_readiness_timeout_includes_logs() -> Result<()> {
    if !docker_available().await {
        return Ok(());
    }

    with_docker_cleanup(async {
        let docker_manager = DockerManager::new().await?;

        let spec = ContainerSpec {
            container_name: Some(format!("harness_test_timeout_{}", Uuid::new_v4().simple())),
            readiness_message: "this line is never logged by postgres".to_string(),
            startup_timeout: Duration::from_secs(15),
            ..ContainerSpec::default()
        };

        let error_msg = match docker_manager.start_postgres(&spec).await {
            Err(e) => e.to_string(),
            Ok(_) => panic!("Expected start_postgres to fail"),
        };

        assert!(
            error_msg.contains("did not log"),
            "Error should explain the readiness timeout, got: {}",
            error_msg
        );
        assert!(
            error_msg.contains("Container logs"),
            "Error should contain inline logs, got: {}",
            error_msg
        );

        Ok::<(), anyhow::Error>(())
    })
    .await
}

#[tokio::test]
async fn test_cleanup_spares_containers_of_concurrent_tests() {
    let sibling = format!("concurrent-test-{}", Uuid::new_v4().simple());
    let own = format!("this-test-{}", Uuid::new_v4().simple());
    register_container(sibling.clone());

    with_docker_cleanup(async {
        register_container(own.clone());
    })
    .await;

    assert!(
        registered_containers().contains(&sibling),
        "a container started by another test must survive this test's cleanup"
    );

    unregister_container(&sibling);
    unregister_container(&own);
}
