//! The scenario releases its table and backend exactly once when the
//! migration or a row-count check fails

use async_trait::async_trait;
use pg_migration_harness::backend::{AnyBackend, DatabaseBackend};
use pg_migration_harness::config::{DbConfig, RunMode};
use pg_migration_harness::db::connect_and_ping;
use pg_migration_harness::error::{HarnessError, Result};
use pg_migration_harness::naming::generate_scoped_table_name;
use pg_migration_harness::scenario::{ScenarioOptions, run_migration_scenario};
use rstest::rstest;
use sqlx::{Executor, PgPool};

use crate::helpers::docker::{docker_available, with_docker_cleanup};
use crate::helpers::harness::init_tracing;

/// Run-mode backend that pins the table name, plants a table under it right
/// after connecting, and records whether that table outlived the scenario.
struct PlantedTableBackend {
    inner: AnyBackend,
    table_name: String,
    planted_sql: String,
    cleanups: usize,
    table_survived: Option<bool>,
}

impl PlantedTableBackend {
    fn new(planted_sql: &str) -> Self {
        let table_name = generate_scoped_table_name("planted_users");
        Self {
            inner: AnyBackend::for_mode(RunMode::from_env()),
            planted_sql: planted_sql.replace("{table}", &table_name),
            table_name,
            cleanups: 0,
            table_survived: None,
        }
    }

    async fn table_exists(&self, config: &DbConfig) -> Result<bool> {
        let pool = connect_and_ping(config, "table check").await?;
        let exists = sqlx::query_scalar::<_, bool>("SELECT to_regclass($1) IS NOT NULL")
            .bind(&self.table_name)
            .fetch_one(&pool)
            .await
            .map_err(|source| HarnessError::Query {
                operation: "check table existence".to_string(),
                source,
            });
        pool.close().await;
        exists
    }
}

#[async_trait]
impl DatabaseBackend for PlantedTableBackend {
    async fn connect(&mut self) -> Result<PgPool> {
        let pool = self.inner.connect().await?;
        pool.execute(self.planted_sql.as_str())
            .await
            .map_err(|source| HarnessError::Query {
                operation: "plant table".to_string(),
                source,
            })?;
        Ok(pool)
    }

    async fn cleanup(&mut self) -> Result<()> {
        self.cleanups += 1;
        // Checked before the container goes away
        if let Some(config) = self.inner.connection_config().cloned() {
            match self.table_exists(&config).await {
                Ok(exists) => self.table_survived = Some(exists),
                Err(e) => eprintln!("Warning: Failed to check table {}: {}", self.table_name, e),
            }
        }
        self.inner.cleanup().await
    }

    fn connection_config(&self) -> Option<&DbConfig> {
        self.inner.connection_config()
    }

    fn describe(&self) -> &'static str {
        self.inner.describe()
    }

    fn generate_scoped_table_name(&self, _prefix: &str) -> String {
        self.table_name.clone()
    }
}

#[rstest]
// CREATE TABLE IF NOT EXISTS skips, then the seed insert hits missing columns
#[case::migration_fails("CREATE TABLE \"{table}\" (id INTEGER)", "migration")]
// Same shape as the migration, but with a third row already present
#[case::row_count_check_fails(
    "CREATE TABLE \"{table}\" (id SERIAL PRIMARY KEY, email VARCHAR(255) UNIQUE NOT NULL, \
     name VARCHAR(255) NOT NULL, created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP); \
     INSERT INTO \"{table}\" (email, name) VALUES ('early@example.com', 'Early Bird')",
    "assertion"
)]
#[tokio::test]
async fn test_scenario_failure_still_releases_everything_once(
    #[case] planted_sql: &str,
    #[case] expected_failure: &str,
) -> anyhow::Result<()> {
    init_tracing();
    if RunMode::from_env() == RunMode::Containerized && !docker_available().await {
        return Ok(());
    }

    with_docker_cleanup(async {
        let mut backend = PlantedTableBackend::new(planted_sql);
        let err = run_migration_scenario(&mut backend, &ScenarioOptions::default())
            .await
            .unwrap_err();

        match (&err, expected_failure) {
            (HarnessError::Migration { table, .. }, "migration") => {
                assert_eq!(table, &backend.table_name)
            }
            (HarnessError::Assertion(message), "assertion") => {
                assert!(message.contains("expected 2 rows after migration, found 3"))
            }
            (other, expected) => panic!("expected {} failure, got {:?}", expected, other),
        }

        assert_eq!(backend.cleanups, 1);
        assert_eq!(
            backend.table_survived,
            Some(false),
            "table {} should be dropped before backend cleanup",
            backend.table_name
        );

        Ok::<(), anyhow::Error>(())
    })
    .await
}
