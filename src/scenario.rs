//! The end-to-end migration check shared by the test suite and the CLI.
//!
//! Sequence: connect, pick a scoped table, migrate, verify the seed rows,
//! insert one more row, verify again. Table drop, pool close and backend
//! cleanup always run afterwards, in that order, whatever happened before;
//! their failures are logged and never replace the scenario's own result.

use std::time::{Duration, Instant};

use chrono::Local;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::backend::DatabaseBackend;
use crate::constants::DEFAULT_TABLE_PREFIX;
use crate::error::{HarnessError, Result};
use crate::migration::{SEED_USERS, cleanup_table, execute_migration};
use crate::naming::quoted_table_name;

/// Row the scenario inserts after the migration
pub const EXTRA_USER_EMAIL: &str = "test@example.com";
pub const EXTRA_USER_NAME: &str = "Test User";

#[derive(Debug, Clone)]
pub struct ScenarioOptions {
    pub table_prefix: String,
}

impl Default for ScenarioOptions {
    fn default() -> Self {
        Self {
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
        }
    }
}

/// What a successful scenario observed
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub backend: &'static str,
    pub table_name: String,
    pub rows_after_migration: i64,
    pub rows_after_insert: i64,
    pub migration_duration: Duration,
    pub total_duration: Duration,
}

struct TableChecks {
    rows_after_migration: i64,
    rows_after_insert: i64,
    migration_duration: Duration,
}

/// Run the full migration scenario against `backend`.
///
/// The backend's cleanup is attempted exactly once, including when `connect`
/// itself fails part-way through provisioning.
pub async fn run_migration_scenario<B>(
    backend: &mut B,
    options: &ScenarioOptions,
) -> Result<ScenarioReport>
where
    B: DatabaseBackend + ?Sized,
{
    let started = Instant::now();
    let label = backend.describe();
    info!("Starting {} scenario at {}", label, Local::now().to_rfc3339());

    let pool = match backend.connect().await {
        Ok(pool) => pool,
        Err(e) => {
            release_backend(backend).await;
            return Err(e);
        }
    };

    let table_name = backend.generate_scoped_table_name(&options.table_prefix);
    info!("Using table name: {}", table_name);

    let outcome = exercise_table(&pool, &table_name).await;

    release_table(&pool, &table_name).await;
    pool.close().await;
    release_backend(backend).await;

    let checks = outcome?;
    let total_duration = started.elapsed();
    info!(
        "{} scenario completed in {:?} for table {}",
        label, total_duration, table_name
    );

    Ok(ScenarioReport {
        backend: label,
        table_name,
        rows_after_migration: checks.rows_after_migration,
        rows_after_insert: checks.rows_after_insert,
        migration_duration: checks.migration_duration,
        total_duration,
    })
}

async fn exercise_table(pool: &PgPool, table_name: &str) -> Result<TableChecks> {
    let migration_start = Instant::now();
    execute_migration(pool, table_name).await?;
    let migration_duration = migration_start.elapsed();

    let rows_after_migration = count_rows(pool, table_name).await?;
    expect_row_count(rows_after_migration, SEED_USERS.len() as i64, "after migration")?;

    for seed in SEED_USERS.iter() {
        match find_user_name(pool, table_name, seed.email).await? {
            Some(name) if name == seed.name => {}
            Some(name) => {
                return Err(HarnessError::Assertion(format!(
                    "expected {} to be named '{}', found '{}'",
                    seed.email, seed.name, name
                )));
            }
            None => {
                return Err(HarnessError::Assertion(format!(
                    "seed user {} missing from {}",
                    seed.email, table_name
                )));
            }
        }
    }

    insert_user(pool, table_name, EXTRA_USER_EMAIL, EXTRA_USER_NAME).await?;

    let rows_after_insert = count_rows(pool, table_name).await?;
    expect_row_count(
        rows_after_insert,
        SEED_USERS.len() as i64 + 1,
        "after insert",
    )?;

    Ok(TableChecks {
        rows_after_migration,
        rows_after_insert,
        migration_duration,
    })
}

fn expect_row_count(actual: i64, expected: i64, stage: &str) -> Result<()> {
    if actual != expected {
        return Err(HarnessError::Assertion(format!(
            "expected {} rows {}, found {}",
            expected, stage, actual
        )));
    }
    Ok(())
}

pub async fn count_rows(pool: &PgPool, table_name: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quoted_table_name(table_name)?);
    sqlx::query_scalar::<_, i64>(&sql)
        .fetch_one(pool)
        .await
        .map_err(|e| HarnessError::query(format!("count rows in {}", table_name), e))
}

pub async fn find_user_name(pool: &PgPool, table_name: &str, email: &str) -> Result<Option<String>> {
    let sql = format!(
        "SELECT name FROM {} WHERE email = $1",
        quoted_table_name(table_name)?
    );
    sqlx::query_scalar::<_, String>(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(|e| HarnessError::query(format!("look up {} in {}", email, table_name), e))
}

pub async fn insert_user(pool: &PgPool, table_name: &str, email: &str, name: &str) -> Result<()> {
    let sql = format!(
        "INSERT INTO {} (email, name) VALUES ($1, $2)",
        quoted_table_name(table_name)?
    );
    sqlx::query(&sql)
        .bind(email)
        .bind(name)
        .execute(pool)
        .await
        .map_err(|e| HarnessError::query(format!("insert {} into {}", email, table_name), e))?;
    Ok(())
}

async fn release_table(pool: &PgPool, table_name: &str) {
    match cleanup_table(pool, table_name).await {
        Ok(()) => info!("Successfully cleaned up table: {}", table_name),
        Err(e) => warn!("Failed to clean up table {}: {}", table_name, e),
    }
}

/// Best-effort backend cleanup; failures are logged
pub async fn release_backend<B>(backend: &mut B)
where
    B: DatabaseBackend + ?Sized,
{
    if let Err(e) = backend.cleanup().await {
        warn!("Failed to clean up {}: {}", backend.describe(), e);
    }
}
