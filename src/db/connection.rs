use sqlx::postgres::PgPoolOptions;
use sqlx::{ConnectOptions, Connection, PgPool};
use tracing::log::LevelFilter;
use tracing::{debug, info};

use crate::config::DbConfig;
use crate::constants::{CONNECT_TIMEOUT, MAX_POOL_CONNECTIONS};
use crate::error::{HarnessError, Result};

/// Open a connection to the database described by `config` and ping it.
///
/// The `label` names the database role (e.g. "containerized database") and
/// is included in error messages along with the masked connection string.
/// No retries: a failed connect or ping is terminal.
pub async fn connect_and_ping(config: &DbConfig, label: &str) -> Result<PgPool> {
    let target = format!("{} at {}", label, config.masked_connection_string());
    debug!("Connecting to {}", target);

    // Statement logging only at debug level so migration SQL stays out of normal output
    let options = config
        .connect_options()?
        .log_statements(LevelFilter::Debug)
        .log_slow_statements(LevelFilter::Off, CONNECT_TIMEOUT);

    let pool = PgPoolOptions::new()
        .max_connections(MAX_POOL_CONNECTIONS)
        .acquire_timeout(CONNECT_TIMEOUT)
        .connect_with(options)
        .await
        .map_err(|source| HarnessError::Connection {
            target: target.clone(),
            source,
        })?;

    if let Err(source) = ping(&pool).await {
        pool.close().await;
        return Err(HarnessError::Connection { target, source });
    }

    info!("✅ Connected to {}", label);
    Ok(pool)
}

async fn ping(pool: &PgPool) -> std::result::Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    conn.ping().await
}
