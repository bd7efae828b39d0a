use sqlx::{Executor, PgPool};
use tracing::debug;

use crate::error::{HarnessError, Result};
use crate::naming::quoted_table_name;

/// Drop a scoped test table. A table that does not exist counts as dropped.
pub async fn cleanup_table(pool: &PgPool, table_name: &str) -> Result<()> {
    let drop_stmt = format!("DROP TABLE IF EXISTS {}", quoted_table_name(table_name)?);

    pool.execute(drop_stmt.as_str())
        .await
        .map_err(|e| HarnessError::Teardown {
            resource: format!("table {}", table_name),
            message: e.to_string(),
        })?;

    debug!("Dropped table {}", table_name);
    Ok(())
}
