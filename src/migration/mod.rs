//! The fixed user-table migration.
//!
//! The script is not versioned or parameterized: it always creates the same
//! table shape and seeds the same two rows, under whatever (validated) name the
//! caller supplies.

use sqlx::{Executor, PgPool};
use tracing::{debug, info};

use crate::error::{HarnessError, Result};
use crate::naming::quoted_table_name;

pub use crate::db::cleaner::cleanup_table;

/// A row the migration seeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedUser {
    pub email: &'static str,
    pub name: &'static str,
}

pub const SEED_USERS: [SeedUser; 2] = [
    SeedUser {
        email: "john@example.com",
        name: "John Doe",
    },
    SeedUser {
        email: "jane@example.com",
        name: "Jane Smith",
    },
];

/// Render the migration script for an already-quoted table identifier
pub fn render_migration_sql(quoted_table: &str) -> String {
    let values = SEED_USERS
        .iter()
        .map(|user| format!("('{}', '{}')", user.email, user.name))
        .collect::<Vec<_>>()
        .join(",\n    ");

    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
    id SERIAL PRIMARY KEY,
    email VARCHAR(255) UNIQUE NOT NULL,
    name VARCHAR(255) NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

INSERT INTO {table} (email, name) VALUES
    {values}
ON CONFLICT (email) DO NOTHING;",
        table = quoted_table,
        values = values,
    )
}

/// Create the user table if needed and seed it.
///
/// Re-running against the same table is a no-op for rows that already exist.
pub async fn execute_migration(pool: &PgPool, table_name: &str) -> Result<()> {
    let sql = render_migration_sql(&quoted_table_name(table_name)?);
    debug!("Running migration for table {}", table_name);

    // Sent without bind parameters so both statements run in one simple-protocol round trip
    pool.execute(sql.as_str())
        .await
        .map_err(|source| HarnessError::Migration {
            table: table_name.to_string(),
            source,
        })?;

    info!("Migration applied to table {}", table_name);
    Ok(())
}
