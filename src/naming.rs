//! Scoped table names and identifier handling.

use std::sync::Mutex;

use chrono::Local;
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constants::{MAX_IDENTIFIER_LENGTH, TABLE_NAME_RANDOM_BOUND, TABLE_NAME_TIMESTAMP_FORMAT};
use crate::error::{HarnessError, Result};

/// Process-wide random source, seeded from OS entropy on first use
static TABLE_NAME_RNG: Lazy<Mutex<StdRng>> = Lazy::new(|| Mutex::new(StdRng::from_entropy()));

/// Generate `{prefix}_{YYYYMMDD_HHMMSS}_{n}` with `n` in `0..10000`
pub fn generate_scoped_table_name(prefix: &str) -> String {
    let timestamp = Local::now().format(TABLE_NAME_TIMESTAMP_FORMAT);
    let suffix = {
        // A poisoned lock still holds a usable generator
        let mut rng = TABLE_NAME_RNG
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.gen_range(0..TABLE_NAME_RANDOM_BOUND)
    };
    format!("{}_{}_{}", prefix, timestamp, suffix)
}

/// Check a name against PostgreSQL's unquoted identifier rules
pub fn is_valid_sql_identifier(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_IDENTIFIER_LENGTH {
        return false;
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Validate a table name and return it quoted for interpolation into SQL
pub fn quoted_table_name(name: &str) -> Result<String> {
    if !is_valid_sql_identifier(name) {
        return Err(HarnessError::InvalidTableName(name.to_string()));
    }
    Ok(quote_ident(name))
}
