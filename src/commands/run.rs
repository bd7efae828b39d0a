use anyhow::Result;
use tracing::info;

use crate::backend::AnyBackend;
use crate::config::RunMode;
use crate::scenario::{ScenarioOptions, ScenarioReport, run_migration_scenario};

/// Run the migration scenario once and print a summary
pub async fn cmd_run(mode: RunMode, table_prefix: &str) -> Result<()> {
    info!("Running migration scenario against {} database", mode.as_str());

    let mut backend = AnyBackend::for_mode(mode);
    let options = ScenarioOptions {
        table_prefix: table_prefix.to_string(),
    };

    let report = run_migration_scenario(&mut backend, &options).await?;
    println!("{}", format_summary(&report));
    Ok(())
}

pub fn format_summary(report: &ScenarioReport) -> String {
    format!(
        "✅ Migration check passed on {}\n   Table:            {}\n   Rows after seed:  {}\n   Rows after write: {}\n   Migration time:   {:?}\n   Total time:       {:?}",
        report.backend,
        report.table_name,
        report.rows_after_migration,
        report.rows_after_insert,
        report.migration_duration,
        report.total_duration,
    )
}
