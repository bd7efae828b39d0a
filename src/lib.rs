//! Integration-test harness that validates a fixed PostgreSQL schema migration
//! against either a throwaway Docker container or an existing database.

pub mod backend;
pub mod commands;
pub mod config;
pub mod constants;
pub mod db;
pub mod docker;
pub mod error;
pub mod migration;
pub mod naming;
pub mod scenario;

pub use backend::{AnyBackend, ContainerizedBackend, DatabaseBackend, ExistingBackend};
pub use config::{ContainerSpec, DbConfig, RunMode};
pub use error::{HarnessError, Result};
pub use scenario::{ScenarioOptions, ScenarioReport, run_migration_scenario};
