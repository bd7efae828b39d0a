// Integration tests for pg-migration-harness

pub mod component;
pub mod unit;
