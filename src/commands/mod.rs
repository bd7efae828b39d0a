pub mod run;

pub use run::cmd_run;
