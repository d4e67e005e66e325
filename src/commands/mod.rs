//! Subcommand implementations

pub mod lookup;
pub mod run;
