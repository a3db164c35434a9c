//! Command implementations for the appdrop CLI.
//!
//! Each submodule handles one subcommand.

pub mod install;
pub mod reconcile;
pub mod sources;
pub mod unlock;
pub mod verify;
