//! Library half of the `phc` binary: argument definitions, command execution
//! and tracing setup.

pub mod cli;
pub mod commands;
pub mod logging;

pub use cli::{Cli, Commands, FieldsAction, KindArg};
pub use commands::{execute, open_context, CliError};
