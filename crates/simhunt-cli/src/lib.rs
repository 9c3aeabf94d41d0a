//! Simhunt CLI Library
//!
//! Command-line interface for the Simhunt playbook engine: validate option
//! files, render saved results, and inspect performance baselines.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)] // String building is clear and correct
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
mod error;
pub mod handlers;
pub mod logging;
mod output;

pub use commands::{
    BaselineArgs, Cli, ColorArg, Commands, PlaybookKind, RenderArgs, RenderFormat, ValidateArgs,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{Status, StatusPrinter};
