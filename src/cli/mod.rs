//! CLI layer for querylytics-rs.
//!
//! Provides the command-line interface using clap, with commands for
//! ingesting documents, asking one-shot questions, running an
//! interactive conversation, and managing the document store.

#[allow(clippy::print_stdout)]
pub mod commands;
pub mod parser;

pub use commands::execute;
pub use parser::{Cli, Commands, DocumentCommands};
