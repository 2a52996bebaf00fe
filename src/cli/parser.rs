//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Conversational query orchestration over a local document store.
#[derive(Debug, Parser)]
#[command(name = "querylytics-rs", version, about, long_about = None)]
pub struct Cli {
    /// Path to the SQLite document store.
    #[arg(long, env = "QUERYLYTICS_DB", default_value = "querylytics.db", global = true)]
    pub db: PathBuf,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ingest text files as documents (chunked and indexed).
    Ingest {
        /// Files to ingest; the file stem becomes the document id.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Source label stored with each document.
        #[arg(long)]
        source: Option<String>,
        /// Authority weight in 0.0..=1.0 stored with each document.
        #[arg(long)]
        authority: Option<f32>,
    },
    /// Ask one question; answers pending probing questions interactively.
    Ask {
        /// The question.
        query: String,
        /// Scope the question to one document id.
        #[arg(long)]
        document: Option<String>,
    },
    /// Interactive conversation (one persistent conversation).
    Chat,
    /// Manage stored documents.
    Documents {
        /// Document operation.
        #[command(subcommand)]
        command: DocumentCommands,
    },
}

/// Document store operations.
#[derive(Debug, Subcommand)]
pub enum DocumentCommands {
    /// List document ids.
    List,
    /// Print one document.
    Show {
        /// Document id.
        id: String,
    },
    /// Delete one document.
    Delete {
        /// Document id.
        id: String,
    },
    /// Print store counters.
    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_ask() {
        let cli = Cli::try_parse_from(["querylytics-rs", "ask", "what is the SLA?"])
            .unwrap_or_else(|_| unreachable!());
        match cli.command {
            Commands::Ask { query, document } => {
                assert_eq!(query, "what is the SLA?");
                assert!(document.is_none());
            }
            _ => unreachable!("expected ask command"),
        }
    }

    #[test]
    fn test_parses_scoped_ask() {
        let cli = Cli::try_parse_from([
            "querylytics-rs",
            "ask",
            "summarize",
            "--document",
            "postmortem-7",
        ])
        .unwrap_or_else(|_| unreachable!());
        match cli.command {
            Commands::Ask { document, .. } => {
                assert_eq!(document.as_deref(), Some("postmortem-7"));
            }
            _ => unreachable!("expected ask command"),
        }
    }

    #[test]
    fn test_parses_documents_stats() {
        let cli = Cli::try_parse_from(["querylytics-rs", "documents", "stats"])
            .unwrap_or_else(|_| unreachable!());
        assert!(matches!(
            cli.command,
            Commands::Documents {
                command: DocumentCommands::Stats
            }
        ));
    }

    #[test]
    fn test_ingest_requires_paths() {
        assert!(Cli::try_parse_from(["querylytics-rs", "ingest"]).is_err());
    }
}
