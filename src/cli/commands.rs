//! Command execution.
//!
//! Wires the reference backends (SQLite store, lexical index, OpenAI
//! generation) to the orchestrator and drives the suspend/resume loop
//! for probing questions on the terminal.

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use uuid::Uuid;

use crate::agent::config::EngineConfig;
use crate::agent::orchestrator::{Orchestrator, QueryOutcome, QueryRequest};
use crate::backend::create_generation;
use crate::backend::feedback::FeedbackSink;
use crate::backend::lexical::LexicalIndex;
use crate::backend::sqlite::SqliteStore;
use crate::backend::store::{Document, DocumentStore};
use crate::chunk::chunk_text;
use crate::cli::parser::{Cli, Commands, DocumentCommands};
use crate::core::types::{DocumentId, SourceMetadata};
use crate::error::EngineError;

/// Runs the parsed command.
///
/// # Errors
///
/// Returns any storage, configuration, or engine error, with context
/// for the failing step.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    let store = Arc::new(
        SqliteStore::open(&cli.db)
            .with_context(|| format!("opening document store at {}", cli.db.display()))?,
    );

    match cli.command {
        Commands::Ingest {
            paths,
            source,
            authority,
        } => ingest(&store, &paths, source, authority),
        Commands::Documents { command } => documents(&store, &command),
        Commands::Ask { query, document } => {
            let orchestrator = build_orchestrator(&store)?;
            let request = match document {
                Some(id) => QueryRequest::new(Uuid::new_v4(), query)
                    .with_document(DocumentId::new(id)),
                None => QueryRequest::new(Uuid::new_v4(), query),
            };
            let outcome = drive(&orchestrator, request).await?;
            print_outcome(&outcome);
            Ok(())
        }
        Commands::Chat => {
            let orchestrator = build_orchestrator(&store)?;
            chat(&orchestrator).await
        }
    }
}

fn build_orchestrator(store: &Arc<SqliteStore>) -> anyhow::Result<Orchestrator> {
    let config = EngineConfig::from_env().context("loading engine configuration")?;
    let generation = create_generation(&config).context("creating generation backend")?;

    let index = LexicalIndex::new();
    let indexed = store
        .index_into(&index)
        .context("rebuilding the lexical index")?;
    tracing::debug!(indexed, "lexical index rebuilt from store");

    Ok(Orchestrator::new(
        generation,
        Arc::new(index),
        Arc::clone(store) as Arc<dyn DocumentStore>,
        Arc::clone(store) as Arc<dyn FeedbackSink>,
        config,
    ))
}

/// Runs one request to completion, answering probing questions from
/// stdin while the conversation is suspended.
async fn drive(
    orchestrator: &Orchestrator,
    mut request: QueryRequest,
) -> Result<QueryOutcome, EngineError> {
    loop {
        let outcome = orchestrator.handle(request.clone()).await?;
        let Some(question) = outcome.pending_question.clone() else {
            return Ok(outcome);
        };
        println!("{question}");
        let answer = read_line("> ");
        request = QueryRequest::new(request.conversation_id, String::new()).with_answer(answer);
    }
}

async fn chat(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let conversation_id = Uuid::new_v4();
    println!("querylytics chat - empty line to exit");
    loop {
        let line = read_line("you> ");
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        match drive(orchestrator, QueryRequest::new(conversation_id, line)).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(err) => println!("error: {err}"),
        }
    }
    Ok(())
}

fn ingest(
    store: &SqliteStore,
    paths: &[std::path::PathBuf],
    source: Option<String>,
    authority: Option<f32>,
) -> anyhow::Result<()> {
    let config = EngineConfig::from_env().context("loading engine configuration")?;
    for path in paths {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let id = document_id_for(path);
        let chunks = chunk_text(&text, config.chunk_size, config.chunk_overlap);
        let document = Document {
            id: id.clone(),
            text,
            metadata: SourceMetadata {
                source: source.clone().or_else(|| Some(path.display().to_string())),
                authority,
                updated_at: Some(Utc::now()),
            },
        };
        store.put_document(&document, &chunks)?;
        println!("ingested {id} ({} chunks)", chunks.len());
    }
    Ok(())
}

fn documents(store: &SqliteStore, command: &DocumentCommands) -> anyhow::Result<()> {
    match command {
        DocumentCommands::List => {
            for id in store.list_documents()? {
                println!("{id}");
            }
        }
        DocumentCommands::Show { id } => {
            let document_id = DocumentId::new(id.clone());
            let document = store
                .get_document(&document_id)?
                .ok_or(EngineError::DocumentNotFound { document_id })?;
            println!("{}", document.text);
        }
        DocumentCommands::Delete { id } => {
            let existed = store.delete_document(&DocumentId::new(id.clone()))?;
            println!("{}", if existed { "deleted" } else { "not found" });
        }
        DocumentCommands::Stats => {
            let stats = store.stats()?;
            println!("documents: {}", stats.documents);
            println!("chunks:    {}", stats.chunks);
        }
    }
    Ok(())
}

fn print_outcome(outcome: &QueryOutcome) {
    println!("{}", outcome.response_text.trim_end());
    if !outcome.citations.is_empty() {
        let cited: Vec<&str> = outcome.citations.iter().map(DocumentId::as_str).collect();
        println!("sources: {}", cited.join(", "));
    }
    println!("confidence: {:.2} ({})", outcome.confidence, outcome.phase);
}

fn document_id_for(path: &Path) -> DocumentId {
    let stem = path
        .file_stem()
        .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned());
    DocumentId::new(stem)
}

fn read_line(prompt: &str) -> String {
    print!("{prompt}");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);
    line.trim_end_matches(['\n', '\r']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_from_path() {
        assert_eq!(
            document_id_for(Path::new("/tmp/notes/handbook.txt")).as_str(),
            "handbook"
        );
        assert_eq!(document_id_for(Path::new("report.md")).as_str(), "report");
    }
}
