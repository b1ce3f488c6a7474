use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use gated_rag::application::{AskRequest, IngestDocumentRequest};
use gated_rag::infrastructure::documents;
use gated_rag::{build_environment, init_tracing};

/// Ask questions against ingested documents, behind an input policy gate.
///
/// # Environment Variables
///
/// - `OPENAI_API_KEY`, `OPENAI_BASE_URL`: model API credentials and root
/// - `EMBEDDING_MODEL`, `GENERATION_MODEL`, `MODERATION_MODEL`: model ids
/// - `TOP_K`, `MAX_CONTEXT_CHARS`: retrieval limits
/// - `GATED_RAG_DATA_DIR`: override data directory location
/// - `GATED_RAG_LOG`: logging level (trace, debug, info, warn, error)
#[derive(Debug, Parser)]
#[command(name = "gated-rag", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Answer a question from the stored chunks.
    Ask {
        query: String,
        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Ingest a PDF, a form-feed separated text file, or every PDF in a folder.
    Ingest {
        path: PathBuf,
        /// Document title; defaults to the file name. Not allowed for folders.
        #[arg(long)]
        title: Option<String>,
    },
    /// Show the most recent metric records.
    Metrics {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Check that the store is reachable and show the configured models.
    Health,
}

fn main() -> ExitCode {
    init_tracing();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("[gated-rag] {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let handles = build_environment().context("failed to bootstrap environment")?;

    match cli.command {
        Command::Ask { query, json } => {
            let response = handles.answer.ask(AskRequest { query })?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.answer);
                if let Some(model) = &response.model {
                    eprintln!(
                        "[gated-rag] model={model} chunks={} tokens={}",
                        response.num_chunks, response.usage.total_tokens
                    );
                }
            }
        }
        Command::Ingest { path, title } => {
            let files = if path.is_dir() {
                if title.is_some() {
                    bail!("--title applies to a single file, not a folder");
                }
                documents::pdfs_in_folder(&path)?
            } else {
                vec![path]
            };

            let mut responses = Vec::with_capacity(files.len());
            for file in files {
                let pages = documents::load_pages(&file)
                    .with_context(|| format!("failed to read {}", file.display()))?;
                let response = handles
                    .ingest
                    .ingest(IngestDocumentRequest {
                        title: title.clone().unwrap_or_else(|| documents::default_title(&file)),
                        source_path: file.display().to_string(),
                        pages,
                    })
                    .with_context(|| format!("failed to ingest {}", file.display()))?;
                responses.push(response);
            }
            println!("{}", serde_json::to_string_pretty(&responses)?);
        }
        Command::Metrics { limit } => {
            let metrics = handles.answer.recent_metrics(limit)?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
        Command::Health => {
            let status = handles.answer.health()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}
