use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ragdex::chat::{AnswerProvider, HttpAnswerProvider};
use ragdex::config::State;
use ragdex::embeddings::HttpEmbeddingProvider;
use ragdex::index::Index;
use ragdex::retriever::{QueryOutcome, Retriever};

const NO_FRAGMENTS_ANSWER: &str = "No relevant fragments found for your question.";

#[derive(Parser)]
#[command(name = "ragdex")]
#[command(version = "0.1")]
#[command(about = "Index local documents and answer questions over them", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every .txt file in the docs directory
    Add,
    /// Answer a question against the index (reads stdin if omitted)
    Query { question: Option<String> },
    /// List indexed documents and their chunk counts
    List,
    /// Print the resolved configuration
    Config,
}

fn add_command(state: &State) -> Result<()> {
    let mut index = Index::open(state)?;
    let embedder = HttpEmbeddingProvider::new(state)?;

    let mut entries: Vec<_> = fs::read_dir(&state.docs_dir)
        .with_context(|| format!("failed to read docs directory '{}'", state.docs_dir))?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("txt"))
                .unwrap_or(false)
        })
        .collect();
    entries.sort();

    info!(count = entries.len(), dir = %state.docs_dir, "found documents to index");

    let mut indexed = 0usize;
    let mut skipped = 0usize;
    for path in &entries {
        let doc_id = match path.file_stem().and_then(|stem| stem.to_str()) {
            Some(stem) => stem.to_string(),
            None => {
                warn!(path = %path.display(), "skipping file with unusable name");
                continue;
            }
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;

        let outcome = index.index_document(&embedder, &doc_id, &text)?;
        indexed += outcome.indexed;
        skipped += outcome.skipped;
    }

    println!(
        "{}",
        serde_json::json!({
            "documents": entries.len(),
            "chunks_indexed": indexed,
            "chunks_skipped": skipped,
            "total_entries": index.len(),
        })
    );

    Ok(())
}

fn query_command(state: &State, question: Option<String>) -> Result<()> {
    let question = match question {
        Some(question) => question,
        None => {
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            line
        }
    };
    let question = question.trim();
    if question.is_empty() {
        anyhow::bail!("question cannot be empty");
    }

    let index = Index::open(state)?;
    let embedder = HttpEmbeddingProvider::new(state)?;
    let retriever = Retriever::new(&index, &embedder);

    let (retrieved, answer) = match retriever.query(question, state.top_k)? {
        QueryOutcome::NoRelevantFragments => (0, NO_FRAGMENTS_ANSWER.to_string()),
        QueryOutcome::Context(context) => {
            let chat = HttpAnswerProvider::new(state)?;
            let answer = chat.synthesize(&context, question)?;
            (context.len(), answer)
        }
    };

    let output = serde_json::json!({
        "question": question,
        "index_entries": index.len(),
        "retrieved": retrieved,
        "answer": answer,
    });
    println!("{}", serde_json::to_string(&output)?);

    Ok(())
}

fn list_command(state: &State) -> Result<()> {
    let index = Index::open(state)?;

    let mut order = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in index.metadata().records() {
        let doc_id = record.doc_id.as_str();
        if !counts.contains_key(doc_id) {
            order.push(doc_id);
        }
        *counts.entry(doc_id).or_insert(0) += 1;
    }

    for doc_id in order {
        println!("{}\t{}", doc_id, counts[doc_id]);
    }
    Ok(())
}

fn config_command(state: &State) -> Result<()> {
    state.print_config();
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Cli::parse();
    let state = State::new()?;

    match args.command {
        Commands::Add => add_command(&state)?,
        Commands::Query { question } => query_command(&state, question)?,
        Commands::List => list_command(&state)?,
        Commands::Config => config_command(&state)?,
    }
    Ok(())
}
