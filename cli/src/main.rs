use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keyrank_core::{Document, Index, DEFAULT_LIMIT};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use std::fs::File;
use std::io::{BufRead, BufReader};

#[derive(Debug, Deserialize)]
struct InputDoc {
    text: String,
    id: Option<u32>,
}

#[derive(Parser)]
#[command(name = "keyrank")]
#[command(about = "Single-term ranked search over a sled-backed inverted index", long_about = None)]
struct Cli {
    /// Index directory
    #[arg(long, global = true, default_value = "keyrank-index")]
    index: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a single document
    Add {
        /// Document text
        text: String,
        /// Explicit document id (auto-assigned when omitted)
        #[arg(long)]
        id: Option<u32>,
    },
    /// Bulk-load documents from a JSONL file, one {"text", "id"?} per line
    Batch {
        /// Input file path
        #[arg(long)]
        input: String,
        /// Skip warming the term cache before the load
        #[arg(long, default_value_t = false)]
        no_prefill: bool,
    },
    /// Rank documents for a single word
    Search {
        /// Query word
        word: String,
        /// Maximum number of results
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
    },
    /// Print the number of stored documents
    Count,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let index = Index::open(&cli.index)
        .with_context(|| format!("opening index at {}", cli.index))?;

    match cli.command {
        Commands::Add { text, id } => {
            let doc = match id {
                Some(id) => Document::with_id(text, id),
                None => Document::new(text),
            };
            let unique = index.add(&doc)?;
            index.flush()?;
            println!("indexed 1 document, {unique} unique terms");
        }
        Commands::Batch { input, no_prefill } => {
            let docs = read_jsonl(&input)?;
            let count = docs.len();
            index.batch_add(&docs, !no_prefill)?;
            index.flush()?;
            tracing::info!(count, input, "batch indexed");
            println!("indexed {count} documents");
        }
        Commands::Search { word, limit } => {
            let results = index.search_single_word(&word, limit)?;
            println!("total: {}  idf: {:.4}", results.total, results.idf);
            for hit in &results.documents {
                let excerpt = index.document(hit.doc_id)?.unwrap_or_default();
                println!("{:>10}  score {:>3}  {}", hit.doc_id, hit.score, excerpt);
            }
        }
        Commands::Count => {
            println!("{}", index.document_count());
        }
    }
    Ok(())
}

fn read_jsonl(path: &str) -> Result<Vec<Document>> {
    let file = File::open(path).with_context(|| format!("opening {path}"))?;
    let mut docs = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: InputDoc = serde_json::from_str(&line)
            .with_context(|| format!("parsing line {}", docs.len() + 1))?;
        docs.push(match doc.id {
            Some(id) => Document::with_id(doc.text, id),
            None => Document::new(doc.text),
        });
    }
    Ok(docs)
}
