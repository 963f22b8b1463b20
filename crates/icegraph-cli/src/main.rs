//! Icegraph CLI
//!
//! Unified command-line interface for:
//! - Ingesting document batches (JSON envelopes) into enhanced documents and
//!   content-addressed artifacts
//! - Running query-time attribution over retrieved chunks
//! - Inspecting the resolved environment configuration

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use icegraph_attribution::QueryAttribution;
use icegraph_ingest::{
    run_batch, BatchConfig, ContentStore, PipelineConfig, ProcessingStatus, RawDocument,
    StoreRecord,
};

#[derive(Parser)]
#[command(name = "icegraph")]
#[command(
    author,
    version,
    about = "Icegraph: research document annotation and attribution pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a batch of documents into enhanced (markup-annotated) form.
    ///
    /// Input is a `.json` envelope file or a directory of them. Each envelope
    /// holds the document metadata, body text, and the attachment records the
    /// external conversion engines produced.
    Ingest {
        /// Input envelope file or directory (walked recursively for `.json`).
        input: PathBuf,
        /// Output directory for enhanced documents (`<uid>.txt`).
        #[arg(short, long)]
        out: PathBuf,
        /// Optional content store root; when set, originals and extracted
        /// text are landed content-addressed under it.
        #[arg(long)]
        store: Option<PathBuf>,
        /// Maximum documents processed concurrently.
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },

    /// Attribute retrieved chunks: sources, confidences, conflicts.
    Attribute {
        /// Chunk text file(s); each file is one retrieved chunk.
        #[arg(required = true)]
        chunks: Vec<PathBuf>,
    },

    /// Print the resolved environment configuration.
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Ingest {
            input,
            out,
            store,
            workers,
        } => cmd_ingest(&input, &out, store.as_deref(), workers),
        Commands::Attribute { chunks } => cmd_attribute(&chunks),
        Commands::Config => cmd_config(),
    }
}

// ============================================================================
// ingest
// ============================================================================

fn cmd_ingest(input: &Path, out: &Path, store_root: Option<&Path>, workers: usize) -> Result<()> {
    let inputs = collect_envelope_paths(input)?;
    if inputs.is_empty() {
        return Err(anyhow!("no .json envelopes under {}", input.display()));
    }

    let mut docs = Vec::with_capacity(inputs.len());
    for path in &inputs {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let doc: RawDocument = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        docs.push(doc);
    }
    println!(
        "Ingesting {} document(s) with {} worker(s)...",
        docs.len(),
        workers
    );

    let config = BatchConfig {
        workers,
        pipeline: PipelineConfig::from_env(),
        ..BatchConfig::default()
    };
    let table_engine = config.pipeline.table_engine;

    let runtime = tokio::runtime::Runtime::new()?;
    let output = runtime.block_on(run_batch(docs, config));

    fs::create_dir_all(out)?;
    let store = store_root.map(ContentStore::new);
    for outcome in &output.outcomes {
        let Some(document) = &outcome.document else {
            continue;
        };
        let path = out.join(format!("{}.txt", document.uid));
        fs::write(&path, &document.text)?;
        println!("  {} {}", "→".cyan(), path.display());

        if let Some(store) = &store {
            let record = StoreRecord {
                source_type: outcome.source_type,
                status: outcome.status.clone(),
                extraction_method: table_engine.as_str().to_string(),
                ingested_at: Utc::now().to_rfc3339(),
                source_date: None,
            };
            let artifact = store.store(
                &document.uid,
                "document.txt",
                document.text.as_bytes(),
                &document.text,
                &record,
            )?;
            println!("  {} {}", "→".cyan(), artifact.content_dir.display());
        }
    }

    println!();
    print!("{}", output.report);
    for outcome in &output.outcomes {
        if let ProcessingStatus::Failed { reason } = &outcome.status {
            println!("  {} {}: {}", "✗".red(), outcome.uid, reason);
        }
    }
    if output.report.total_failed() == 0 {
        println!("{}", "Batch complete.".green());
        Ok(())
    } else {
        Err(anyhow!("{} document(s) failed", output.report.total_failed()))
    }
}

/// A single `.json` file, or every `.json` file under a directory.
fn collect_envelope_paths(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    let mut paths = Vec::new();
    for entry in WalkDir::new(input).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "json")
        {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

// ============================================================================
// attribute
// ============================================================================

fn cmd_attribute(chunk_paths: &[PathBuf]) -> Result<()> {
    let mut chunks = Vec::with_capacity(chunk_paths.len());
    for path in chunk_paths {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        chunks.push(text);
    }

    let display = QueryAttribution::new(chunks)
        .build_cache()
        .enrich_sources()
        .resolve_confidence()
        .flag_conflicts();

    print!("{}", display.render());
    if !display.conflicts.is_empty() {
        println!(
            "{}",
            format!("{} conflict(s) detected", display.conflicts.len()).yellow()
        );
    }
    Ok(())
}

// ============================================================================
// config
// ============================================================================

fn cmd_config() -> Result<()> {
    let config = PipelineConfig::from_env();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
