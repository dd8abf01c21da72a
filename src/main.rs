//! Patchwright CLI: run one refactoring request through the pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use patchwright::agent::{PatchRequest, Pipeline, PipelineOutcome};
use patchwright::config::Config;
use patchwright::generator::ChatCompletionsGenerator;
use patchwright::knowledge::{HttpEmbeddings, InMemoryIndex, KnowledgeStore, load_corpus};
use patchwright::verifier::SpatchVerifier;

#[derive(Parser, Debug)]
#[command(
    name = "patchwright",
    version,
    about = "Draft a structural patch script, prove it on a synthetic sample, then apply it"
)]
struct Cli {
    /// The refactoring request, in natural language.
    request: String,

    /// Real files to apply the proven script to. Omit to stop after the
    /// dry run.
    #[arg(long = "target", value_name = "PATH")]
    targets: Vec<PathBuf>,

    /// Pre-built knowledge corpus (JSON array of tagged documents).
    #[arg(long, env = "PATCHWRIGHT_CORPUS")]
    corpus: Option<PathBuf>,

    /// Print the final report as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if cli.corpus.is_some() {
        config.knowledge.corpus_path = cli.corpus.clone();
    }

    let generator = Arc::new(
        ChatCompletionsGenerator::new(config.generator.clone())
            .context("configuring the generator")?,
    );

    let index = build_index(&config).await?;
    let knowledge = Arc::new(
        KnowledgeStore::new(Arc::new(index)).with_top_k(config.knowledge.top_k),
    );
    let verifier = Arc::new(SpatchVerifier::new(config.verifier.clone()));

    let pipeline = Pipeline::new(generator, knowledge, verifier);
    let outcome = pipeline
        .handle(PatchRequest::new(cli.request, cli.targets))
        .await;

    render(outcome, cli.json)
}

async fn build_index(config: &Config) -> anyhow::Result<InMemoryIndex> {
    let Some(path) = &config.knowledge.corpus_path else {
        tracing::warn!("no corpus configured; drafting without retrieved knowledge");
        return Ok(InMemoryIndex::empty());
    };

    let documents =
        load_corpus(path).with_context(|| format!("loading corpus {}", path.display()))?;
    let embedder = Arc::new(
        HttpEmbeddings::new(config.embeddings.clone()).context("configuring embeddings")?,
    );

    tracing::info!(documents = documents.len(), "building knowledge index");
    InMemoryIndex::build(embedder, documents)
        .await
        .context("embedding the corpus")
}

fn render(outcome: PipelineOutcome, json: bool) -> anyhow::Result<()> {
    match outcome {
        PipelineOutcome::DirectFallback { rationale } => {
            if json {
                let value = serde_json::json!({
                    "status": "direct-fallback",
                    "rationale": rationale,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("Routed to direct edits: {}", rationale);
            }
        }
        PipelineOutcome::Structural(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Status: {:?}", report.status);
                println!("\n--- script ---\n{}", report.script);
                if let Some(diff) = &report.diff {
                    println!("\n--- diff ---\n{}", diff);
                }
                if !report.error_trace.is_empty() {
                    println!("\n--- error trace ---");
                    for line in &report.error_trace {
                        println!("{}", line);
                    }
                }
            }
        }
    }
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("patchwright=info")),
        )
        .init();
}
