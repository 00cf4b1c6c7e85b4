//! CLI command implementations. Results go to stdout; logs and progress
//! go to stderr.

use anyhow::{bail, Result};

use crate::answer::{self, RagContext};
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::health::{
    self, CredentialStatus, HealthStatus, OverallStatus, ProviderStatus, VectorStoreStatus,
};
use crate::index::{IndexManager, VectorIndex};
use crate::llm;
use crate::models::AnswerRecord;
use crate::progress::ProgressMode;
use crate::retrieve;

const SNIPPET_CHARS: usize = 240;

async fn ready_index(
    config: &Config,
    embedder: &dyn EmbeddingProvider,
    force_rebuild: bool,
    progress: ProgressMode,
) -> Result<VectorIndex> {
    let index = IndexManager::new(config, embedder)
        .with_progress(progress.reporter())
        .get_or_build_index(force_rebuild)
        .await?;
    Ok(index)
}

pub async fn run_index(config: &Config, force: bool, progress: ProgressMode) -> Result<()> {
    let embedder = embedding::create_provider(&config.embedding)?;
    let index = ready_index(config, embedder.as_ref(), force, progress).await?;
    let chunks = index.count().await?;

    println!(
        "Index ready: {} ({} chunks, {} dims)",
        index.collection_id(),
        chunks,
        index.dims()
    );
    Ok(())
}

pub async fn run_search(
    config: &Config,
    query: &str,
    k: Option<usize>,
    progress: ProgressMode,
) -> Result<()> {
    let k = k.unwrap_or(config.retrieval.k);
    let embedder = embedding::create_provider(&config.embedding)?;
    let index = ready_index(config, embedder.as_ref(), false, progress).await?;

    let results = retrieve::query(&index, embedder.as_ref(), query, k).await?;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} ({} #{})",
            i + 1,
            hit.score,
            hit.chunk.display_name,
            hit.chunk.source_id,
            hit.chunk.chunk_index
        );
        let snippet: String = hit.chunk.content.chars().take(SNIPPET_CHARS).collect();
        println!("    {}", snippet.replace('\n', " "));
        println!();
    }
    Ok(())
}

pub async fn run_ask(
    config: &Config,
    question: &str,
    k: Option<usize>,
    temperature: Option<f32>,
    json: bool,
    progress: ProgressMode,
) -> Result<()> {
    let k = k.unwrap_or(config.retrieval.k);
    let temperature = temperature.unwrap_or(config.llm.temperature);

    let embedder = embedding::create_provider(&config.embedding)?;
    let model = llm::create_model(&config.llm)?;
    let index = ready_index(config, embedder.as_ref(), false, progress).await?;

    let ctx = RagContext::new(index, embedder, model);
    let record = answer::answer(&ctx, question, k, temperature).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_answer(&record);
    }
    Ok(())
}

fn print_answer(record: &AnswerRecord) {
    println!("{}", record.answer_text);
    if !record.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &record.sources {
            println!("  - {} ({})", source.display_name, source.document_identifier);
        }
    }
}

/// Print the health report. Fails only when the system is unhealthy.
pub async fn run_health(config: &Config, json: bool) -> Result<()> {
    let report = health::check_persisted_health(config).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_health(&report);
    }

    if report.status == OverallStatus::Unhealthy {
        bail!("policy assistant is unhealthy");
    }
    Ok(())
}

fn print_health(report: &HealthStatus) {
    let status = match report.status {
        OverallStatus::Healthy => "healthy",
        OverallStatus::Degraded => "degraded",
        OverallStatus::Unhealthy => "unhealthy",
    };
    let credentials = match report.components.credentials {
        CredentialStatus::Configured => "configured",
        CredentialStatus::Missing => "missing (set OPENAI_API_KEY)",
        CredentialStatus::NotRequired => "not required",
    };
    let provider = |p: ProviderStatus| match p {
        ProviderStatus::Configured => "configured",
        ProviderStatus::Disabled => "disabled",
    };
    let vector_store = match &report.components.vector_store {
        VectorStoreStatus::Loaded { collection, chunks } => {
            format!("loaded ({}, {} chunks)", collection, chunks)
        }
        VectorStoreStatus::NotLoaded => "not loaded (run `policy-assistant index`)".to_string(),
        VectorStoreStatus::Error { error } => format!("error: {}", error),
    };

    println!("status: {}", status);
    println!("  embedding:    {}", provider(report.components.models.embedding));
    println!("  llm:          {}", provider(report.components.models.llm));
    println!("  credentials:  {}", credentials);
    println!("  vector_store: {}", vector_store);
}
