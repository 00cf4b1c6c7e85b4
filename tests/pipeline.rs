//! End-to-end pipeline tests against the library API, with in-process stub
//! providers standing in for the embedding service and language model.

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use policy_assistant::answer::{self, RagContext, FALLBACK_ANSWER};
use policy_assistant::config::Config;
use policy_assistant::embedding::EmbeddingProvider;
use policy_assistant::error::{RagError, Result};
use policy_assistant::fingerprint;
use policy_assistant::health::{self, OverallStatus, ProviderStatus, VectorStoreStatus};
use policy_assistant::index::{get_or_build_index, IndexManager};
use policy_assistant::llm::LanguageModel;
use policy_assistant::retrieve;

const DIMS: usize = 64;

/// Bag-of-words embedder: each lowercase word is hashed into one of
/// `DIMS` buckets. Counts calls and embedded texts.
#[derive(Default)]
struct StubEmbedder {
    calls: AtomicUsize,
    texts: AtomicUsize,
    fail: AtomicBool,
}

impl StubEmbedder {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn texts(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.calls.store(0, Ordering::SeqCst);
        self.texts.store(0, Ordering::SeqCst);
    }

    fn vectorize(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize))
                % DIMS;
            v[bucket] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub-embedder"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagError::EmbeddingProvider {
                provider: "stub".to_string(),
                message: "service unavailable".to_string(),
            });
        }
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }
}

/// Records every prompt and replies with a canned answer (or an error).
struct StubModel {
    reply: std::result::Result<String, String>,
    prompts: Arc<Mutex<Vec<(String, f32)>>>,
}

impl StubModel {
    fn replying(text: &str) -> (Self, Arc<Mutex<Vec<(String, f32)>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                reply: Ok(text.to_string()),
                prompts: prompts.clone(),
            },
            prompts,
        )
    }

    fn failing(message: &str) -> (Self, Arc<Mutex<Vec<(String, f32)>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                reply: Err(message.to_string()),
                prompts: prompts.clone(),
            },
            prompts,
        )
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    fn model_name(&self) -> &str {
        "stub-model"
    }

    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((prompt.to_string(), temperature));
        self.reply.clone().map_err(|message| RagError::LanguageModel {
            provider: "stub".to_string(),
            message,
        })
    }
}

const PTO: &str = "Paid Time Off\n\nEmployees receive 15 days of PTO per year. \
Unused PTO days roll over up to a maximum of 5 days.";
const REMOTE: &str = "Remote Work\n\nStaff may work from home two weekdays each week \
with manager approval.";
const HOLIDAYS: &str = "Company Holidays\n\nThe office closes for New Year, \
Independence Day and Thanksgiving.";

fn write_corpus(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("pto.md"), PTO).unwrap();
    fs::write(dir.join("remote-work.md"), REMOTE).unwrap();
    fs::write(dir.join("holidays.txt"), HOLIDAYS).unwrap();
}

fn setup() -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("policies");
    write_corpus(&corpus);

    let mut config = Config::for_corpus(&corpus, tmp.path().join("index_db"));
    config.embedding.provider = "disabled".to_string();
    config.llm.provider = "disabled".to_string();
    (tmp, config)
}

fn context(index: policy_assistant::index::VectorIndex, model: StubModel) -> RagContext {
    RagContext::new(index, Box::new(StubEmbedder::default()), Box::new(model))
}

#[tokio::test]
async fn test_pto_question_cites_pto_policy() {
    let (_tmp, config) = setup();
    let embedder = StubEmbedder::default();
    let index = get_or_build_index(&config, &embedder, false).await.unwrap();

    let (model, prompts) = StubModel::replying("Employees receive 15 days of PTO per year (pto.md).");
    let ctx = context(index, model);

    let record = answer::answer(&ctx, "How many days of PTO do employees receive?", 4, 0.0)
        .await
        .unwrap();

    assert_eq!(
        record.answer_text,
        "Employees receive 15 days of PTO per year (pto.md)."
    );
    assert_eq!(record.sources[0].document_identifier, "pto.md");
    assert_eq!(record.sources[0].display_name, "Pto");
    assert_eq!(record.chunks_retrieved, 3);

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    let (prompt, temperature) = &prompts[0];
    assert_eq!(*temperature, 0.0);
    assert!(prompt.contains("[Source 1: pto.md]\nPaid Time Off"));
    assert!(prompt.contains("QUESTION: How many days of PTO do employees receive?"));
}

#[tokio::test]
async fn test_unchanged_corpus_embeds_once() {
    let (_tmp, config) = setup();
    let embedder = StubEmbedder::default();

    let first = get_or_build_index(&config, &embedder, false).await.unwrap();
    assert_eq!(embedder.texts(), 3);
    let calls = embedder.calls();

    let second = get_or_build_index(&config, &embedder, false).await.unwrap();
    assert_eq!(embedder.calls(), calls);
    assert_eq!(first.collection_id(), second.collection_id());
    assert_eq!(first.fingerprint(), second.fingerprint());
    assert_eq!(second.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_added_file_rebuilds_everything() {
    let (_tmp, config) = setup();
    let embedder = StubEmbedder::default();

    let before = get_or_build_index(&config, &embedder, false).await.unwrap();
    embedder.reset();

    fs::write(
        config.corpus.path.join("expenses.md"),
        "Expenses\n\nSubmit receipts within 30 days.",
    )
    .unwrap();

    let after = get_or_build_index(&config, &embedder, false).await.unwrap();
    assert_ne!(before.collection_id(), after.collection_id());
    assert_ne!(before.fingerprint(), after.fingerprint());
    // The whole corpus is re-embedded, not just the new file.
    assert_eq!(embedder.texts(), 4);
    assert_eq!(after.count().await.unwrap(), 4);

    let record = fingerprint::read_record(&config.index.persist_path)
        .unwrap()
        .unwrap();
    assert_eq!(record.collection_id, after.collection_id());
    assert_eq!(record.fingerprint, after.fingerprint());
}

#[tokio::test]
async fn test_failed_rebuild_keeps_previous_index() {
    let (_tmp, config) = setup();
    let embedder = StubEmbedder::default();

    let good = get_or_build_index(&config, &embedder, false).await.unwrap();
    let artifact_before = fs::read_to_string(fingerprint::artifact_path(&config.index.persist_path)).unwrap();

    fs::write(config.corpus.path.join("pto.md"), "PTO is now 20 days.").unwrap();
    embedder.fail.store(true, Ordering::SeqCst);

    let err = get_or_build_index(&config, &embedder, false).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingProvider { .. }));

    let artifact_after = fs::read_to_string(fingerprint::artifact_path(&config.index.persist_path)).unwrap();
    assert_eq!(artifact_before, artifact_after);
    assert_eq!(good.count().await.unwrap(), 3);

    // Once the provider recovers the next call rebuilds.
    embedder.fail.store(false, Ordering::SeqCst);
    let rebuilt = get_or_build_index(&config, &embedder, false).await.unwrap();
    assert_ne!(rebuilt.collection_id(), good.collection_id());
}

#[tokio::test]
async fn test_missing_and_empty_corpus() {
    let tmp = TempDir::new().unwrap();
    let embedder = StubEmbedder::default();

    let missing = Config::for_corpus(tmp.path().join("nope"), tmp.path().join("index_db"));
    let err = get_or_build_index(&missing, &embedder, false).await.unwrap_err();
    assert!(matches!(err, RagError::CorpusNotFound(_)));

    let empty_dir = tmp.path().join("empty");
    fs::create_dir_all(&empty_dir).unwrap();
    fs::write(empty_dir.join("notes.pdf"), "not eligible").unwrap();
    let empty = Config::for_corpus(&empty_dir, tmp.path().join("index_db"));
    let err = get_or_build_index(&empty, &embedder, false).await.unwrap_err();
    assert!(matches!(err, RagError::EmptyCorpus(_)));

    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_empty_index_falls_back_without_model_call() {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("policies");
    fs::create_dir_all(&corpus).unwrap();
    fs::write(corpus.join("blank.md"), "   \n\n  ").unwrap();
    let config = Config::for_corpus(&corpus, tmp.path().join("index_db"));

    let embedder = StubEmbedder::default();
    let index = get_or_build_index(&config, &embedder, false).await.unwrap();
    assert_eq!(index.count().await.unwrap(), 0);

    let (model, prompts) = StubModel::replying("should not be used");
    let ctx = context(index, model);
    let record = answer::answer(&ctx, "What is the PTO policy?", 4, 0.0)
        .await
        .unwrap();

    assert_eq!(record.answer_text, FALLBACK_ANSWER);
    assert!(record.sources.is_empty());
    assert_eq!(record.chunks_retrieved, 0);
    assert!(prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_model_failure_is_soft() {
    let (_tmp, config) = setup();
    let embedder = StubEmbedder::default();
    let index = get_or_build_index(&config, &embedder, false).await.unwrap();

    let (model, _prompts) = StubModel::failing("rate limited");
    let ctx = context(index, model);
    let record = answer::answer(&ctx, "Can I work from home?", 2, 0.0)
        .await
        .unwrap();

    assert!(record.answer_text.starts_with("Error generating answer: "));
    assert!(record.answer_text.contains("rate limited"));
    assert_eq!(record.chunks_retrieved, 2);
    assert_eq!(record.sources.len(), 2);
}

#[tokio::test]
async fn test_citations_deduplicated() {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("policies");
    fs::create_dir_all(&corpus).unwrap();
    let long_pto = (0..30)
        .map(|i| format!("PTO rule {} applies to employees taking PTO days.", i))
        .collect::<Vec<_>>()
        .join("\n\n");
    fs::write(corpus.join("pto.md"), &long_pto).unwrap();
    fs::write(corpus.join("remote-work.md"), REMOTE).unwrap();

    let mut config = Config::for_corpus(&corpus, tmp.path().join("index_db"));
    config.chunking.chunk_size = 200;
    config.chunking.chunk_overlap = 20;

    let embedder = StubEmbedder::default();
    let index = get_or_build_index(&config, &embedder, false).await.unwrap();
    assert!(index.count().await.unwrap() > 4);

    let hits = retrieve::query(&index, &embedder, "PTO days for employees", 4)
        .await
        .unwrap();
    assert_eq!(hits.len(), 4);
    assert!(hits.iter().all(|h| h.chunk.source_id == "pto.md"));

    let (model, _prompts) = StubModel::replying("See the PTO policy.");
    let ctx = context(index, model);
    let record = answer::answer(&ctx, "PTO days for employees", 4, 0.0)
        .await
        .unwrap();
    assert_eq!(record.chunks_retrieved, 4);
    assert_eq!(record.sources.len(), 1);
    assert_eq!(record.sources[0].document_identifier, "pto.md");
}

#[tokio::test]
async fn test_health_reflects_index() {
    let (_tmp, config) = setup();

    let before = health::check_persisted_health(&config).await;
    assert_eq!(before.components.vector_store, VectorStoreStatus::NotLoaded);
    // Disabled providers and no index: nothing can be answered.
    assert_eq!(before.status, OverallStatus::Unhealthy);

    let embedder = StubEmbedder::default();
    let index = IndexManager::new(&config, &embedder)
        .get_or_build_index(false)
        .await
        .unwrap();

    // An index alone is not enough while the language model is disabled.
    let held = health::check_health(&config, Some(&index)).await;
    assert_eq!(held.components.models.llm, ProviderStatus::Disabled);
    assert_eq!(held.status, OverallStatus::Degraded);

    let mut local = config.clone();
    local.embedding.provider = "ollama".to_string();
    local.llm.provider = "ollama".to_string();
    let served = health::check_health(&local, Some(&index)).await;
    assert_eq!(served.status, OverallStatus::Healthy);

    let persisted = health::check_persisted_health(&config).await;
    assert_eq!(
        persisted.components.vector_store,
        VectorStoreStatus::Loaded {
            collection: index.collection_id().to_string(),
            chunks: 3,
        }
    );
}

#[tokio::test]
async fn test_health_reports_dangling_artifact() {
    let (_tmp, config) = setup();
    fs::create_dir_all(&config.index.persist_path).unwrap();
    fs::write(
        fingerprint::artifact_path(&config.index.persist_path),
        format!("{}\npolicy_documents_v9\n", "0".repeat(64)),
    )
    .unwrap();

    let report = health::check_persisted_health(&config).await;
    assert!(matches!(
        report.components.vector_store,
        VectorStoreStatus::Error { .. }
    ));
    assert_eq!(report.status, OverallStatus::Unhealthy);

    // get_or_build_index treats the same state as "rebuild".
    let embedder = StubEmbedder::default();
    let index = get_or_build_index(&config, &embedder, false).await.unwrap();
    assert_eq!(index.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_answer_record_json() {
    let (_tmp, config) = setup();
    let embedder = StubEmbedder::default();
    let index = get_or_build_index(&config, &embedder, false).await.unwrap();

    let (model, _prompts) = StubModel::replying("15 days.");
    let ctx = context(index, model);
    let record = answer::answer(&ctx, "How much PTO?", 1, 0.0).await.unwrap();

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["question"], "How much PTO?");
    assert_eq!(json["answer_text"], "15 days.");
    assert_eq!(json["chunks_retrieved"], 1);
    assert!(json["sources"][0]["document_identifier"].is_string());
    assert!(json["sources"][0]["display_name"].is_string());
}

#[tokio::test]
async fn test_single_file_vacation_scenario() {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("policies");
    fs::create_dir_all(&corpus).unwrap();
    fs::write(
        corpus.join("pto.md"),
        "Employees get 15 vacation days per year.",
    )
    .unwrap();
    let config = Config::for_corpus(&corpus, tmp.path().join("index_db"));

    let embedder = StubEmbedder::default();
    let index = get_or_build_index(&config, &embedder, false).await.unwrap();

    let hits = retrieve::query(&index, &embedder, "How many vacation days?", 1)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.source_id, "pto.md");

    let (model, _prompts) = StubModel::replying("15 vacation days per year.");
    let ctx = context(index, model);
    let record = answer::answer(&ctx, "How many vacation days?", 1, 0.0)
        .await
        .unwrap();

    assert_eq!(record.chunks_retrieved, 1);
    assert_eq!(
        record.sources,
        vec![policy_assistant::models::Citation {
            document_identifier: "pto.md".to_string(),
            display_name: "Pto".to_string(),
        }]
    );
}

#[test]
fn test_load_and_chunk_empty_corpus() {
    let tmp = TempDir::new().unwrap();
    let config = Config::for_corpus(tmp.path(), tmp.path().join("index_db"));
    let err = policy_assistant::chunk::load_and_chunk(&config.corpus, &config.chunking).unwrap_err();
    assert!(matches!(err, RagError::EmptyCorpus(_)));
}
