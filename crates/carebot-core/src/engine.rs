//! Retrieval-augmented question answering.
//!
//! [`RagEngine`] wires an [`Embedder`], a [`VectorIndex`] and a
//! [`ChatModel`] together:
//!
//! ```text
//!  ingest:  documents ──embed──▶ vector records ──upsert──▶ index
//!  answer:  question ──embed──▶ query(k) ──▶ context ──prompt──▶ chat ──▶ answer
//!                                                                │
//!                                                     run ──▶ trace store
//! ```
//!
//! All collaborators are passed in explicitly; nothing is process-global.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::chat::{ChatMessage, ChatModel};
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::models::{Document, RunRecord, VectorRecord, SOURCE_KEY, TEXT_KEY};
use crate::trace::{TraceStore, FEEDBACK_KEY};

/// Reply used whenever the context cannot answer the question.
pub const UNKNOWN_ANSWER: &str = "I don't know.";

/// Maximum records per upsert request.
pub const UPSERT_BATCH_SIZE: usize = 100;

const PROMPT_TEMPLATE: &str = "You are a Health Care Insurance Data Interpreter bot. \
Use the following pieces of context to interpret the user's query. \
If the information can not be found in the context, just say \"I don't know.\"\n\
Context: {context}\n\
Question: {question}\n\
Answer: ";

/// Tunables for a [`RagEngine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Chunks retrieved per question.
    pub top_k: usize,
    /// Documents embedded per embedding request.
    pub batch_size: usize,
    /// Trace project runs are logged under.
    pub project: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            top_k: 7,
            batch_size: 32,
            project: "engine".to_string(),
        }
    }
}

/// A stored chunk returned by [`RagEngine::retrieve`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub id: String,
    pub content: String,
    pub source: Option<String>,
    pub score: f32,
}

/// Result of [`RagEngine::answer`].
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Content of every chunk the answer was grounded on.
    pub sources: Vec<String>,
    pub run_id: Uuid,
}

impl Answer {
    pub fn is_unknown(&self) -> bool {
        is_unknown_answer(&self.text)
    }
}

/// True for the "I don't know" sentinel (with or without the period) and
/// for empty answers, ignoring case and surrounding whitespace.
pub fn is_unknown_answer(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    matches!(normalized.as_str(), "" | "i don't know" | "i don't know.")
}

/// Render the interpreter prompt for `question` over `context`.
pub fn build_prompt(context: &str, question: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{context}", context)
        .replace("{question}", question)
}

/// Stable vector id for a document: SHA-256 of its source path, or of its
/// content when it has no source.
pub fn vector_id(document: &Document) -> String {
    let mut hasher = Sha256::new();
    match document.source() {
        Some(source) => hasher.update(source.as_bytes()),
        None => hasher.update(document.content.as_bytes()),
    }
    format!("{:x}", hasher.finalize())
}

pub struct RagEngine {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    chat: Arc<dyn ChatModel>,
    tracer: Option<Arc<dyn TraceStore>>,
    options: EngineOptions,
}

impl RagEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        chat: Arc<dyn ChatModel>,
        tracer: Option<Arc<dyn TraceStore>>,
        options: EngineOptions,
    ) -> Self {
        Self {
            embedder,
            index,
            chat,
            tracer,
            options,
        }
    }

    pub fn index_name(&self) -> &str {
        self.index.name()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Embed and store `documents`. Returns the number of records written.
    ///
    /// An empty batch fails with [`Error::NoDocumentsFound`] before the
    /// index is touched.
    pub async fn ingest(&self, documents: &[Document]) -> Result<usize> {
        if documents.is_empty() {
            return Err(Error::NoDocumentsFound("the ingestion batch".to_string()));
        }

        let batch_size = self.options.batch_size.max(1);
        let mut written = 0usize;

        for batch in documents.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
            let vectors = self.embedder.embed_documents(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(Error::remote(
                    self.embedder.model_name(),
                    format!(
                        "expected {} embeddings, received {}",
                        batch.len(),
                        vectors.len()
                    ),
                ));
            }

            let records: Vec<_> = batch
                .iter()
                .zip(vectors)
                .map(|(doc, values)| {
                    let mut metadata = doc.metadata.clone();
                    metadata.insert(TEXT_KEY.to_string(), Value::String(doc.content.clone()));
                    VectorRecord {
                        id: vector_id(doc),
                        values,
                        metadata,
                    }
                })
                .collect();

            for upsert in records.chunks(UPSERT_BATCH_SIZE) {
                written += self.index.upsert(upsert).await?;
            }
        }

        tracing::info!(index = self.index.name(), written, "documents ingested");
        Ok(written)
    }

    /// Delete every vector in the index.
    pub async fn clear(&self) -> Result<()> {
        self.index.delete_all().await?;
        tracing::info!(index = self.index.name(), "vector store cleared");
        Ok(())
    }

    /// Whether the index currently holds no vectors.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.index.vector_count().await? == 0)
    }

    /// The `k` stored chunks most similar to `query`, best first.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let vector = self.embedder.embed_query(query).await?;
        let matches = self.index.query(&vector, k).await?;
        tracing::debug!(retrieved = matches.len(), k, "similarity search");

        Ok(matches
            .into_iter()
            .map(|m| RetrievedChunk {
                content: m.text().unwrap_or_default().to_string(),
                source: m
                    .metadata
                    .get(SOURCE_KEY)
                    .and_then(Value::as_str)
                    .map(str::to_string),
                id: m.id,
                score: m.score,
            })
            .collect())
    }

    /// Retrieve context for `question` and ask the chat model to answer
    /// strictly from it.
    ///
    /// Without any retrieved context the sentinel [`UNKNOWN_ANSWER`] is
    /// returned and the model is not called. Every answer is logged as a run
    /// when a trace store is configured.
    pub async fn answer(&self, question: &str, user_id: Option<&str>) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::invalid_input("question is empty"));
        }

        let run_id = Uuid::new_v4();
        let start_time = Utc::now();

        let chunks = self.retrieve(question, self.options.top_k).await?;
        let sources: Vec<String> = chunks
            .into_iter()
            .map(|c| c.content)
            .filter(|c| !c.trim().is_empty())
            .collect();

        let text = if sources.is_empty() {
            tracing::info!("no context retrieved, answering with sentinel");
            UNKNOWN_ANSWER.to_string()
        } else {
            let prompt = build_prompt(&sources.join("\n\n"), question);
            tracing::debug!(
                model = self.chat.model_name(),
                context = sources.len(),
                "asking chat model"
            );
            self.chat.complete(&[ChatMessage::user(prompt)]).await?
        };

        let answer = Answer {
            text,
            sources,
            run_id,
        };

        if let Some(tracer) = &self.tracer {
            let run = RunRecord {
                id: run_id,
                project: self.options.project.clone(),
                question: question.to_string(),
                sources: answer.sources.clone(),
                answer: answer.text.clone(),
                user_id: user_id.map(str::to_string),
                start_time,
                end_time: Utc::now(),
            };
            if let Err(e) = tracer.create_run(&run).await {
                tracing::warn!(run_id = %run_id, error = %e, "failed to log run");
            }
        }

        Ok(answer)
    }

    /// Attach a helpfulness score (1 helpful, 0 not) to a logged run.
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn log_feedback(&self, run_id: Uuid, helpful: bool) {
        let Some(tracer) = &self.tracer else {
            tracing::warn!(run_id = %run_id, "no trace store configured, feedback dropped");
            return;
        };
        let score = if helpful { 1.0 } else { 0.0 };
        match tracer.create_feedback(run_id, FEEDBACK_KEY, score).await {
            Ok(()) => tracing::info!(run_id = %run_id, score, "feedback recorded"),
            Err(e) => tracing::warn!(run_id = %run_id, error = %e, "failed to record feedback"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ensure_index, IndexControl, IndexTarget};
    use crate::memory::{HashingEmbedder, IndexCall, MemoryIndexService, MemoryTraceStore, StaticChat};

    struct Fixture {
        service: MemoryIndexService,
        chat: Arc<StaticChat>,
        tracer: Arc<MemoryTraceStore>,
        engine: RagEngine,
    }

    async fn fixture(dims: usize, reply: &str) -> Fixture {
        let service = MemoryIndexService::new();
        let embedder = Arc::new(HashingEmbedder::new("hash", dims));
        let target = IndexTarget {
            name: "care".to_string(),
            region: "us-east-1".to_string(),
            allow_recreate: true,
        };
        let handle = ensure_index(&service, embedder.as_ref(), &target)
            .await
            .unwrap();
        let index = service.open(&handle.description).unwrap();
        let chat = Arc::new(StaticChat::new(reply));
        let tracer = Arc::new(MemoryTraceStore::new());
        let engine = RagEngine::new(
            embedder,
            index,
            chat.clone(),
            Some(tracer.clone()),
            EngineOptions::default(),
        );
        Fixture {
            service,
            chat,
            tracer,
            engine,
        }
    }

    fn docs() -> Vec<Document> {
        vec![
            Document::whole("data/a.pdf", "The annual deductible is 500 dollars per member."),
            Document::whole("data/b.pdf", "Emergency room visits require a 150 dollar copay."),
            Document::whole("data/c.pdf", "Dental cleanings are covered twice per year."),
        ]
    }

    #[test]
    fn test_unknown_answer_variants() {
        assert!(is_unknown_answer("I don't know."));
        assert!(is_unknown_answer("  i don't know  "));
        assert!(is_unknown_answer(""));
        assert!(!is_unknown_answer("The deductible is $500."));
    }

    #[test]
    fn test_prompt_contains_context_and_question() {
        let prompt = build_prompt("ctx text", "what is covered?");
        assert!(prompt.contains("Context: ctx text"));
        assert!(prompt.contains("Question: what is covered?"));
        assert!(prompt.contains("I don't know."));
        assert!(prompt.ends_with("Answer: "));
    }

    #[test]
    fn test_vector_id_stable_per_source() {
        let a = Document::whole("data/a.pdf", "v1");
        let b = Document::whole("data/a.pdf", "v2");
        assert_eq!(vector_id(&a), vector_id(&b));
        assert_eq!(vector_id(&a).len(), 64);
    }

    #[tokio::test]
    async fn test_ingest_then_retrieve_exact_text() {
        let f = fixture(256, "unused").await;
        assert_eq!(f.engine.ingest(&docs()).await.unwrap(), 3);

        let text = "Emergency room visits require a 150 dollar copay.";
        let hits = f.engine.retrieve(text, 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, text);
        assert_eq!(hits[0].source.as_deref(), Some("data/b.pdf"));
    }

    #[tokio::test]
    async fn test_reingest_overwrites_by_source() {
        let f = fixture(64, "unused").await;
        f.engine.ingest(&docs()).await.unwrap();
        f.engine.ingest(&docs()).await.unwrap();
        assert_eq!(f.engine.retrieve("deductible", 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_ingest_never_touches_index() {
        let f = fixture(64, "unused").await;
        let before = f.service.calls().len();

        let err = f.engine.ingest(&[]).await.unwrap_err();

        assert!(matches!(err, Error::NoDocumentsFound(_)));
        assert_eq!(f.service.calls().len(), before);
    }

    #[tokio::test]
    async fn test_ingest_splits_upserts() {
        let f = fixture(16, "unused").await;
        let many: Vec<Document> = (0..250)
            .map(|i| Document::whole(format!("data/{}.pdf", i), format!("document {}", i)))
            .collect();

        assert_eq!(f.engine.ingest(&many).await.unwrap(), 250);

        let upserts: Vec<usize> = f
            .service
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                IndexCall::Upsert(n) => Some(n),
                _ => None,
            })
            .collect();
        assert!(upserts.iter().all(|&n| n <= UPSERT_BATCH_SIZE));
        assert_eq!(upserts.iter().sum::<usize>(), 250);
    }

    #[tokio::test]
    async fn test_clear_then_retrieve_is_empty() {
        let f = fixture(64, "unused").await;
        f.engine.ingest(&docs()).await.unwrap();
        assert!(!f.engine.is_empty().await.unwrap());

        f.engine.clear().await.unwrap();

        assert!(f.engine.retrieve("deductible", 7).await.unwrap().is_empty());
        assert!(f.engine.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_answer_uses_context_and_logs_run() {
        let f = fixture(128, "The deductible is 500 dollars.").await;
        f.engine.ingest(&docs()).await.unwrap();

        let answer = f
            .engine
            .answer("What is the annual deductible?", Some("member-42"))
            .await
            .unwrap();

        assert_eq!(answer.text, "The deductible is 500 dollars.");
        assert_eq!(answer.sources.len(), 3);
        assert!(!answer.is_unknown());

        let prompts = f.chat.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("annual deductible is 500"));
        assert!(prompts[0].contains("Question: What is the annual deductible?"));

        let runs = f.tracer.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, answer.run_id);
        assert_eq!(runs[0].user_id.as_deref(), Some("member-42"));
        assert_eq!(runs[0].project, "engine");
    }

    #[tokio::test]
    async fn test_answer_without_context_is_sentinel() {
        let f = fixture(64, "should not be used").await;

        let answer = f.engine.answer("Is acupuncture covered?", None).await.unwrap();

        assert_eq!(answer.text, UNKNOWN_ANSWER);
        assert!(answer.sources.is_empty());
        assert!(f.chat.prompts().is_empty());
        assert_eq!(f.tracer.runs().len(), 1);
    }

    #[tokio::test]
    async fn test_answer_rejects_blank_question() {
        let f = fixture(64, "x").await;
        let err = f.engine.answer("   ", None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_feedback_attached_to_run() {
        let f = fixture(64, "Covered.").await;
        f.engine.ingest(&docs()).await.unwrap();
        let answer = f.engine.answer("dental cleanings", None).await.unwrap();

        f.engine.log_feedback(answer.run_id, true).await;
        f.engine.log_feedback(Uuid::new_v4(), false).await;

        assert_eq!(
            f.tracer.feedback(),
            vec![(answer.run_id, FEEDBACK_KEY.to_string(), 1.0)]
        );
    }

    #[tokio::test]
    async fn test_chat_failure_propagates() {
        let service = MemoryIndexService::new();
        service.seed_index("care", 32);
        let index = service
            .open(&service.describe_index("care").await.unwrap())
            .unwrap();
        let engine = RagEngine::new(
            Arc::new(HashingEmbedder::new("hash", 32)),
            index,
            Arc::new(StaticChat::failing("rate limited")),
            None,
            EngineOptions::default(),
        );
        engine.ingest(&docs()).await.unwrap();

        let err = engine.answer("copay", None).await.unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }
}
