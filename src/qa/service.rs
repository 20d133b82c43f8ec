//! Question answering service and per-request sessions.

use crate::{
    completion::{ChatClient, ChatRequest, get_chat_client},
    config::Config,
    embedding::{EmbeddingClient, get_embedding_client},
    metrics::{MetricsSnapshot, QaMetrics},
    qa::{
        chunking::{TextSplitter, dedupe_chunks},
        prompt::{build_context, render_prompt},
        types::{AnswerMap, LoadSummary, NO_ANSWER, QaError, QaSettings, QuestionOutcome},
    },
    store::{IndexedChunk, VectorIndex, VectorStore, get_vector_store},
};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use std::collections::HashSet;
use std::sync::Arc;

/// Shared, immutable collaborators of the QA pipeline.
///
/// The service holds no per-document state: every request opens its own [`QaSession`], which
/// owns an isolated vector index. Cloning is cheap and shares the same clients and metrics.
#[derive(Clone)]
pub struct QaService {
    embedding_client: Arc<dyn EmbeddingClient>,
    chat_client: Arc<dyn ChatClient>,
    vector_store: Arc<dyn VectorStore>,
    splitter: TextSplitter,
    settings: QaSettings,
    metrics: Arc<QaMetrics>,
}

/// Abstraction over the QA pipeline used by the HTTP surface.
#[async_trait]
pub trait QaApi: Send + Sync {
    /// Index `document_text` in a fresh session and answer every question against it.
    async fn answer_document(
        &self,
        document_text: String,
        questions: Vec<String>,
    ) -> Result<AnswerMap, QaError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl QaService {
    /// Assemble a service from explicit collaborators.
    pub fn new(
        embedding_client: Arc<dyn EmbeddingClient>,
        chat_client: Arc<dyn ChatClient>,
        vector_store: Arc<dyn VectorStore>,
        settings: QaSettings,
    ) -> Result<Self, QaError> {
        let splitter = TextSplitter::new(
            settings.chunk_size,
            settings.chunk_overlap,
            settings.length_unit,
            &settings.tokenizer_model,
        )?;
        Ok(Self {
            embedding_client,
            chat_client,
            vector_store,
            splitter,
            settings,
            metrics: Arc::new(QaMetrics::new()),
        })
    }

    /// Build the service and its provider clients from configuration.
    pub fn from_config(config: &Config) -> Result<Self, QaError> {
        tracing::info!(
            provider = ?config.embedding_provider,
            model = %config.embedding_model,
            "Initializing embedding client"
        );
        let embedding_client: Arc<dyn EmbeddingClient> = Arc::from(get_embedding_client(config)?);
        tracing::info!(
            provider = ?config.chat_provider,
            model = %config.chat_model,
            "Initializing chat client"
        );
        let chat_client: Arc<dyn ChatClient> = Arc::from(get_chat_client(config)?);
        let vector_store = get_vector_store(config)?;
        tracing::info!(backend = ?config.vector_store, "Vector store ready");

        Self::new(
            embedding_client,
            chat_client,
            vector_store,
            QaSettings::from_config(config),
        )
    }

    /// Open a new, unloaded session.
    pub fn session(&self) -> QaSession {
        QaSession {
            service: self.clone(),
            loaded: None,
        }
    }

    /// Settings the service was built with.
    pub fn settings(&self) -> &QaSettings {
        &self.settings
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl QaApi for QaService {
    async fn answer_document(
        &self,
        document_text: String,
        questions: Vec<String>,
    ) -> Result<AnswerMap, QaError> {
        if questions.is_empty() {
            return Err(QaError::NoQuestions);
        }

        let mut session = self.session();
        session.load_document(&document_text).await?;
        let answers = session.answer_questions(&questions).await;
        session.close().await;
        answers
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        QaService::metrics_snapshot(self)
    }
}

struct LoadedIndex {
    index: Box<dyn VectorIndex>,
    summary: LoadSummary,
}

/// One document's question answering context.
///
/// A session starts unloaded; [`QaSession::load_document`] builds its private index and
/// [`QaSession::answer_questions`] queries it. Sessions never share indexes.
pub struct QaSession {
    service: QaService,
    loaded: Option<LoadedIndex>,
}

impl QaSession {
    /// Whether a document has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// Summary of the currently loaded document, if any.
    pub fn summary(&self) -> Option<LoadSummary> {
        self.loaded.as_ref().map(|loaded| loaded.summary)
    }

    /// Chunk, embed, and index a document, replacing any previously loaded one.
    pub async fn load_document(&mut self, text: &str) -> Result<LoadSummary, QaError> {
        if text.trim().is_empty() {
            return Err(QaError::EmptyDocument);
        }

        let service = &self.service;
        let chunks = service.splitter.split(text);
        let (prepared, skipped_duplicates) = dedupe_chunks(chunks);
        if prepared.is_empty() {
            return Err(QaError::EmptyDocument);
        }
        tracing::debug!(
            chunks = prepared.len(),
            skipped_duplicates,
            chunk_size = service.splitter.chunk_size(),
            overlap = service.splitter.overlap(),
            "Document split"
        );

        let texts: Vec<String> = prepared.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = service.embedding_client.generate_embeddings(texts).await?;
        let dimension = embeddings.first().map(Vec::len).ok_or(QaError::EmptyEmbedding)?;

        let indexed: Vec<IndexedChunk> = prepared
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, vector)| IndexedChunk {
                text: chunk.text,
                chunk_hash: chunk.chunk_hash,
                vector,
            })
            .collect();

        let index = service.vector_store.open_index(dimension).await?;
        let chunk_count = match index.insert(indexed).await {
            Ok(count) => count,
            Err(error) => {
                release_index(index.as_ref()).await;
                return Err(error.into());
            }
        };

        let summary = LoadSummary {
            chunk_count,
            skipped_duplicates,
            dimension,
        };
        if let Some(previous) = self.loaded.replace(LoadedIndex { index, summary }) {
            release_index(previous.index.as_ref()).await;
        }

        self.service.metrics.record_document(chunk_count as u64);
        tracing::info!(
            chunks = chunk_count,
            skipped_duplicates,
            dimension,
            "Document loaded"
        );
        Ok(summary)
    }

    /// Answer each distinct question against the loaded document.
    ///
    /// Failures are recorded per question and never abort the batch. Duplicate questions
    /// collapse to one entry at the position of their first occurrence.
    pub async fn answer_questions(&self, questions: &[String]) -> Result<AnswerMap, QaError> {
        let loaded = self.loaded.as_ref().ok_or(QaError::NotLoaded)?;
        let index = loaded.index.as_ref();

        let mut seen = HashSet::new();
        let distinct: Vec<&str> = questions
            .iter()
            .map(String::as_str)
            .filter(|question| seen.insert(*question))
            .collect();
        if distinct.len() < questions.len() {
            tracing::debug!(
                duplicates = questions.len() - distinct.len(),
                "Collapsed duplicate questions"
            );
        }

        let outcomes: Vec<(String, QuestionOutcome)> = stream::iter(distinct)
            .map(str::to_owned)
            .map(|question: String| async move {
                let question = question.as_str();
                let outcome = match self.answer_one(index, question).await {
                    Ok(answer) => QuestionOutcome::Answered(answer),
                    Err(error) => {
                        tracing::warn!(question, error = %error, "Question failed");
                        QuestionOutcome::Failed(error.to_string())
                    }
                };
                (question.to_string(), outcome)
            })
            .buffered(self.service.settings.max_concurrency.max(1))
            .collect()
            .await;

        let answers: AnswerMap = outcomes.into_iter().collect();
        self.service.metrics.record_answers(
            answers.answered_count() as u64,
            answers.failed_count() as u64,
        );
        tracing::info!(
            questions = answers.len(),
            failed = answers.failed_count(),
            "Questions answered"
        );
        Ok(answers)
    }

    /// Release the session's index.
    pub async fn close(mut self) {
        if let Some(loaded) = self.loaded.take() {
            release_index(loaded.index.as_ref()).await;
        }
    }

    async fn answer_one(&self, index: &dyn VectorIndex, question: &str) -> Result<String, QaError> {
        let service = &self.service;
        let mut vectors = service
            .embedding_client
            .generate_embeddings(vec![question.to_string()])
            .await?;
        let vector = vectors.pop().ok_or(QaError::EmptyEmbedding)?;

        let hits = index.search(&vector, service.settings.top_k).await?;
        tracing::debug!(question, hits = hits.len(), "Retrieved context");
        let prompt = render_prompt(&build_context(&hits), question);

        let answer = service
            .chat_client
            .complete(ChatRequest::deterministic(prompt))
            .await?;
        if answer.trim().is_empty() {
            Ok(NO_ANSWER.to_string())
        } else {
            Ok(answer)
        }
    }
}

async fn release_index(index: &dyn VectorIndex) {
    if let Err(error) = index.release().await {
        tracing::warn!(error = %error, "Failed to release vector index");
    }
}
