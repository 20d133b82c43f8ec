//! Result types and errors for the question answering pipeline.

use crate::{
    completion::ChatClientError, config::Config, config::LengthUnit,
    embedding::EmbeddingClientError, qa::chunking::ChunkingError, store::VectorStoreError,
};
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

/// Answer text used when the model returns nothing.
pub const NO_ANSWER: &str = "Unable to generate answer";

/// Errors emitted by the question answering pipeline.
#[derive(Debug, Error)]
pub enum QaError {
    /// Questions were requested before any document was loaded.
    #[error("Document must be loaded before answering questions")]
    NotLoaded,
    /// Document text was empty or produced no chunks.
    #[error("Document file is empty or could not be processed")]
    EmptyDocument,
    /// Caller supplied no questions.
    #[error("No questions provided")]
    NoQuestions,
    /// Splitter could not be configured.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors.
    #[error("Embedding request failed: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Embedding provider returned no vector for a question.
    #[error("Embedding provider returned no vectors for the query")]
    EmptyEmbedding,
    /// Chat provider failed to answer.
    #[error("Answer generation failed: {0}")]
    Chat(#[from] ChatClientError),
    /// Vector store rejected an operation.
    #[error("Vector store request failed: {0}")]
    Store(#[from] VectorStoreError),
}

impl QaError {
    /// Whether the error stems from caller input rather than a provider or backend.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::EmptyDocument | Self::NoQuestions)
    }
}

/// Outcome of answering a single question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionOutcome {
    /// The model produced an answer.
    Answered(String),
    /// Retrieval or generation failed with this message.
    Failed(String),
}

impl QuestionOutcome {
    /// Whether an answer was produced.
    pub fn is_answered(&self) -> bool {
        matches!(self, Self::Answered(_))
    }

    /// Text reported in the `results` map: the answer, or the failure prefixed for readers.
    pub fn display_text(&self) -> String {
        match self {
            Self::Answered(answer) => answer.clone(),
            Self::Failed(message) => format!("Error processing question: {message}"),
        }
    }
}

/// Answers keyed by question text, in the order questions were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerMap {
    entries: Vec<(String, QuestionOutcome)>,
}

impl AnswerMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an outcome; a question already present keeps its first outcome.
    pub fn insert(&mut self, question: String, outcome: QuestionOutcome) -> bool {
        if self.get(&question).is_some() {
            return false;
        }
        self.entries.push((question, outcome));
        true
    }

    /// Look up the outcome for a question.
    pub fn get(&self, question: &str) -> Option<&QuestionOutcome> {
        self.entries
            .iter()
            .find(|(key, _)| key == question)
            .map(|(_, outcome)| outcome)
    }

    /// Number of distinct questions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no question has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over questions and outcomes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &QuestionOutcome)> {
        self.entries
            .iter()
            .map(|(question, outcome)| (question.as_str(), outcome))
    }

    /// Number of questions that received an answer.
    pub fn answered_count(&self) -> usize {
        self.iter().filter(|(_, outcome)| outcome.is_answered()).count()
    }

    /// Number of questions that failed.
    pub fn failed_count(&self) -> usize {
        self.len() - self.answered_count()
    }

    /// Serializable view of the failed questions and their messages.
    pub fn failures(&self) -> Failures<'_> {
        Failures(self)
    }
}

impl FromIterator<(String, QuestionOutcome)> for AnswerMap {
    fn from_iter<I: IntoIterator<Item = (String, QuestionOutcome)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (question, outcome) in iter {
            map.insert(question, outcome);
        }
        map
    }
}

impl Serialize for AnswerMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (question, outcome) in self.iter() {
            map.serialize_entry(question, &outcome.display_text())?;
        }
        map.end()
    }
}

/// Failed questions of an [`AnswerMap`], serialized as `{question: message}`.
#[derive(Debug, Clone, Copy)]
pub struct Failures<'a>(&'a AnswerMap);

impl Failures<'_> {
    /// Whether every question was answered.
    pub fn is_empty(&self) -> bool {
        self.0.failed_count() == 0
    }
}

impl Serialize for Failures<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.failed_count()))?;
        for (question, outcome) in self.0.iter() {
            if let QuestionOutcome::Failed(message) = outcome {
                map.serialize_entry(question, message)?;
            }
        }
        map.end()
    }
}

/// Tunables for splitting, retrieval, and fan-out.
#[derive(Debug, Clone)]
pub struct QaSettings {
    /// Maximum chunk length.
    pub chunk_size: usize,
    /// Length shared by adjacent chunks.
    pub chunk_overlap: usize,
    /// Unit for chunk size and overlap.
    pub length_unit: LengthUnit,
    /// Model whose tokenizer measures chunks when the unit is tokens.
    pub tokenizer_model: String,
    /// Chunks retrieved per question.
    pub top_k: usize,
    /// Questions answered concurrently within one session.
    pub max_concurrency: usize,
}

impl Default for QaSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            length_unit: LengthUnit::Chars,
            tokenizer_model: String::new(),
            top_k: 3,
            max_concurrency: 4,
        }
    }
}

impl QaSettings {
    /// Derive settings from the runtime configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.text_splitter_chunk_size,
            chunk_overlap: config.text_splitter_chunk_overlap,
            length_unit: config.text_splitter_length_unit,
            tokenizer_model: config.embedding_model.clone(),
            top_k: config.retriever_top_k,
            max_concurrency: config.qa_max_concurrency,
        }
    }
}

/// Summary of a completed document load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    /// Chunks stored in the session index.
    pub chunk_count: usize,
    /// Duplicate chunks dropped before embedding.
    pub skipped_duplicates: usize,
    /// Embedding dimension of the index.
    pub dimension: usize,
}
