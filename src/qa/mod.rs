//! Retrieval-augmented question answering over a single document.

pub mod chunking;
pub mod prompt;
mod service;
pub mod types;

pub use service::{QaApi, QaService, QaSession};
pub use types::{AnswerMap, LoadSummary, NO_ANSWER, QaError, QaSettings, QuestionOutcome};
