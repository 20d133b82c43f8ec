use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing question answering activity.
#[derive(Default)]
pub struct QaMetrics {
    documents_loaded: AtomicU64,
    chunks_indexed: AtomicU64,
    questions_answered: AtomicU64,
    questions_failed: AtomicU64,
}

impl QaMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a loaded document and the number of chunks indexed for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_loaded.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record the outcome counts of one answered batch.
    pub fn record_answers(&self, answered: u64, failed: u64) {
        self.questions_answered
            .fetch_add(answered, Ordering::Relaxed);
        self.questions_failed.fetch_add(failed, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_loaded: self.documents_loaded.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            questions_failed: self.questions_failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of QA counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents loaded since startup.
    pub documents_loaded: u64,
    /// Total chunk count indexed across all loaded documents.
    pub chunks_indexed: u64,
    /// Questions that produced an answer.
    pub questions_answered: u64,
    /// Questions whose retrieval or generation failed.
    pub questions_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = QaMetrics::new();
        metrics.record_document(2);
        metrics.record_document(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_loaded, 2);
        assert_eq!(snapshot.chunks_indexed, 5);
    }

    #[test]
    fn records_answer_outcomes() {
        let metrics = QaMetrics::new();
        metrics.record_answers(3, 1);
        metrics.record_answers(1, 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.questions_answered, 4);
        assert_eq!(snapshot.questions_failed, 1);
    }

    #[test]
    fn snapshot_starts_empty() {
        assert_eq!(QaMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}
