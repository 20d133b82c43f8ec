use super::{IndexedChunk, ScoredChunk, VectorIndex, VectorStore, VectorStoreError};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Opens process-local indexes scored by brute-force cosine similarity.
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemoryStore;

impl InMemoryStore {
    /// Construct the in-memory backend.
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn open_index(
        &self,
        dimension: usize,
    ) -> Result<Box<dyn VectorIndex>, VectorStoreError> {
        Ok(Box::new(InMemoryIndex::new(dimension)?))
    }
}

/// Chunk index held entirely in memory.
#[derive(Debug)]
pub struct InMemoryIndex {
    dimension: usize,
    entries: RwLock<Vec<Entry>>,
}

#[derive(Debug)]
struct Entry {
    text: String,
    vector: Vec<f32>,
    norm: f32,
}

impl InMemoryIndex {
    /// Create an empty index for vectors of `dimension` components.
    pub fn new(dimension: usize) -> Result<Self, VectorStoreError> {
        if dimension == 0 {
            return Err(VectorStoreError::InvalidDimension);
        }
        Ok(Self {
            dimension,
            entries: RwLock::new(Vec::new()),
        })
    }

    /// Number of stored chunks.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the index holds no chunks.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn check_dimension(&self, actual: usize) -> Result<(), VectorStoreError> {
        if actual == self.dimension {
            Ok(())
        } else {
            Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual,
            })
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn insert(&self, chunks: Vec<IndexedChunk>) -> Result<usize, VectorStoreError> {
        for chunk in &chunks {
            self.check_dimension(chunk.vector.len())?;
        }

        let count = chunks.len();
        let mut entries = self.entries.write().await;
        entries.extend(chunks.into_iter().map(|chunk| Entry {
            norm: norm(&chunk.vector),
            text: chunk.text,
            vector: chunk.vector,
        }));
        Ok(count)
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError> {
        self.check_dimension(vector.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = norm(vector);
        let entries = self.entries.read().await;
        let mut scored: Vec<ScoredChunk> = entries
            .iter()
            .map(|entry| ScoredChunk {
                text: entry.text.clone(),
                score: cosine(vector, query_norm, &entry.vector, entry.norm),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    async fn release(&self) -> Result<(), VectorStoreError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (a_norm * b_norm)
}
