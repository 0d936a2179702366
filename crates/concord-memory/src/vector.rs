//! In-memory vector-similarity store for strategy-outcome embeddings.
//!
//! Lets the mutator's prompts be enriched with "you tried something like
//! this before and it scored X". Entries carry the outcome score alongside
//! the embedding; a soft cap keeps the store bounded by evicting zero-score
//! (no-signal) entries first, oldest first after that.

use tracing::debug;

/// One remembered strategy and how it worked out.
#[derive(Debug, Clone)]
pub struct StrategyRecord {
    pub agent_id: String,
    pub strategy_text: String,
    /// Mean shadow/epoch score the strategy earned.
    pub outcome_score: f64,
    pub embedding: Vec<f32>,
}

/// A scored retrieval hit.
#[derive(Debug, Clone)]
pub struct SimilarStrategy {
    pub record: StrategyRecord,
    pub similarity: f32,
}

/// Bounded similarity store.
pub struct VectorMemory {
    entries: Vec<StrategyRecord>,
    soft_cap: usize,
}

impl VectorMemory {
    pub fn new(soft_cap: usize) -> Self {
        Self {
            entries: Vec::new(),
            soft_cap,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a record, evicting to stay at the soft cap.
    ///
    /// Eviction order: zero-score entries (they carry no signal), then the
    /// oldest remaining entry.
    pub fn insert(&mut self, record: StrategyRecord) {
        if self.entries.len() >= self.soft_cap {
            if let Some(idx) = self.entries.iter().position(|e| e.outcome_score == 0.0) {
                debug!(evicted = %self.entries[idx].agent_id, "evicted zero-score entry");
                self.entries.remove(idx);
            } else {
                debug!(evicted = %self.entries[0].agent_id, "evicted oldest entry");
                self.entries.remove(0);
            }
        }
        self.entries.push(record);
    }

    /// The `k` most cosine-similar records to `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SimilarStrategy> {
        let mut hits: Vec<SimilarStrategy> = self
            .entries
            .iter()
            .map(|record| SimilarStrategy {
                similarity: cosine_similarity(query, &record.embedding),
                record: record.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(k);
        hits
    }
}

/// Cosine similarity; zero for mismatched or zero-norm inputs.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
