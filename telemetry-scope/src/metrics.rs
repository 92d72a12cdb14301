//! Per-request metrics accumulator.
//!
//! Business logic writes latency and retrieval figures as it goes; the chat
//! turn guard reads them once at emission time. Values are kept raw here and
//! only validated when an event is built.

use std::collections::BTreeMap;

use crate::scope::RequestScope;

/// Stage latencies in milliseconds plus an optional explicit total.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LatencyBreakdown {
    stages: BTreeMap<String, u64>,
    total_ms: Option<u64>,
}

impl LatencyBreakdown {
    /// Returns the latency recorded for `stage`.
    #[must_use]
    pub fn stage(&self, stage: &str) -> Option<u64> {
        self.stages.get(stage).copied()
    }

    /// Returns every recorded stage.
    #[must_use]
    pub fn stages(&self) -> &BTreeMap<String, u64> {
        &self.stages
    }

    /// Returns the explicit total if one was set, otherwise the stage sum.
    #[must_use]
    pub fn total_ms(&self) -> u64 {
        self.total_ms
            .unwrap_or_else(|| self.stages.values().fold(0, |acc, v| acc.saturating_add(*v)))
    }

    /// Returns `true` when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty() && self.total_ms.is_none()
    }
}

/// A scored retrieval hit as reported by the retriever.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredChunk {
    /// Source document identifier.
    pub doc_id: String,
    /// Chunk identifier within the document.
    pub chunk_id: String,
    /// Similarity or rerank score.
    pub score: f64,
}

impl ScoredChunk {
    /// Creates a scored chunk.
    #[must_use]
    pub fn new(doc_id: impl Into<String>, chunk_id: impl Into<String>, score: f64) -> Self {
        Self {
            doc_id: doc_id.into(),
            chunk_id: chunk_id.into(),
            score,
        }
    }
}

/// Retrieval statistics for the current request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RetrievalStats {
    /// Retriever identifier; empty when retrieval did not run.
    pub retriever: String,
    /// Number of results requested.
    pub top_k: u32,
    /// Hits in ranking order.
    pub sources: Vec<ScoredChunk>,
}

impl RetrievalStats {
    /// Returns `true` when no retrieval was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.retriever.is_empty() && self.top_k == 0 && self.sources.is_empty()
    }
}

/// Mutable scratch state owned by one request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricsAccumulator {
    /// Latency breakdown.
    pub latency: LatencyBreakdown,
    /// Retrieval statistics.
    pub rag_info: RetrievalStats,
}

impl MetricsAccumulator {
    /// Returns `true` when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.latency.is_empty() && self.rag_info.is_empty()
    }
}

/// Records (overwrites) the latency of one stage.
pub fn set_latency(stage: impl Into<String>, ms: u64) {
    let stage = stage.into();
    let _ = RequestScope::with_current(|state| {
        state.metrics.latency.stages.insert(stage, ms);
    });
}

/// Records (overwrites) the end-to-end latency.
pub fn set_total_latency(ms: u64) {
    let _ = RequestScope::with_current(|state| state.metrics.latency.total_ms = Some(ms));
}

/// Returns the latency breakdown recorded so far.
#[must_use]
pub fn get_latency() -> LatencyBreakdown {
    RequestScope::with_current(|state| state.metrics.latency.clone()).unwrap_or_default()
}

/// Records (overwrites) the retrieval statistics.
pub fn set_rag_info(retriever: impl Into<String>, top_k: u32, sources: Vec<ScoredChunk>) {
    let stats = RetrievalStats {
        retriever: retriever.into(),
        top_k,
        sources,
    };
    let _ = RequestScope::with_current(|state| state.metrics.rag_info = stats);
}

/// Returns the retrieval statistics recorded so far.
#[must_use]
pub fn get_rag_info() -> RetrievalStats {
    RequestScope::with_current(|state| state.metrics.rag_info.clone()).unwrap_or_default()
}

/// Returns a copy of the whole accumulator.
#[must_use]
pub fn snapshot_metrics() -> MetricsAccumulator {
    RequestScope::with_current(|state| state.metrics.clone()).unwrap_or_default()
}

/// Clears every metric for the current request.
pub fn reset_all_metrics() {
    let _ = RequestScope::with_current(|state| state.metrics = MetricsAccumulator::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_outside_scope() {
        set_latency("retrieval", 12);
        assert!(get_latency().is_empty());
        assert!(get_rag_info().is_empty());
        assert_eq!(get_latency().total_ms(), 0);
    }

    #[test]
    fn latency_overwrites_and_sums() {
        RequestScope::new().run_sync(|| {
            set_latency("intent", 30);
            set_latency("retrieval", 80);
            set_latency("retrieval", 90);
            let latency = get_latency();
            assert_eq!(latency.stage("retrieval"), Some(90));
            assert_eq!(latency.total_ms(), 120);

            set_total_latency(150);
            assert_eq!(get_latency().total_ms(), 150);
        });
    }

    #[test]
    fn rag_info_overwrites() {
        RequestScope::new().run_sync(|| {
            set_rag_info("bm25", 3, vec![ScoredChunk::new("d1", "c1", 0.3)]);
            set_rag_info(
                "hybrid",
                5,
                vec![
                    ScoredChunk::new("d2", "c4", 0.8),
                    ScoredChunk::new("d3", "c1", 0.5),
                ],
            );
            let info = get_rag_info();
            assert_eq!(info.retriever, "hybrid");
            assert_eq!(info.top_k, 5);
            assert_eq!(info.sources[0].doc_id, "d2");
            assert_eq!(info.sources.len(), 2);
        });
    }

    #[test]
    fn reset_clears_everything() {
        RequestScope::new().run_sync(|| {
            set_latency("generation", 400);
            set_rag_info("dense", 4, Vec::new());
            assert!(!snapshot_metrics().is_empty());
            reset_all_metrics();
            assert!(snapshot_metrics().is_empty());
        });
    }
}
