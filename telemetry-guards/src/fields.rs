//! Caller-supplied chat turn fields and their conversion into a payload.
//!
//! Classification fields must be enumerated labels; free text fails the
//! whole event. Retrieval details are best effort: a source whose ids are not
//! labels is skipped, and an unlabelled retriever drops `ragInfo` entirely.

use telemetry_primitives::{ChatTurnPayload, Label, RagInfo, RagSource};
use telemetry_scope::{MetricsAccumulator, RetrievalStats, ScoredChunk};
use tracing::warn;

use crate::error::GuardResult;

/// Caller-supplied fields of a chat turn event.
///
/// Latency and retrieval statistics are not part of this type; they are read
/// from the request's metrics accumulator when the event is built.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatTurnFields {
    /// Primary classified intent.
    pub intent_main: String,
    /// Route chosen by the router.
    pub route_type: String,
    /// Business domain of the answer.
    pub domain: String,
    /// Whether retrieval contributed to the answer.
    pub rag_used: bool,
    /// Whether PII was detected in the user input.
    pub pii_detected_input: bool,
    /// Whether PII was detected in the generated output.
    pub pii_detected_output: bool,
    /// Error classification when the turn failed.
    pub error_code: Option<String>,
}

impl ChatTurnFields {
    /// Creates fields for a turn with the given classification.
    #[must_use]
    pub fn new(
        intent_main: impl Into<String>,
        route_type: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            intent_main: intent_main.into(),
            route_type: route_type.into(),
            domain: domain.into(),
            ..Self::default()
        }
    }

    /// Marks whether retrieval contributed to the answer.
    #[must_use]
    pub fn with_rag_used(mut self, rag_used: bool) -> Self {
        self.rag_used = rag_used;
        self
    }

    /// Records PII detection on input and output.
    #[must_use]
    pub fn with_pii_detected(mut self, input: bool, output: bool) -> Self {
        self.pii_detected_input = input;
        self.pii_detected_output = output;
        self
    }

    /// Attaches an error classification.
    #[must_use]
    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    pub(crate) fn into_payload(self, metrics: &MetricsAccumulator) -> GuardResult<ChatTurnPayload> {
        let rag_info = if metrics.rag_info.is_empty() {
            None
        } else {
            rag_info(&metrics.rag_info)
        };

        Ok(ChatTurnPayload {
            intent_main: Label::new(self.intent_main)?,
            route_type: Label::new(self.route_type)?,
            domain: Label::new(self.domain)?,
            rag_used: self.rag_used,
            latency_ms_total: metrics.latency.total_ms(),
            pii_detected_input: self.pii_detected_input,
            pii_detected_output: self.pii_detected_output,
            error_code: self.error_code.map(Label::new).transpose()?,
            rag_info,
        })
    }
}

fn rag_info(stats: &RetrievalStats) -> Option<RagInfo> {
    let retriever = match Label::new(stats.retriever.as_str()) {
        Ok(retriever) => retriever,
        Err(err) => {
            warn!(%err, "dropping retrieval info");
            return None;
        }
    };
    let sources = stats.sources.iter().filter_map(rag_source).collect();
    Some(RagInfo::new(retriever, stats.top_k, sources))
}

fn rag_source(chunk: &ScoredChunk) -> Option<RagSource> {
    let source = Label::new(chunk.doc_id.as_str()).and_then(|doc_id| {
        RagSource::new(doc_id, Label::new(chunk.chunk_id.as_str())?, chunk.score)
    });
    match source {
        Ok(source) => Some(source),
        Err(err) => {
            warn!(%err, "skipping retrieval source");
            None
        }
    }
}
