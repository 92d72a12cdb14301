//! Per-kind payload schemas.
//!
//! Payloads only carry structured values: [`Label`]s, enums, booleans, and
//! numbers. The shape of the payload is determined by the event kind.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::event::EventType;
use crate::label::Label;

/// One retrieved chunk that contributed to an answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagSource {
    doc_id: Label,
    chunk_id: Label,
    score: f64,
}

impl RagSource {
    /// Creates a source entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPayload`] when the score is NaN or infinite.
    pub fn new(doc_id: Label, chunk_id: Label, score: f64) -> Result<Self> {
        if !score.is_finite() {
            return Err(Error::invalid_payload("score", "score must be finite"));
        }
        Ok(Self {
            doc_id,
            chunk_id,
            score,
        })
    }

    /// Returns the document identifier.
    #[must_use]
    pub fn doc_id(&self) -> &Label {
        &self.doc_id
    }

    /// Returns the chunk identifier.
    #[must_use]
    pub fn chunk_id(&self) -> &Label {
        &self.chunk_id
    }

    /// Returns the retrieval score.
    #[must_use]
    pub const fn score(&self) -> f64 {
        self.score
    }
}

/// Retrieval statistics for a single chat turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagInfo {
    retriever: Label,
    top_k: u32,
    #[serde(default)]
    sources: Vec<RagSource>,
}

impl RagInfo {
    /// Creates retrieval statistics; `sources` keeps the ranking order.
    #[must_use]
    pub fn new(retriever: Label, top_k: u32, sources: Vec<RagSource>) -> Self {
        Self {
            retriever,
            top_k,
            sources,
        }
    }

    /// Returns the retriever identifier.
    #[must_use]
    pub fn retriever(&self) -> &Label {
        &self.retriever
    }

    /// Returns the requested number of results.
    #[must_use]
    pub const fn top_k(&self) -> u32 {
        self.top_k
    }

    /// Returns the ranked sources.
    #[must_use]
    pub fn sources(&self) -> &[RagSource] {
        &self.sources
    }
}

/// Payload for [`EventType::ChatTurn`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurnPayload {
    /// Primary classified intent.
    pub intent_main: Label,
    /// Route chosen by the router.
    pub route_type: Label,
    /// Business domain of the answer.
    pub domain: Label,
    /// Whether retrieval contributed to the answer.
    pub rag_used: bool,
    /// End-to-end latency in milliseconds.
    pub latency_ms_total: u64,
    /// Whether PII was detected in the user input.
    pub pii_detected_input: bool,
    /// Whether PII was detected in the generated output.
    pub pii_detected_output: bool,
    /// Error classification when the turn failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<Label>,
    /// Retrieval statistics when retrieval ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_info: Option<RagInfo>,
}

/// Payload for [`EventType::Security`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPayload {
    /// Kind of block applied (e.g. `pii`, `prompt_injection`).
    pub block_type: Label,
    /// Whether the request was blocked.
    pub blocked: bool,
    /// Rule that triggered the block.
    pub rule_id: Label,
}

/// Closed set of user feedback values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackValue {
    /// Positive feedback.
    Like,
    /// Negative feedback.
    Dislike,
    /// Feedback withdrawn or explicitly neutral.
    Neutral,
}

impl FeedbackValue {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Dislike => "dislike",
            Self::Neutral => "neutral",
        }
    }
}

impl Display for FeedbackValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "like" => Ok(Self::Like),
            "dislike" => Ok(Self::Dislike),
            "neutral" => Ok(Self::Neutral),
            other => Err(Error::UnknownFeedback(other.to_owned())),
        }
    }
}

/// Payload for [`EventType::Feedback`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackPayload {
    /// Feedback given by the user.
    pub feedback: FeedbackValue,
    /// Conversation the feedback refers to.
    pub target_conversation_id: String,
    /// Turn the feedback refers to.
    pub target_turn_id: i64,
}

/// Payload variant whose shape is selected by the event kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    /// Chat turn summary.
    ChatTurn(ChatTurnPayload),
    /// Security block.
    Security(SecurityPayload),
    /// User feedback.
    Feedback(FeedbackPayload),
}

impl EventPayload {
    /// Returns the event kind matching this payload.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::ChatTurn(_) => EventType::ChatTurn,
            Self::Security(_) => EventType::Security,
            Self::Feedback(_) => EventType::Feedback,
        }
    }
}

impl From<ChatTurnPayload> for EventPayload {
    fn from(value: ChatTurnPayload) -> Self {
        Self::ChatTurn(value)
    }
}

impl From<SecurityPayload> for EventPayload {
    fn from(value: SecurityPayload) -> Self {
        Self::Security(value)
    }
}

impl From<FeedbackPayload> for EventPayload {
    fn from(value: FeedbackPayload) -> Self {
        Self::Feedback(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn label(value: &str) -> Label {
        Label::new(value).unwrap()
    }

    #[test]
    fn rejects_non_finite_scores() {
        let err = RagSource::new(label("doc-1"), label("c-1"), f64::NAN).unwrap_err();
        assert!(matches!(err, Error::InvalidPayload { field: "score", .. }));
        assert!(RagSource::new(label("doc-1"), label("c-1"), f64::INFINITY).is_err());
    }

    #[test]
    fn chat_turn_omits_absent_optionals() {
        let payload = ChatTurnPayload {
            intent_main: label("policy_qa"),
            route_type: label("rag"),
            domain: label("hr"),
            rag_used: false,
            latency_ms_total: 420,
            pii_detected_input: false,
            pii_detected_output: false,
            error_code: None,
            rag_info: None,
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            json!({
                "intentMain": "policy_qa",
                "routeType": "rag",
                "domain": "hr",
                "ragUsed": false,
                "latencyMsTotal": 420,
                "piiDetectedInput": false,
                "piiDetectedOutput": false,
            })
        );
    }

    #[test]
    fn rag_info_serializes_sources_in_order() {
        let info = RagInfo::new(
            label("hybrid"),
            2,
            vec![
                RagSource::new(label("doc-a"), label("a-1"), 0.9).unwrap(),
                RagSource::new(label("doc-b"), label("b-7"), 0.4).unwrap(),
            ],
        );
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["retriever"], "hybrid");
        assert_eq!(value["topK"], 2);
        assert_eq!(value["sources"][0]["docId"], "doc-a");
        assert_eq!(value["sources"][1]["chunkId"], "b-7");
    }

    #[test]
    fn feedback_parses_case_insensitively() {
        assert_eq!("LIKE".parse::<FeedbackValue>().unwrap(), FeedbackValue::Like);
        assert_eq!(
            " dislike ".parse::<FeedbackValue>().unwrap(),
            FeedbackValue::Dislike
        );
        assert!(matches!(
            "love".parse::<FeedbackValue>(),
            Err(Error::UnknownFeedback(_))
        ));
    }

    #[test]
    fn payload_reports_matching_kind() {
        let payload: EventPayload = SecurityPayload {
            block_type: label("pii"),
            blocked: true,
            rule_id: label("r-1"),
        }
        .into();
        assert_eq!(payload.event_type(), EventType::Security);
    }
}
