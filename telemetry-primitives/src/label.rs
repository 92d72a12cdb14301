//! Structured label values carried in event payloads.
//!
//! Payloads must never carry free-text user content. Every string field is a
//! [`Label`]: a short identifier-like token drawn from a restricted alphabet,
//! so prose (which needs whitespace) cannot be smuggled into an event.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MAX_LABEL_LEN: usize = 128;
const PREVIEW_LEN: usize = 32;

/// Validated structured label (intent names, route types, rule ids, ...).
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Label(String);

impl Label {
    /// Creates a new label after validating its format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLabel`] if the value is empty, too long, or
    /// contains characters outside ASCII alphanumerics and `- _ . : /`.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        validate_label(&value)?;
        Ok(Self(value))
    }

    /// Returns the label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Label {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Label {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Label {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Label> for String {
    fn from(value: Label) -> Self {
        value.0
    }
}

fn validate_label(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidLabel {
            value: String::new(),
            reason: "label cannot be empty".into(),
        });
    }

    if value.len() > MAX_LABEL_LEN {
        return Err(Error::InvalidLabel {
            value: preview(value),
            reason: format!("label length must be <= {MAX_LABEL_LEN}"),
        });
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '/'))
    {
        return Err(Error::InvalidLabel {
            value: preview(value),
            reason: "label must contain ASCII alphanumeric, dash, underscore, dot, colon, or slash"
                .into(),
        });
    }

    Ok(())
}

fn preview(value: &str) -> String {
    value.chars().take(PREVIEW_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_identifier_like_values() {
        for value in ["policy_qa", "RAG", "hr.leave", "rule:pii-01", "kb/v2"] {
            assert_eq!(Label::new(value).unwrap().as_str(), value);
        }
    }

    #[test]
    fn rejects_free_text() {
        let err = Label::new("what is my salary?").expect_err("prose");
        assert!(matches!(err, Error::InvalidLabel { .. }));
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert!(Label::new("").is_err());
        assert!(Label::new("a".repeat(MAX_LABEL_LEN + 1)).is_err());
        assert!(Label::new("a".repeat(MAX_LABEL_LEN)).is_ok());
    }

    #[test]
    fn error_preview_is_truncated() {
        let long = format!("{} tail", "x".repeat(100));
        let Error::InvalidLabel { value, .. } = Label::new(long).unwrap_err() else {
            panic!("expected label error");
        };
        assert_eq!(value.len(), PREVIEW_LEN);
    }

    #[test]
    fn deserialization_validates() {
        let ok: Label = serde_json::from_str("\"chat\"").unwrap();
        assert_eq!(ok.as_str(), "chat");
        assert!(serde_json::from_str::<Label>("\"two words\"").is_err());
    }
}
