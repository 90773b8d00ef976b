use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable dedup key of a story, derived from its candidate reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Strip `prefix` from `reference`. A reference without the prefix is
    /// used verbatim, so identifiers stay stable even if a listing switches
    /// between absolute and already-bare references.
    pub fn from_reference(reference: &str, prefix: &str) -> Self {
        Self(reference.strip_prefix(prefix).unwrap_or(reference).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A lightweight reference to a possibly-new story, obtained before its
/// full content is fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Absolute story URL.
    pub reference: String,
    /// Listing data the source already holds for this story, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Candidate {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            payload: None,
        }
    }

    pub fn with_payload(reference: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            reference: reference.into(),
            payload: Some(payload),
        }
    }
}

/// A fully parsed story, ready to be announced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: ItemId,
    pub title: String,
    pub author: Option<String>,
    pub company: Option<String>,
    pub tag: Option<String>,
    pub link: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_reference_strips_prefix() {
        let id = ItemId::from_reference("https://deshimula.com/story/abc-123", "https://deshimula.com/story/");
        assert_eq!(id.as_str(), "abc-123");
    }

    #[test]
    fn from_reference_without_prefix_is_verbatim() {
        let id = ItemId::from_reference("abc-123", "https://deshimula.com/story/");
        assert_eq!(id, ItemId::from("abc-123"));
    }

    #[test]
    fn item_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&ItemId::new("42")).unwrap();
        assert_eq!(json, "\"42\"");
    }

    #[test]
    fn candidate_payload_is_optional_in_json() {
        let c: Candidate = serde_json::from_str(r#"{"reference":"https://oakthu.com/story/7"}"#).unwrap();
        assert_eq!(c, Candidate::new("https://oakthu.com/story/7"));
    }
}
