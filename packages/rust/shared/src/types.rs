//! Core domain types for SiteBot conversations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Company name used by enrichment stubs when nothing better is known.
pub const UNKNOWN_COMPANY: &str = "Unknown";

// ---------------------------------------------------------------------------
// ConversationId
// ---------------------------------------------------------------------------

/// External chat identifier (a Telegram chat id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ConversationId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

impl From<i64> for ConversationId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// CompanyInfo
// ---------------------------------------------------------------------------

/// Structured company facts attached to a stored website.
///
/// Always exactly four fields. Answers from external services are loosely
/// typed, so use [`CompanyInfo::from_value`] to normalize them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub company_name: String,
    pub description: String,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub contact: serde_json::Map<String, serde_json::Value>,
}

impl CompanyInfo {
    /// A degraded record with an unknown company and the given description.
    pub fn stub(description: impl Into<String>) -> Self {
        Self {
            company_name: UNKNOWN_COMPANY.to_string(),
            description: description.into(),
            services: Vec::new(),
            contact: serde_json::Map::new(),
        }
    }

    /// Normalize an arbitrary JSON value into the four-field record.
    ///
    /// A string `services` becomes a one-item list, non-string list items are
    /// rendered as JSON, a non-object `contact` becomes an empty map and
    /// missing or empty names fall back to [`UNKNOWN_COMPANY`].
    pub fn from_value(value: &serde_json::Value) -> Self {
        let text = |key: &str| match value.get(key) {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        let company_name = match text("company_name") {
            name if name.is_empty() => UNKNOWN_COMPANY.to_string(),
            name => name,
        };

        let services = match value.get("services") {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                })
                .filter(|s| !s.is_empty())
                .collect(),
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                vec![s.trim().to_string()]
            }
            _ => Vec::new(),
        };

        let contact = match value.get("contact") {
            Some(serde_json::Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };

        Self {
            company_name,
            description: text("description"),
            services,
            contact,
        }
    }

    /// The company name, or `None` when it is the unknown placeholder.
    pub fn known_name(&self) -> Option<&str> {
        let name = self.company_name.trim();
        if name.is_empty() || name == UNKNOWN_COMPANY {
            None
        } else {
            Some(name)
        }
    }
}

// ---------------------------------------------------------------------------
// ConversationContext
// ---------------------------------------------------------------------------

/// The persisted website context of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Row identifier (UUID v7).
    pub id: String,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Absolute website URL with scheme.
    pub website: String,
    /// Cleaned page text with the company record appended as a marker segment.
    pub enriched_text: String,
    /// Last refresh time.
    pub created_at: DateTime<Utc>,
}
