//! Record types shared by the API client, CSV layer, and reconciliation core.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output column order of the consolidated CRM CSV.
pub const CONTACT_COLUMNS: [&str; 8] = [
    "id",
    "first",
    "last",
    "email",
    "phone",
    "last contact date",
    "last contact text",
    "all contact text",
];

/// Separator placed between entries of a contact's history.
pub const HISTORY_SEPARATOR: &str = "\n \n ";

/// One CRM CSV row keyed by its header.
pub type RawContact = HashMap<String, String>;

/// One form submission object as returned by the API.
pub type RawSubmission = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// A canonical CRM contact.
///
/// Serializes with the CRM's own column names so the CSV writer emits the
/// expected header directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub first: String,
    pub last: String,
    pub email: String,
    pub phone: String,
    #[serde(rename = "last contact date")]
    pub last_contact_date: String,
    #[serde(rename = "last contact text")]
    pub last_contact_text: String,
    #[serde(rename = "all contact text")]
    pub all_contact_text: String,
}

impl Contact {
    /// Identity key: the id if present, otherwise the lowercased email.
    pub fn identity_key(&self) -> String {
        if self.id.is_empty() {
            self.email.to_lowercase()
        } else {
            self.id.clone()
        }
    }

    /// Number of dated entries in `all_contact_text`.
    pub fn history_len(&self) -> usize {
        self.all_contact_text
            .split(HISTORY_SEPARATOR)
            .filter(|entry| !entry.trim().is_empty())
            .count()
    }

    /// Email used in log lines.
    pub fn display_email(&self) -> &str {
        if self.email.is_empty() {
            "unknown"
        } else {
            &self.email
        }
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// A normalized event-feedback form submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub first: String,
    pub last: String,
    pub email: String,
    pub phone: String,
    pub feedback: String,
    pub submission_date: String,
    pub event: String,
    pub rating: String,
}

// ---------------------------------------------------------------------------
// Payload shaping
// ---------------------------------------------------------------------------

/// Extract submission objects from a form-submissions response body.
///
/// Accepts `{"data": [...]}`, `{"submissions": [...]}`, a bare array, or a
/// single submission object. Anything else yields no submissions. Non-object
/// array elements are dropped.
pub fn submissions_from_payload(payload: Value) -> Vec<RawSubmission> {
    match payload {
        Value::Object(mut map) => {
            if map.is_empty() {
                return Vec::new();
            }
            if let Some(inner) = map.remove("data") {
                return objects_only(inner);
            }
            if let Some(inner) = map.remove("submissions") {
                return objects_only(inner);
            }
            vec![map]
        }
        Value::Array(_) => objects_only(payload),
        other => {
            tracing::debug!(kind = value_kind(&other), "unexpected submissions payload");
            Vec::new()
        }
    }
}

fn objects_only(value: Value) -> Vec<RawSubmission> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        Value::Object(map) if !map.is_empty() => vec![map],
        other => {
            tracing::debug!(kind = value_kind(&other), "unexpected submissions container");
            Vec::new()
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
