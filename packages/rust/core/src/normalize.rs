//! Mapping of raw source records onto the canonical [`Contact`] / [`Submission`] schema.
//!
//! Nothing here fails: absent or unusable source data becomes an empty string.

use serde_json::Value;

use crmsync_shared::{Contact, RawContact, RawSubmission, Submission};

// ---------------------------------------------------------------------------
// Contacts
// ---------------------------------------------------------------------------

/// Rename CRM export columns to canonical fields, trimming every value.
pub fn normalize_contact(raw: &RawContact) -> Contact {
    let field = |column: &str| {
        raw.get(column)
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    };

    Contact {
        id: field("id"),
        first: field("first"),
        last: field("last"),
        email: field("email"),
        phone: field("phone"),
        last_contact_date: field("last contact date"),
        last_contact_text: field("last contact text"),
        all_contact_text: field("all contact text"),
    }
}

// ---------------------------------------------------------------------------
// Submissions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum SubmissionField {
    Id,
    First,
    Last,
    Email,
    Phone,
    Feedback,
    SubmissionDate,
    Event,
    Rating,
}

/// Source keys accepted for each canonical field, in priority order.
const SUBMISSION_ALIASES: [(SubmissionField, &[&str]); 9] = [
    (SubmissionField::Id, &["id", "contact_id", "user_id", "submission_id"]),
    (SubmissionField::First, &["first", "first_name", "firstName", "fname"]),
    (SubmissionField::Last, &["last", "last_name", "lastName", "lname"]),
    (SubmissionField::Email, &["email", "email_address", "user_email"]),
    (SubmissionField::Phone, &["phone", "phone_number", "mobile", "telephone"]),
    (
        SubmissionField::Feedback,
        &["feedback", "comments", "message", "review", "notes"],
    ),
    (
        SubmissionField::SubmissionDate,
        &["submission_date", "created_at", "timestamp", "date", "submitted_at"],
    ),
    (SubmissionField::Event, &["event", "event_name", "event_title"]),
    (SubmissionField::Rating, &["rating", "score", "satisfaction"]),
];

fn slot(submission: &mut Submission, field: SubmissionField) -> &mut String {
    match field {
        SubmissionField::Id => &mut submission.id,
        SubmissionField::First => &mut submission.first,
        SubmissionField::Last => &mut submission.last,
        SubmissionField::Email => &mut submission.email,
        SubmissionField::Phone => &mut submission.phone,
        SubmissionField::Feedback => &mut submission.feedback,
        SubmissionField::SubmissionDate => &mut submission.submission_date,
        SubmissionField::Event => &mut submission.event,
        SubmissionField::Rating => &mut submission.rating,
    }
}

/// Resolve every canonical field from the first alias holding a usable value.
pub fn normalize_submission(raw: &RawSubmission) -> Submission {
    let mut submission = Submission::default();

    for (field, aliases) in SUBMISSION_ALIASES {
        let value = aliases
            .iter()
            .find_map(|alias| raw.get(*alias).and_then(render_value));
        if let Some(value) = value {
            *slot(&mut submission, field) = value.trim().to_string();
        }
    }

    submission
}

/// Render a JSON value as a field string, or `None` for empty-ish values
/// (null, `""`, `false`, zero, `[]`, `{}`) so the next alias is tried.
fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some("True".to_string()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) if map.is_empty() => None,
        other => Some(other.to_string()),
    }
}
