//! Applying a submission to a contact.

use chrono::{Local, NaiveDate};
use tracing::debug;

use crmsync_shared::{Contact, HISTORY_SEPARATOR, Submission};

/// Prefix shared by every feedback-derived contact text.
pub const FEEDBACK_PREFIX: &str = "Event feedback";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Merge `submission` into a copy of `contact`, dating undated feedback today.
pub fn apply_feedback(contact: &Contact, submission: &Submission) -> Contact {
    apply_feedback_on(contact, submission, Local::now().date_naive())
}

/// Merge `submission` into a copy of `contact`, dating undated feedback `today`.
///
/// Empty phone/first/last are filled from the submission. Feedback becomes the
/// last contact text and is appended to the history; existing history is kept.
pub fn apply_feedback_on(contact: &Contact, submission: &Submission, today: NaiveDate) -> Contact {
    let mut updated = contact.clone();

    fill_missing(&mut updated.phone, &submission.phone, "phone");
    fill_missing(&mut updated.first, &submission.first, "first name");
    fill_missing(&mut updated.last, &submission.last, "last name");

    if submission.feedback.is_empty() {
        return updated;
    }

    let text = feedback_text(submission);
    let date = contact_date(submission, today);
    let entry = history_entry(&date, &text);

    let existing = updated.all_contact_text.trim();
    updated.all_contact_text = if existing.is_empty() {
        entry
    } else {
        format!("{existing}{HISTORY_SEPARATOR}{entry}")
    };
    updated.last_contact_text = text;
    updated.last_contact_date = date;

    let preview: String = submission.feedback.chars().take(50).collect();
    debug!(email = updated.display_email(), feedback = %preview, "added feedback");

    updated
}

/// `Event feedback[ about {event}]: {feedback}[ (Rating: {rating})]`
pub fn feedback_text(submission: &Submission) -> String {
    let mut text = String::from(FEEDBACK_PREFIX);
    if !submission.event.is_empty() {
        text.push_str(" about ");
        text.push_str(&submission.event);
    }
    text.push_str(": ");
    text.push_str(&submission.feedback);
    if !submission.rating.is_empty() {
        text.push_str(&format!(" (Rating: {})", submission.rating));
    }
    text
}

/// One dated history line.
pub fn history_entry(date: &str, text: &str) -> String {
    format!("{date} - {text}")
}

/// The submission's own date, or `today` when it has none.
pub(crate) fn contact_date(submission: &Submission, today: NaiveDate) -> String {
    if submission.submission_date.is_empty() {
        today.format(DATE_FORMAT).to_string()
    } else {
        submission.submission_date.clone()
    }
}

fn fill_missing(target: &mut String, source: &str, label: &str) {
    if target.is_empty() && !source.is_empty() {
        *target = source.to_string();
        debug!(field = label, value = source, "filled missing field");
    }
}
