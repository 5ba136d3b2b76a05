//! Decides whether a submission carries anything a contact is missing or behind on.
//!
//! Ambiguity resolves toward updating: a date that cannot be parsed counts as newer.

use chrono::NaiveDate;
use tracing::debug;

use crmsync_shared::{Contact, Submission};

/// Why a contact needs updating from a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateReason {
    MissingPhone,
    MissingFirstName,
    MissingLastName,
    NoLastContactDate,
    NewerFeedback,
    UnparsableDate,
}

impl std::fmt::Display for UpdateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::MissingPhone => "missing phone",
            Self::MissingFirstName => "missing first name",
            Self::MissingLastName => "missing last name",
            Self::NoLastContactDate => "no last contact date",
            Self::NewerFeedback => "newer feedback available",
            Self::UnparsableDate => "date parsing issue",
        };
        f.write_str(text)
    }
}

/// True when `submission` should be applied to `contact`.
pub fn needs_update(contact: &Contact, submission: &Submission) -> bool {
    match update_reason(contact, submission) {
        Some(reason) => {
            debug!(email = contact.display_email(), %reason, "contact needs update");
            true
        }
        None => false,
    }
}

/// The first rule that calls for an update, checked in order.
pub fn update_reason(contact: &Contact, submission: &Submission) -> Option<UpdateReason> {
    if contact.phone.is_empty() && !submission.phone.is_empty() {
        return Some(UpdateReason::MissingPhone);
    }
    if contact.first.is_empty() && !submission.first.is_empty() {
        return Some(UpdateReason::MissingFirstName);
    }
    if contact.last.is_empty() && !submission.last.is_empty() {
        return Some(UpdateReason::MissingLastName);
    }

    if submission.feedback.is_empty() {
        return None;
    }
    if contact.last_contact_date.is_empty() {
        return Some(UpdateReason::NoLastContactDate);
    }
    if submission.submission_date.is_empty() {
        return None;
    }

    match (
        parse_calendar_date(&submission.submission_date),
        parse_calendar_date(&contact.last_contact_date),
    ) {
        (Some(submitted), Some(last_contact)) if submitted > last_contact => {
            Some(UpdateReason::NewerFeedback)
        }
        (Some(_), Some(_)) => None,
        _ => Some(UpdateReason::UnparsableDate),
    }
}

/// Parse the calendar-date part of an ISO-like timestamp.
///
/// Anything after a `T` or space separator is ignored, as is a trailing `Z`.
pub fn parse_calendar_date(value: &str) -> Option<NaiveDate> {
    let date_part = value
        .trim()
        .split(['T', ' '])
        .next()
        .unwrap_or_default()
        .trim_end_matches(['Z', 'z']);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
