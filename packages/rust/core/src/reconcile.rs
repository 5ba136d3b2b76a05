//! Reconciliation of CRM contacts against form submissions.
//!
//! 1. Normalize both sides
//! 2. Index submissions by id and email
//! 3. Fold each contact over its matches, merging whenever it is stale
//! 4. Turn submissions from unknown people into new contacts

use std::collections::HashSet;

use chrono::{Local, NaiveDate};
use tracing::{debug, info, instrument};

use crmsync_shared::{Contact, RawContact, RawSubmission, Submission};

use crate::matcher::MatchIndex;
use crate::merge::{self, FEEDBACK_PREFIX};
use crate::normalize::{normalize_contact, normalize_submission};
use crate::staleness::needs_update;

/// Result of a reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// Updated CRM contacts in input order, then new contacts in submission order.
    pub contacts: Vec<Contact>,
    /// CRM contacts that received at least one merge.
    pub updated: usize,
    /// Contacts synthesized from unmatched submissions.
    pub created: usize,
}

impl ReconcileOutcome {
    /// Contacts whose last contact text came from event feedback.
    pub fn with_feedback(&self) -> usize {
        self.contacts
            .iter()
            .filter(|c| c.last_contact_text.starts_with(FEEDBACK_PREFIX))
            .count()
    }
}

/// Reconcile raw contacts with raw submissions, returning the merged contact list.
pub fn reconcile(raw_contacts: &[RawContact], raw_submissions: &[RawSubmission]) -> Vec<Contact> {
    reconcile_detailed(raw_contacts, raw_submissions).contacts
}

/// Like [`reconcile`], also reporting update and creation counts.
pub fn reconcile_detailed(
    raw_contacts: &[RawContact],
    raw_submissions: &[RawSubmission],
) -> ReconcileOutcome {
    reconcile_on(raw_contacts, raw_submissions, Local::now().date_naive())
}

/// Reconcile with an explicit date for undated feedback.
#[instrument(skip_all, fields(contacts = raw_contacts.len(), submissions = raw_submissions.len()))]
pub fn reconcile_on(
    raw_contacts: &[RawContact],
    raw_submissions: &[RawSubmission],
    today: NaiveDate,
) -> ReconcileOutcome {
    if raw_contacts.is_empty() {
        info!("no CRM contacts, nothing to reconcile");
        return ReconcileOutcome::default();
    }

    let contacts: Vec<Contact> = raw_contacts.iter().map(normalize_contact).collect();
    let submissions: Vec<Submission> = raw_submissions.iter().map(normalize_submission).collect();

    info!(
        contacts = contacts.len(),
        submissions = submissions.len(),
        "processing contacts"
    );

    let index = MatchIndex::build(&submissions);
    debug!(
        ids = index.id_count(),
        emails = index.email_count(),
        "indexed submissions"
    );
    let mut outcome = ReconcileOutcome {
        contacts: Vec::with_capacity(contacts.len()),
        ..Default::default()
    };

    for contact in &contacts {
        let mut current = contact.clone();
        let mut touched = false;

        for submission in index.find_matches(contact) {
            if needs_update(&current, submission) {
                info!(email = current.display_email(), "updating contact");
                current = merge::apply_feedback_on(&current, submission, today);
                touched = true;
            }
        }

        if touched {
            outcome.updated += 1;
        }
        outcome.contacts.push(current);
    }

    info!(
        updated = outcome.updated,
        total = contacts.len(),
        "merged submissions into contacts"
    );

    let known = KnownContacts::from_contacts(&contacts);
    for submission in &submissions {
        if known.is_new(submission) {
            let placeholder = outcome.contacts.len() + 1;
            let created = synthesize_contact(submission, placeholder, today);
            info!(email = created.display_email(), "added new contact from submission");
            outcome.contacts.push(created);
            outcome.created += 1;
        }
    }

    if outcome.created > 0 {
        info!(created = outcome.created, "added new contacts from submissions");
    }

    outcome
}

// ---------------------------------------------------------------------------
// New contacts
// ---------------------------------------------------------------------------

/// Ids and lowercased emails of the CRM contacts as they were before merging.
struct KnownContacts {
    ids: HashSet<String>,
    emails: HashSet<String>,
}

impl KnownContacts {
    fn from_contacts(contacts: &[Contact]) -> Self {
        Self {
            ids: contacts
                .iter()
                .filter(|c| !c.id.is_empty())
                .map(|c| c.id.clone())
                .collect(),
            emails: contacts
                .iter()
                .filter(|c| !c.email.is_empty())
                .map(|c| c.email.to_lowercase())
                .collect(),
        }
    }

    /// A submission describes a new person only if it has an unknown id, an
    /// unknown email, and feedback to record.
    fn is_new(&self, submission: &Submission) -> bool {
        let email = submission.email.to_lowercase();
        let is_new = !email.is_empty()
            && !self.emails.contains(&email)
            && !submission.id.is_empty()
            && !self.ids.contains(&submission.id)
            && !submission.feedback.is_empty();
        if !is_new {
            debug!(id = %submission.id, email = %submission.email, "submission is not a new contact");
        }
        is_new
    }
}

/// Build a contact from a submission with a single history entry.
fn synthesize_contact(submission: &Submission, placeholder: usize, today: NaiveDate) -> Contact {
    let text = merge::feedback_text(submission);
    let date = merge::contact_date(submission, today);

    // `is_new` requires an id, so the placeholder is never used today.
    let id = if submission.id.is_empty() {
        format!("new-{placeholder}")
    } else {
        submission.id.clone()
    };

    Contact {
        id,
        first: submission.first.clone(),
        last: submission.last.clone(),
        email: submission.email.clone(),
        phone: submission.phone.clone(),
        all_contact_text: merge::history_entry(&date, &text),
        last_contact_date: date,
        last_contact_text: text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
    }

    fn raw_contact(pairs: &[(&str, &str)]) -> RawContact {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn raw_submission(value: Value) -> RawSubmission {
        match value {
            Value::Object(map) => map,
            _ => panic!("test submission must be an object"),
        }
    }

    /// Render contacts back into raw CRM rows, as a second run would read them.
    fn as_raw(contacts: &[Contact]) -> Vec<RawContact> {
        contacts
            .iter()
            .map(|c| {
                raw_contact(&[
                    ("id", c.id.as_str()),
                    ("first", c.first.as_str()),
                    ("last", c.last.as_str()),
                    ("email", c.email.as_str()),
                    ("phone", c.phone.as_str()),
                    ("last contact date", c.last_contact_date.as_str()),
                    ("last contact text", c.last_contact_text.as_str()),
                    ("all contact text", c.all_contact_text.as_str()),
                ])
            })
            .collect()
    }

    #[test]
    fn merges_phone_and_feedback() {
        let contacts = vec![raw_contact(&[("id", "1"), ("email", "a@x.com")])];
        let submissions = vec![raw_submission(json!({
            "id": "1",
            "email": "a@x.com",
            "phone": "555",
            "feedback": "Great event",
            "submission_date": "2024-01-01",
            "event": "Meetup",
            "rating": "5",
        }))];

        let outcome = reconcile_on(&contacts, &submissions, today());
        assert_eq!(outcome.contacts.len(), 1);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.created, 0);

        let merged = &outcome.contacts[0];
        assert_eq!(merged.phone, "555");
        assert_eq!(
            merged.last_contact_text,
            "Event feedback about Meetup: Great event (Rating: 5)"
        );
        assert_eq!(merged.last_contact_date, "2024-01-01");
        assert_eq!(
            merged.all_contact_text,
            "2024-01-01 - Event feedback about Meetup: Great event (Rating: 5)"
        );
    }

    #[test]
    fn older_submission_leaves_contact_unchanged() {
        let contacts = vec![raw_contact(&[
            ("id", "1"),
            ("first", "Ann"),
            ("last", "Lee"),
            ("email", "a@x.com"),
            ("phone", "555"),
            ("last contact date", "2024-02-01"),
            ("last contact text", "Call"),
            ("all contact text", "2024-02-01 - Call"),
        ])];
        let submissions = vec![raw_submission(json!({
            "email": "a@x.com",
            "feedback": "Late review",
            "submission_date": "2024-01-01",
        }))];

        let outcome = reconcile_on(&contacts, &submissions, today());
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.contacts[0], normalize_contact(&contacts[0]));
    }

    #[test]
    fn successive_submissions_build_history() {
        let contacts = vec![raw_contact(&[("id", "1"), ("email", "a@x.com"), ("phone", "1")])];
        let submissions = vec![
            raw_submission(json!({"email": "a@x.com", "feedback": "first", "submission_date": "2024-01-01"})),
            raw_submission(json!({"email": "a@x.com", "feedback": "second", "submission_date": "2024-03-01"})),
        ];

        let outcome = reconcile_on(&contacts, &submissions, today());
        let merged = &outcome.contacts[0];
        assert_eq!(merged.history_len(), 2);
        assert_eq!(merged.last_contact_date, "2024-03-01");
        assert_eq!(merged.last_contact_text, "Event feedback: second");
        assert_eq!(outcome.updated, 1);
    }

    #[test]
    fn later_submission_sees_earlier_merge() {
        // second submission is older than the first, so only the first applies
        let contacts = vec![raw_contact(&[("id", "1"), ("email", "a@x.com"), ("phone", "1")])];
        let submissions = vec![
            raw_submission(json!({"email": "a@x.com", "feedback": "new", "submission_date": "2024-03-01"})),
            raw_submission(json!({"email": "a@x.com", "feedback": "old", "submission_date": "2024-01-01"})),
        ];

        let outcome = reconcile_on(&contacts, &submissions, today());
        assert_eq!(outcome.contacts[0].history_len(), 1);
        assert_eq!(outcome.contacts[0].last_contact_text, "Event feedback: new");
    }

    #[test]
    fn unknown_submission_becomes_new_contact() {
        let contacts = vec![raw_contact(&[("id", "1"), ("email", "a@x.com")])];
        let submissions = vec![raw_submission(json!({
            "id": "99",
            "email": "new@x.com",
            "first_name": "Neo",
            "feedback": "Hello",
            "event": "Gala",
        }))];

        let outcome = reconcile_on(&contacts, &submissions, today());
        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.contacts.len(), 2);

        let created = &outcome.contacts[1];
        assert_eq!(created.id, "99");
        assert_eq!(created.first, "Neo");
        assert_eq!(created.last_contact_date, "2025-06-30");
        assert_eq!(created.last_contact_text, "Event feedback about Gala: Hello");
        assert_eq!(created.all_contact_text, "2025-06-30 - Event feedback about Gala: Hello");
        assert_eq!(outcome.with_feedback(), 1);
    }

    #[test]
    fn new_contact_requires_id_email_and_feedback() {
        let contacts = vec![raw_contact(&[("id", "1"), ("email", "a@x.com")])];
        let submissions = vec![
            raw_submission(json!({"email": "x@x.com", "feedback": "no id"})),
            raw_submission(json!({"id": "50", "feedback": "no email"})),
            raw_submission(json!({"id": "51", "email": "y@x.com"})),
            raw_submission(json!({"id": "1", "email": "z@x.com", "feedback": "known id"})),
            raw_submission(json!({"id": "52", "email": "A@X.com", "feedback": "known email"})),
        ];

        let outcome = reconcile_on(&contacts, &submissions, today());
        assert_eq!(outcome.created, 0);
        assert_eq!(outcome.contacts.len(), 1);
    }

    #[test]
    fn unmatched_contacts_pass_through() {
        let contacts = vec![
            raw_contact(&[("id", "1"), ("email", " a@x.com "), ("first", "Ann")]),
            raw_contact(&[("id", "2"), ("email", "b@x.com")]),
        ];
        let submissions = vec![raw_submission(json!({"email": "b@x.com", "phone": "9"}))];

        let outcome = reconcile_on(&contacts, &submissions, today());
        assert_eq!(outcome.contacts[0], normalize_contact(&contacts[0]));
        assert_eq!(outcome.contacts[1].phone, "9");
        assert_eq!(outcome.updated, 1);
    }

    #[test]
    fn second_run_is_a_no_op() {
        let contacts = vec![
            raw_contact(&[("id", "1"), ("email", "a@x.com")]),
            raw_contact(&[("id", "2"), ("email", "b@x.com"), ("last contact date", "2023-05-05")]),
        ];
        let submissions = vec![
            raw_submission(json!({"id": "1", "phone": "555", "first": "Ann", "feedback": "A", "submission_date": "2024-01-01"})),
            raw_submission(json!({"email": "b@x.com", "feedback": "B", "submission_date": "2024-02-01", "rating": 4})),
            raw_submission(json!({"email": "b@x.com", "feedback": "C", "submission_date": "2024-03-01"})),
        ];

        let first = reconcile_on(&contacts, &submissions, today());
        let second = reconcile_on(&as_raw(&first.contacts), &submissions, today());

        assert_eq!(second.updated, 0);
        assert_eq!(second.created, 0);
        assert_eq!(second.contacts, first.contacts);
    }

    #[test]
    fn history_never_shrinks() {
        let contacts = vec![raw_contact(&[
            ("id", "1"),
            ("email", "a@x.com"),
            ("phone", "1"),
            ("last contact date", "2023-01-01"),
            ("all contact text", "2022-01-01 - a\n \n 2023-01-01 - b"),
        ])];
        let submissions = vec![raw_submission(
            json!({"id": "1", "feedback": "c", "submission_date": "2024-01-01"}),
        )];

        let before = normalize_contact(&contacts[0]).history_len();
        let outcome = reconcile_on(&contacts, &submissions, today());
        let after = outcome.contacts[0].history_len();
        assert_eq!(before, 2);
        assert_eq!(after, 3);
        assert!(outcome.contacts[0].all_contact_text.starts_with("2022-01-01 - a"));
    }

    #[test]
    fn empty_contacts_short_circuit() {
        let submissions = vec![raw_submission(json!({"id": "9", "email": "n@x.com", "feedback": "hi"}))];
        let outcome = reconcile_on(&[], &submissions, today());
        assert!(outcome.contacts.is_empty());
        assert_eq!(outcome.created, 0);
    }

    #[test]
    fn reconcile_returns_contacts_only() {
        let contacts = vec![raw_contact(&[("id", "1")])];
        assert_eq!(reconcile(&contacts, &[]).len(), 1);
    }

    #[test]
    fn placeholder_id_when_submission_has_none() {
        let sub = Submission {
            email: "p@x.com".into(),
            feedback: "hi".into(),
            ..Default::default()
        };
        assert_eq!(synthesize_contact(&sub, 4, today()).id, "new-4");
    }
}
