//! Submission lookup by contact id and email.

use std::collections::{HashMap, HashSet};

use crmsync_shared::{Contact, Submission};

/// Submissions indexed by id and by lowercased email.
///
/// Buckets keep submissions in input order.
#[derive(Debug, Default)]
pub struct MatchIndex<'a> {
    by_id: HashMap<&'a str, Vec<&'a Submission>>,
    by_email: HashMap<String, Vec<&'a Submission>>,
}

impl<'a> MatchIndex<'a> {
    /// Index submissions, skipping empty ids/emails for the respective map.
    pub fn build(submissions: &'a [Submission]) -> Self {
        let mut index = Self::default();

        for submission in submissions {
            if !submission.id.is_empty() {
                index
                    .by_id
                    .entry(submission.id.as_str())
                    .or_default()
                    .push(submission);
            }
            if !submission.email.is_empty() {
                index
                    .by_email
                    .entry(submission.email.to_lowercase())
                    .or_default()
                    .push(submission);
            }
        }

        index
    }

    /// Id matches followed by email matches, deduplicated on
    /// (email, feedback, submission_date) keeping first-seen order.
    pub fn find_matches(&self, contact: &Contact) -> Vec<&'a Submission> {
        let by_id = (!contact.id.is_empty())
            .then(|| self.by_id.get(contact.id.as_str()))
            .flatten();
        let by_email = (!contact.email.is_empty())
            .then(|| self.by_email.get(&contact.email.to_lowercase()))
            .flatten();

        let mut seen = HashSet::new();
        by_id
            .into_iter()
            .chain(by_email)
            .flatten()
            .copied()
            .filter(|sub| {
                seen.insert((
                    sub.email.as_str(),
                    sub.feedback.as_str(),
                    sub.submission_date.as_str(),
                ))
            })
            .collect()
    }

    /// Number of distinct ids indexed.
    pub fn id_count(&self) -> usize {
        self.by_id.len()
    }

    /// Number of distinct emails indexed.
    pub fn email_count(&self) -> usize {
        self.by_email.len()
    }
}
