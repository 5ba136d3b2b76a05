//! Contact reconciliation and sync orchestration for crmsync.
//!
//! The reconciliation itself ([`reconcile`]) is synchronous and never fails on
//! malformed data. [`pipeline`] wraps it with API fetching and CSV output.

pub mod matcher;
pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod staleness;

pub use matcher::MatchIndex;
pub use merge::{apply_feedback, apply_feedback_on, feedback_text};
pub use normalize::{normalize_contact, normalize_submission};
pub use reconcile::{ReconcileOutcome, reconcile, reconcile_detailed, reconcile_on};
pub use staleness::{UpdateReason, needs_update, parse_calendar_date, update_reason};
