//! End-to-end sync: fetch → reconcile → write CSV.
//!
//! Fetch failures never abort a run. A failed contact fetch means there is
//! nothing to reconcile; a failed submission fetch means contacts pass
//! through unchanged.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crmsync_api::CrmClient;
use crmsync_shared::{ApiConfig, RawContact, RawSubmission, Result};

use crate::reconcile::{ReconcileOutcome, reconcile_detailed};

/// Configuration for the `run_sync` pipeline.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// API connection settings.
    pub api: ApiConfig,
    /// Where the reconciled CSV is written.
    pub output_path: PathBuf,
    /// Save the untouched CRM export here first, if set.
    pub snapshot_path: Option<PathBuf>,
}

/// Result of a sync or offline reconcile run.
#[derive(Debug)]
pub struct SyncSummary {
    /// Identifier of this run, for correlating log lines.
    pub run_id: Uuid,
    /// Contacts in the output.
    pub total: usize,
    /// CRM contacts that were updated.
    pub updated: usize,
    /// Contacts created from unmatched submissions.
    pub created: usize,
    /// Contacts whose last contact text is event feedback.
    pub with_feedback: usize,
    /// Submissions considered.
    pub submissions: usize,
    /// Path written, or `None` when there were no contacts to process.
    pub output_path: Option<PathBuf>,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the pipeline completes.
    fn done(&self, summary: &SyncSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _summary: &SyncSummary) {}
}

/// Run the full sync against the CRM API.
///
/// 1. Snapshot the original export (optional)
/// 2. Fetch contacts and submissions
/// 3. Reconcile
/// 4. Write the output CSV
#[instrument(skip_all, fields(base_url = %config.api.base_url))]
pub async fn run_sync(config: &SyncConfig, progress: &dyn ProgressReporter) -> Result<SyncSummary> {
    let start = Instant::now();
    let run_id = Uuid::now_v7();
    info!(%run_id, "starting CRM sync");

    let client = CrmClient::new(config.api.clone())?;

    if let Some(snapshot_path) = &config.snapshot_path {
        progress.phase("Saving original CRM export");
        match client.download_contacts_csv().await {
            Ok(raw) => {
                if let Err(e) = crmsync_records::write_snapshot(snapshot_path, &raw) {
                    warn!(error = %e, "error saving original CRM export");
                }
            }
            Err(e) => warn!(error = %e, "failed to download original CRM export"),
        }
    }

    progress.phase("Fetching CRM contacts");
    let contacts = client.fetch_contacts().await.unwrap_or_else(|e| {
        warn!(error = %e, "no CRM data found or invalid response");
        Vec::new()
    });

    progress.phase("Fetching form submissions");
    let submissions = client.fetch_submissions().await.unwrap_or_else(|e| {
        warn!(error = %e, "no form submission data found or invalid response");
        Vec::new()
    });

    let summary = finish(run_id, start, &contacts, &submissions, &config.output_path, progress)?;
    progress.done(&summary);
    Ok(summary)
}

/// Reconcile local files instead of fetching from the API.
///
/// Unlike the API path, unreadable input files are errors.
#[instrument(skip_all, fields(contacts = %contacts_path.display()))]
pub fn run_offline(
    contacts_path: &Path,
    submissions_path: Option<&Path>,
    output_path: &Path,
    progress: &dyn ProgressReporter,
) -> Result<SyncSummary> {
    let start = Instant::now();
    let run_id = Uuid::now_v7();
    info!(%run_id, "starting offline reconcile");

    progress.phase("Reading contacts");
    let contacts = crmsync_records::read_contacts_file(contacts_path)?;

    progress.phase("Reading submissions");
    let submissions = match submissions_path {
        Some(path) => crmsync_records::read_submissions_file(path)?,
        None => Vec::new(),
    };

    let summary = finish(run_id, start, &contacts, &submissions, output_path, progress)?;
    progress.done(&summary);
    Ok(summary)
}

/// Reconcile and write the output CSV.
///
/// With no CRM contacts no file is written at all, so an earlier output is
/// left in place and `output_path` in the summary is `None`.
fn finish(
    run_id: Uuid,
    start: Instant,
    contacts: &[RawContact],
    submissions: &[RawSubmission],
    output_path: &Path,
    progress: &dyn ProgressReporter,
) -> Result<SyncSummary> {
    progress.phase("Reconciling contacts");
    let outcome = reconcile_detailed(contacts, submissions);

    let output_path = if contacts.is_empty() {
        warn!("no CRM contacts found, output not written");
        None
    } else {
        progress.phase("Writing output CSV");
        crmsync_records::write_contacts_file(output_path, &outcome.contacts)?;
        Some(output_path.to_path_buf())
    };

    let summary = summarize(run_id, start, &outcome, submissions.len(), output_path);
    info!(
        %run_id,
        total = summary.total,
        updated = summary.updated,
        created = summary.created,
        with_feedback = summary.with_feedback,
        "sync complete"
    );
    Ok(summary)
}

fn summarize(
    run_id: Uuid,
    start: Instant,
    outcome: &ReconcileOutcome,
    submissions: usize,
    output_path: Option<PathBuf>,
) -> SyncSummary {
    SyncSummary {
        run_id,
        total: outcome.contacts.len(),
        updated: outcome.updated,
        created: outcome.created,
        with_feedback: outcome.with_feedback(),
        submissions,
        output_path,
        elapsed: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmsync_api::{CONTACTS_ENDPOINT, SUBMISSIONS_ENDPOINT};
    use crmsync_shared::AppConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CSV_BODY: &str = "id,first,last,email,phone,last contact date,last contact text,all contact text\n\
                            1,Ann,Lee,ann@x.com,,,,\n\
                            2,Bob,Ray,bob@x.com,555,2024-05-01,Call,2024-05-01 - Call\n";

    const SUBMISSIONS_BODY: &str = r#"{"submissions": [
        {"email": "ANN@x.com", "phone_number": "777", "comments": "Loved it", "created_at": "2024-06-01T09:00:00Z", "event_name": "Summit", "score": 5},
        {"user_id": "99", "email": "new@x.com", "first_name": "Neo", "feedback": "First time", "date": "2024-06-02"}
    ]}"#;

    fn sync_config(server: &MockServer, out_dir: &Path, snapshot: bool) -> SyncConfig {
        let mut app = AppConfig::default();
        app.api.base_url = server.uri();
        app.api.rate_limit_ms = 0;
        SyncConfig {
            api: ApiConfig::new(&app, "test-token").unwrap(),
            output_path: out_dir.join("crm-update.csv"),
            snapshot_path: snapshot.then(|| out_dir.join("original.csv")),
        }
    }

    fn temp_dir(prefix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("{prefix}-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    async fn mount(server: &MockServer, endpoint: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(response)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn sync_writes_reconciled_csv() {
        let server = MockServer::start().await;
        mount(&server, CONTACTS_ENDPOINT, ResponseTemplate::new(200).set_body_string(CSV_BODY)).await;
        mount(
            &server,
            SUBMISSIONS_ENDPOINT,
            ResponseTemplate::new(200).set_body_string(SUBMISSIONS_BODY),
        )
        .await;

        let dir = temp_dir("crmsync-sync");
        let config = sync_config(&server, &dir, true);
        let summary = run_sync(&config, &SilentProgress).await.unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.with_feedback, 2);
        assert_eq!(summary.submissions, 2);

        let rows = crmsync_records::read_contacts_file(&config.output_path).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["phone"], "777");
        assert_eq!(
            rows[0]["last contact text"],
            "Event feedback about Summit: Loved it (Rating: 5)"
        );
        assert_eq!(rows[0]["last contact date"], "2024-06-01T09:00:00Z");
        assert_eq!(rows[1]["all contact text"], "2024-05-01 - Call");
        assert_eq!(rows[2]["id"], "99");

        let snapshot = std::fs::read_to_string(dir.join("original.csv")).unwrap();
        assert_eq!(snapshot, CSV_BODY);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn submission_failure_passes_contacts_through() {
        let server = MockServer::start().await;
        mount(&server, CONTACTS_ENDPOINT, ResponseTemplate::new(200).set_body_string(CSV_BODY)).await;
        mount(&server, SUBMISSIONS_ENDPOINT, ResponseTemplate::new(500)).await;

        let dir = temp_dir("crmsync-nosubs");
        let config = sync_config(&server, &dir, false);
        let summary = run_sync(&config, &SilentProgress).await.unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(summary.updated, 0);
        assert_eq!(summary.submissions, 0);
        assert!(config.output_path.exists());
        assert!(!dir.join("original.csv").exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn contact_failure_writes_nothing() {
        let server = MockServer::start().await;
        mount(&server, CONTACTS_ENDPOINT, ResponseTemplate::new(503)).await;
        mount(
            &server,
            SUBMISSIONS_ENDPOINT,
            ResponseTemplate::new(200).set_body_string(SUBMISSIONS_BODY),
        )
        .await;

        let dir = temp_dir("crmsync-nocontacts");
        let config = sync_config(&server, &dir, true);
        let summary = run_sync(&config, &SilentProgress).await.unwrap();

        assert_eq!(summary.total, 0);
        assert!(summary.output_path.is_none());
        assert!(!config.output_path.exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn snapshot_write_failure_still_writes_output() {
        let server = MockServer::start().await;
        mount(&server, CONTACTS_ENDPOINT, ResponseTemplate::new(200).set_body_string(CSV_BODY)).await;
        mount(
            &server,
            SUBMISSIONS_ENDPOINT,
            ResponseTemplate::new(200).set_body_string(SUBMISSIONS_BODY),
        )
        .await;

        let dir = temp_dir("crmsync-badsnapshot");
        // A regular file where the snapshot's parent directory should be.
        let blocker = dir.join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut config = sync_config(&server, &dir, false);
        config.snapshot_path = Some(blocker.join("original.csv"));
        let summary = run_sync(&config, &SilentProgress).await.unwrap();

        assert_eq!(summary.total, 3);
        assert!(config.output_path.exists());
        assert!(!blocker.join("original.csv").exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn snapshot_creates_missing_directories() {
        let server = MockServer::start().await;
        mount(&server, CONTACTS_ENDPOINT, ResponseTemplate::new(200).set_body_string(CSV_BODY)).await;
        mount(&server, SUBMISSIONS_ENDPOINT, ResponseTemplate::new(200).set_body_string("[]")).await;

        let dir = temp_dir("crmsync-snapshotdir");
        let mut config = sync_config(&server, &dir, false);
        let snapshot_path = dir.join("debug").join("original.csv");
        config.snapshot_path = Some(snapshot_path.clone());
        run_sync(&config, &SilentProgress).await.unwrap();

        assert_eq!(std::fs::read_to_string(&snapshot_path).unwrap(), CSV_BODY);
        assert!(config.output_path.exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn offline_reconcile_from_files() {
        let dir = temp_dir("crmsync-offline");
        let contacts_path = dir.join("contacts.csv");
        let submissions_path = dir.join("submissions.json");
        std::fs::write(&contacts_path, CSV_BODY).unwrap();
        std::fs::write(&submissions_path, SUBMISSIONS_BODY).unwrap();

        let output_path = dir.join("out.csv");
        let summary = run_offline(
            &contacts_path,
            Some(&submissions_path),
            &output_path,
            &SilentProgress,
        )
        .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.output_path.as_deref(), Some(output_path.as_path()));
        assert_eq!(crmsync_records::read_contacts_file(&output_path).unwrap().len(), 3);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn offline_reconcile_missing_file_is_error() {
        let dir = temp_dir("crmsync-missing");
        let result = run_offline(&dir.join("nope.csv"), None, &dir.join("out.csv"), &SilentProgress);
        assert!(result.is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
