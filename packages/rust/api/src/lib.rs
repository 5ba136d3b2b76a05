//! Client for the CRM data API.
//!
//! Two endpoints are consumed:
//! - `/api/data/crm` returns the contact export as CSV.
//! - `/api/data/form-submissions` returns event-feedback submissions as JSON.
//!
//! Every request is authenticated with a bearer token and followed by a fixed
//! delay so a run stays within the API's rate limit.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{debug, info, instrument};
use url::Url;

use crmsync_shared::{ApiConfig, CrmSyncError, RawContact, RawSubmission, Result};

/// Contact export endpoint (CSV).
pub const CONTACTS_ENDPOINT: &str = "/api/data/crm";

/// Form submissions endpoint (JSON).
pub const SUBMISSIONS_ENDPOINT: &str = "/api/data/form-submissions";

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("crmsync/", env!("CARGO_PKG_VERSION"));

/// How much of a response body is echoed into debug logs.
const BODY_PREVIEW_CHARS: usize = 300;

// ---------------------------------------------------------------------------
// CrmClient
// ---------------------------------------------------------------------------

/// Authenticated, rate-limited client for the CRM API.
pub struct CrmClient {
    config: ApiConfig,
    client: Client,
}

impl CrmClient {
    /// Create a client from an explicit API configuration.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|e| CrmSyncError::config(format!("token is not a valid header value: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CrmSyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Download the contact export as raw CSV text.
    pub async fn download_contacts_csv(&self) -> Result<String> {
        self.get_text(CONTACTS_ENDPOINT).await
    }

    /// Fetch and parse the contact export into header-keyed rows.
    #[instrument(skip_all)]
    pub async fn fetch_contacts(&self) -> Result<Vec<RawContact>> {
        let body = self.download_contacts_csv().await?;
        if body.trim().is_empty() {
            return Err(CrmSyncError::validation("contact export is empty"));
        }
        let contacts = crmsync_records::parse_contacts(&body)?;
        info!(count = contacts.len(), "fetched CRM contacts");
        Ok(contacts)
    }

    /// Fetch form submissions, unwrapping whichever envelope the API used.
    #[instrument(skip_all)]
    pub async fn fetch_submissions(&self) -> Result<Vec<RawSubmission>> {
        let body = self.get_text(SUBMISSIONS_ENDPOINT).await?;
        let submissions = crmsync_records::parse_submissions(&body)?;
        info!(count = submissions.len(), "fetched form submissions");
        Ok(submissions)
    }

    /// GET an endpoint and return its body, sleeping for the rate-limit delay afterwards.
    async fn get_text(&self, endpoint: &str) -> Result<String> {
        let url = self.endpoint_url(endpoint)?;
        debug!(%url, "making request");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| CrmSyncError::Network(format!("{url}: {e}")))?;

        if self.config.rate_limit_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.rate_limit_ms)).await;
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CrmSyncError::Network(format!("{url}: failed to read body: {e}")))?;

        debug!(
            %status,
            preview = %preview(&body),
            "received response"
        );

        if !status.is_success() {
            return Err(CrmSyncError::Network(format!(
                "{url}: HTTP {status}: {}",
                preview(&body)
            )));
        }

        Ok(body)
    }

    /// Append an endpoint path to the base URL, keeping any base path prefix.
    fn endpoint_url(&self, endpoint: &str) -> Result<Url> {
        let base = self.config.base_url.as_str().trim_end_matches('/');
        let joined = format!("{base}{endpoint}");
        Url::parse(&joined)
            .map_err(|e| CrmSyncError::validation(format!("invalid endpoint URL '{joined}': {e}")))
    }
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}
