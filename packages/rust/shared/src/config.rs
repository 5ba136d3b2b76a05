//! Application configuration for crmsync.
//!
//! User config lives at `~/.crmsync/crmsync.toml`.
//! CLI flags override config file values, which override defaults.
//! The API token is never stored in the file; only the name of the env var
//! holding it is. A `.env` file in the working directory may provide it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CrmSyncError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "crmsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".crmsync";

/// Name of the dotenv file looked up in the working directory.
const ENV_FILE_NAME: &str = ".env";

// ---------------------------------------------------------------------------
// Config structs (matching crmsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// CRM API settings.
    #[serde(default)]
    pub api: CrmApiSection,

    /// Output file settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmApiSection {
    /// Base URL of the CRM API (scheme + host).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the bearer token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Delay in ms after every request. 2100 keeps us under 5 requests per 10s.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,
}

impl Default for CrmApiSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
            rate_limit_ms: default_rate_limit(),
        }
    }
}

fn default_base_url() -> String {
    "https://it-hiring.blackbird.vc".into()
}
fn default_token_env() -> String {
    "ACCESS_TOKEN".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_rate_limit() -> u64 {
    2100
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Where the reconciled CSV is written.
    #[serde(default = "default_output_path")]
    pub path: String,

    /// Where the untouched CRM export is saved when snapshotting.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

fn default_output_path() -> String {
    "crm-update.csv".into()
}
fn default_snapshot_path() -> String {
    "original_crm_contacts.csv".into()
}

// ---------------------------------------------------------------------------
// API config (runtime, merged from config + CLI flags + token)
// ---------------------------------------------------------------------------

/// Runtime API client configuration, handed to the API client explicitly.
#[derive(Clone)]
pub struct ApiConfig {
    /// Validated base URL.
    pub base_url: Url,
    /// Bearer token.
    pub token: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Delay in ms after every request.
    pub rate_limit_ms: u64,
}

impl ApiConfig {
    /// Build the runtime config from the file config and a resolved token.
    pub fn new(config: &AppConfig, token: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(&config.api.base_url).map_err(|e| {
            CrmSyncError::validation(format!("invalid base URL '{}': {e}", config.api.base_url))
        })?;

        Ok(Self {
            base_url,
            token: token.into(),
            timeout_secs: config.api.timeout_secs,
            rate_limit_ms: config.api.rate_limit_ms,
        })
    }

    /// First few characters of the token, for debug output.
    pub fn token_preview(&self) -> String {
        let head: String = self.token.chars().take(5).collect();
        format!("{head}...")
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token_preview())
            .field("timeout_secs", &self.timeout_secs)
            .field("rate_limit_ms", &self.rate_limit_ms)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.crmsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CrmSyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.crmsync/crmsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CrmSyncError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        CrmSyncError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CrmSyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CrmSyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CrmSyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Load `<dir>/.env` into the process environment if it exists.
///
/// Variables already set in the environment win. Returns whether a file was loaded.
pub fn load_env_file(dir: &Path) -> bool {
    let path = dir.join(ENV_FILE_NAME);
    match dotenvy::from_path(&path) {
        Ok(()) => {
            tracing::debug!(?path, "loaded env file");
            true
        }
        Err(e) => {
            tracing::debug!(?path, error = %e, "no usable env file");
            false
        }
    }
}

/// Read the API token from the env var named in the config.
pub fn resolve_token(config: &AppConfig) -> Result<String> {
    let var_name = &config.api.token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(CrmSyncError::config(format!(
            "API token not found. Set the {var_name} environment variable \
             or add it to a {ENV_FILE_NAME} file in the working directory."
        ))),
    }
}
