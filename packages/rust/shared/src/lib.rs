//! Shared types, error model, and configuration for crmsync.
//!
//! This crate is the foundation depended on by all other crmsync crates.
//! It provides:
//! - [`CrmSyncError`]: the unified error type
//! - Record types ([`Contact`], [`Submission`], [`RawContact`], [`RawSubmission`])
//! - Configuration ([`AppConfig`], [`ApiConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiConfig, AppConfig, CrmApiSection, OutputConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, load_env_file, resolve_token,
};
pub use error::{CrmSyncError, Result};
pub use types::{
    CONTACT_COLUMNS, Contact, HISTORY_SEPARATOR, RawContact, RawSubmission, Submission,
    submissions_from_payload,
};
