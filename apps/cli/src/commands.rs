//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use crmsync_api::CrmClient;
use crmsync_core::pipeline::{ProgressReporter, SyncConfig, SyncSummary};
use crmsync_shared::{
    ApiConfig, AppConfig, init_config, load_config, load_config_from, load_env_file,
    resolve_token,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// crmsync: merge event feedback into CRM contacts.
#[derive(Parser)]
#[command(
    name = "crmsync",
    version,
    about = "Reconcile a CRM contact export with event feedback submissions.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Debug mode: debug logging and a snapshot of the original CRM export.
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Config file to use instead of ~/.crmsync/crmsync.toml.
    #[arg(long = "config", global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch contacts and submissions from the API, reconcile, and write the CSV.
    Sync {
        /// Output CSV path (defaults to the configured output path).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// API base URL override.
        #[arg(long, env = "CRMSYNC_BASE_URL")]
        base_url: Option<String>,

        /// Save the original CRM export before reconciling.
        #[arg(long)]
        snapshot: bool,
    },

    /// Reconcile local files instead of calling the API.
    Reconcile {
        /// CRM contact export (CSV).
        #[arg(long)]
        contacts: PathBuf,

        /// Form submissions (JSON).
        #[arg(long)]
        submissions: Option<PathBuf>,

        /// Output CSV path (defaults to the configured output path).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Download the original CRM export without reconciling.
    Snapshot {
        /// Where to save the export (defaults to the configured snapshot path).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// API base URL override.
        #[arg(long, env = "CRMSYNC_BASE_URL")]
        base_url: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = if cli.debug { cli.verbose.max(1) } else { cli.verbose };
    let filter = match level {
        0 => "crmsync=info",
        1 => "crmsync=debug",
        _ => "crmsync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Sync {
            output,
            base_url,
            snapshot,
        } => {
            cmd_sync(
                config,
                output,
                base_url.as_deref(),
                snapshot || cli.debug,
            )
            .await
        }
        Command::Reconcile {
            contacts,
            submissions,
            output,
        } => cmd_reconcile(&config, &contacts, submissions.as_deref(), output),
        Command::Snapshot { output, base_url } => {
            cmd_snapshot(config, output, base_url.as_deref()).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

/// Load `.env`, read the token, and build the runtime API config.
fn api_config(mut config: AppConfig, base_url: Option<&str>) -> Result<ApiConfig> {
    let cwd = std::env::current_dir()
        .map_err(|e| eyre!("cannot determine working directory: {e}"))?;
    if !load_env_file(&cwd) {
        warn!(dir = %cwd.display(), "could not locate .env file, relying on the environment");
    }

    if let Some(url) = base_url {
        config.api.base_url = url.to_string();
    }

    let token = resolve_token(&config)?;
    let api = ApiConfig::new(&config, token)?;
    tracing::debug!(token = %api.token_preview(), "using API token");
    Ok(api)
}

async fn cmd_sync(
    config: AppConfig,
    output: Option<PathBuf>,
    base_url: Option<&str>,
    snapshot: bool,
) -> Result<()> {
    let output_path = output.unwrap_or_else(|| PathBuf::from(&config.output.path));
    let snapshot_path = snapshot.then(|| PathBuf::from(&config.output.snapshot_path));

    let sync_config = SyncConfig {
        api: api_config(config, base_url)?,
        output_path,
        snapshot_path,
    };

    info!(
        base_url = %sync_config.api.base_url,
        output = %sync_config.output_path.display(),
        "starting CRM update"
    );

    let reporter = CliProgress::new();
    let summary = crmsync_core::pipeline::run_sync(&sync_config, &reporter).await?;
    print_summary(&summary);
    Ok(())
}

fn cmd_reconcile(
    config: &AppConfig,
    contacts: &Path,
    submissions: Option<&Path>,
    output: Option<PathBuf>,
) -> Result<()> {
    let output_path = output.unwrap_or_else(|| PathBuf::from(&config.output.path));

    info!(
        contacts = %contacts.display(),
        output = %output_path.display(),
        "reconciling local files"
    );

    let reporter = CliProgress::new();
    let summary =
        crmsync_core::pipeline::run_offline(contacts, submissions, &output_path, &reporter)?;
    print_summary(&summary);
    Ok(())
}

async fn cmd_snapshot(
    config: AppConfig,
    output: Option<PathBuf>,
    base_url: Option<&str>,
) -> Result<()> {
    let path = output.unwrap_or_else(|| PathBuf::from(&config.output.snapshot_path));
    let client = CrmClient::new(api_config(config, base_url)?)?;

    let raw = client.download_contacts_csv().await?;
    crmsync_records::write_snapshot(&path, &raw)?;

    println!("Original CRM export saved to {}", path.display());
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_summary(summary: &SyncSummary) {
    println!();
    match &summary.output_path {
        Some(path) => {
            println!("  Processing summary");
            println!("  Total contacts:          {}", summary.total);
            println!("  Updated from feedback:   {}", summary.updated);
            println!("  New from submissions:    {}", summary.created);
            println!("  With event feedback:     {}", summary.with_feedback);
            println!("  Submissions considered:  {}", summary.submissions);
            println!("  Output file:             {}", path.display());
        }
        None => println!("  No contacts were processed."),
    }
    println!("  Time:                    {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _summary: &SyncSummary) {
        self.spinner.finish_and_clear();
    }
}
