use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use andtransfer::commands::upload_share;
use andtransfer::config::{self, Config};
use andtransfer::errors::AppError;
use andtransfer::share_payload::{ShareAction, SharePayload};
use andtransfer::uploader::{
    BatchSummary, ResourceRef, UploadDispatcher, UploadNotifier, UploadOutcome, UploadStatus,
};

#[derive(Parser)]
#[command(
    name = "andtransfer",
    version,
    about = "Upload shared text and files to your own server"
)]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Server domain uploads are posted under
    #[arg(long, global = true)]
    domain: Option<String>,

    /// Basic auth username (enables basic auth)
    #[arg(long, global = true)]
    username: Option<String>,

    #[arg(long, global = true)]
    password: Option<String>,

    /// Maximum uploads in flight, 0 for unbounded
    #[arg(long, global = true)]
    max_concurrent: Option<usize>,

    /// Timeout for each upload request
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Print the batch report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Share one text or one file
    Send(SendArgs),
    /// Share several texts or several files
    SendMultiple(SendMultipleArgs),
    /// Upload a file reference directly
    View { reference: String },
    /// Upload a share payload stored as JSON
    Payload { path: PathBuf },
    /// Show or change the stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct SendArgs {
    #[arg(long)]
    text: Option<String>,
    #[arg(long)]
    file: Option<String>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct SendMultipleArgs {
    #[arg(long = "text")]
    texts: Vec<String>,
    #[arg(long = "file")]
    files: Vec<String>,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current settings
    Show,
    /// Store --domain/--username/--password/--max-concurrent/--timeout-secs
    Set {
        /// Disable basic auth
        #[arg(long)]
        no_auth: bool,
        #[arg(long)]
        retry_rounds: Option<u32>,
        #[arg(long)]
        log_level: Option<String>,
    },
    /// Restore default settings
    Reset,
}

/// Prints upload status to stderr.
#[derive(Default)]
struct ConsoleNotifier {
    last_decile: Mutex<HashMap<usize, u32>>,
}

impl UploadNotifier for ConsoleNotifier {
    fn upload_started(&self, index: usize, name: &str) {
        eprintln!("📤 [{}] {}", index + 1, name);
    }

    fn upload_progress(&self, index: usize, name: &str, fraction: f32) {
        let decile = (fraction * 10.0).floor() as u32;
        let changed = match self.last_decile.lock() {
            Ok(mut last) => last.insert(index, decile) != Some(decile),
            Err(_) => false,
        };
        if changed && decile > 0 && decile < 10 {
            eprintln!("   [{}] {} {}%", index + 1, name, decile * 10);
        }
    }

    fn upload_finished(&self, outcome: &UploadOutcome) {
        match &outcome.status {
            UploadStatus::Success(code) => {
                eprintln!("✅ [{}] {} ({})", outcome.index + 1, outcome.name, code)
            }
            UploadStatus::Failure(error) => {
                eprintln!("❌ [{}] {}: {}", outcome.index + 1, outcome.name, error)
            }
        }
    }

    fn batch_finished(&self, summary: &BatchSummary) {
        eprintln!("{}", summary.message());
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let level_from_env = init_logging();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::get_config_path()?,
    };

    // Validated only after overrides; `config set` and `config reset` must
    // still run against an invalid stored config
    let mut settings = config::read_config_from(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if !level_from_env {
        log::set_max_level(settings.log_filter());
    }

    apply_overrides(&mut settings, &cli);

    let payload = match cli.command {
        Command::Config { action } => return run_config(action, settings, &config_path),
        Command::Send(args) => SharePayload {
            action: Some(ShareAction::Send),
            text: args.text,
            stream: args.file.map(ResourceRef::new),
            ..Default::default()
        },
        Command::SendMultiple(args) => SharePayload {
            action: Some(ShareAction::SendMultiple),
            texts: Some(args.texts),
            streams: Some(args.files.into_iter().map(ResourceRef::new).collect()),
            ..Default::default()
        },
        Command::View { reference } => SharePayload::view(ResourceRef::new(reference)),
        Command::Payload { path } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read payload {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse payload {}", path.display()))?
        }
    };

    config::validate_config(&settings)?;
    let target = settings.upload_target()?;
    let dispatcher = UploadDispatcher::new(settings.dispatch_options())?;

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        log::warn!("Interrupted, cancelling uploads");
        handler_token.cancel();
    }) {
        log::warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let notifier: Arc<dyn UploadNotifier> = Arc::new(ConsoleNotifier::default());

    match upload_share(
        &payload,
        &target,
        &dispatcher,
        settings.retry_failed_rounds,
        notifier,
        cancel,
    )
    .await
    {
        Ok(report) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            if report.summary.all_succeeded() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(1))
            }
        }
        Err(AppError::Parse(e)) => {
            eprintln!("Error: {}", e);
            Ok(ExitCode::from(2))
        }
        Err(e) => Err(e.into()),
    }
}

/// Logs at info until the config is read. Returns true when RUST_LOG is set,
/// in which case it decides the level.
fn init_logging() -> bool {
    let level_from_env = std::env::var_os("RUST_LOG").is_some();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")).init();
    if !level_from_env {
        log::set_max_level(log::LevelFilter::Info);
    }

    level_from_env
}

fn apply_overrides(settings: &mut Config, cli: &Cli) {
    if let Some(domain) = &cli.domain {
        settings.domain = domain.clone();
    }
    if let Some(username) = &cli.username {
        settings.uses_basic_auth = true;
        settings.basic_auth_username = username.clone();
    }
    if let Some(password) = &cli.password {
        settings.basic_auth_password = password.clone();
    }
    if let Some(max_concurrent) = cli.max_concurrent {
        settings.max_concurrent_uploads = max_concurrent;
    }
    if let Some(timeout_secs) = cli.timeout_secs {
        settings.request_timeout_secs = timeout_secs;
    }
}

fn run_config(
    action: ConfigAction,
    mut settings: Config,
    config_path: &Path,
) -> anyhow::Result<ExitCode> {
    match action {
        ConfigAction::Show => {
            if !settings.basic_auth_password.is_empty() {
                settings.basic_auth_password = "***".to_string();
            }
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        ConfigAction::Set {
            no_auth,
            retry_rounds,
            log_level,
        } => {
            if no_auth {
                settings.uses_basic_auth = false;
            }
            if let Some(retry_rounds) = retry_rounds {
                settings.retry_failed_rounds = retry_rounds;
            }
            if let Some(log_level) = log_level {
                settings.log_level = log_level;
            }
            config::save_config_to(config_path, &settings)?;
            eprintln!("Saved settings to {}", config_path.display());
        }
        ConfigAction::Reset => {
            config::reset_config_at(config_path)?;
            eprintln!("Settings reset to defaults");
        }
    }

    Ok(ExitCode::SUCCESS)
}
