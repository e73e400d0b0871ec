//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use sourcing_clients::RpcClients;
use sourcing_core::{
    MinimumExperience, ProgressReporter, RunState, RunSummary, WorkflowOrchestrator,
};
use sourcing_shared::{
    AppConfig, CredentialContext, RunRequest, SaveOutcome, SaveStatus, Secret, SkillList,
    WorkflowConfig, init_config, load_config, validate_endpoints,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Find candidates and persist them to the record store.
#[derive(Parser)]
#[command(
    name = "sourcing",
    version,
    about = "Authenticate, search for candidates, and persist every match.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Run one sourcing workflow.
    Run(RunArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
pub(crate) struct RunArgs {
    /// Operator username.
    #[arg(short, long, required_unless_present = "request")]
    pub username: Option<String>,

    /// Operator secret.
    #[arg(long, env = "SOURCING_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Job title to search for.
    #[arg(short, long, required_unless_present = "request")]
    pub title: Option<String>,

    /// Comma-separated skills, e.g. "Go,Distributed Systems".
    #[arg(short, long, default_value = "")]
    pub skills: String,

    /// Read the run request from a JSON file instead of flags.
    #[arg(long, conflicts_with_all = ["username", "title"])]
    pub request: Option<PathBuf>,

    /// Persistence worker pool size (overrides config).
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    pub concurrency: Option<u32>,

    /// Skip candidates with less stated experience than this many years.
    #[arg(long)]
    pub min_experience: Option<f32>,

    /// Print the summary as JSON.
    #[arg(long)]
    pub json: bool,
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

    let filter = match cli.verbose {
        0 => "sourcing=info",
        1 => "sourcing=debug",
        _ => "sourcing=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(args: RunArgs) -> Result<()> {
    let mut config = load_config()?;
    if let Some(concurrency) = args.concurrency {
        config.workflow.concurrency = concurrency;
    }
    validate_endpoints(&config)?;

    let ctx = build_context(&args)?;
    let workflow = WorkflowConfig::from(&config);
    let clients = RpcClients::resolve(&config.services, workflow.call_timeout).await?;

    let mut orchestrator = WorkflowOrchestrator::from_rpc(clients, workflow);
    if let Some(years) = args.min_experience {
        orchestrator = orchestrator.with_gate(MinimumExperience::new(years));
    }

    info!(
        run_id = %ctx.run_id(),
        title = ctx.filter().title(),
        skills = ctx.filter().skills().len(),
        concurrency = orchestrator.config().concurrency,
        "starting run"
    );

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            on_ctrl_c.cancel();
        }
    });

    let reporter = CliProgress::new(!args.json);
    let summary = orchestrator.run(ctx, cancel, &reporter).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    match &summary.failure_reason {
        Some(reason) if !summary.is_done() => Err(eyre!(
            "run failed during {:?}: {}",
            reason.stage,
            reason.message
        )),
        _ => Ok(()),
    }
}

/// Build the run context from `--request` or from individual flags.
fn build_context(args: &RunArgs) -> Result<CredentialContext> {
    let request = match &args.request {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("reading run request {}", path.display()))?;
            serde_json::from_str::<RunRequest>(&raw)
                .wrap_err_with(|| format!("parsing run request {}", path.display()))?
        }
        None => RunRequest {
            username: args.username.clone().unwrap_or_default(),
            secret: Secret::new(
                args.secret
                    .clone()
                    .ok_or_else(|| eyre!("no secret given: pass --secret or set SOURCING_SECRET"))?,
            ),
            title: args.title.clone().unwrap_or_default(),
            skills: SkillList::Csv(args.skills.clone()),
        },
    };

    Ok(request.into_context()?)
}

fn print_summary(summary: &RunSummary) {
    let elapsed = summary.finished_at - summary.started_at;

    println!();
    match &summary.failure_reason {
        Some(reason) if !summary.is_done() => {
            println!("  Run failed during {:?} ({})", reason.stage, reason.kind);
            println!("  Reason:     {}", reason.message);
        }
        Some(reason) => {
            println!("  Run finished early ({})", reason.message);
        }
        None => println!("  Run complete."),
    }
    println!("  Run:        {}", summary.run_id);
    println!("  Found:      {}", summary.candidates_found);
    println!("  Saved:      {}", summary.saved);
    println!("  Duplicates: {}", summary.duplicates);
    println!("  Failed:     {}", summary.failed);
    if summary.skipped > 0 {
        println!("  Skipped:    {}", summary.skipped);
    }
    println!(
        "  Time:       {:.1}s",
        elapsed.num_milliseconds() as f64 / 1000.0
    );

    if !summary.failure_details.is_empty() {
        println!();
        println!("  Failures:");
        for detail in &summary.failure_details {
            println!(
                "    {:<16} {:<15} {}",
                detail.candidate_id, detail.kind, detail.message
            );
        }
    }
    println!();
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(visible: bool) -> Self {
        if !visible {
            return Self {
                spinner: ProgressBar::hidden(),
            };
        }

        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn state(&self, state: RunState) {
        let message = match state {
            RunState::Authenticating => "Authenticating",
            RunState::Searching => "Searching candidates",
            RunState::Persisting => "Persisting candidates",
            RunState::Summarizing => "Summarizing",
            _ => return,
        };
        self.spinner.set_message(message);
    }

    fn candidate_finished(&self, outcome: &SaveOutcome, finished: usize, total: usize) {
        let status = match outcome.status {
            SaveStatus::Saved => "saved",
            SaveStatus::Duplicate => "duplicate",
            SaveStatus::Failed => "failed",
        };
        self.spinner.set_message(format!(
            "Persisting [{finished}/{total}] {} {status}",
            outcome.candidate_id
        ));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
