//! FocusGuard CLI
//!
//! Developer tool that drives the background owner against a JSON state
//! file standing in for the browser. Each stateful invocation runs the
//! startup path first, the same way the service worker does when it wakes.

mod host;
mod logger;

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;

use fg_background::{Background, Command, Reply};
use fg_core::{Clock, FocusConfig, Timestamp};
use fg_rules::{reconcile, DnrUpdate, SyncReport};

use crate::host::{FileHost, HostClock};

#[derive(Parser)]
#[command(name = "fg-cli")]
#[command(about = "FocusGuard site blocker and focus sprint tools")]
struct Cli {
    /// State file emulating browser storage, alarms and rules
    #[arg(short, long, global = true, default_value = "focusguard-state.json")]
    state: PathBuf,

    /// JSON config overriding the defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Pretend the current time is this many ms since the epoch
    #[arg(long, global = true)]
    now: Option<Timestamp>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize site input into block patterns
    Normalize {
        /// Sites, URLs or patterns
        #[arg(required = true)]
        inputs: Vec<String>,
    },

    /// Print declarativeNetRequest rules
    Rules {
        /// Patterns to expand; defaults to the installed rule table
        patterns: Vec<String>,

        /// Redirect to the sprint page
        #[arg(long)]
        sprint: bool,

        /// Absolute extension base URL instead of extension paths
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Manage the blocked site list
    Sites {
        #[command(subcommand)]
        action: SitesAction,
    },

    /// Pause or resume blocking
    Toggle,

    /// Focus sprints
    Sprint {
        #[command(subcommand)]
        action: SprintAction,
    },

    /// Fire alarms that are due
    Alarms,

    /// Record a bypass of the blocked page
    Bypass,
}

#[derive(Subcommand)]
enum SitesAction {
    /// List blocked sites with their index
    List,
    /// Add sites (newline or comma separated)
    Add {
        #[arg(required = true)]
        sites: Vec<String>,
    },
    /// Remove the site at an index
    Remove { index: usize },
    /// Restore the default list
    Reset,
}

#[derive(Subcommand)]
enum SprintAction {
    /// Start a sprint
    Start {
        /// Duration in minutes
        #[arg(allow_negative_numbers = true)]
        minutes: i64,
        #[arg(short, long)]
        goal: Option<String>,
        #[arg(long)]
        criteria: Option<String>,
    },
    /// Cancel the running sprint
    Cancel,
    /// Show sprint state, badge and pending alarms
    Status,
}

fn main() {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let result = match &cli.command {
        Commands::Normalize { inputs } => cmd_normalize(inputs),
        Commands::Rules {
            patterns,
            sprint,
            base_url,
        } if !patterns.is_empty() => cmd_rules_for(patterns, *sprint, base_url.as_deref(), &cli),
        _ => run_stateful(&cli),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<FocusConfig, String> {
    let Some(path) = path else {
        return Ok(FocusConfig::default());
    };
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    FocusConfig::from_json(&text).map_err(|e| e.to_string())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| format!("Failed to encode: {}", e))?;
    println!("{text}");
    Ok(())
}

fn cmd_normalize(inputs: &[String]) -> Result<(), String> {
    for input in inputs {
        println!("{}", fg_core::normalize(input));
    }
    Ok(())
}

fn cmd_rules_for(
    patterns: &[String],
    sprint: bool,
    base_url: Option<&str>,
    cli: &Cli,
) -> Result<(), String> {
    let config = load_config(cli.config.as_deref())?;
    let reconciliation = reconcile(patterns, true, sprint, config.rule_capacity);
    if let Some(exceeded) = reconciliation.truncated {
        eprintln!("Warning: {exceeded}");
    }
    print_json(&DnrUpdate::from_update(&reconciliation.update, base_url))
}

// =============================================================================
// Stateful commands
// =============================================================================

type FileBackground<'a> =
    Background<&'a FileHost, &'a FileHost, &'a FileHost, &'a FileHost, &'a FileHost, HostClock>;

fn run_stateful(cli: &Cli) -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    runtime.block_on(run_stateful_async(cli))
}

async fn run_stateful_async(cli: &Cli) -> Result<(), String> {
    let config = load_config(cli.config.as_deref())?;
    let host = FileHost::load(&cli.state, HostClock::new(cli.now)).await?;
    let background: FileBackground<'_> =
        Background::new(&host, &host, &host, &host, &host, host.clock(), config);

    let startup = if host.is_fresh() {
        background.on_installed().await
    } else {
        background.on_startup().await
    };
    if let Err(e) = startup {
        eprintln!("Warning: startup failed: {e}");
    }
    // Startup already synced the rule table
    host.take_changes();

    let result = dispatch(cli, &background, &host).await;

    pump_changes(&background, &host).await;
    host.save().await?;
    result
}

/// Deliver storage notifications the way `storage.onChanged` would.
async fn pump_changes(background: &FileBackground<'_>, host: &FileHost) {
    loop {
        let changes = host.take_changes();
        if changes.is_empty() {
            break;
        }
        for (area, changed) in changes {
            match background.handle_storage_change(area, &changed).await {
                Ok(Some(SyncReport {
                    truncated: Some(exceeded),
                    ..
                })) => eprintln!(
                    "Warning: {exceeded}; only the first {} rules are active",
                    exceeded.cap
                ),
                Ok(_) => {}
                Err(e) => eprintln!("Warning: rule sync failed: {e}"),
            }
        }
    }
}

async fn dispatch(cli: &Cli, background: &FileBackground<'_>, host: &FileHost) -> Result<(), String> {
    match &cli.command {
        Commands::Normalize { .. } => Ok(()),
        Commands::Rules { base_url, .. } => {
            let rules = host.dynamic_rules();
            match base_url {
                Some(base) => print_json(&rebase(rules, base)),
                None => print_json(&rules),
            }
        }
        Commands::Sites { action } => cmd_sites(action, background).await,
        Commands::Toggle => show(background.handle_command(Command::ToggleEnabled)).await,
        Commands::Sprint { action } => cmd_sprint(action, background, host).await,
        Commands::Alarms => cmd_alarms(background, host).await,
        Commands::Bypass => show(background.handle_command(Command::RecordBypass)).await,
    }
}

/// Print a reply, turning error replies into a failed command.
async fn show(reply: impl Future<Output = Reply>) -> Result<(), String> {
    let reply = reply.await;
    if let Reply::Error { code, message } = &reply {
        return Err(format!("{message} ({code})"));
    }
    print_json(&reply)
}

fn rebase(rules: Vec<fg_rules::DnrRule>, base: &str) -> Vec<fg_rules::DnrRule> {
    rules
        .into_iter()
        .map(|mut rule| {
            let fg_rules::dnr::DnrAction::Redirect { redirect } = &mut rule.action;
            if let Some(path) = redirect.extension_path.take() {
                redirect.url = Some(format!("{}{}", base.trim_end_matches('/'), path));
            }
            rule
        })
        .collect()
}

async fn cmd_sites(action: &SitesAction, background: &FileBackground<'_>) -> Result<(), String> {
    match action {
        SitesAction::List => {
            let settings = background.settings().load().await;
            if settings.blocked_sites.is_empty() {
                println!("No blocked sites");
            }
            for (index, site) in settings.blocked_sites.iter().enumerate() {
                println!("{index:>3}  {site}");
            }
            println!(
                "Blocking {}",
                if settings.is_enabled { "enabled" } else { "paused" }
            );
            Ok(())
        }
        SitesAction::Add { sites } => {
            let text = sites.join("\n");
            show(background.handle_command(Command::AddSites { text })).await
        }
        SitesAction::Remove { index } => {
            show(background.handle_command(Command::RemoveSite { index: *index })).await
        }
        SitesAction::Reset => show(background.handle_command(Command::ResetSites)).await,
    }
}

async fn cmd_sprint(
    action: &SprintAction,
    background: &FileBackground<'_>,
    host: &FileHost,
) -> Result<(), String> {
    match action {
        SprintAction::Start {
            minutes,
            goal,
            criteria,
        } => {
            show(background.handle_command(Command::StartSprint {
                duration_minutes: *minutes,
                goal: goal.clone(),
                success_criteria: criteria.clone(),
            }))
            .await
        }
        SprintAction::Cancel => show(background.handle_command(Command::CancelSprint)).await,
        SprintAction::Status => {
            let view = background.sprint().get_sprint_state();
            print_json(&serde_json::json!({
                "sprint": view,
                "badge": host.badge(),
                "alarms": host.alarms(),
            }))
        }
    }
}

async fn cmd_alarms(background: &FileBackground<'_>, host: &FileHost) -> Result<(), String> {
    let now = host.clock().now_ms();
    let due = host.take_due(now);
    if due.is_empty() {
        println!("No alarms due");
        return Ok(());
    }
    for name in due {
        let outcome = background
            .handle_alarm(&name)
            .await
            .map_err(|e| format!("Alarm '{name}' failed: {e}"))?;
        println!("{name}: {outcome:?}");
    }
    Ok(())
}
