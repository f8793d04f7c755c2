use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches};
use colored::*;
use eyre::{Context, Result, eyre};
use tracing::{debug, info, warn};

use svnwatch::cli::{Cli, Command, DaemonCommand, generate_after_help, get_log_path};
use svnwatch::config::Config;
use svnwatch::daemon::DaemonManager;
use svnwatch::scheduler::{CheckCycleResult, HookOutcome, RepositoryOutcome, Scheduler, ShutdownFlag};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        None => tracing::Level::INFO,
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            other => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
                tracing::Level::INFO
            }
        },
    };

    // Append: hook invocations share the file with a running monitor
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    for warning in config.validate()? {
        warn!("{}", warning);
        eprintln!("{} {}", "Warning:".yellow(), warning);
    }

    match cli.command {
        Some(Command::Monitor) => run_monitor(&config).await,
        Some(Command::Check { json }) => cmd_check(&config, json).await,
        Some(Command::Hook { repository, revision }) => cmd_hook(&config, &repository, revision).await,
        Some(Command::Daemon { command }) => match command {
            DaemonCommand::Start { foreground } => cmd_start(&config, cli.config.as_ref(), foreground).await,
            DaemonCommand::Stop => cmd_stop(),
            DaemonCommand::Status { json } => cmd_status(json),
        },
        Some(Command::RunDaemon) => cmd_run_daemon(&config).await,
        Some(Command::Logs { follow, lines }) => cmd_logs(follow, lines),
        Some(Command::Repos) => cmd_repos(&config),
        None => {
            let mut cmd = Cli::command().after_help(generate_after_help());
            cmd.print_help()?;
            Ok(())
        }
    }
}

/// Set the shutdown flag on SIGINT or SIGTERM
async fn watch_signals(shutdown: ShutdownFlag) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received"),
            _ = sigterm.recv() => warn!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        warn!("Ctrl+C received");
    }

    shutdown.request();
    Ok(())
}

/// Run the polling loop until a signal arrives
async fn run_monitor(config: &Config) -> Result<()> {
    info!("Monitor starting...");
    let shutdown = ShutdownFlag::new();
    let scheduler = Scheduler::from_config(config, shutdown.clone()).context("Failed to initialise scheduler")?;

    let signals = tokio::spawn(watch_signals(shutdown));
    let result = scheduler.run().await;
    signals.abort();

    info!("Monitor shutting down...");
    result
}

/// Run exactly one cycle and print what happened
async fn cmd_check(config: &Config, json: bool) -> Result<()> {
    let scheduler = Scheduler::from_config(config, ShutdownFlag::new()).context("Failed to initialise scheduler")?;
    let result = scheduler.run_cycle().await?;

    if json {
        let summary = serde_json::json!({
            "cycle_id": result.cycle_id.to_string(),
            "started_at": result.started_at.to_rfc3339(),
            "total_repositories": result.total_repositories,
            "checked": result.checked(),
            "with_changes": result.with_changes(),
            "total_changes": result.total_changes(),
            "notification": result.dispatch_label(),
            "outcomes": result.outcomes,
            "committed": result.committed,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_cycle(&result);
    }

    if result.dispatch.as_ref().is_some_and(|d| !d.succeeded()) {
        return Err(eyre!("Notification failed: {}", result.dispatch_label()));
    }
    Ok(())
}

fn print_cycle(result: &CheckCycleResult) {
    println!(
        "Check cycle {} ({} repositories)",
        result.started_at.format("%Y-%m-%d %H:%M:%S"),
        result.total_repositories
    );
    for outcome in &result.outcomes {
        let line = match outcome {
            RepositoryOutcome::Unchanged { revision, .. } => format!("unchanged at r{}", revision).normal(),
            RepositoryOutcome::Changed { from, to, records, .. } => {
                format!("r{} -> r{} ({} changes)", from, to, records).green()
            }
            RepositoryOutcome::Failed { error, .. } => format!("failed: {}", error).red(),
            RepositoryOutcome::Skipped { .. } => "skipped".yellow(),
        };
        println!("  {:<20} {}", outcome.id().cyan(), line);
    }
    println!();
    println!(
        "Changes: {}  Errors: {}  Notification: {}",
        result.total_changes(),
        result.errors().len(),
        result.dispatch_label()
    );
}

/// Single commit from a post-commit hook
async fn cmd_hook(config: &Config, repository: &str, revision: u64) -> Result<()> {
    let scheduler = Scheduler::from_config(config, ShutdownFlag::new()).context("Failed to initialise scheduler")?;

    match scheduler.process_commit(repository, revision).await? {
        HookOutcome::AlreadyProcessed { watermark } => {
            println!("r{} already processed (watermark r{})", revision, watermark);
        }
        HookOutcome::Committed {
            repository,
            revision,
            notified,
        } => {
            let how = if notified { "notification sent" } else { "no notification" };
            println!("{} {} r{} ({})", "✓".green(), repository.cyan(), revision, how);
        }
        HookOutcome::DeliveryFailed { repository, reason } => {
            return Err(eyre!("Notification for {} r{} failed: {}", repository, revision, reason));
        }
    }
    Ok(())
}

async fn cmd_start(config: &Config, config_path: Option<&PathBuf>, foreground: bool) -> Result<()> {
    let daemon = DaemonManager::new();

    if let Some(pid) = daemon.running_pid() {
        println!("svnwatch is already running (PID: {})", pid);
        return Ok(());
    }

    if foreground {
        println!("Starting svnwatch in foreground mode...");
        run_monitor(config).await
    } else {
        let pid = daemon.start(config_path.map(PathBuf::as_path))?;
        println!("svnwatch started (PID: {})", pid);
        Ok(())
    }
}

fn cmd_stop() -> Result<()> {
    let daemon = DaemonManager::new();

    if !daemon.is_running() {
        println!("svnwatch is not running");
        return Ok(());
    }

    let pid = daemon.stop()?;
    println!("svnwatch stopped (was PID: {})", pid);
    Ok(())
}

fn cmd_status(json: bool) -> Result<()> {
    let status = DaemonManager::new().status();

    if json {
        let json = serde_json::json!({
            "running": status.running,
            "pid": status.pid,
            "version": status.version,
            "pid_file": status.pid_file.to_string_lossy()
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("svnwatch Status");
    println!("---------------");
    match status.pid {
        Some(pid) => {
            println!("Status: {}", "running".green());
            println!("PID: {}", pid);
            if let Some(version) = &status.version {
                println!("Version: {}", version);
            }
        }
        None => println!("Status: {}", "stopped".red()),
    }
    println!("PID file: {}", status.pid_file.display());
    Ok(())
}

/// Background process entry point spawned by `daemon start`
async fn cmd_run_daemon(config: &Config) -> Result<()> {
    let daemon = DaemonManager::new();
    daemon.register_self()?;

    let result = run_monitor(config).await;
    if let Err(e) = daemon.unregister() {
        warn!(error = %e, "Failed to remove PID file");
    }
    result
}

fn cmd_logs(follow: bool, lines: usize) -> Result<()> {
    let log_path = get_log_path();

    if !log_path.exists() {
        println!("No log file found at: {}", log_path.display());
        println!("The monitor may not have been started yet.");
        return Ok(());
    }

    if follow {
        println!("Following log file: {} (Ctrl+C to stop)", log_path.display());
        println!();

        let mut child = std::process::Command::new("tail")
            .args(["-f", "-n", &lines.to_string()])
            .arg(&log_path)
            .spawn()
            .context("Failed to run tail -f")?;

        child.wait()?;
    } else {
        let file = fs::File::open(&log_path).context("Failed to open log file")?;
        let all_lines: Vec<String> = BufReader::new(file).lines().map_while(Result::ok).collect();
        let start = all_lines.len().saturating_sub(lines);

        for line in &all_lines[start..] {
            println!("{}", line);
        }
    }

    Ok(())
}

/// Configured repositories with their stored watermarks
fn cmd_repos(config: &Config) -> Result<()> {
    if config.repositories.is_empty() {
        println!("No repositories configured");
        return Ok(());
    }

    let store = revstore::RevisionStore::open(&config.storage.revisions_file).context("Failed to open revision store")?;
    let marks = store.load().context("Failed to load watermarks")?;
    debug!(count = marks.len(), "cmd_repos: loaded watermarks");

    for repo in &config.repositories {
        let watermark = match marks.get(&repo.id) {
            Some(revision) => format!("r{}", revision),
            None => "never checked".to_string(),
        };
        let notify = if repo.notify { "" } else { " [notify off]" };
        println!(
            "{:<20} {:<12} {} ({}, {}){}",
            repo.id.cyan(),
            watermark,
            repo.url,
            repo.display_name(),
            repo.mode,
            notify.yellow()
        );
    }
    Ok(())
}
