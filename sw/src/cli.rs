//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::daemon::DaemonManager;

/// svnwatch - Subversion change notifier
#[derive(Parser)]
#[command(
    name = "sw",
    about = "Watches Subversion repositories and mails a summary of new commits",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the polling loop in the foreground until interrupted
    Monitor,

    /// Run exactly one check cycle and print its summary
    Check {
        /// Print the cycle summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Process a single commit (for use from a post-commit hook)
    Hook {
        /// Repository path or URL as passed to the hook
        #[arg(long)]
        repository: String,

        /// Committed revision
        #[arg(short = 'r', long)]
        revision: u64,
    },

    /// Manage the background monitor
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Internal: Run as daemon process (used by `daemon start`)
    #[command(hide = true)]
    RunDaemon,

    /// Show monitor logs
    Logs {
        /// Follow log output (like tail -f)
        #[arg(short, long)]
        follow: bool,

        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },

    /// List configured repositories with their watermarks
    Repos,
}

/// Daemon management subcommands
#[derive(Debug, Subcommand)]
pub enum DaemonCommand {
    /// Start the monitor in the background
    Start {
        /// Don't fork to background (run in foreground)
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the background monitor
    Stop,

    /// Check whether the background monitor is running
    Status {
        /// Print status as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Result of checking a required tool
pub struct ToolCheck {
    pub name: &'static str,
    pub available: bool,
    pub version: Option<String>,
}

impl ToolCheck {
    /// Run `name` with `version_args` and keep the first version-like word
    pub fn check(name: &'static str, version_args: &[&str]) -> Self {
        debug!(name, ?version_args, "ToolCheck::check: called");
        match std::process::Command::new(name).args(version_args).output() {
            Ok(output) if output.status.success() => Self {
                name,
                available: true,
                version: Some(parse_version(&String::from_utf8_lossy(&output.stdout))),
            },
            _ => {
                debug!(name, "ToolCheck::check: tool not available");
                Self {
                    name,
                    available: false,
                    version: None,
                }
            }
        }
    }
}

/// First dotted number in the output, or "unknown"
fn parse_version(output: &str) -> String {
    output
        .split_whitespace()
        .map(|word| word.trim_start_matches('v'))
        .filter(|word| word.starts_with(|c: char| c.is_ascii_digit()))
        .map(|word| {
            word.chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect::<String>()
        })
        .find(|version| !version.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("svnwatch")
        .join("logs")
        .join("svnwatch.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Generate the after_help text with the svn check and daemon status
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    let svn = ToolCheck::check("svn", &["--version", "--quiet"]);
    let daemon_running = DaemonManager::new().is_running();

    let mut help = String::new();

    help.push_str("Required Tools:\n");
    let icon = if svn.available { "\u{2705}" } else { "\u{274C}" };
    let version = svn.version.as_deref().unwrap_or("not found");
    help.push_str(&format!("  {} {:<10} {}\n", icon, svn.name, version));

    help.push('\n');
    help.push_str("Daemon:\n");
    let (icon, status) = if daemon_running {
        ("\u{2705}", "running")
    } else {
        ("\u{274C}", "stopped")
    };
    help.push_str(&format!("  {} {}\n", icon, status));

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));
    help
}
