//! svn subprocess boundary

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::error::VcsError;

/// Options whose following argument is a secret
const SECRET_OPTIONS: &[&str] = &["--username", "--password"];

/// One svn invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Arguments after the program name
    pub args: Vec<String>,
    /// Working directory, if any
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl Invocation {
    pub fn new<I, S>(args: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            timeout,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// svn subcommand (`info`, `log`, ...)
    pub fn subcommand(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("")
    }

    /// Command line safe for logs and error messages
    pub fn display(&self) -> String {
        mask_args(&self.args)
    }
}

/// Render an svn command line with credential values replaced by `***`
///
/// Every place that logs or reports a command goes through here.
pub fn mask_args(args: &[String]) -> String {
    let mut out = Vec::with_capacity(args.len() + 1);
    out.push("svn".to_string());

    let mut mask_next = false;
    for arg in args {
        if mask_next {
            out.push("***".to_string());
            mask_next = false;
            continue;
        }

        if SECRET_OPTIONS.contains(&arg.as_str()) {
            mask_next = true;
            out.push(arg.clone());
        } else if let Some(option) = SECRET_OPTIONS.iter().find(|o| arg.starts_with(&format!("{}=", o))) {
            out.push(format!("{}=***", option));
        } else {
            out.push(arg.clone());
        }
    }

    out.join(" ")
}

/// Something that can run svn and hand back stdout
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the invocation, returning stdout on success
    async fn run(&self, invocation: &Invocation) -> Result<String, VcsError>;
}

/// Runs the real `svn` binary
#[derive(Debug, Clone)]
pub struct SvnProcess {
    binary: PathBuf,
}

impl Default for SvnProcess {
    fn default() -> Self {
        Self::new("svn")
    }
}

impl SvnProcess {
    pub fn new(binary: impl AsRef<Path>) -> Self {
        Self {
            binary: binary.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl CommandRunner for SvnProcess {
    async fn run(&self, invocation: &Invocation) -> Result<String, VcsError> {
        let command = invocation.display();
        debug!(%command, cwd = ?invocation.cwd, "SvnProcess::run: called");

        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(&invocation.args)
            // Keep diagnostics in English so classification is stable
            .env("LC_MESSAGES", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        let output = match tokio::time::timeout(invocation.timeout, cmd.output()).await {
            Ok(Ok(output)) => {
                debug!(status = ?output.status, "SvnProcess::run: command completed");
                output
            }
            Ok(Err(source)) => {
                debug!(%source, "SvnProcess::run: failed to execute command");
                return Err(VcsError::Spawn {
                    program: self.binary.display().to_string(),
                    source,
                });
            }
            Err(_) => {
                debug!("SvnProcess::run: command timed out");
                return Err(VcsError::Timeout {
                    command,
                    timeout: invocation.timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            debug!(stdout_len = stdout.len(), "SvnProcess::run: command succeeded");
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!(exit_code = ?output.status.code(), %stderr, "SvnProcess::run: command failed");
        Err(VcsError::from_failure(command, output.status.code(), stderr))
    }
}
