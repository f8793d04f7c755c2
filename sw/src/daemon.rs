//! Background monitor process management
//!
//! Handles the PID and version files and process control for `sw daemon`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use eyre::{Context, Result, eyre};
use tracing::{debug, info, warn};

/// Version recorded by the running monitor
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long `stop` waits for SIGTERM to take effect before SIGKILL
const STOP_GRACE: Duration = Duration::from_secs(10);
const STOP_POLL: Duration = Duration::from_millis(100);

fn runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("svnwatch")
}

/// PID file manager for the background monitor
#[derive(Debug)]
pub struct DaemonManager {
    pid_file: PathBuf,
    version_file: PathBuf,
}

/// Daemon status information
#[derive(Debug)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub version: Option<String>,
    pub pid_file: PathBuf,
}

impl Default for DaemonManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonManager {
    /// Manager using `<runtime dir>/svnwatch/svnwatch.pid`
    pub fn new() -> Self {
        Self::with_pid_file(runtime_dir().join("svnwatch.pid"))
    }

    /// Manager with a custom PID file, the version file sits next to it
    pub fn with_pid_file(pid_file: PathBuf) -> Self {
        debug!(?pid_file, "DaemonManager::with_pid_file: called");
        let version_file = pid_file.with_extension("version");
        Self { pid_file, version_file }
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    pub fn is_running(&self) -> bool {
        self.running_pid().is_some()
    }

    /// PID from the PID file, only if that process is still alive
    pub fn running_pid(&self) -> Option<u32> {
        let pid = self.read_pid().filter(|&pid| is_process_running(pid));
        debug!(?pid, "DaemonManager::running_pid: returning");
        pid
    }

    fn read_pid(&self) -> Option<u32> {
        fs::read_to_string(&self.pid_file).ok()?.trim().parse().ok()
    }

    pub fn read_version(&self) -> Option<String> {
        fs::read_to_string(&self.version_file)
            .ok()
            .map(|v| v.trim().to_string())
    }

    fn write_file(path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context(format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, contents).context(format!("Failed to write {}", path.display()))
    }

    fn remove_file(path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path).context(format!("Failed to remove {}", path.display()))?;
            debug!(?path, "Removed file");
        }
        Ok(())
    }

    /// Spawn `sw run-daemon` detached and record its PID
    pub fn start(&self, config: Option<&Path>) -> Result<u32> {
        debug!("DaemonManager::start: called");
        if let Some(pid) = self.running_pid() {
            return Err(eyre!("Monitor already running with PID {}", pid));
        }

        let exe = std::env::current_exe().context("Failed to get current executable")?;
        let mut command = Command::new(&exe);
        if let Some(path) = config {
            command.arg("--config").arg(path);
        }
        let child = command
            .arg("run-daemon")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn monitor process")?;

        let pid = child.id();
        Self::write_file(&self.pid_file, &pid.to_string())?;
        info!(pid, "Monitor started");
        Ok(pid)
    }

    /// SIGTERM the monitor, escalating to SIGKILL after the grace period
    pub fn stop(&self) -> Result<u32> {
        debug!("DaemonManager::stop: called");
        let pid = self.running_pid().ok_or_else(|| eyre!("Monitor is not running"))?;

        info!(pid, "Stopping monitor");
        send_signal(pid, Signal::Terminate)?;

        let mut waited = Duration::ZERO;
        while is_process_running(pid) && waited < STOP_GRACE {
            std::thread::sleep(STOP_POLL);
            waited += STOP_POLL;
        }

        if is_process_running(pid) {
            warn!(pid, "Monitor did not stop gracefully, sending SIGKILL");
            let _ = send_signal(pid, Signal::Kill);
        }

        Self::remove_file(&self.pid_file)?;
        Self::remove_file(&self.version_file)?;
        info!(pid, "Monitor stopped");
        Ok(pid)
    }

    /// Record the current process as the monitor
    pub fn register_self(&self) -> Result<()> {
        let pid = std::process::id();
        Self::write_file(&self.pid_file, &pid.to_string())?;
        Self::write_file(&self.version_file, VERSION)?;
        info!(pid, version = VERSION, "Monitor registered");
        Ok(())
    }

    /// Remove the PID and version files on a clean exit
    pub fn unregister(&self) -> Result<()> {
        if self.read_pid() == Some(std::process::id()) {
            Self::remove_file(&self.pid_file)?;
            Self::remove_file(&self.version_file)?;
        }
        Ok(())
    }

    pub fn status(&self) -> DaemonStatus {
        let pid = self.running_pid();
        DaemonStatus {
            running: pid.is_some(),
            pid,
            version: pid.and_then(|_| self.read_version()),
            pid_file: self.pid_file.clone(),
        }
    }
}

enum Signal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: Signal) -> Result<()> {
    use nix::sys::signal::{Signal as NixSignal, kill};
    use nix::unistd::Pid;

    let sig = match signal {
        Signal::Terminate => NixSignal::SIGTERM,
        Signal::Kill => NixSignal::SIGKILL,
    };
    kill(Pid::from_raw(pid as i32), sig).context(format!("Failed to send {} to {}", sig, pid))
}

#[cfg(not(unix))]
fn send_signal(pid: u32, _signal: Signal) -> Result<()> {
    Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F"])
        .output()
        .context("Failed to kill process")?;
    Ok(())
}

/// Signal 0 checks that the process exists without touching it
#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    true
}
