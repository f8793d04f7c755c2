//! Operational mail: per-cycle status report and startup notice

use serde::Serialize;

/// Subject prefix for the status report
pub const STATUS_SUBJECT_PREFIX: &str = "svnwatch status report";

/// Subject prefix for the startup notice
pub const STARTUP_SUBJECT_PREFIX: &str = "svnwatch started";

/// Outcome of one repository in a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryStatus {
    pub id: String,
    pub name: String,
    pub status: String,
    pub color: &'static str,
}

impl RepositoryStatus {
    pub fn ok(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: "OK".to_string(),
            color: "green",
        }
    }

    pub fn changed(id: impl Into<String>, name: impl Into<String>, count: usize) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: format!("{} new", count),
            color: "orange",
        }
    }

    pub fn failed(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: "Error".to_string(),
            color: "red",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorLine {
    pub repository: String,
    pub message: String,
}

/// Everything the status templates need
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub check_time: String,
    pub total_repositories: usize,
    pub checked: usize,
    pub with_changes: usize,
    pub total_changes: usize,
    /// Human readable notification outcome
    pub dispatch: String,
    pub repositories: Vec<RepositoryStatus>,
    pub errors: Vec<ErrorLine>,
}

impl StatusReport {
    pub fn subject(&self) -> String {
        format!("{} - {}", STATUS_SUBJECT_PREFIX, self.check_time)
    }

    /// One line for the log, always written
    pub fn summary(&self) -> String {
        format!(
            "checked {}/{} repositories, {} with changes, {} changes, {} errors, notification {}",
            self.checked,
            self.total_repositories,
            self.with_changes,
            self.total_changes,
            self.errors.len(),
            self.dispatch
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchedRepository {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// Context for the startup notice
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartupNotice {
    pub started_at: String,
    pub host: String,
    pub version: String,
    pub count: usize,
    pub repositories: Vec<WatchedRepository>,
}

impl StartupNotice {
    pub fn new(started_at: impl Into<String>, host: impl Into<String>, repositories: Vec<WatchedRepository>) -> Self {
        Self {
            started_at: started_at.into(),
            host: host.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            count: repositories.len(),
            repositories,
        }
    }

    pub fn subject(&self) -> String {
        format!("{} - {}", STARTUP_SUBJECT_PREFIX, self.started_at)
    }
}
