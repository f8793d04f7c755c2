//! Results produced by a check cycle

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{ChangeRecord, TIMESTAMP_FORMAT};
use crate::notify::{Delivery, ErrorLine, RecipientResolver, RepositoryStatus, StatusReport};

/// New revisions seen in one repository, proposed for commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub repository: String,
    /// Watermark at the start of the check
    pub from: u64,
    /// Latest revision, the proposed new watermark
    pub to: u64,
    pub records: Vec<ChangeRecord>,
    /// Whether the repository wants a notification
    pub notify: bool,
}

impl Detection {
    pub fn new_revisions(&self) -> u64 {
        self.to.saturating_sub(self.from)
    }

    /// Commit without waiting for a notification
    ///
    /// Holds when notification is off, or when the complete log for the range
    /// had no entries. A log that could not be fetched never becomes a
    /// `Detection`.
    pub fn commits_immediately(&self) -> bool {
        !self.notify || self.records.is_empty()
    }
}

/// What happened to one repository in a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RepositoryOutcome {
    /// Latest revision equals the watermark
    Unchanged { id: String, revision: u64 },
    /// New revisions were found
    Changed { id: String, from: u64, to: u64, records: usize },
    /// The check failed
    Failed { id: String, error: String },
    /// Not checked because shutdown was requested
    Skipped { id: String },
}

impl RepositoryOutcome {
    pub fn id(&self) -> &str {
        match self {
            Self::Unchanged { id, .. } | Self::Changed { id, .. } | Self::Failed { id, .. } | Self::Skipped { id } => id,
        }
    }
}

/// Summary of one cycle, feeds the status report
#[derive(Debug, Clone)]
pub struct CheckCycleResult {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub total_repositories: usize,
    pub outcomes: Vec<RepositoryOutcome>,
    /// `None` when nothing needed a notification
    pub dispatch: Option<Delivery>,
    /// Watermarks written during this cycle
    pub committed: revstore::Watermarks,
}

impl CheckCycleResult {
    pub fn new(total_repositories: usize) -> Self {
        Self {
            cycle_id: Uuid::now_v7(),
            started_at: Utc::now(),
            total_repositories,
            outcomes: Vec::new(),
            dispatch: None,
            committed: revstore::Watermarks::new(),
        }
    }

    /// Repositories actually checked (skipped ones excluded)
    pub fn checked(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !matches!(o, RepositoryOutcome::Skipped { .. }))
            .count()
    }

    pub fn with_changes(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, RepositoryOutcome::Changed { .. }))
            .count()
    }

    pub fn total_changes(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o {
                RepositoryOutcome::Changed { records, .. } => *records,
                _ => 0,
            })
            .sum()
    }

    pub fn errors(&self) -> Vec<(&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                RepositoryOutcome::Failed { id, error } => Some((id.as_str(), error.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Outcome of the notification, as shown to people
    pub fn dispatch_label(&self) -> String {
        match &self.dispatch {
            Some(delivery) => delivery.to_string(),
            None => "not needed".to_string(),
        }
    }

    pub fn status_report(&self, resolver: &RecipientResolver) -> StatusReport {
        let repositories = self
            .outcomes
            .iter()
            .map(|o| {
                let name = resolver.display_name(o.id());
                match o {
                    RepositoryOutcome::Changed { records, .. } => RepositoryStatus::changed(o.id(), name, *records),
                    RepositoryOutcome::Failed { .. } => RepositoryStatus::failed(o.id(), name),
                    RepositoryOutcome::Skipped { .. } => RepositoryStatus {
                        status: "Skipped".to_string(),
                        color: "grey",
                        ..RepositoryStatus::ok(o.id(), name)
                    },
                    RepositoryOutcome::Unchanged { .. } => RepositoryStatus::ok(o.id(), name),
                }
            })
            .collect();

        StatusReport {
            check_time: self.started_at.format(TIMESTAMP_FORMAT).to_string(),
            total_repositories: self.total_repositories,
            checked: self.checked(),
            with_changes: self.with_changes(),
            total_changes: self.total_changes(),
            dispatch: self.dispatch_label(),
            repositories,
            errors: self
                .errors()
                .into_iter()
                .map(|(repository, message)| ErrorLine {
                    repository: repository.to_string(),
                    message: message.to_string(),
                })
                .collect(),
        }
    }
}
