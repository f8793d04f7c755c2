//! Normalized change records produced by the log parser

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

/// Display format for commit timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What happened to a path in a revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PathAction {
    Added,
    Modified,
    Deleted,
    Replaced,
}

impl PathAction {
    /// Decode an svn action letter; anything unrecognised counts as a modification
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "A" => Self::Added,
            "D" => Self::Deleted,
            "R" => Self::Replaced,
            _ => Self::Modified,
        }
    }

    pub fn code(&self) -> char {
        match self {
            Self::Added => 'A',
            Self::Modified => 'M',
            Self::Deleted => 'D',
            Self::Replaced => 'R',
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Added => "Added",
            Self::Modified => "Modified",
            Self::Deleted => "Deleted",
            Self::Replaced => "Replaced",
        }
    }
}

impl fmt::Display for PathAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One changed path within a revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathChange {
    pub path: String,
    pub action: PathAction,
}

impl PathChange {
    pub fn new(path: impl Into<String>, action: PathAction) -> Self {
        Self {
            path: path.into(),
            action,
        }
    }
}

/// Overall character of a revision, used to highlight it in mail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Replaced,
    Mixed,
    Empty,
}

impl ChangeKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Added => "Added",
            Self::Modified => "Modified",
            Self::Deleted => "Deleted",
            Self::Replaced => "Replaced",
            Self::Mixed => "Mixed",
            Self::Empty => "None",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Self::Added => "green",
            Self::Modified => "blue",
            Self::Deleted => "red",
            Self::Replaced => "black",
            Self::Mixed => "orange",
            Self::Empty => "grey",
        }
    }
}

/// A single revision as reported by `svn log`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    /// Revision number; 0 only for the synthetic parse-failure record
    pub revision: u64,
    pub author: String,
    /// Commit time formatted with [`TIMESTAMP_FORMAT`]
    pub timestamp: String,
    pub message: String,
    pub paths: Vec<PathChange>,
    /// Owning repository id
    pub repository: String,
}

impl ChangeRecord {
    /// Placeholder returned when a log could not be recovered at all
    pub fn parse_failure(repository: impl Into<String>, detail: &str, timestamp: String) -> Self {
        Self {
            revision: 0,
            author: "unknown".to_string(),
            timestamp,
            message: format!("Unable to parse svn log output: {}", detail),
            paths: Vec::new(),
            repository: repository.into(),
        }
    }

    /// True for the parse-failure placeholder
    pub fn is_synthetic(&self) -> bool {
        self.revision == 0
    }

    /// Classify the revision: any delete wins, several distinct actions are mixed
    pub fn change_kind(&self) -> ChangeKind {
        let actions: BTreeSet<PathAction> = self.paths.iter().map(|p| p.action).collect();

        if actions.is_empty() {
            ChangeKind::Empty
        } else if actions.contains(&PathAction::Deleted) {
            ChangeKind::Deleted
        } else if actions.len() > 1 {
            ChangeKind::Mixed
        } else if actions.contains(&PathAction::Modified) {
            ChangeKind::Modified
        } else if actions.contains(&PathAction::Added) {
            ChangeKind::Added
        } else {
            ChangeKind::Replaced
        }
    }
}
