//! svn error types and failure classification

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to svn
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("Working copy is locked: {command}: {stderr}")]
    LockConflict { command: String, stderr: String },

    #[error("Timeout after {timeout:?}: {command}")]
    Timeout { command: String, timeout: Duration },

    #[error("Authentication failed: {command}: {stderr}")]
    AuthFailure { command: String, stderr: String },

    #[error("Repository path not found: {command}: {stderr}")]
    NotFound { command: String, stderr: String },

    #[error("svn exited with {code:?}: {command}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected svn output: {0}")]
    InvalidOutput(String),

    #[error("Repository {0} has no URL configured")]
    MissingUrl(String),

    #[error("Repository {0} has no working copy path")]
    MissingWorkingCopy(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl VcsError {
    /// Build the right variant for a non-zero svn exit
    pub fn from_failure(command: String, code: Option<i32>, stderr: String) -> Self {
        match classify_failure(&stderr) {
            FailureKind::Lock => Self::LockConflict { command, stderr },
            FailureKind::Auth => Self::AuthFailure { command, stderr },
            FailureKind::NotFound => Self::NotFound { command, stderr },
            FailureKind::Other => Self::CommandFailed { command, code, stderr },
        }
    }

    /// Check if this is a working-copy lock that cleanup may clear
    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, VcsError::LockConflict { .. })
    }

    /// Check if a later attempt could succeed without operator action
    pub fn is_retryable(&self) -> bool {
        match self {
            VcsError::LockConflict { .. } => true,
            VcsError::Timeout { .. } => true,
            VcsError::CommandFailed { .. } => true,
            VcsError::AuthFailure { .. } => false,
            VcsError::NotFound { .. } => false,
            VcsError::Spawn { .. } => false,
            VcsError::InvalidOutput(_) => false,
            VcsError::MissingUrl(_) => false,
            VcsError::MissingWorkingCopy(_) => false,
            VcsError::Io { .. } => false,
        }
    }
}

/// Coarse category of an svn diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Lock,
    Auth,
    NotFound,
    Other,
}

/// svn error codes, checked before any message text
const LOCK_CODES: &[&str] = &["E155004", "E155037", "E200033"];
const AUTH_CODES: &[&str] = &["E170001", "E215004"];
const NOT_FOUND_CODES: &[&str] = &["E155007", "E160013", "E170000", "E195012"];

/// Message fragments for diagnostics that carry no code (lowercase)
///
/// Only working-copy locks count. Repository path locks ("is already locked
/// by user") are not something cleanup can clear.
const LOCK_FRAGMENTS: &[&str] = &[
    "svn cleanup",
    "run 'cleanup'",
    "previous operation has not finished",
    "already-locked dir",
    "' locked",
];
const AUTH_FRAGMENTS: &[&str] = &[
    "authorization failed",
    "authentication failed",
    "no more credentials",
];
const NOT_FOUND_FRAGMENTS: &[&str] = &["is not a working copy", "path not found", "non-existent"];

/// Map svn stderr to a failure category
///
/// svn is always spawned with `LC_MESSAGES=C`, so the English fragments
/// apply; error codes are locale independent and win when present.
pub fn classify_failure(stderr: &str) -> FailureKind {
    let has_code = |codes: &[&str]| codes.iter().any(|code| stderr.contains(code));
    if has_code(LOCK_CODES) {
        return FailureKind::Lock;
    }
    if has_code(AUTH_CODES) {
        return FailureKind::Auth;
    }
    if has_code(NOT_FOUND_CODES) {
        return FailureKind::NotFound;
    }

    let lower = stderr.to_lowercase();
    let has_fragment = |fragments: &[&str]| fragments.iter().any(|f| lower.contains(f));
    if has_fragment(LOCK_FRAGMENTS) {
        FailureKind::Lock
    } else if has_fragment(AUTH_FRAGMENTS) {
        FailureKind::Auth
    } else if has_fragment(NOT_FOUND_FRAGMENTS) {
        FailureKind::NotFound
    } else {
        FailureKind::Other
    }
}
