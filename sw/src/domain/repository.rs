//! Repository descriptors loaded from configuration

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Username/password pair handed to svn
///
/// `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Build a pair only when both halves are present and non-empty
    pub fn from_parts(username: Option<&str>, password: Option<&str>) -> Option<Self> {
        match (username, password) {
            (Some(u), Some(p)) if !u.trim().is_empty() && !p.is_empty() => Some(Self::new(u.trim(), p)),
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// How new revisions are discovered for a repository
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Maintain a working copy and query it
    Local,
    /// Query the repository URL directly
    #[default]
    Remote,
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// One watched repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    /// Stable identifier, key of the watermark store
    pub id: String,

    /// Human readable name, falls back to the id
    #[serde(default)]
    pub name: String,

    /// Repository URL (or local repository path for hooks)
    pub url: String,

    /// Per-repository svn credentials
    #[serde(default)]
    pub credentials: Option<Credentials>,

    /// Seconds between checks
    #[serde(rename = "poll-interval-secs", default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Whether new revisions produce a notification
    #[serde(default = "default_notify")]
    pub notify: bool,

    #[serde(default)]
    pub mode: DetectionMode,

    /// Working copy directory for local mode
    #[serde(rename = "working-copy", default)]
    pub working_copy: Option<PathBuf>,

    /// Recipients for this repository only
    #[serde(default)]
    pub recipients: Vec<String>,
}

fn default_poll_interval() -> u64 {
    crate::DEFAULT_POLL_INTERVAL_SECS
}

fn default_notify() -> bool {
    true
}

impl RepositoryDescriptor {
    /// Minimal remote-mode descriptor
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            url: url.into(),
            credentials: None,
            poll_interval_secs: default_poll_interval(),
            notify: true,
            mode: DetectionMode::Remote,
            working_copy: None,
            recipients: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_notify(mut self, notify: bool) -> Self {
        self.notify = notify;
        self
    }

    pub fn with_mode(mut self, mode: DetectionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_working_copy(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_copy = Some(path.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    pub fn with_recipients<I, S>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recipients = recipients.into_iter().map(Into::into).collect();
        self
    }

    /// Name shown in mail and logs
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() { &self.id } else { &self.name }
    }

    /// Fill in a working copy under `root` for local-mode repositories without one
    pub fn resolve_working_copy(&mut self, root: &Path) {
        if self.mode == DetectionMode::Local && self.working_copy.is_none() {
            self.working_copy = Some(root.join(&self.id));
        }
    }

    /// Whether a hook-supplied repository path refers to this repository
    pub fn matches_path(&self, path: &str) -> bool {
        self.path_match(path).is_some()
    }

    /// How closely a hook-supplied path matches the URL or working copy
    ///
    /// `/srv/svn/proj` is a segment match for `file:///srv/svn/proj`; plain
    /// substring containment in either direction is the weakest match.
    pub fn path_match(&self, path: &str) -> Option<PathMatch> {
        let path = path.trim().trim_end_matches('/');
        if path.is_empty() {
            return None;
        }

        let mut candidates = vec![self.url.trim_end_matches('/').to_string()];
        if let Some(wc) = &self.working_copy {
            candidates.push(wc.to_string_lossy().trim_end_matches('/').to_string());
        }

        candidates
            .iter()
            .filter(|c| !c.is_empty())
            .filter_map(|c| {
                if c == path {
                    Some(PathMatch::Exact)
                } else if contains_segments(c, path) || contains_segments(path, c) {
                    Some(PathMatch::Segment)
                } else if c.contains(path) || path.contains(c.as_str()) {
                    Some(PathMatch::Contains)
                } else {
                    None
                }
            })
            .max()
    }
}

/// Strength of a hook path match, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PathMatch {
    Contains,
    Segment,
    Exact,
}

/// `needle` occurs in `haystack` bounded by separators on both sides
fn contains_segments(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        matches!(before, None | Some('/') | Some(':')) && matches!(after, None | Some('/'))
    })
}
