//! Grouping change records into a single notification

use std::collections::{BTreeMap, BTreeSet};

use lettre::message::Mailbox;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{ChangeRecord, RepositoryDescriptor};

/// Prefix some recipient tables put in front of repository ids
pub const RECIPIENT_PREFIX: &str = "REPO_";

/// Subject line prefix for change mail
pub const SUBJECT_PREFIX: &str = "SVN change notification";

/// What the resolver knows about a configured repository
#[derive(Debug, Clone)]
struct KnownRepository {
    name: String,
    url: String,
    recipients: Vec<String>,
}

/// Finds the recipients for a repository
///
/// Lookup order, first non-empty list wins:
/// 1. the repository's own list, then the table entry for its id
/// 2. the table entry for its display name (or, given a name, for its id)
/// 3. the table entry for `REPO_<id>`
/// 4. the table entry for the id without a `REPO_` prefix
/// 5. every address in the table
/// 6. the global default list
#[derive(Debug, Clone, Default)]
pub struct RecipientResolver {
    table: BTreeMap<String, Vec<String>>,
    defaults: Vec<String>,
    repositories: BTreeMap<String, KnownRepository>,
}

impl RecipientResolver {
    pub fn new(table: BTreeMap<String, Vec<String>>, defaults: Vec<String>) -> Self {
        debug!(entries = table.len(), defaults = defaults.len(), "RecipientResolver::new: called");
        Self {
            table,
            defaults,
            repositories: BTreeMap::new(),
        }
    }

    /// Register names, URLs and per-repository recipients
    pub fn with_repositories(mut self, repositories: &[RepositoryDescriptor]) -> Self {
        for repo in repositories {
            self.repositories.insert(
                repo.id.clone(),
                KnownRepository {
                    name: repo.display_name().to_string(),
                    url: repo.url.clone(),
                    recipients: repo.recipients.clone(),
                },
            );
        }
        self
    }

    /// Display name for an id, the id itself when unknown
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.repositories.get(id).map(|r| r.name.as_str()).unwrap_or(id)
    }

    pub fn url(&self, id: &str) -> Option<&str> {
        self.repositories
            .get(id)
            .map(|r| r.url.as_str())
            .filter(|url| !url.is_empty())
    }

    /// Resolve the recipient list for one repository
    pub fn resolve(&self, id: &str) -> Vec<String> {
        debug!(%id, "RecipientResolver::resolve: called");

        if let Some(own) = self.repositories.get(id).map(|r| clean_recipients(&r.recipients)) {
            if !own.is_empty() {
                debug!(%id, "RecipientResolver::resolve: repository list");
                return own;
            }
        }

        let found = self
            .lookup(id)
            .or_else(|| self.lookup_alias(id))
            .or_else(|| self.lookup(&format!("{}{}", RECIPIENT_PREFIX, id)))
            .or_else(|| id.strip_prefix(RECIPIENT_PREFIX).and_then(|stripped| self.lookup(stripped)));
        if let Some(found) = found {
            return found;
        }

        let union: BTreeSet<String> = self.table.values().flat_map(|v| clean_recipients(v)).collect();
        if !union.is_empty() {
            debug!(%id, count = union.len(), "RecipientResolver::resolve: no specific entry, using every configured address");
            return union.into_iter().collect();
        }

        debug!(%id, "RecipientResolver::resolve: falling back to default recipients");
        clean_recipients(&self.defaults)
    }

    fn lookup(&self, key: &str) -> Option<Vec<String>> {
        self.table
            .get(key)
            .map(|v| clean_recipients(v))
            .filter(|v| !v.is_empty())
            .inspect(|_| debug!(%key, "RecipientResolver::lookup: matched"))
    }

    fn lookup_alias(&self, id: &str) -> Option<Vec<String>> {
        if let Some(known) = self.repositories.get(id) {
            if known.name != id {
                if let Some(found) = self.lookup(&known.name) {
                    return Some(found);
                }
            }
        }

        // The caller may have handed us a display name
        self.repositories
            .iter()
            .filter(|(other, known)| known.name == id && other.as_str() != id)
            .find_map(|(other, _)| self.lookup(other))
    }
}

/// Normalise a recipient list
///
/// Entries may hold several addresses separated by `;` or `,`. Addresses are
/// trimmed, blanks and `nan` are dropped and duplicates removed keeping the
/// first occurrence. Entries that do not parse as a mailbox are dropped with
/// a warning, so one bad address cannot block a whole delivery.
pub fn clean_recipients<S: AsRef<str>>(entries: &[S]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();

    for entry in entries {
        for address in entry.as_ref().split([';', ',']) {
            let address = address.trim();
            if address.is_empty() || address.eq_ignore_ascii_case("nan") {
                continue;
            }
            if let Err(e) = address.parse::<Mailbox>() {
                warn!(%address, error = %e, "Dropping invalid recipient address");
                continue;
            }
            if seen.insert(address.to_string()) {
                out.push(address.to_string());
            }
        }
    }

    out
}

/// Records of one repository inside a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositorySection {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
    pub records: Vec<ChangeRecord>,
}

impl RepositorySection {
    /// `id (name)`, or just the id when both are the same
    pub fn label(&self) -> String {
        if self.name.is_empty() || self.name == self.id {
            self.id.clone()
        } else {
            format!("{} ({})", self.id, self.name)
        }
    }
}

/// One combined notification for a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    pub subject: String,
    pub sections: Vec<RepositorySection>,
    pub recipients: Vec<String>,
    pub total_changes: usize,
}

impl NotificationPayload {
    pub fn is_empty(&self) -> bool {
        self.total_changes == 0
    }

    pub fn repository_ids(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.id.as_str()).collect()
    }
}

/// Group records by repository and work out subject and recipients
///
/// Repositories keep the order in which they first appear, records keep
/// their order within a repository.
pub fn aggregate(records: &[ChangeRecord], resolver: &RecipientResolver) -> NotificationPayload {
    debug!(records = records.len(), "aggregate: called");
    let mut sections: Vec<RepositorySection> = Vec::new();

    for record in records {
        match sections.iter_mut().find(|s| s.id == record.repository) {
            Some(section) => section.records.push(record.clone()),
            None => sections.push(RepositorySection {
                id: record.repository.clone(),
                name: resolver.display_name(&record.repository).to_string(),
                url: resolver.url(&record.repository).map(str::to_string),
                records: vec![record.clone()],
            }),
        }
    }

    let resolved: Vec<String> = sections.iter().flat_map(|s| resolver.resolve(&s.id)).collect();
    let recipients = clean_recipients(&resolved);

    NotificationPayload {
        subject: subject_for(&sections, records.len()),
        sections,
        recipients,
        total_changes: records.len(),
    }
}

fn subject_for(sections: &[RepositorySection], total: usize) -> String {
    match sections {
        [only] => format!("{} - {} ({})", SUBJECT_PREFIX, only.label(), changes(total)),
        _ => {
            let labels: Vec<String> = sections.iter().map(RepositorySection::label).collect();
            format!(
                "{} - {} across {} repositories ({})",
                SUBJECT_PREFIX,
                changes(total),
                sections.len(),
                labels.join(", ")
            )
        }
    }
}

fn changes(n: usize) -> String {
    if n == 1 {
        "1 change".to_string()
    } else {
        format!("{} changes", n)
    }
}
