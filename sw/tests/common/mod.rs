//! Scripted svn and mail fakes shared by the integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use svnwatch::domain::RepositoryDescriptor;
use svnwatch::notify::{
    MailTransport, NotificationDispatcher, OutgoingMail, RecipientResolver, RetryPolicy, TransportError,
};
use svnwatch::scheduler::Scheduler;
use svnwatch::vcs::{ClientOptions, CommandRunner, Invocation, RepositoryClient, VcsError};
use tempfile::TempDir;

pub const SENDER: &str = "svnwatch@example.com";
pub const TEAM: &str = "team@example.com";

#[derive(Debug, Default, Clone)]
struct FakeRepository {
    head: u64,
    malformed: BTreeSet<u64>,
    /// Revisions whose single-revision query fails; ranges covering them come back empty
    failing: BTreeSet<u64>,
    unreachable: bool,
}

/// In-memory stand-in for the svn binary, keyed by repository URL
#[derive(Default)]
pub struct FakeSvn {
    repositories: Mutex<BTreeMap<String, FakeRepository>>,
    calls: Mutex<Vec<Invocation>>,
}

impl FakeSvn {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_head(&self, url: &str, head: u64) {
        self.repositories.lock().unwrap().entry(url.to_string()).or_default().head = head;
    }

    /// Make the log entry for `revision` unparseable
    pub fn corrupt(&self, url: &str, revision: u64) {
        self.repositories
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .malformed
            .insert(revision);
    }

    pub fn fail_revision(&self, url: &str, revision: u64) {
        self.repositories
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .failing
            .insert(revision);
    }

    pub fn set_unreachable(&self, url: &str, unreachable: bool) {
        self.repositories.lock().unwrap().entry(url.to_string()).or_default().unreachable = unreachable;
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, subcommand: &str) -> usize {
        self.calls().iter().filter(|c| c.subcommand() == subcommand).count()
    }

    fn log_document(repo: &FakeRepository, range: &str) -> String {
        let (start, end) = match range.split_once(':') {
            Some((a, b)) => (a.parse::<u64>().unwrap(), b.parse::<u64>().unwrap()),
            None => {
                let rev = range.parse::<u64>().unwrap();
                (rev, rev)
            }
        };

        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<log>\n");
        for revision in start..=end.min(repo.head) {
            if repo.malformed.contains(&revision) {
                out.push_str(&format!(
                    "<logentry revision=\"{}\"><author>bob</author><msg>broken</logentry>\n",
                    revision
                ));
            } else {
                out.push_str(&log_entry(revision));
            }
        }
        out.push_str("</log>\n");
        out
    }
}

/// A well-formed verbose log entry
pub fn log_entry(revision: u64) -> String {
    format!(
        "<logentry revision=\"{rev}\">\n\
         <author>alice</author>\n\
         <date>2024-05-01T10:{min:02}:00.000000Z</date>\n\
         <paths>\n\
         <path action=\"M\" kind=\"file\">/trunk/src/file{rev}.c</path>\n\
         </paths>\n\
         <msg>change {rev}</msg>\n\
         </logentry>\n",
        rev = revision,
        min = revision % 60
    )
}

#[async_trait]
impl CommandRunner for FakeSvn {
    async fn run(&self, invocation: &Invocation) -> Result<String, VcsError> {
        self.calls.lock().unwrap().push(invocation.clone());

        let url = invocation.args.get(1).cloned().unwrap_or_default();
        let repo = self
            .repositories
            .lock()
            .unwrap()
            .get(&url)
            .cloned()
            .ok_or_else(|| VcsError::NotFound {
                command: invocation.display(),
                stderr: format!("svn: E170000: URL '{}' doesn't exist", url),
            })?;

        if repo.unreachable {
            return Err(VcsError::CommandFailed {
                command: invocation.display(),
                code: Some(1),
                stderr: "svn: E170013: Unable to connect to a repository".to_string(),
            });
        }

        match invocation.subcommand() {
            "info" => Ok(format!("{}\n", repo.head)),
            "log" => {
                let pos = invocation.args.iter().position(|a| a == "-r").unwrap();
                let range = &invocation.args[pos + 1];
                match range.split_once(':') {
                    Some((a, b)) => {
                        let (a, b) = (a.parse::<u64>().unwrap(), b.parse::<u64>().unwrap());
                        if repo.failing.range(a..=b).next().is_some() {
                            return Ok(String::new());
                        }
                    }
                    None => {
                        if repo.failing.contains(&range.parse::<u64>().unwrap()) {
                            return Err(VcsError::CommandFailed {
                                command: invocation.display(),
                                code: Some(1),
                                stderr: "svn: E175002: Unexpected HTTP status 500".to_string(),
                            });
                        }
                    }
                }
                Ok(Self::log_document(&repo, range))
            }
            other => panic!("unexpected svn subcommand {}", other),
        }
    }
}

/// Mail transport that records every message and replays scripted failures
#[derive(Default)]
pub struct RecordingMailer {
    script: Mutex<VecDeque<TransportError>>,
    attempts: Mutex<usize>,
    sent: Mutex<Vec<OutgoingMail>>,
}

impl RecordingMailer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `times` attempts fail with a connection error
    pub fn fail_next(&self, times: usize) {
        let mut script = self.script.lock().unwrap();
        for _ in 0..times {
            script.push_back(TransportError::Connection("connection refused".to_string()));
        }
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError> {
        *self.attempts.lock().unwrap() += 1;
        if let Some(error) = self.script.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        backoff: Duration::ZERO,
        attempt_timeout: Duration::from_secs(5),
    }
}

/// Scheduler over the fakes with a watermark file inside `temp`
pub fn scheduler(
    temp: &TempDir,
    repositories: Vec<RepositoryDescriptor>,
    svn: &Arc<FakeSvn>,
    mailer: &Arc<RecordingMailer>,
) -> Scheduler {
    let client = RepositoryClient::new(
        svn.clone(),
        ClientOptions {
            page_size: 2,
            page_delay: Duration::ZERO,
            ..Default::default()
        },
    );
    let store = revstore::RevisionStore::open(temp.path().join("last_revisions.json")).unwrap();
    let dispatcher = NotificationDispatcher::new(mailer.clone(), SENDER).with_policy(fast_policy());
    let resolver = RecipientResolver::new(BTreeMap::new(), vec![TEAM.to_string()]).with_repositories(&repositories);

    Scheduler::new(repositories, client, store, dispatcher).with_resolver(resolver)
}

/// Watermark file used by [`scheduler`]
pub fn store(temp: &TempDir) -> revstore::RevisionStore {
    revstore::RevisionStore::open(temp.path().join("last_revisions.json")).unwrap()
}
