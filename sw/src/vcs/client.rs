//! Repository client: latest revision and paged log retrieval

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::command::{CommandRunner, Invocation};
use super::error::VcsError;
use super::working_copy;
use crate::domain::{Credentials, DetectionMode, RepositoryDescriptor};

/// Certificate problems svn is told to accept when trust is enabled
pub const TRUSTED_CERT_FAILURES: &str = "unknown-ca,cn-mismatch,expired,not-yet-valid,other";

/// Revisions requested per `svn log` call
pub const DEFAULT_PAGE_SIZE: u64 = 500;

/// Knobs for the repository client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Revisions per log page
    pub page_size: u64,
    /// Pause between log pages
    pub page_delay: Duration,
    /// Timeout for info/log/cleanup/update
    pub command_timeout: Duration,
    /// Timeout for a fresh checkout
    pub checkout_timeout: Duration,
    /// Pass `--trust-server-cert-failures`
    pub trust_server_cert: bool,
    /// Fallback when a repository has no credentials of its own
    pub credentials: Option<Credentials>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: Duration::from_millis(500),
            command_timeout: Duration::from_secs(60),
            checkout_timeout: Duration::from_secs(1800),
            trust_server_cert: true,
            credentials: None,
        }
    }
}

/// Where log queries are pointed
#[derive(Debug, Clone)]
enum LogTarget {
    Url(String),
    WorkingCopy(PathBuf),
}

/// Talks to one or more repositories through a [`CommandRunner`]
pub struct RepositoryClient {
    runner: Arc<dyn CommandRunner>,
    options: ClientOptions,
}

impl RepositoryClient {
    pub fn new(runner: Arc<dyn CommandRunner>, options: ClientOptions) -> Self {
        debug!(?options, "RepositoryClient::new: called");
        Self { runner, options }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Latest revision of the repository
    ///
    /// Local mode brings the working copy up to date first.
    pub async fn latest_revision(&self, repo: &RepositoryDescriptor) -> Result<u64, VcsError> {
        debug!(repo = %repo.id, mode = %repo.mode, "RepositoryClient::latest_revision: called");
        let output = match repo.mode {
            DetectionMode::Remote => {
                let url = require_url(repo)?;
                let args = vec!["info".to_string(), url.to_string(), "--show-item".into(), "revision".into()];
                self.run(repo, args, None, self.options.command_timeout).await?
            }
            DetectionMode::Local => {
                let wc = self.ensure_working_copy(repo).await?;
                let args = vec!["info".to_string(), "--show-item".into(), "revision".into()];
                self.run(repo, args, Some(&wc), self.options.command_timeout).await?
            }
        };

        let revision = parse_revision(&output)?;
        debug!(repo = %repo.id, revision, "RepositoryClient::latest_revision: returning");
        Ok(revision)
    }

    /// Raw `svn log --xml` output covering revisions `from + 1 ..= to`
    ///
    /// The range is fetched in pages. An empty page is re-queried one revision
    /// at a time; a failing page aborts so the caller never advances past
    /// revisions it has not seen.
    pub async fn changes_between(
        &self,
        repo: &RepositoryDescriptor,
        from: u64,
        to: u64,
    ) -> Result<Vec<String>, VcsError> {
        debug!(repo = %repo.id, from, to, "RepositoryClient::changes_between: called");
        if to <= from {
            return Ok(Vec::new());
        }

        let target = match repo.mode {
            DetectionMode::Remote => LogTarget::Url(require_url(repo)?.to_string()),
            DetectionMode::Local => LogTarget::WorkingCopy(self.ensure_working_copy(repo).await?),
        };

        let page_size = self.options.page_size.max(1);
        let mut chunks = Vec::new();
        let mut start = from + 1;

        while start <= to {
            let end = start.saturating_add(page_size - 1).min(to);
            debug!(repo = %repo.id, start, end, "Fetching log page");

            let output = self.log(repo, &target, &format!("{}:{}", start, end)).await?;
            if output.trim().is_empty() {
                warn!(repo = %repo.id, start, end, "Empty log page, querying revisions individually");
                self.fetch_individually(repo, &target, start, end, &mut chunks).await?;
            } else {
                chunks.push(output);
            }

            if end >= to {
                break;
            }
            start = end + 1;
            if !self.options.page_delay.is_zero() {
                tokio::time::sleep(self.options.page_delay).await;
            }
        }

        info!(repo = %repo.id, from, to, chunks = chunks.len(), "Fetched log");
        Ok(chunks)
    }

    /// Query `start..=end` one revision at a time
    ///
    /// A revision with no output has no entry and is skipped. A failing query
    /// aborts the whole fetch, so the watermark never passes a revision that
    /// was not seen.
    async fn fetch_individually(
        &self,
        repo: &RepositoryDescriptor,
        target: &LogTarget,
        start: u64,
        end: u64,
        chunks: &mut Vec<String>,
    ) -> Result<(), VcsError> {
        for revision in start..=end {
            match self.log(repo, target, &revision.to_string()).await {
                Ok(output) if !output.trim().is_empty() => chunks.push(output),
                Ok(_) => debug!(repo = %repo.id, revision, "No log entry for revision"),
                Err(e) => {
                    warn!(repo = %repo.id, revision, error = %e, "Failed to fetch revision");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn log(&self, repo: &RepositoryDescriptor, target: &LogTarget, range: &str) -> Result<String, VcsError> {
        let mut args = vec!["log".to_string()];
        let cwd = match target {
            LogTarget::Url(url) => {
                args.push(url.clone());
                None
            }
            LogTarget::WorkingCopy(wc) => Some(wc.as_path()),
        };
        args.extend(["--xml".to_string(), "--verbose".into(), "-r".into(), range.to_string()]);
        self.run(repo, args, cwd, self.options.command_timeout).await
    }

    /// Check out the working copy if needed, otherwise clean up and update it
    pub async fn ensure_working_copy(&self, repo: &RepositoryDescriptor) -> Result<PathBuf, VcsError> {
        debug!(repo = %repo.id, "RepositoryClient::ensure_working_copy: called");
        let wc = repo
            .working_copy
            .clone()
            .ok_or_else(|| VcsError::MissingWorkingCopy(repo.id.clone()))?;

        if working_copy::is_working_copy(&wc) {
            if let Err(e) = self.cleanup(repo, &wc).await {
                warn!(repo = %repo.id, error = %e, "Proactive cleanup failed");
            }
            let args = vec!["update".to_string(), "--accept".into(), "theirs-full".into()];
            self.run(repo, args, Some(&wc), self.options.checkout_timeout).await?;
            debug!(repo = %repo.id, ?wc, "Working copy updated");
            return Ok(wc);
        }

        working_copy::discard(&wc).await?;
        working_copy::prepare_parent(&wc).await?;

        let url = require_url(repo)?;
        info!(repo = %repo.id, ?wc, "Checking out working copy");
        let args = vec!["checkout".to_string(), url.to_string(), wc.to_string_lossy().into_owned()];
        self.run(repo, args, None, self.options.checkout_timeout).await?;
        Ok(wc)
    }

    /// `svn cleanup`, falling back to deleting lock files when cleanup is itself locked
    pub async fn cleanup(&self, repo: &RepositoryDescriptor, wc: &Path) -> Result<(), VcsError> {
        debug!(repo = %repo.id, ?wc, "RepositoryClient::cleanup: called");
        let invocation = self.invocation(repo, vec!["cleanup".to_string()], Some(wc), self.options.command_timeout);

        match self.runner.run(&invocation).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_lock_conflict() => {
                warn!(repo = %repo.id, error = %e, "Cleanup blocked by lock, removing lock files");
                working_copy::remove_lock_files(wc)?;
                self.runner.run(&invocation).await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    /// Run once; on a lock conflict inside a working copy clean up and retry exactly once
    async fn run(
        &self,
        repo: &RepositoryDescriptor,
        args: Vec<String>,
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> Result<String, VcsError> {
        let invocation = self.invocation(repo, args, cwd, timeout);
        match self.runner.run(&invocation).await {
            Err(e) if e.is_lock_conflict() => {
                let Some(wc) = cwd else {
                    return Err(e);
                };
                warn!(
                    repo = %repo.id,
                    command = %invocation.display(),
                    "Lock conflict, running cleanup and retrying once"
                );
                self.cleanup(repo, wc).await?;
                self.runner.run(&invocation).await
            }
            other => other,
        }
    }

    fn invocation(
        &self,
        repo: &RepositoryDescriptor,
        mut args: Vec<String>,
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> Invocation {
        args.extend(self.global_args(repo));
        let invocation = Invocation::new(args, timeout);
        match cwd {
            Some(dir) => invocation.in_dir(dir),
            None => invocation,
        }
    }

    /// Credentials and non-interactive flags appended to every command
    fn global_args(&self, repo: &RepositoryDescriptor) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(creds) = self.credentials_for(repo) {
            args.extend([
                "--username".to_string(),
                creds.username.clone(),
                "--password".to_string(),
                creds.password.clone(),
                "--no-auth-cache".to_string(),
            ]);
        }
        args.push("--non-interactive".to_string());
        if self.options.trust_server_cert {
            args.push("--trust-server-cert-failures".to_string());
            args.push(TRUSTED_CERT_FAILURES.to_string());
        }
        args
    }

    /// Per-repository credentials win over the global pair
    pub fn credentials_for<'a>(&'a self, repo: &'a RepositoryDescriptor) -> Option<&'a Credentials> {
        repo.credentials.as_ref().or(self.options.credentials.as_ref())
    }
}

fn require_url(repo: &RepositoryDescriptor) -> Result<&str, VcsError> {
    let url = repo.url.trim();
    if url.is_empty() {
        return Err(VcsError::MissingUrl(repo.id.clone()));
    }
    Ok(url)
}

/// Parse `svn info --show-item revision` output
fn parse_revision(output: &str) -> Result<u64, VcsError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(VcsError::InvalidOutput("empty revision output".to_string()));
    }
    trimmed
        .parse()
        .map_err(|_| VcsError::InvalidOutput(format!("not a revision number: {:?}", trimmed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    type Reply = Result<String, VcsError>;

    /// Replays queued replies per subcommand and records every call
    #[derive(Default)]
    struct ScriptedRunner {
        replies: Mutex<Vec<(String, VecDeque<Reply>)>>,
        calls: Mutex<Vec<Invocation>>,
    }

    impl ScriptedRunner {
        fn reply(self, subcommand: &str, reply: Reply) -> Self {
            {
                let mut replies = self.replies.lock().unwrap();
                match replies.iter_mut().find(|(s, _)| s == subcommand) {
                    Some((_, queue)) => queue.push_back(reply),
                    None => replies.push((subcommand.to_string(), VecDeque::from([reply]))),
                }
            }
            self
        }

        fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, subcommand: &str) -> usize {
            self.calls().iter().filter(|c| c.subcommand() == subcommand).count()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, invocation: &Invocation) -> Result<String, VcsError> {
            self.calls.lock().unwrap().push(invocation.clone());
            let mut replies = self.replies.lock().unwrap();
            let queue = replies.iter_mut().find(|(s, _)| s == invocation.subcommand());
            match queue.and_then(|(_, q)| q.pop_front()) {
                Some(reply) => reply,
                None => Ok(String::new()),
            }
        }
    }

    fn lock_error() -> VcsError {
        VcsError::from_failure("svn".into(), Some(1), "svn: E155004: Run 'svn cleanup' to remove locks".into())
    }

    fn fast_options() -> ClientOptions {
        ClientOptions {
            page_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn client(runner: &Arc<ScriptedRunner>, options: ClientOptions) -> RepositoryClient {
        RepositoryClient::new(runner.clone(), options)
    }

    fn remote_repo() -> RepositoryDescriptor {
        RepositoryDescriptor::new("core", "https://svn.example.com/core")
    }

    fn local_repo(temp: &TempDir) -> RepositoryDescriptor {
        RepositoryDescriptor::new("core", "https://svn.example.com/core")
            .with_mode(DetectionMode::Local)
            .with_working_copy(temp.path().join("wc"))
    }

    fn make_working_copy(repo: &RepositoryDescriptor) {
        let wc = repo.working_copy.as_ref().unwrap();
        std::fs::create_dir_all(wc.join(".svn")).unwrap();
    }

    fn range_of(invocation: &Invocation) -> String {
        let pos = invocation.args.iter().position(|a| a == "-r").unwrap();
        invocation.args[pos + 1].clone()
    }

    #[tokio::test]
    async fn test_latest_revision_remote() {
        let runner = Arc::new(ScriptedRunner::default().reply("info", Ok("1234\n".into())));
        let client = client(&runner, fast_options());

        assert_eq!(client.latest_revision(&remote_repo()).await.unwrap(), 1234);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            &calls[0].args[..4],
            &["info", "https://svn.example.com/core", "--show-item", "revision"]
        );
        assert!(calls[0].args.contains(&"--non-interactive".to_string()));
        assert!(calls[0].cwd.is_none());
    }

    #[tokio::test]
    async fn test_latest_revision_rejects_bad_output() {
        let runner = Arc::new(
            ScriptedRunner::default()
                .reply("info", Ok("  \n".into()))
                .reply("info", Ok("r12".into())),
        );
        let client = client(&runner, fast_options());

        assert!(matches!(
            client.latest_revision(&remote_repo()).await,
            Err(VcsError::InvalidOutput(_))
        ));
        assert!(matches!(
            client.latest_revision(&remote_repo()).await,
            Err(VcsError::InvalidOutput(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_url() {
        let runner = Arc::new(ScriptedRunner::default());
        let client = client(&runner, fast_options());
        let repo = RepositoryDescriptor::new("core", "  ");

        assert!(matches!(
            client.latest_revision(&repo).await,
            Err(VcsError::MissingUrl(_))
        ));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_credentials_per_repo_then_global() {
        let runner = Arc::new(ScriptedRunner::default());
        let client = client(
            &runner,
            ClientOptions {
                credentials: Some(Credentials::new("global", "gpass")),
                ..fast_options()
            },
        );

        let own = remote_repo().with_credentials(Credentials::new("mine", "mpass"));
        assert_eq!(client.credentials_for(&own).unwrap().username, "mine");
        assert_eq!(client.credentials_for(&remote_repo()).unwrap().username, "global");

        let args = client.global_args(&remote_repo());
        let pos = args.iter().position(|a| a == "--username").unwrap();
        assert_eq!(args[pos + 1], "global");
        assert!(args.contains(&"--trust-server-cert-failures".to_string()));
    }

    #[tokio::test]
    async fn test_no_trust_flags_when_disabled() {
        let runner = Arc::new(ScriptedRunner::default());
        let client = client(
            &runner,
            ClientOptions {
                trust_server_cert: false,
                ..fast_options()
            },
        );

        let args = client.global_args(&remote_repo());
        assert_eq!(args, vec!["--non-interactive".to_string()]);
    }

    #[tokio::test]
    async fn test_changes_between_empty_range() {
        let runner = Arc::new(ScriptedRunner::default());
        let client = client(&runner, fast_options());

        assert!(client.changes_between(&remote_repo(), 10, 10).await.unwrap().is_empty());
        assert!(client.changes_between(&remote_repo(), 10, 3).await.unwrap().is_empty());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_changes_between_pages() {
        let runner = Arc::new(
            ScriptedRunner::default()
                .reply("log", Ok("<log>page1</log>".into()))
                .reply("log", Ok("<log>page2</log>".into()))
                .reply("log", Ok("<log>page3</log>".into())),
        );
        let client = client(&runner, fast_options());

        let chunks = client.changes_between(&remote_repo(), 100, 1150).await.unwrap();

        assert_eq!(chunks.len(), 3);
        let ranges: Vec<String> = runner.calls().iter().map(range_of).collect();
        assert_eq!(ranges, vec!["101:600", "601:1100", "1101:1150"]);
    }

    #[tokio::test]
    async fn test_empty_page_falls_back_to_single_revisions() {
        let runner = Arc::new(
            ScriptedRunner::default()
                .reply("log", Ok("   \n".into()))
                .reply("log", Ok("<log>r6</log>".into()))
                .reply("log", Ok(String::new()))
                .reply("log", Ok("<log>r8</log>".into()))
                .reply("log", Ok("<log>r9</log>".into())),
        );
        let client = client(
            &runner,
            ClientOptions {
                page_size: 3,
                ..fast_options()
            },
        );

        let chunks = client.changes_between(&remote_repo(), 5, 9).await.unwrap();

        // r7 has no entry; the second page came back normally
        assert_eq!(
            chunks,
            vec![
                "<log>r6</log>".to_string(),
                "<log>r8</log>".to_string(),
                "<log>r9</log>".to_string()
            ]
        );
        let ranges: Vec<String> = runner.calls().iter().map(range_of).collect();
        assert_eq!(ranges, vec!["6:8", "6", "7", "8", "9:9"]);
    }

    #[tokio::test]
    async fn test_failing_single_revision_aborts() {
        let runner = Arc::new(
            ScriptedRunner::default()
                .reply("log", Ok(String::new()))
                .reply("log", Ok("<log>r6</log>".into()))
                .reply("log", Err(lock_error())),
        );
        let client = client(
            &runner,
            ClientOptions {
                page_size: 3,
                ..fast_options()
            },
        );

        let result = client.changes_between(&remote_repo(), 5, 9).await;

        assert!(matches!(result, Err(VcsError::LockConflict { .. })));
        // Nothing after r7 was requested
        let ranges: Vec<String> = runner.calls().iter().map(range_of).collect();
        assert_eq!(ranges, vec!["6:8", "6", "7"]);
    }

    #[tokio::test]
    async fn test_failing_page_aborts() {
        let runner = Arc::new(
            ScriptedRunner::default()
                .reply("log", Ok("<log/>".into()))
                .reply(
                    "log",
                    Err(VcsError::Timeout {
                        command: "svn log".into(),
                        timeout: Duration::from_secs(1),
                    }),
                ),
        );
        let client = client(
            &runner,
            ClientOptions {
                page_size: 2,
                ..fast_options()
            },
        );

        let result = client.changes_between(&remote_repo(), 0, 4).await;
        assert!(matches!(result, Err(VcsError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_remote_lock_conflict_is_not_retried() {
        let runner = Arc::new(ScriptedRunner::default().reply("info", Err(lock_error())));
        let client = client(&runner, fast_options());

        assert!(client.latest_revision(&remote_repo()).await.unwrap_err().is_lock_conflict());
        assert_eq!(runner.count("cleanup"), 0);
        assert_eq!(runner.count("info"), 1);
    }

    #[tokio::test]
    async fn test_checkout_when_missing() {
        let temp = TempDir::new().unwrap();
        let repo = local_repo(&temp);
        let runner = Arc::new(ScriptedRunner::default().reply("info", Ok("77".into())));
        let client = client(&runner, fast_options());

        assert_eq!(client.latest_revision(&repo).await.unwrap(), 77);

        let calls = runner.calls();
        assert_eq!(calls[0].subcommand(), "checkout");
        assert_eq!(calls[0].args[1], "https://svn.example.com/core");
        assert_eq!(calls[1].subcommand(), "info");
        assert_eq!(calls[1].cwd.as_deref(), repo.working_copy.as_deref());
        assert_eq!(runner.count("update"), 0);
    }

    #[tokio::test]
    async fn test_invalid_working_copy_is_recreated() {
        let temp = TempDir::new().unwrap();
        let repo = local_repo(&temp);
        let wc = repo.working_copy.clone().unwrap();
        std::fs::create_dir_all(&wc).unwrap();
        std::fs::write(wc.join("stray.txt"), "junk").unwrap();

        let runner = Arc::new(ScriptedRunner::default());
        let client = client(&runner, fast_options());
        client.ensure_working_copy(&repo).await.unwrap();

        assert!(!wc.join("stray.txt").exists());
        assert_eq!(runner.count("checkout"), 1);
    }

    #[tokio::test]
    async fn test_update_runs_proactive_cleanup() {
        let temp = TempDir::new().unwrap();
        let repo = local_repo(&temp);
        make_working_copy(&repo);

        let runner = Arc::new(ScriptedRunner::default());
        let client = client(&runner, fast_options());
        client.ensure_working_copy(&repo).await.unwrap();

        let subcommands: Vec<String> = runner.calls().iter().map(|c| c.subcommand().to_string()).collect();
        assert_eq!(subcommands, vec!["cleanup", "update"]);
        assert!(runner.calls()[1].args.contains(&"theirs-full".to_string()));
    }

    #[tokio::test]
    async fn test_update_lock_conflict_retried_once() {
        let temp = TempDir::new().unwrap();
        let repo = local_repo(&temp);
        make_working_copy(&repo);

        let runner = Arc::new(
            ScriptedRunner::default()
                .reply("update", Err(lock_error()))
                .reply("update", Ok("Updated to revision 9.".into())),
        );
        let client = client(&runner, fast_options());
        client.ensure_working_copy(&repo).await.unwrap();

        // proactive cleanup, failed update, recovery cleanup, retried update
        let subcommands: Vec<String> = runner.calls().iter().map(|c| c.subcommand().to_string()).collect();
        assert_eq!(subcommands, vec!["cleanup", "update", "cleanup", "update"]);
    }

    #[tokio::test]
    async fn test_update_lock_conflict_gives_up_after_one_retry() {
        let temp = TempDir::new().unwrap();
        let repo = local_repo(&temp);
        make_working_copy(&repo);

        let runner = Arc::new(
            ScriptedRunner::default()
                .reply("update", Err(lock_error()))
                .reply("update", Err(lock_error()))
                .reply("update", Ok("never reached".into())),
        );
        let client = client(&runner, fast_options());

        assert!(client.ensure_working_copy(&repo).await.unwrap_err().is_lock_conflict());
        assert_eq!(runner.count("update"), 2);
    }

    #[tokio::test]
    async fn test_locked_cleanup_removes_lock_files() {
        let temp = TempDir::new().unwrap();
        let repo = local_repo(&temp);
        make_working_copy(&repo);
        let lock_file = repo.working_copy.as_ref().unwrap().join(".svn").join("lock");
        std::fs::write(&lock_file, "").unwrap();

        let runner = Arc::new(
            ScriptedRunner::default()
                .reply("cleanup", Err(lock_error()))
                .reply("cleanup", Ok(String::new())),
        );
        let client = client(&runner, fast_options());
        client.cleanup(&repo, repo.working_copy.as_ref().unwrap()).await.unwrap();

        assert!(!lock_file.exists());
        assert_eq!(runner.count("cleanup"), 2);
    }

    #[tokio::test]
    async fn test_local_log_runs_inside_working_copy() {
        let temp = TempDir::new().unwrap();
        let repo = local_repo(&temp);
        make_working_copy(&repo);

        let runner = Arc::new(ScriptedRunner::default().reply("log", Ok("<log/>".into())));
        let client = client(&runner, fast_options());
        client.changes_between(&repo, 1, 3).await.unwrap();

        let log = runner.calls().into_iter().find(|c| c.subcommand() == "log").unwrap();
        assert_eq!(log.cwd.as_deref(), repo.working_copy.as_deref());
        assert_eq!(log.args[1], "--xml");
        assert_eq!(range_of(&log), "2:3");
    }

    #[tokio::test]
    async fn test_local_mode_without_working_copy() {
        let runner = Arc::new(ScriptedRunner::default());
        let client = client(&runner, fast_options());
        let repo = remote_repo().with_mode(DetectionMode::Local);

        assert!(matches!(
            client.latest_revision(&repo).await,
            Err(VcsError::MissingWorkingCopy(_))
        ));
    }

    #[test]
    fn test_parse_revision() {
        assert_eq!(parse_revision("42\n").unwrap(), 42);
        assert!(parse_revision("").is_err());
        assert!(parse_revision("-1").is_err());
    }

    /// Answers every log request with a non-empty document
    #[derive(Default)]
    struct EchoRunner {
        calls: Mutex<Vec<Invocation>>,
    }

    #[async_trait]
    impl CommandRunner for EchoRunner {
        async fn run(&self, invocation: &Invocation) -> Result<String, VcsError> {
            self.calls.lock().unwrap().push(invocation.clone());
            Ok(format!("<log>{}</log>", range_of(invocation)))
        }
    }

    proptest::proptest! {
        #[test]
        fn prop_pages_cover_range_exactly(from in 0u64..5_000, len in 0u64..3_000, page_size in 1u64..700) {
            let to = from + len;
            let runner = Arc::new(EchoRunner::default());
            let client = RepositoryClient::new(
                runner.clone(),
                ClientOptions {
                    page_size,
                    ..fast_options()
                },
            );

            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let chunks = rt.block_on(client.changes_between(&remote_repo(), from, to)).unwrap();

            let mut expected = from + 1;
            for invocation in runner.calls.lock().unwrap().iter() {
                let range = range_of(invocation);
                let (start, end) = range.split_once(':').unwrap();
                let (start, end): (u64, u64) = (start.parse().unwrap(), end.parse().unwrap());
                proptest::prop_assert_eq!(start, expected);
                proptest::prop_assert!(end >= start && end - start < page_size);
                expected = end + 1;
            }
            proptest::prop_assert_eq!(expected, to + 1);
            proptest::prop_assert_eq!(chunks.len() as u64, len.div_ceil(page_size));
        }
    }
}
