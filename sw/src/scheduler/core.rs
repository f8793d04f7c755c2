//! Scheduler implementation

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use eyre::{Context, Result, eyre};
use futures::{FutureExt, StreamExt, stream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::cycle::{CheckCycleResult, Detection, RepositoryOutcome};
use super::state::{SchedulerState, ShutdownFlag};
use crate::config::{Config, HookConfig, SchedulerConfig};
use crate::domain::{ChangeRecord, PathMatch, RepositoryDescriptor, TIMESTAMP_FORMAT};
use crate::notify::{
    Delivery, NotificationDispatcher, RecipientResolver, StartupNotice, WatchedRepository, aggregate,
    clean_recipients,
};
use crate::parser::{LogParser, join_chunks};
use crate::vcs::{RepositoryClient, SvnProcess, VcsError};
use revstore::{RevisionStore, Watermarks};

/// Longest single sleep while waiting, so shutdown is noticed quickly
const WAIT_SLICE: Duration = Duration::from_secs(1);

/// What a hook invocation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// The revision is not newer than the stored watermark
    AlreadyProcessed { watermark: u64 },
    /// The watermark moved to `revision`
    Committed { repository: String, revision: u64, notified: bool },
    /// Delivery failed, the watermark was left alone
    DeliveryFailed { repository: String, reason: String },
}

/// Drives check cycles and owns every watermark write
pub struct Scheduler {
    repositories: Vec<RepositoryDescriptor>,
    client: RepositoryClient,
    parser: LogParser,
    store: RevisionStore,
    dispatcher: NotificationDispatcher,
    resolver: RecipientResolver,
    config: SchedulerConfig,
    hook: HookConfig,
    status_recipients: Vec<String>,
    startup_notice: bool,
    shutdown: ShutdownFlag,
    state: watch::Sender<SchedulerState>,
}

impl Scheduler {
    pub fn new(
        repositories: Vec<RepositoryDescriptor>,
        client: RepositoryClient,
        store: RevisionStore,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        debug!(repositories = repositories.len(), "Scheduler::new: called");
        let resolver = RecipientResolver::default().with_repositories(&repositories);
        Self {
            repositories,
            client,
            parser: LogParser::new(),
            store,
            dispatcher,
            resolver,
            config: SchedulerConfig::default(),
            hook: HookConfig::default(),
            status_recipients: Vec::new(),
            startup_notice: false,
            shutdown: ShutdownFlag::new(),
            state: watch::Sender::new(SchedulerState::Idle),
        }
    }

    /// Wire everything up from configuration using the real svn binary
    pub fn from_config(config: &Config, shutdown: ShutdownFlag) -> Result<Self> {
        debug!("Scheduler::from_config: called");
        let runner = Arc::new(SvnProcess::new(&config.svn.binary));
        let client = RepositoryClient::new(runner, config.client_options());
        let store = RevisionStore::open(&config.storage.revisions_file).context("Failed to open revision store")?;
        let dispatcher = NotificationDispatcher::from_config(&config.email);
        let resolver = RecipientResolver::new(config.recipients.clone(), config.email.to.clone())
            .with_repositories(&config.repositories);

        Ok(Self::new(config.repositories.clone(), client, store, dispatcher)
            .with_resolver(resolver)
            .with_config(config.scheduler.clone())
            .with_hook_config(config.hook.clone())
            .with_status_recipients(config.email.status_recipients.clone())
            .with_startup_notice(config.email.startup_notice)
            .with_shutdown(shutdown))
    }

    pub fn with_resolver(mut self, resolver: RecipientResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_hook_config(mut self, hook: HookConfig) -> Self {
        self.hook = hook;
        self
    }

    pub fn with_parser(mut self, parser: LogParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_status_recipients(mut self, recipients: Vec<String>) -> Self {
        self.status_recipients = recipients;
        self
    }

    pub fn with_startup_notice(mut self, enabled: bool) -> Self {
        self.startup_notice = enabled;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownFlag) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    pub fn repositories(&self) -> &[RepositoryDescriptor] {
        &self.repositories
    }

    fn set_state(&self, state: SchedulerState) {
        // Once shutting down, stay there
        if self.state() == SchedulerState::ShuttingDown {
            return;
        }
        let state = if self.shutdown.is_requested() && state == SchedulerState::Idle {
            SchedulerState::ShuttingDown
        } else {
            state
        };
        debug!(%state, "Scheduler state");
        self.state.send_replace(state);
    }

    /// Run cycles until shutdown is requested
    pub async fn run(&self) -> Result<()> {
        info!(repositories = self.repositories.len(), "Scheduler starting");
        if self.startup_notice {
            self.announce_startup().await;
        }

        while !self.shutdown.is_requested() {
            let interval = self.config.cycle_interval(&self.repositories);

            match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
                Ok(Ok(result)) => {
                    debug!(cycle = %result.cycle_id, "Scheduler::run: cycle finished");
                }
                Ok(Err(e)) => {
                    error!(op = "CYCLE_FAILED", error = %e, "Check cycle abandoned");
                }
                Err(panic) => {
                    error!(op = "CYCLE_FAILED", panic = %panic_message(&*panic), "Check cycle panicked");
                }
            }
            self.set_state(SchedulerState::Idle);

            debug!(?interval, "Waiting for next cycle");
            if !self.wait(interval).await {
                break;
            }
        }

        self.set_state(SchedulerState::ShuttingDown);
        info!("Scheduler stopped");
        Ok(())
    }

    /// Sleep in short slices; false if shutdown was requested meanwhile
    pub async fn wait(&self, interval: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + interval;
        loop {
            if self.shutdown.is_requested() {
                return false;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return true;
            }
            tokio::time::sleep((deadline - now).min(WAIT_SLICE)).await;
        }
    }

    /// One complete check, dispatch and commit pass over every repository
    pub async fn run_cycle(&self) -> Result<CheckCycleResult> {
        let mut result = CheckCycleResult::new(self.repositories.len());
        info!(cycle = %result.cycle_id, repositories = self.repositories.len(), "Check cycle starting");
        self.set_state(SchedulerState::Checking);

        let watermarks = self.store.load().context("Failed to load watermarks")?;

        let checks: Vec<(String, Option<Result<Option<Detection>, VcsError>>)> = stream::iter(&self.repositories)
            .map(|repo| {
                let watermark = watermarks.get(&repo.id).copied().unwrap_or(0);
                async move {
                    if self.shutdown.is_requested() {
                        return (repo.id.clone(), None);
                    }
                    (repo.id.clone(), Some(self.check_repository(repo, watermark).await))
                }
            })
            .buffered(self.config.max_concurrent_checks.max(1))
            .collect()
            .await;

        let mut immediate = Watermarks::new();
        let mut pending: Vec<Detection> = Vec::new();

        for (id, check) in checks {
            match check {
                None => result.outcomes.push(RepositoryOutcome::Skipped { id }),
                Some(Err(e)) => {
                    error!(op = "CHECK_FAILED", repo = %id, error = %e, "Repository check failed");
                    result.outcomes.push(RepositoryOutcome::Failed {
                        id,
                        error: e.to_string(),
                    });
                }
                Some(Ok(None)) => {
                    let revision = watermarks.get(&id).copied().unwrap_or(0);
                    result.outcomes.push(RepositoryOutcome::Unchanged { id, revision });
                }
                Some(Ok(Some(detection))) => {
                    result.outcomes.push(RepositoryOutcome::Changed {
                        id,
                        from: detection.from,
                        to: detection.to,
                        records: detection.records.len(),
                    });
                    if detection.commits_immediately() {
                        immediate.insert(detection.repository.clone(), detection.to);
                    } else {
                        pending.push(detection);
                    }
                }
            }
        }

        if !immediate.is_empty() {
            self.commit(&immediate, &mut result)?;
        }

        if !pending.is_empty() {
            let delivery = self.dispatch(&pending).await;
            if delivery.succeeded() {
                let confirmed: Watermarks = pending.iter().map(|d| (d.repository.clone(), d.to)).collect();
                self.commit(&confirmed, &mut result)?;
            } else {
                self.discard_pending(&pending)?;
            }
            result.dispatch = Some(delivery);
        }

        self.set_state(SchedulerState::Idle);
        self.report_status(&result).await;
        Ok(result)
    }

    /// Single-revision path used by the post-commit hook
    pub async fn process_commit(&self, repository_path: &str, revision: u64) -> Result<HookOutcome> {
        debug!(%repository_path, revision, "Scheduler::process_commit: called");
        let repo = self.resolve_hook_repository(repository_path)?;

        let watermark = self.store.get(&repo.id).context("Failed to load watermarks")?;
        if revision <= watermark {
            info!(repo = %repo.id, revision, watermark, "Revision already processed");
            return Ok(HookOutcome::AlreadyProcessed { watermark });
        }

        let records = if repo.notify {
            self.collect_records(repo, watermark, revision).await?
        } else {
            Vec::new()
        };
        info!(op = "CHANGE_DETECTED", repo = %repo.id, from = watermark, to = revision, records = records.len(), "Hook revision detected");

        let detection = Detection {
            repository: repo.id.clone(),
            from: watermark,
            to: revision,
            records,
            notify: repo.notify,
        };
        let mut result = CheckCycleResult::new(1);
        let update: Watermarks = [(repo.id.clone(), revision)].into_iter().collect();

        let outcome = if detection.commits_immediately() {
            self.commit(&update, &mut result)?;
            HookOutcome::Committed {
                repository: repo.id.clone(),
                revision,
                notified: false,
            }
        } else {
            let pending = vec![detection];
            match self.dispatch(&pending).await {
                Delivery::Failed(reason) => {
                    self.discard_pending(&pending)?;
                    HookOutcome::DeliveryFailed {
                        repository: repo.id.clone(),
                        reason,
                    }
                }
                delivered => {
                    self.commit(&update, &mut result)?;
                    HookOutcome::Committed {
                        repository: repo.id.clone(),
                        revision,
                        notified: delivered == Delivery::Sent,
                    }
                }
            }
        };

        self.set_state(SchedulerState::Idle);
        Ok(outcome)
    }

    fn resolve_hook_repository(&self, repository_path: &str) -> Result<&RepositoryDescriptor> {
        // Strongest match wins, the first configured one on a tie
        let mut best: Option<(PathMatch, &RepositoryDescriptor)> = None;
        for repo in &self.repositories {
            match (repo.path_match(repository_path), best) {
                (Some(strength), Some((current, _))) if strength <= current => {}
                (Some(strength), _) => best = Some((strength, repo)),
                (None, _) => {}
            }
        }
        if let Some((strength, repo)) = best {
            debug!(repo = %repo.id, ?strength, "Hook path resolved");
            return Ok(repo);
        }

        match self.repositories.first() {
            Some(first) if self.hook.fallback_to_first_repository => {
                warn!(
                    %repository_path,
                    fallback = %first.id,
                    "No repository matches the hook path, falling back to the first configured repository"
                );
                Ok(first)
            }
            _ => Err(eyre!("No configured repository matches {}", repository_path)),
        }
    }

    async fn check_repository(&self, repo: &RepositoryDescriptor, watermark: u64) -> Result<Option<Detection>, VcsError> {
        debug!(repo = %repo.id, watermark, "Scheduler::check_repository: called");
        let latest = self.client.latest_revision(repo).await?;

        if latest <= watermark {
            if latest < watermark {
                warn!(repo = %repo.id, latest, watermark, "Repository reports a revision below the watermark");
            }
            debug!(repo = %repo.id, latest, "No new revisions");
            return Ok(None);
        }

        let records = if repo.notify {
            self.collect_records(repo, watermark, latest).await?
        } else {
            Vec::new()
        };

        info!(
            op = "CHANGE_DETECTED",
            repo = %repo.id,
            from = watermark,
            to = latest,
            records = records.len(),
            notify = repo.notify,
            "New revisions detected"
        );
        Ok(Some(Detection {
            repository: repo.id.clone(),
            from: watermark,
            to: latest,
            records,
            notify: repo.notify,
        }))
    }

    async fn collect_records(
        &self,
        repo: &RepositoryDescriptor,
        from: u64,
        to: u64,
    ) -> Result<Vec<ChangeRecord>, VcsError> {
        let chunks = self.client.changes_between(repo, from, to).await?;
        let records = self.parser.parse(&join_chunks(&chunks), &repo.id);
        Ok(records
            .into_iter()
            .filter(|r| r.is_synthetic() || (r.revision > from && r.revision <= to))
            .collect())
    }

    async fn dispatch(&self, pending: &[Detection]) -> Delivery {
        self.set_state(SchedulerState::Dispatching);
        let records: Vec<ChangeRecord> = pending.iter().flat_map(|d| d.records.iter().cloned()).collect();
        let payload = aggregate(&records, &self.resolver);
        self.dispatcher.deliver(&payload).await
    }

    fn commit(&self, updates: &Watermarks, result: &mut CheckCycleResult) -> Result<()> {
        self.set_state(SchedulerState::Committing);
        let committed = self.store.commit(updates).context("Failed to commit watermarks")?;
        for (repo, revision) in updates {
            info!(op = "WATERMARK_COMMITTED", repo = %repo, revision, "Watermark committed");
            let stored = committed.get(repo).copied().unwrap_or(*revision);
            result.committed.insert(repo.clone(), stored);
        }
        Ok(())
    }

    /// Forget pending proposals and re-read what is actually stored
    fn discard_pending(&self, pending: &[Detection]) -> Result<()> {
        let stored = self.store.load().context("Failed to reload watermarks")?;
        for detection in pending {
            warn!(
                op = "ROLLBACK",
                repo = %detection.repository,
                kept = stored.get(&detection.repository).copied().unwrap_or(0),
                proposed = detection.to,
                "Notification failed, watermark not advanced"
            );
        }
        Ok(())
    }

    async fn report_status(&self, result: &CheckCycleResult) {
        let report = result.status_report(&self.resolver);
        info!(op = "STATUS", cycle = %result.cycle_id, "{}", report.summary());

        let recipients = clean_recipients(&self.status_recipients);
        if recipients.is_empty() {
            return;
        }
        let delivery = self.dispatcher.send_status(&report, &recipients).await;
        if !delivery.succeeded() {
            warn!(outcome = %delivery, "Status report not delivered");
        }
    }

    async fn announce_startup(&self) {
        let recipients = clean_recipients(&self.status_recipients);
        if recipients.is_empty() {
            debug!("Startup notice enabled but no status recipients configured");
            return;
        }

        let host = nix::unistd::gethostname()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        let watched = self
            .repositories
            .iter()
            .map(|r| WatchedRepository {
                id: r.id.clone(),
                name: r.display_name().to_string(),
                url: r.url.clone(),
            })
            .collect();
        let notice = StartupNotice::new(Utc::now().format(TIMESTAMP_FORMAT).to_string(), host, watched);

        let delivery = self.dispatcher.send_startup_notice(&notice, &recipients).await;
        info!(op = "STARTUP", outcome = %delivery, "Startup notice processed");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
