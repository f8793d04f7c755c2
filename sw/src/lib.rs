//! svnwatch - Subversion change detection and mail notification
//!
//! svnwatch polls a set of Subversion repositories, compares the latest
//! revision of each against a durable watermark, turns the new revisions into
//! structured change records and mails one combined notification per cycle.
//! A watermark only moves forward once the notification covering it was
//! delivered, so a failed delivery is retried on the next cycle.
//!
//! # Core Concepts
//!
//! - **Watermarks**: the last confirmed revision per repository, see [`revstore`]
//! - **Cycle**: one pass over every repository followed by at most one mail
//! - **Hook path**: a post-commit hook can push a single revision in directly
//!
//! # Modules
//!
//! - [`domain`] - Repository descriptors and change records
//! - [`vcs`] - svn invocation, paging and working copy handling
//! - [`parser`] - Tolerant `svn log --xml` parsing
//! - [`notify`] - Aggregation, templates and SMTP delivery
//! - [`scheduler`] - Check cycles, commit discipline and the hook path
//! - [`config`] - Configuration types and loading
//! - [`daemon`] - PID file handling for background runs
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod notify;
pub mod parser;
pub mod scheduler;
pub mod vcs;

/// Poll interval used when neither the repository nor the scheduler sets one
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

pub use config::Config;
pub use domain::{ChangeRecord, RepositoryDescriptor};
pub use notify::{Delivery, NotificationDispatcher};
pub use parser::LogParser;
pub use scheduler::{CheckCycleResult, HookOutcome, Scheduler, ShutdownFlag};
pub use vcs::RepositoryClient;
