//! Subversion access
//!
//! Everything that shells out to `svn` lives here: the process boundary
//! ([`CommandRunner`]), failure classification ([`VcsError`]) and the
//! [`RepositoryClient`] that turns them into revision numbers and raw log
//! pages.

mod client;
mod command;
mod error;
mod working_copy;

pub use client::{ClientOptions, DEFAULT_PAGE_SIZE, RepositoryClient, TRUSTED_CERT_FAILURES};
pub use command::{CommandRunner, Invocation, SvnProcess, mask_args};
pub use error::{FailureKind, VcsError, classify_failure};
pub use working_copy::{ADMIN_DIR, is_working_copy, remove_lock_files};
