//! Domain types shared by every stage of the pipeline

mod change;
mod repository;

pub use change::{ChangeKind, ChangeRecord, PathAction, PathChange, TIMESTAMP_FORMAT};
pub use repository::{Credentials, DetectionMode, PathMatch, RepositoryDescriptor};
