//! svn log decoding

mod svn_log;

pub use svn_log::{LogParser, join_chunks};
