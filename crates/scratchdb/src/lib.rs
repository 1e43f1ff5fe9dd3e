//! Ephemeral on-disk SQLite databases for test fixtures.
//!
//! A [`ScratchDb`] owns one uniquely named database file from creation to
//! teardown. Consumers borrow it one [`Context`] at a time and the files
//! are deleted when the instance is destroyed or dropped, so a test run
//! leaves nothing behind.
//!
//! # Design decisions
//!
//! - Names are reserved by exclusive file creation, not by checking for
//!   existence first, so two instances can never claim the same path.
//! - One consumer at a time is the contract. The slot is a flag, not a
//!   lock, and the type is deliberately `!Sync`; a second context while
//!   one is live is a usage error surfaced as
//!   [`ScratchError::ContextOpen`].
//! - WAL journaling is stamped into the file at creation. Teardown
//!   checkpoints the log and removes the sidecar files along with the
//!   database.
//! - This is test infrastructure, not production plumbing: no retries, no
//!   backoff, no pooling.

mod context;
mod error;
mod instance;
mod paths;

pub use context::{Context, FromRow};
pub use error::ScratchError;
pub use instance::{ScratchDb, ScratchOptions};
