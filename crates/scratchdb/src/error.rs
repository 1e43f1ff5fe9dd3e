//! Error types for the scratch database lifecycle.

use std::path::PathBuf;

/// Errors that can occur while creating, using, or destroying a scratch
/// database.
#[derive(Debug, thiserror::Error)]
pub enum ScratchError {
    /// Every candidate file name was already taken.
    #[error("no unused database path after {attempts} attempts in {}", dir.display())]
    NoUnusedPath {
        /// How many candidate names were tried.
        attempts: u32,
        /// The directory that was probed.
        dir: PathBuf,
    },

    /// A second context was requested while one is still open.
    #[error("a context is already open for this instance")]
    ContextOpen,

    /// Instance setup failed. Teardown has already been attempted; the
    /// details carry the path state and a listing of the scratch directory
    /// at failure time.
    #[error("scratch database setup failed: {details}")]
    Setup {
        /// Diagnostic dump of the instance paths and scratch directory.
        details: String,
        /// The failure that aborted setup.
        #[source]
        source: Box<ScratchError>,
    },

    /// A database operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
