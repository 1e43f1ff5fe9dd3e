//! Scratch database lifecycle: create, hand out contexts, destroy.

use std::cell::Cell;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};

use crate::error::ScratchError;
use crate::paths::ScratchPaths;

/// Configuration for a scratch database instance.
#[derive(Debug, Clone)]
pub struct ScratchOptions {
    /// Prefix for the generated database name. Keep it identifier-safe: it
    /// becomes part of the file name and the attach alias.
    pub prefix: String,

    /// Directory the database files are created in. `None` means the OS
    /// temp directory. The path is handed to SQLite as text, so it should
    /// be valid UTF-8.
    pub dir: Option<PathBuf>,

    /// How many randomized candidate names to try before giving up.
    pub max_name_attempts: u32,

    /// Busy timeout applied to every connection, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Schema batch applied once during setup, with ensure-created
    /// semantics (`CREATE TABLE IF NOT EXISTS ...`). Empty means no schema.
    pub schema_sql: String,
}

impl Default for ScratchOptions {
    fn default() -> Self {
        Self {
            prefix: "scratch".to_string(),
            dir: None,
            max_name_attempts: 10,
            busy_timeout_ms: 5_000,
            schema_sql: String::new(),
        }
    }
}

/// Manages one ephemeral on-disk SQLite database: a uniquely named file
/// created on construction, at most one live [`Context`](crate::Context) at
/// a time, and deterministic teardown of the file and its WAL sidecars.
/// Not suitable for production use.
///
/// The single-consumer guard is a plain flag, not a lock. The type is
/// deliberately `!Sync`; concurrent acquisition is a usage error, not a
/// race to arbitrate.
#[derive(Debug)]
pub struct ScratchDb {
    pub(crate) paths: ScratchPaths,
    pub(crate) options: ScratchOptions,
    pub(crate) context_open: Cell<bool>,
    torn_down: bool,
}

impl ScratchDb {
    /// Creates the database: reserves an unused path, stamps WAL journaling
    /// into the file, and applies the configured schema through a single
    /// direct context.
    ///
    /// # Errors
    ///
    /// Path exhaustion surfaces as [`ScratchError::NoUnusedPath`]. Any
    /// failure after the reservation tears the instance down first, then
    /// returns [`ScratchError::Setup`] carrying the directory state at
    /// failure time.
    pub fn create(options: ScratchOptions) -> Result<Self, ScratchError> {
        let dir = options.dir.clone().unwrap_or_else(std::env::temp_dir);
        let paths = ScratchPaths::reserve(&dir, &options.prefix, options.max_name_attempts)?;

        let mut db = Self {
            paths,
            options,
            context_open: Cell::new(false),
            torn_down: false,
        };

        if let Err(e) = db.initialize() {
            let details = db.dir_debug_info(&dir);
            if let Err(teardown_err) = db.teardown() {
                tracing::warn!(
                    error = %teardown_err,
                    "teardown after failed setup did not finish cleanly"
                );
            }
            return Err(ScratchError::Setup {
                details,
                source: Box::new(e),
            });
        }

        tracing::info!(
            name = %db.paths.db_name,
            path = %db.paths.db_path.display(),
            "created scratch database"
        );
        Ok(db)
    }

    /// The generated database name, which doubles as the attach alias.
    pub fn name(&self) -> &str {
        &self.paths.db_name
    }

    /// Path of the primary database file.
    pub fn db_path(&self) -> &Path {
        &self.paths.db_path
    }

    /// Path of the write-ahead log sidecar.
    pub fn wal_path(&self) -> &Path {
        &self.paths.wal_path
    }

    /// Path of the shared-memory index sidecar.
    pub fn shm_path(&self) -> &Path {
        &self.paths.shm_path
    }

    /// Destroys the database and deletes its files.
    ///
    /// Consuming `self` guarantees no context is still open, since the
    /// borrow would forbid the move. Dropping the instance runs the same
    /// teardown best-effort; call this method when the result matters.
    ///
    /// # Errors
    ///
    /// Returns the first file deletion that failed. The WAL checkpoint step
    /// is best-effort and never surfaces here.
    pub fn destroy(mut self) -> Result<(), ScratchError> {
        self.teardown()
    }

    fn initialize(&self) -> Result<(), ScratchError> {
        self.stamp_wal_mode()?;

        // One mapped context applies the schema, exercising the
        // single-consumer slot before any caller sees the instance.
        let ctx = self.context_direct()?;
        ctx.ensure_schema(&self.options.schema_sql)?;
        Ok(())
    }

    /// Switches the fresh database into WAL journaling via a short-lived
    /// maintenance connection. WAL mode is persistent: every later open of
    /// the file, direct or attached, inherits it.
    fn stamp_wal_mode(&self) -> Result<(), ScratchError> {
        let conn = self.maintenance_connection()?;

        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        if journal_mode != "wal" {
            return Err(ScratchError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!(
                    "failed to set WAL journal mode, got: {journal_mode}"
                )),
            )));
        }

        close_quietly(conn, &self.paths.db_name);
        Ok(())
    }

    fn maintenance_connection(&self) -> Result<Connection, ScratchError> {
        Ok(Connection::open_with_flags(
            &self.paths.db_path,
            connection_flags(),
        )?)
    }

    /// Idempotent teardown: checkpoint the WAL best-effort, delete the
    /// primary and sidecar files, reset to empty. Safe to call after a
    /// partial setup; a second call is a no-op.
    fn teardown(&mut self) -> Result<(), ScratchError> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        // Fold the write-ahead log back into the primary file and release
        // its locks. One attempt only; a failure here is logged and
        // suppressed so it cannot mask whatever brought us to teardown.
        if self.paths.db_path.exists() {
            match self.checkpoint() {
                Ok((busy, log_frames)) => {
                    tracing::debug!(
                        name = %self.paths.db_name,
                        busy,
                        log_frames,
                        "checkpointed scratch database before teardown"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        name = %self.paths.db_name,
                        error = %e,
                        "wal checkpoint before teardown failed"
                    );
                }
            }
        }

        let mut first_err: Option<ScratchError> = None;
        for path in [
            &self.paths.db_path,
            &self.paths.wal_path,
            &self.paths.shm_path,
        ] {
            if let Err(e) = remove_if_present(path) {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to delete scratch file"
                );
                if first_err.is_none() {
                    first_err = Some(ScratchError::Io(e));
                }
            }
        }

        match first_err {
            None => {
                tracing::info!(name = %self.paths.db_name, "destroyed scratch database");
                Ok(())
            }
            Some(e) => Err(e),
        }
    }

    fn checkpoint(&self) -> Result<(i64, i64), ScratchError> {
        let conn = self.maintenance_connection()?;
        let (busy, log_frames, _checkpointed): (i64, i64, i64) = conn.query_row(
            "PRAGMA wal_checkpoint(TRUNCATE);",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        close_quietly(conn, &self.paths.db_name);
        Ok((busy, log_frames))
    }

    /// Path state plus a listing of the scratch directory, attached to
    /// setup failures so collisions and permission problems can be read
    /// straight off the error.
    fn dir_debug_info(&self, dir: &Path) -> String {
        let mut out = String::new();
        out.push_str(&format!("db_name: {}\n", self.paths.db_name));
        out.push_str(&format!("db_path: {}\n", self.paths.db_path.display()));
        out.push_str(&format!("wal_path: {}\n", self.paths.wal_path.display()));
        out.push_str(&format!("files in {}:", dir.display()));

        match fs::read_dir(dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    out.push_str(&format!("\n  {}", entry.file_name().to_string_lossy()));
                }
            }
            Err(e) => out.push_str(&format!(" <unreadable: {e}>")),
        }

        out
    }
}

impl Drop for ScratchDb {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            tracing::warn!(
                name = %self.paths.db_name,
                error = %e,
                "scratch database teardown failed during drop"
            );
        }
    }
}

pub(crate) fn connection_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX
}

fn remove_if_present(path: &Path) -> Result<(), std::io::Error> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Closes a maintenance connection, logging instead of failing: by this
/// point the useful work has already happened.
fn close_quietly(conn: Connection, name: &str) {
    if let Err((_, e)) = conn.close() {
        tracing::warn!(name = %name, error = %e, "failed to close maintenance connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_the_documented_contract() {
        let options = ScratchOptions::default();

        assert_eq!(options.prefix, "scratch");
        assert_eq!(options.dir, None);
        assert_eq!(options.max_name_attempts, 10);
        assert_eq!(options.busy_timeout_ms, 5_000);
        assert!(options.schema_sql.is_empty());
    }

    #[test]
    fn dir_debug_info_lists_the_scratch_directory() {
        let tmp = tempfile::TempDir::new().expect("should create temp dir");
        let db = ScratchDb::create(ScratchOptions {
            dir: Some(tmp.path().to_path_buf()),
            ..Default::default()
        })
        .expect("should create scratch db");

        let info = db.dir_debug_info(tmp.path());

        assert!(info.contains("db_name:"));
        assert!(info.contains(db.name()), "listing should mention the instance");
        assert!(
            info.contains(&format!("{}.db", db.name())),
            "listing should include the primary file"
        );
    }
}
