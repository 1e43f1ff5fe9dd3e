//! Path reservation for scratch database files.
//!
//! A scratch instance owns up to three files: the primary database, the
//! `-wal` write-ahead log, and the `-shm` index that goes with it. The
//! primary path is claimed with exclusive-create semantics so two test runs
//! can never reserve the same name; the sidecar paths are derived from it.

use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::ScratchError;

/// Identity of one scratch database: its generated name and file paths.
#[derive(Debug, Clone)]
pub(crate) struct ScratchPaths {
    pub(crate) db_name: String,
    pub(crate) db_path: PathBuf,
    pub(crate) wal_path: PathBuf,
    pub(crate) shm_path: PathBuf,
}

impl ScratchPaths {
    /// Reserves an unused database path under `dir`.
    ///
    /// Draws up to `max_attempts` randomized `<prefix>_<hex>` names and
    /// creates the primary file for the first free one. Creation is atomic
    /// (`create_new`), so an existing file can never be adopted and
    /// concurrent reservations cannot race each other onto the same name.
    ///
    /// # Errors
    ///
    /// Returns [`ScratchError::NoUnusedPath`] once the attempt cap is
    /// exhausted, or [`ScratchError::Io`] for any filesystem failure other
    /// than a name collision.
    pub(crate) fn reserve(
        dir: &Path,
        prefix: &str,
        max_attempts: u32,
    ) -> Result<Self, ScratchError> {
        let candidates = (0..max_attempts).map(|_| {
            let id = Uuid::new_v4().simple().to_string();
            format!("{prefix}_{}", &id[..8])
        });

        match Self::reserve_from_candidates(dir, candidates)? {
            Some(paths) => Ok(paths),
            None => Err(ScratchError::NoUnusedPath {
                attempts: max_attempts,
                dir: dir.to_path_buf(),
            }),
        }
    }

    fn reserve_from_candidates<I>(dir: &Path, candidates: I) -> Result<Option<Self>, ScratchError>
    where
        I: IntoIterator<Item = String>,
    {
        for db_name in candidates {
            let db_path = dir.join(format!("{db_name}.db"));

            match OpenOptions::new().write(true).create_new(true).open(&db_path) {
                Ok(_) => {
                    tracing::debug!(
                        name = %db_name,
                        path = %db_path.display(),
                        "reserved scratch database path"
                    );
                    return Ok(Some(Self {
                        wal_path: sidecar(&db_path, "-wal"),
                        shm_path: sidecar(&db_path, "-shm"),
                        db_name,
                        db_path,
                    }));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::debug!(name = %db_name, "candidate name taken, trying another");
                }
                Err(e) => return Err(ScratchError::Io(e)),
            }
        }

        Ok(None)
    }
}

/// Appends a SQLite sidecar suffix to a database path (`x.db` → `x.db-wal`).
fn sidecar(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(db_path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reserve_creates_the_primary_file() {
        let tmp = TempDir::new().expect("should create temp dir");

        let paths =
            ScratchPaths::reserve(tmp.path(), "scratch", 10).expect("reserve should succeed");

        assert!(paths.db_path.exists(), "primary file should be created");
        assert!(paths.db_name.starts_with("scratch_"));
        assert_eq!(
            paths.db_path.file_name().and_then(|n| n.to_str()),
            Some(format!("{}.db", paths.db_name).as_str())
        );
    }

    #[test]
    fn sidecar_paths_extend_the_primary_name() {
        let tmp = TempDir::new().expect("should create temp dir");

        let paths =
            ScratchPaths::reserve(tmp.path(), "scratch", 10).expect("reserve should succeed");

        let primary = paths.db_path.to_string_lossy().into_owned();
        assert_eq!(paths.wal_path.to_string_lossy(), format!("{primary}-wal"));
        assert_eq!(paths.shm_path.to_string_lossy(), format!("{primary}-shm"));
    }

    #[test]
    fn reserve_skips_taken_candidates() {
        let tmp = TempDir::new().expect("should create temp dir");
        std::fs::write(tmp.path().join("taken.db"), b"").expect("should occupy candidate");

        let paths = ScratchPaths::reserve_from_candidates(
            tmp.path(),
            vec!["taken".to_string(), "fresh".to_string()],
        )
        .expect("reservation should not error")
        .expect("should fall through to the free candidate");

        assert_eq!(paths.db_name, "fresh");
        assert!(paths.db_path.exists());
    }

    #[test]
    fn reserve_gives_up_when_every_candidate_is_taken() {
        let tmp = TempDir::new().expect("should create temp dir");
        std::fs::write(tmp.path().join("dup.db"), b"").expect("should occupy candidate");

        let outcome = ScratchPaths::reserve_from_candidates(
            tmp.path(),
            vec!["dup".to_string(), "dup".to_string(), "dup".to_string()],
        )
        .expect("collisions are not errors");

        assert!(outcome.is_none(), "exhaustion should yield no reservation");
    }

    #[test]
    fn reserve_reports_the_attempt_cap_on_exhaustion() {
        let tmp = TempDir::new().expect("should create temp dir");

        let err = ScratchPaths::reserve(tmp.path(), "scratch", 0)
            .expect_err("zero attempts should exhaust immediately");

        match err {
            ScratchError::NoUnusedPath { attempts, dir } => {
                assert_eq!(attempts, 0);
                assert_eq!(dir, tmp.path());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn repeated_reservations_never_collide() {
        let tmp = TempDir::new().expect("should create temp dir");

        let mut names = Vec::new();
        for _ in 0..5 {
            let paths =
                ScratchPaths::reserve(tmp.path(), "scratch", 10).expect("reserve should succeed");
            assert!(paths.db_path.exists());
            names.push(paths.db_name);
        }

        names.sort();
        names.dedup();
        assert_eq!(names.len(), 5, "every reservation should get its own name");
    }
}
