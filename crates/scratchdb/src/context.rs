//! Context handles: scoped connections that occupy the single-consumer slot.

use rusqlite::{Connection, Params, Row};

use crate::error::ScratchError;
use crate::instance::{connection_flags, ScratchDb};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextMode {
    /// The scratch file is the connection's `main` database.
    Direct,
    /// An in-memory primary with the scratch file attached under the
    /// instance name. Unqualified statements resolve through the attach,
    /// mirroring consumers that address the database by name.
    Attached,
}

impl ScratchDb {
    /// Opens a context with the scratch database attached under
    /// [`name`](ScratchDb::name). Queries may address tables unqualified or
    /// as `"name".table`.
    ///
    /// # Errors
    ///
    /// Fails with [`ScratchError::ContextOpen`] while another context is
    /// live.
    pub fn context(&self) -> Result<Context<'_>, ScratchError> {
        self.open_context(ContextMode::Attached)
    }

    /// Opens a context directly on the scratch file. Schema changes must go
    /// through this mode: DDL targets the connection's `main` database,
    /// which in an attached context is the in-memory primary.
    ///
    /// # Errors
    ///
    /// Fails with [`ScratchError::ContextOpen`] while another context is
    /// live.
    pub fn context_direct(&self) -> Result<Context<'_>, ScratchError> {
        self.open_context(ContextMode::Direct)
    }

    fn open_context(&self, mode: ContextMode) -> Result<Context<'_>, ScratchError> {
        if self.context_open.get() {
            return Err(ScratchError::ContextOpen);
        }

        // Claim the slot only once the connection exists, so a failed open
        // leaves the instance usable.
        let conn = self.open_connection(mode)?;
        self.context_open.set(true);

        tracing::debug!(name = %self.paths.db_name, ?mode, "opened scratch context");
        Ok(Context {
            db: self,
            conn: Some(conn),
        })
    }

    fn open_connection(&self, mode: ContextMode) -> Result<Connection, ScratchError> {
        let conn = match mode {
            ContextMode::Direct => {
                Connection::open_with_flags(&self.paths.db_path, connection_flags())?
            }
            ContextMode::Attached => {
                let conn = Connection::open_in_memory_with_flags(connection_flags())?;
                let db_path = self.paths.db_path.to_string_lossy();
                conn.execute(
                    &format!("ATTACH DATABASE ?1 AS \"{}\"", self.paths.db_name),
                    [db_path.as_ref()],
                )?;
                conn
            }
        };

        conn.execute_batch(&format!(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = {};",
            self.options.busy_timeout_ms
        ))?;

        // The file was stamped to WAL at creation; a connection that does
        // not see it is reading the wrong database.
        let schema = match mode {
            ContextMode::Direct => "main".to_string(),
            ContextMode::Attached => format!("\"{}\"", self.paths.db_name),
        };
        let journal_mode: String =
            conn.query_row(&format!("PRAGMA {schema}.journal_mode;"), [], |row| {
                row.get(0)
            })?;
        if journal_mode != "wal" {
            return Err(ScratchError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!(
                    "scratch database is not in WAL mode, got: {journal_mode}"
                )),
            )));
        }

        Ok(conn)
    }
}

/// Maps a query row to a value. Implemented by the row shapes handed to
/// [`Context::query_rows`]; each column is read independently, so nullable
/// columns come through as `Option`.
pub trait FromRow: Sized {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// A live connection to the scratch database, holding the instance's
/// single context slot. The borrow of [`ScratchDb`] makes destroying the
/// instance while a context is open a compile error; dropping the context
/// releases the slot.
#[derive(Debug)]
pub struct Context<'db> {
    db: &'db ScratchDb,
    conn: Option<Connection>,
}

impl Context<'_> {
    /// The underlying connection, for statements the convenience methods
    /// do not cover.
    pub fn connection(&self) -> &Connection {
        self.conn.as_ref().expect("connection is present until drop")
    }

    /// Executes a single statement, returning the affected row count.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize, ScratchError> {
        Ok(self.connection().execute(sql, params)?)
    }

    /// Runs a query and maps every row through [`FromRow`].
    pub fn query_rows<T: FromRow>(&self, sql: &str) -> Result<Vec<T>, ScratchError> {
        let mut stmt = self.connection().prepare(sql)?;
        let rows = stmt.query_map([], T::from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Applies a schema batch. The statements run against the connection's
    /// `main` database, so call this on a [direct](ScratchDb::context_direct)
    /// context. An empty batch is a no-op, and idempotent DDL
    /// (`CREATE TABLE IF NOT EXISTS ...`) keeps repeated runs safe.
    pub fn ensure_schema(&self, sql: &str) -> Result<(), ScratchError> {
        if sql.trim().is_empty() {
            return Ok(());
        }
        self.connection().execute_batch(sql)?;
        Ok(())
    }
}

impl Drop for Context<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                tracing::warn!(
                    name = %self.db.paths.db_name,
                    error = %e,
                    "failed to close scratch context connection"
                );
            }
        }
        self.db.context_open.set(false);
        tracing::debug!(name = %self.db.paths.db_name, "released scratch context");
    }
}
