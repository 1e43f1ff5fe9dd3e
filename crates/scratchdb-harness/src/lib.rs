//! Test harness for raw-query row mapping against a scratch database.
//!
//! The interesting machinery lives in [`scratchdb`]; this crate only
//! declares the row shapes and schema the regression tests run against: a
//! keyed `widgets` table and a keyless summary projection that exists
//! purely as the result shape of raw queries.

use rusqlite::Row;
use scratchdb::{Context, FromRow, ScratchError, ScratchOptions};

/// Schema applied to every harness database.
pub const SCHEMA: &str = include_str!("schema.sql");

/// Options preconfigured for the harness: widget schema, `widgetdb` name
/// prefix. Override `dir` to sandbox the files.
pub fn harness_options() -> ScratchOptions {
    ScratchOptions {
        prefix: "widgetdb".to_string(),
        schema_sql: SCHEMA.to_string(),
        ..ScratchOptions::default()
    }
}

/// A row of the `widgets` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Widget {
    pub id: i64,
    pub label: Option<String>,
}

impl FromRow for Widget {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            label: row.get(1)?,
        })
    }
}

/// A keyless projection: label, quantity, price, each independently
/// nullable. Raw queries decide what lands in each column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetSummary {
    pub label: Option<String>,
    pub quantity: Option<i64>,
    pub price: Option<i64>,
}

impl FromRow for WidgetSummary {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            label: row.get(0)?,
            quantity: row.get(1)?,
            price: row.get(2)?,
        })
    }
}

/// Inserts a widget through the given context.
pub fn seed_widget(ctx: &Context<'_>, widget: &Widget) -> Result<(), ScratchError> {
    ctx.execute(
        "INSERT INTO widgets (id, label) VALUES (?1, ?2)",
        rusqlite::params![widget.id, widget.label],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scratchdb::ScratchDb;
    use tempfile::TempDir;

    fn harness_db(tmp: &TempDir) -> ScratchDb {
        ScratchDb::create(ScratchOptions {
            dir: Some(tmp.path().to_path_buf()),
            ..harness_options()
        })
        .expect("should create harness db")
    }

    #[test]
    fn setup_creates_the_widgets_table() {
        let tmp = TempDir::new().expect("should create temp dir");
        let db = harness_db(&tmp);

        // An unqualified sqlite_master resolves to the connection's main
        // database, so inspect the catalogue through a direct context.
        let ctx = db.context_direct().expect("should open direct context");
        let count: i64 = ctx
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'widgets'",
                [],
                |row| row.get(0),
            )
            .expect("should query sqlite_master");
        assert_eq!(count, 1, "the schema should create exactly the widgets table");
    }

    #[test]
    fn seeded_widgets_read_back() {
        let tmp = TempDir::new().expect("should create temp dir");
        let db = harness_db(&tmp);

        let widget = Widget {
            id: 1,
            label: Some("flange".to_string()),
        };
        let ctx = db.context().expect("should open context");
        seed_widget(&ctx, &widget).expect("should seed widget");

        let rows: Vec<Widget> = ctx
            .query_rows("SELECT id, label FROM widgets ORDER BY id")
            .expect("should read widgets back");
        assert_eq!(rows, vec![widget]);
    }
}
