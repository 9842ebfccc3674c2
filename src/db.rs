use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::error::{CollectError, Result};
use crate::model::{CollectionRun, SecurityListing, ThemeResult};
use crate::snapshot::SnapshotSink;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| CollectError::io(dir, e))?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS themes (
            position     INTEGER PRIMARY KEY,
            theme_name   TEXT NOT NULL,
            count        INTEGER NOT NULL,
            collected_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS theme_stocks (
            theme_position INTEGER NOT NULL REFERENCES themes(position) ON DELETE CASCADE,
            rank           INTEGER NOT NULL,
            code           TEXT NOT NULL,
            name           TEXT NOT NULL,
            UNIQUE(theme_position, code)
        );
        CREATE INDEX IF NOT EXISTS idx_theme_stocks_code ON theme_stocks(code);
        ",
    )?;
    Ok(())
}

/// Snapshot kept in two tables, replaced wholesale inside one transaction.
pub struct SqliteSnapshot {
    path: PathBuf,
    conn: Connection,
}

impl SqliteSnapshot {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let conn = connect(&path)?;
        init_schema(&conn)?;
        Ok(Self { path, conn })
    }
}

impl SnapshotSink for SqliteSnapshot {
    fn write(&mut self, run: &CollectionRun) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM theme_stocks", [])?;
        tx.execute("DELETE FROM themes", [])?;
        {
            let mut theme_stmt =
                tx.prepare("INSERT INTO themes (position, theme_name, count) VALUES (?1, ?2, ?3)")?;
            let mut stock_stmt = tx.prepare(
                "INSERT INTO theme_stocks (theme_position, rank, code, name) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (pos, theme) in run.themes().iter().enumerate() {
                theme_stmt.execute(rusqlite::params![pos as i64, theme.theme_name, theme.count as i64])?;
                for (rank, stock) in theme.stocks.iter().enumerate() {
                    stock_stmt.execute(rusqlite::params![pos as i64, rank as i64, stock.code, stock.name])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load(&self) -> Result<CollectionRun> {
        let mut theme_stmt =
            self.conn.prepare("SELECT position, theme_name FROM themes ORDER BY position")?;
        let themes = theme_stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stock_stmt = self.conn.prepare(
            "SELECT name, code FROM theme_stocks WHERE theme_position = ?1 ORDER BY rank",
        )?;
        let mut run = CollectionRun::new();
        for (pos, name) in themes {
            let stocks = stock_stmt
                .query_map([pos], |row| {
                    Ok(SecurityListing {
                        name: row.get(0)?,
                        code: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            run.push(ThemeResult::new(name, stocks));
        }
        Ok(run)
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}
