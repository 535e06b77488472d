//! Schema migrations for the ledger and event log databases
//!
//! A migration set is a list of embedded SQL files. Applied names are
//! recorded in sys_migrations.

use std::collections::HashSet;

use duckdb::Connection;

use crate::domain::result::{Error, Result};
use crate::migrations::MIGRATIONS;

/// Creates sys_migrations; must be idempotent
const BOOTSTRAP: &str = "000_migrations.sql";

/// Outcome of one migration run
#[derive(Debug)]
pub struct MigrationResult {
    /// Newly applied, in order
    pub applied: Vec<String>,
    pub already_applied: usize,
}

/// Applies an embedded migration set to one connection
pub struct MigrationService<'a> {
    conn: &'a Connection,
    migrations: &'static [(&'static str, &'static str)],
}

impl<'a> MigrationService<'a> {
    /// Runner for the ledger schema
    pub fn new(conn: &'a Connection) -> Self {
        Self::with_migrations(conn, MIGRATIONS)
    }

    pub fn with_migrations(
        conn: &'a Connection,
        migrations: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self { conn, migrations }
    }

    /// Apply every migration not yet recorded, in declaration order
    ///
    /// Each migration and its bookkeeping row commit together, so a failed
    /// migration leaves nothing behind and is retried on the next run.
    pub fn run_pending(&self) -> Result<MigrationResult> {
        if !self.tracking_table_exists()? {
            let (_, sql) = self
                .migrations
                .iter()
                .find(|(name, _)| *name == BOOTSTRAP)
                .ok_or_else(|| Error::database("migration set has no bootstrap migration"))?;
            self.conn.execute_batch(sql)?;
        }

        let recorded: HashSet<String> = self.get_applied()?.into_iter().collect();
        let mut result = MigrationResult {
            applied: Vec::new(),
            already_applied: 0,
        };

        for (name, sql) in self.migrations {
            if recorded.contains(*name) {
                result.already_applied += 1;
                continue;
            }
            self.apply(name, sql)?;
            result.applied.push(name.to_string());
        }

        Ok(result)
    }

    fn apply(&self, name: &str, sql: &str) -> Result<()> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;

        let outcome = self.conn.execute_batch(sql).and_then(|_| {
            self.conn
                .execute("INSERT INTO sys_migrations (migration_name) VALUES (?)", [name])
                .map(|_| ())
        });

        match outcome {
            Ok(()) => {
                self.conn.execute_batch("COMMIT")?;
                tracing::debug!(migration = name, "applied migration");
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    tracing::warn!(migration = name, error = %rollback, "rollback failed");
                }
                Err(Error::database(format!("migration {} failed: {}", name, e)))
            }
        }
    }

    fn tracking_table_exists(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'sys_migrations'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Recorded migration names, sorted
    pub fn get_applied(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT migration_name FROM sys_migrations ORDER BY migration_name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// Names in the set that are not recorded yet
    pub fn get_pending(&self) -> Result<Vec<String>> {
        let recorded: HashSet<String> = self.get_applied()?.into_iter().collect();
        Ok(self
            .migrations
            .iter()
            .map(|(name, _)| name.to_string())
            .filter(|name| !recorded.contains(name))
            .collect())
    }
}
