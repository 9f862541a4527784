//! Shared fixtures: a throwaway SQLite database with a minimal `location` table

#![allow(dead_code)]

use std::path::Path;

use anyhow::Result;
use sqlx::{Connection, SqliteConnection};
use tempfile::TempDir;

use cdw_sqlgen::validator::CheckSet;
use cdw_sqlgen::{DatabaseConfig, ScriptExecutor, SqlExecutor};

pub const LOCATION_DDL: &str = "CREATE TABLE location (
    location_id INTEGER,
    address_1 TEXT,
    address_2 TEXT,
    city TEXT,
    state TEXT,
    zip TEXT,
    county TEXT,
    location_source_value TEXT
);";

pub struct TestDb {
    pub dir: TempDir,
    pub config: DatabaseConfig,
}

impl TestDb {
    /// Fresh database file with the `location` table; checks use schema `main`
    pub async fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let config = DatabaseConfig::from_url(sqlite_url(&dir.path().join("cdw.db")), "main");
        let db = Self { dir, config };
        let setup = db
            .executor()
            .execute(LOCATION_DDL, &CheckSet::empty("setup"))
            .await?;
        assert!(setup.committed, "setup failed: {:?}", setup.execution);
        Ok(db)
    }

    pub fn executor(&self) -> SqlExecutor {
        SqlExecutor::new(self.config.clone())
    }

    pub async fn count(&self, table: &str) -> Result<i64> {
        let url = self.config.connection_url()?;
        let mut conn = SqliteConnection::connect(&url).await?;
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&mut conn)
            .await?;
        conn.close().await?;
        Ok(n)
    }
}

pub fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}?mode=rwc", path.display())
}

pub fn insert_location(id: i64, address: &str, zip: &str) -> String {
    format!(
        "INSERT INTO main.location (location_id, address_1, city, state, zip) \
         VALUES ({}, '{}', 'Boston', 'MA', '{}');",
        id, address, zip
    )
}
