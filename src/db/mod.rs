//! The ledger store: persisted monthly budgets, rule sets and per-family sync state.
//!
//! `LedgerStore` is the contract the pipeline depends on. `Db` implements it on top of a SQLite
//! file managed with `sqlx`.

mod migrations;
mod sqlite;

use crate::error::Res;
use crate::model::{MonthCommit, MonthlyBudget, RuleSet, RuleUpdate, Rules, SyncState, YearMonth};
use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Durable storage for everything the sync pipeline keeps between runs.
///
/// Writes that can race with another writer are conditional. When the condition fails the returned
/// error's chain contains a `StoreConflict`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// The budget record for a family and month, if one exists.
    async fn get_budget(
        &self,
        family_id: &str,
        month: YearMonth,
    ) -> anyhow::Result<Option<MonthlyBudget>>;

    /// Writes a month's new totals and records the contributing transaction ids, atomically and
    /// only if the record is still at `commit.expected_version`. Unless `commit.replace` is set,
    /// the commit also conflicts if any of its ids was already recorded.
    async fn commit_month(&self, commit: &MonthCommit) -> anyhow::Result<MonthlyBudget>;

    /// The ids of every transaction already folded into one of the family's months.
    async fn synced_ids(&self, family_id: &str) -> anyhow::Result<HashSet<String>>;

    /// Both rule sets for a family. Missing rule sets are `None`.
    async fn get_rules(&self, family_id: &str) -> anyhow::Result<Rules>;

    /// Applies `update` to the family's rule set for `update.flow_type` and marks the family's
    /// rules as changed, in one transaction. Returns the updated rule set.
    async fn update_rule(&self, family_id: &str, update: &RuleUpdate) -> anyhow::Result<RuleSet>;

    /// The family's sync state. A family that never synced gets a fresh state.
    async fn get_sync_state(&self, family_id: &str) -> anyhow::Result<SyncState>;

    /// Records a completed sync: moves the cursor and marks the rules generation seen in
    /// `observed` as applied. Fails with a conflict if another sync completed since `observed` was
    /// read.
    async fn commit_sync_state(
        &self,
        observed: &SyncState,
        cursor: Option<DateTime<Utc>>,
    ) -> anyhow::Result<SyncState>;
}

/// A SQLite-backed `LedgerStore`.
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// - Validates that no file currently exists at `path`
    /// - Creates a new SQLite file at `path`
    /// - Creates the schema
    pub async fn init(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            bail!("A database already exists at {}", path.display());
        }
        let pool = connect(path, true).await?;
        sqlx::query("CREATE TABLE schema_version (version INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .context("Unable to create the schema_version table")?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (0)")
            .execute(&pool)
            .await
            .context("Unable to initialize schema_version")?;
        migrations::run(&pool, 0, migrations::CURRENT_VERSION).await?;
        debug!("Created ledger database at {}", path.display());
        Ok(Self { pool })
    }

    /// - Validates that the SQLite file at `path` exists
    /// - Upgrades the schema if it is older than this build expects
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("The database file is missing '{}'", path.display());
        }
        let pool = connect(path, false).await?;
        let version = schema_version(&pool).await?;
        if version > migrations::CURRENT_VERSION {
            bail!(
                "The database schema is version {version} but this program only understands up to \
                 version {}",
                migrations::CURRENT_VERSION
            );
        }
        migrations::run(&pool, version, migrations::CURRENT_VERSION).await?;
        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn connect(path: &Path, create: bool) -> Res<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
        .context("Unable to build SQLite connection options")?
        .create_if_missing(create)
        .foreign_keys(true);

    // A single connection serializes writers, which keeps the conditional updates simple.
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("Unable to open SQLite database at {}", path.display()))
}

async fn schema_version(pool: &SqlitePool) -> Res<i32> {
    let row: (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .context("Unable to read schema_version")?;
    Ok(row.0.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.sqlite");
        let db = Db::init(&path).await.unwrap();
        assert_eq!(schema_version(db.pool()).await.unwrap(), 1);
        drop(db);

        let db = Db::load(&path).await.unwrap();
        assert_eq!(schema_version(db.pool()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_init_refuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.sqlite");
        let _db = Db::init(&path).await.unwrap();
        assert!(Db::init(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_load_requires_file() {
        let dir = TempDir::new().unwrap();
        assert!(Db::load(dir.path().join("nope.sqlite")).await.is_err());
    }
}
