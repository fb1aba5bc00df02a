//! Versioned schema migrations for the ledger database.
//!
//! Each schema version `NN` has two files next to this module:
//! - `migration_NN_up.sql` takes the schema from `NN-1` to `NN`
//! - `migration_NN_down.sql` takes the schema from `NN` back to `NN-1`

use crate::error::Res;
use anyhow::{bail, Context};
use sqlx::{Executor, SqlitePool};
use tracing::debug;

/// The schema version this build of the crate expects.
pub(crate) const CURRENT_VERSION: i32 = 1;

struct Migration {
    version: i32,
    up: &'static str,
    down: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    up: include_str!("migration_01_up.sql"),
    down: include_str!("migration_01_down.sql"),
}];

fn find(version: i32) -> Res<&'static Migration> {
    MIGRATIONS
        .iter()
        .find(|m| m.version == version)
        .with_context(|| format!("Migration {version:02} not found"))
}

/// Moves the schema from `from` to `to`, one version at a time. Going up runs `up` scripts in
/// ascending order, going down runs `down` scripts in descending order. Each step commits together
/// with its `schema_version` row, so an interrupted run leaves the schema at a known version.
pub(crate) async fn run(pool: &SqlitePool, from: i32, to: i32) -> Res<()> {
    if from == to {
        debug!("Schema is at version {to}, nothing to migrate");
        return Ok(());
    }
    check_available(from, to)?;

    if from < to {
        for version in (from + 1)..=to {
            debug!("Applying migration {version:02} up");
            apply(pool, find(version)?.up, version).await?;
        }
    } else {
        for version in ((to + 1)..=from).rev() {
            debug!("Applying migration {version:02} down");
            apply(pool, find(version)?.down, version - 1).await?;
        }
    }

    debug!("Schema migrated from version {from} to {to}");
    Ok(())
}

async fn apply(pool: &SqlitePool, sql: &str, resulting_version: i32) -> Res<()> {
    let mut tx = pool
        .begin()
        .await
        .context("Unable to start a migration transaction")?;

    tx.execute(sql)
        .await
        .with_context(|| format!("Migration to version {resulting_version} failed"))?;

    sqlx::query("DELETE FROM schema_version")
        .execute(&mut *tx)
        .await
        .context("Unable to clear schema_version")?;
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(resulting_version)
        .execute(&mut *tx)
        .await
        .context("Unable to record the new schema_version")?;

    tx.commit()
        .await
        .context("Unable to commit the migration transaction")
}

/// Fails before anything runs if any step between `from` and `to` has no migration.
fn check_available(from: i32, to: i32) -> Res<()> {
    let (low, high) = if from < to { (from + 1, to) } else { (to + 1, from) };
    for version in low..=high {
        if !MIGRATIONS.iter().any(|m| m.version == version) {
            bail!("Cannot migrate from version {from} to {to}, migration {version:02} is missing");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;
    use tempfile::TempDir;

    const TABLES: [&str; 4] = ["budget", "rule_sets", "sync_state", "synced_transactions"];

    async fn empty_db() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("migrations.sqlite");
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .unwrap()
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE schema_version (version INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO schema_version (version) VALUES (0)")
            .execute(&pool)
            .await
            .unwrap();
        (dir, pool)
    }

    async fn version(pool: &SqlitePool) -> i32 {
        let row: (i32,) = sqlx::query_as("SELECT MAX(version) FROM schema_version")
            .fetch_one(pool)
            .await
            .unwrap();
        row.0
    }

    async fn has_table(pool: &SqlitePool, name: &str) -> bool {
        let row: (i32,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?")
                .bind(name)
                .fetch_one(pool)
                .await
                .unwrap();
        row.0 > 0
    }

    #[tokio::test]
    async fn test_up_then_down() {
        let (_dir, pool) = empty_db().await;
        run(&pool, 0, CURRENT_VERSION).await.unwrap();
        assert_eq!(version(&pool).await, CURRENT_VERSION);
        for table in TABLES {
            assert!(has_table(&pool, table).await, "{table} should exist");
        }

        run(&pool, CURRENT_VERSION, 0).await.unwrap();
        assert_eq!(version(&pool).await, 0);
        for table in TABLES {
            assert!(!has_table(&pool, table).await, "{table} should be gone");
        }
    }

    #[tokio::test]
    async fn test_same_version_is_noop() {
        let (_dir, pool) = empty_db().await;
        run(&pool, 0, 1).await.unwrap();
        run(&pool, 1, 1).await.unwrap();
        assert_eq!(version(&pool).await, 1);
    }

    #[test]
    fn test_missing_migration_is_detected() {
        assert!(check_available(0, 1).is_ok());
        assert!(check_available(1, 0).is_ok());
        assert!(check_available(0, 2).is_err());
        assert!(check_available(3, 1).is_err());
    }
}
