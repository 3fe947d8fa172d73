//! Hierarchical entity store backed by SQLite.
//!
//! Every entity lives in one `entities` table as a JSON document, addressed
//! by a [`Key`] whose parent chain is persisted in the `parent` column. That
//! gives the operations the rest of the crate relies on:
//!
//! - `get` / `put` / `delete` of a single entity by key,
//! - batch `put_multi` / `delete_multi`,
//! - ancestor queries with property filters and ordering ([`Query`]),
//! - transactional grouping through [`Store::begin`].
//!
//! All operations take a `&mut SqliteConnection`, so the same call works on a
//! pooled connection or inside a transaction:
//!
//! ```rust,no_run
//! use mealplan_core::store::{self, Store, key::{Key, Kind}};
//! use mealplan_core::model::Word;
//! # use std::path::Path;
//!
//! # async fn demo() -> mealplan_core::PlannerResult<()> {
//! let store = Store::open(Path::new("/tmp/planner")).await?;
//! let library = Key::new(Kind::Library, 1, None);
//!
//! let mut tx = store.begin().await?;
//! let key = store::put(&mut tx, &Key::incomplete(Kind::Tag, Some(&library)), &Word::new("quick")).await?;
//! tx.commit().await?;
//!
//! let mut conn = store.acquire().await?;
//! let tag: Word = store::get(&mut conn, &key).await?;
//! # Ok(())
//! # }
//! ```

pub mod key;
pub mod query;

use crate::error::{PlannerError, PlannerResult};
use key::{Key, Kind};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub use query::{FilterValue, Query};

#[derive(Clone)]
pub struct Store {
    pub(crate) pool: SqlitePool,
}

impl Store {
    /// Opens (creating if needed) the database file `.mealplan.db` inside `dir`.
    pub async fn open(dir: &Path) -> PlannerResult<Self> {
        let db_path = dir.join(".mealplan.db");
        Store::connect(&format!("sqlite:{}?mode=rwc", db_path.display())).await
    }

    pub async fn connect(url: &str) -> PlannerResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                parent TEXT,
                data TEXT NOT NULL DEFAULT '{}'
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS entities_kind_parent ON entities (kind, parent)")
            .execute(&pool)
            .await?;

        Ok(Store { pool })
    }

    pub async fn acquire(&self) -> PlannerResult<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Starts a transaction; dropping it without `commit` rolls back.
    pub async fn begin(&self) -> PlannerResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Total number of stored entities of `kind`, across every library.
    pub async fn count(&self, kind: Kind) -> PlannerResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM entities WHERE kind = ?")
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get(0))
    }
}

pub(crate) fn row_key(kind: &str, id: i64, parent: Option<&str>) -> PlannerResult<Key> {
    let parent = parent.map(Key::from_path).transpose()?;
    Ok(Key::new(kind.parse()?, id, parent.as_ref()))
}

fn parent_path(key: &Key) -> Option<String> {
    key.parent().map(Key::path)
}

/// Fetches the entity stored under `key`.
///
/// A missing entity, or a key whose parent chain differs from the stored
/// one, yields [`PlannerError::UnknownItem`].
pub async fn get<T: DeserializeOwned>(conn: &mut SqliteConnection, key: &Key) -> PlannerResult<T> {
    get_opt(conn, key).await?.ok_or(PlannerError::UnknownItem)
}

pub async fn get_opt<T: DeserializeOwned>(
    conn: &mut SqliteConnection,
    key: &Key,
) -> PlannerResult<Option<T>> {
    if key.is_incomplete() {
        return Ok(None);
    }

    let row = sqlx::query("SELECT data FROM entities WHERE id = ? AND kind = ? AND parent IS ?")
        .bind(key.id())
        .bind(key.kind().as_str())
        .bind(parent_path(key))
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let data: String = row.get(0);
            Ok(Some(serde_json::from_str(&data)?))
        }
        None => Ok(None),
    }
}

/// Stores `value` under `key`, returning the complete key.
///
/// An incomplete key is assigned a fresh id. A complete key overwrites the
/// existing entity only when kind and parent chain match; a key that points
/// at an entity of another shape is rejected as [`PlannerError::UnknownItem`].
pub async fn put<T: Serialize>(
    conn: &mut SqliteConnection,
    key: &Key,
    value: &T,
) -> PlannerResult<Key> {
    let data = serde_json::to_string(value)?;

    if key.is_incomplete() {
        let res = sqlx::query("INSERT INTO entities (kind, parent, data) VALUES (?, ?, ?)")
            .bind(key.kind().as_str())
            .bind(parent_path(key))
            .bind(data)
            .execute(&mut *conn)
            .await?;

        return Ok(Key::new(key.kind(), res.last_insert_rowid(), key.parent()));
    }

    let res = sqlx::query(
        "INSERT INTO entities (id, kind, parent, data) VALUES (?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET data = excluded.data
         WHERE entities.kind = excluded.kind AND entities.parent IS excluded.parent",
    )
    .bind(key.id())
    .bind(key.kind().as_str())
    .bind(parent_path(key))
    .bind(data)
    .execute(&mut *conn)
    .await?;

    if res.rows_affected() == 0 {
        return Err(PlannerError::UnknownItem);
    }

    Ok(key.clone())
}

pub async fn put_multi<T: Serialize>(
    conn: &mut SqliteConnection,
    keys: &[Key],
    values: &[T],
) -> PlannerResult<Vec<Key>> {
    if keys.len() != values.len() {
        return Err(PlannerError::Other(format!(
            "put_multi: {} keys for {} values",
            keys.len(),
            values.len()
        )));
    }

    let mut stored = Vec::with_capacity(keys.len());
    for (key, value) in keys.iter().zip(values) {
        stored.push(put(conn, key, value).await?);
    }
    Ok(stored)
}

/// Deletes the entity under `key`. Deleting a missing entity is not an error.
pub async fn delete(conn: &mut SqliteConnection, key: &Key) -> PlannerResult<()> {
    sqlx::query("DELETE FROM entities WHERE id = ? AND kind = ? AND parent IS ?")
        .bind(key.id())
        .bind(key.kind().as_str())
        .bind(parent_path(key))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn delete_multi(conn: &mut SqliteConnection, keys: &[Key]) -> PlannerResult<()> {
    for key in keys {
        delete(conn, key).await?;
    }
    Ok(())
}

/// Deletes every strict descendant of `key`, whatever its kind.
pub async fn delete_descendants(conn: &mut SqliteConnection, key: &Key) -> PlannerResult<u64> {
    let path = key.path();
    let res = sqlx::query("DELETE FROM entities WHERE parent = ? OR parent LIKE ?")
        .bind(&path)
        .bind(format!("{path}/%"))
        .execute(&mut *conn)
        .await?;
    Ok(res.rows_affected())
}
