use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use crud::adapter::Query;
use serde_json::Value;
use shared::domain::{FieldMap, RecordKey};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

mod entity;
mod gateway;
mod session;

pub use entity::{EntityManager, EntityRepository, UnitOfWork};
pub use gateway::TableGateway;
pub use session::SqliteSessionStore;

const MEMORY_URL: &str = "sqlite::memory:";

/// SQLite store holding every resource's records as JSON rows.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredRow {
    pub key: RecordKey,
    pub fields: FieldMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredPending {
    pub controller: String,
    pub data: FieldMap,
}

/// A queued write, applied by [`Storage::apply_changes`].
#[derive(Debug, Clone, PartialEq)]
pub enum RowChange {
    /// Insert under the next free numeric key, written into `key_field`.
    Insert {
        resource: String,
        key_field: String,
        fields: FieldMap,
    },
    Upsert {
        resource: String,
        key: RecordKey,
        fields: FieldMap,
    },
    Delete {
        resource: String,
        key: RecordKey,
    },
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // every in-memory connection is a separate database
        let max_connections = if database_url.starts_with(MEMORY_URL) { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn upsert_row(&self, resource: &str, key: &RecordKey, fields: &FieldMap) -> Result<()> {
        let encoded = serde_json::to_string(fields)?;
        sqlx::query(
            "INSERT INTO records (resource, key, fields) VALUES (?, ?, ?)
             ON CONFLICT(resource, key) DO UPDATE SET fields=excluded.fields, updated_at=CURRENT_TIMESTAMP",
        )
        .bind(resource)
        .bind(key.as_str())
        .bind(encoded)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to store {resource} record '{key}'"))?;
        Ok(())
    }

    pub async fn load_row(&self, resource: &str, key: &RecordKey) -> Result<Option<StoredRow>> {
        let row = sqlx::query(
            "SELECT key, fields, created_at, updated_at FROM records WHERE resource = ? AND key = ?",
        )
        .bind(resource)
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(decode_row).transpose()
    }

    /// Returns the number of rows removed.
    pub async fn delete_row(&self, resource: &str, key: &RecordKey) -> Result<u64> {
        let result = sqlx::query("DELETE FROM records WHERE resource = ? AND key = ?")
            .bind(resource)
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_rows(&self, resource: &str, query: &Query) -> Result<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
        push_selection(&mut builder, resource, query);
        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("failed to count {resource} records"))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Selects rows matching `query`; `limit` of `None` returns everything
    /// from `offset` on.
    pub async fn select_rows(
        &self,
        resource: &str,
        query: &Query,
        limit: Option<u32>,
        offset: u64,
    ) -> Result<Vec<StoredRow>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT key, fields, created_at, updated_at");
        push_selection(&mut builder, resource, query);
        push_ordering(&mut builder, query);
        builder
            .push(" LIMIT ")
            .push_bind(limit.map(i64::from).unwrap_or(-1))
            .push(" OFFSET ")
            .push_bind(i64::try_from(offset).unwrap_or(i64::MAX));

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to select {resource} records"))?;
        rows.into_iter().map(decode_row).collect()
    }

    /// Inserts `fields` under the next free integer key of `resource` and
    /// writes that key into `key_field`. Key choice and insert are one
    /// statement, so concurrent inserts never share a key.
    pub async fn insert_next(
        &self,
        resource: &str,
        key_field: &str,
        fields: &FieldMap,
    ) -> Result<RecordKey> {
        let mut conn = self.pool.acquire().await?;
        insert_next_key(&mut conn, resource, key_field, fields).await
    }

    /// Applies queued writes atomically, in order. Returns the keys assigned
    /// to `Insert` changes.
    pub async fn apply_changes(&self, changes: &[RowChange]) -> Result<Vec<RecordKey>> {
        let mut tx = self.pool.begin().await?;
        let mut assigned = Vec::new();
        for change in changes {
            match change {
                RowChange::Insert {
                    resource,
                    key_field,
                    fields,
                } => {
                    assigned.push(insert_next_key(&mut tx, resource, key_field, fields).await?);
                }
                RowChange::Upsert {
                    resource,
                    key,
                    fields,
                } => {
                    sqlx::query(
                        "INSERT INTO records (resource, key, fields) VALUES (?, ?, ?)
                         ON CONFLICT(resource, key) DO UPDATE SET fields=excluded.fields, updated_at=CURRENT_TIMESTAMP",
                    )
                    .bind(resource)
                    .bind(key.as_str())
                    .bind(serde_json::to_string(fields)?)
                    .execute(&mut *tx)
                    .await?;
                }
                RowChange::Delete { resource, key } => {
                    sqlx::query("DELETE FROM records WHERE resource = ? AND key = ?")
                        .bind(resource)
                        .bind(key.as_str())
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await.context("failed to commit queued changes")?;
        Ok(assigned)
    }

    /// Resource names with their row counts.
    pub async fn list_resources(&self) -> Result<Vec<(String, u64)>> {
        let rows = sqlx::query(
            "SELECT resource, COUNT(*) FROM records GROUP BY resource ORDER BY resource",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let count = r.get::<i64, _>(1);
                (r.get::<String, _>(0), u64::try_from(count).unwrap_or_default())
            })
            .collect())
    }

    pub async fn store_pending(&self, session_id: &str, controller: &str, data: &FieldMap) -> Result<()> {
        sqlx::query(
            "INSERT INTO pending_submissions (session_id, controller, data) VALUES (?, ?, ?)
             ON CONFLICT(session_id) DO UPDATE SET controller=excluded.controller, data=excluded.data, created_at=CURRENT_TIMESTAMP",
        )
        .bind(session_id)
        .bind(controller)
        .bind(serde_json::to_string(data)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Removes and returns the pending submission of a session.
    pub async fn consume_pending(&self, session_id: &str) -> Result<Option<StoredPending>> {
        let row = sqlx::query(
            "DELETE FROM pending_submissions WHERE session_id = ? RETURNING controller, data",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let data = serde_json::from_str::<FieldMap>(&r.get::<String, _>(1))
                .context("pending submission is not a JSON object")?;
            Ok(StoredPending {
                controller: r.get::<String, _>(0),
                data,
            })
        })
        .transpose()
    }
}

async fn insert_next_key(
    conn: &mut SqliteConnection,
    resource: &str,
    key_field: &str,
    fields: &FieldMap,
) -> Result<RecordKey> {
    let key: String = sqlx::query_scalar(
        "INSERT INTO records (resource, key, fields)
         SELECT ?, CAST(next_key AS TEXT), json_set(?, ?, next_key)
         FROM (SELECT COALESCE(MAX(CAST(key AS INTEGER)), 0) + 1 AS next_key
               FROM records
               WHERE resource = ? AND key GLOB '[0-9]*')
         RETURNING key",
    )
    .bind(resource)
    .bind(serde_json::to_string(fields)?)
    .bind(json_path(key_field))
    .bind(resource)
    .fetch_one(&mut *conn)
    .await
    .with_context(|| format!("failed to insert new {resource} record"))?;
    Ok(RecordKey::new(key))
}

fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', ""))
}

fn push_selection(builder: &mut QueryBuilder<'_, Sqlite>, resource: &str, query: &Query) {
    builder
        .push(" FROM records WHERE resource = ")
        .push_bind(resource.to_string());
    for filter in &query.filters {
        builder
            .push(" AND json_extract(fields, ")
            .push_bind(json_path(&filter.field))
            .push(")");
        match &filter.value {
            Value::Null => {
                builder.push(" IS NULL");
            }
            Value::Bool(b) => {
                builder.push(" = ").push_bind(i64::from(*b));
            }
            Value::Number(n) => match n.as_i64() {
                Some(i) => {
                    builder.push(" = ").push_bind(i);
                }
                None => {
                    builder.push(" = ").push_bind(n.as_f64().unwrap_or_default());
                }
            },
            Value::String(s) => {
                builder.push(" = ").push_bind(s.clone());
            }
            other => {
                builder.push(" = ").push_bind(other.to_string());
            }
        }
    }
}

const KEY_ORDER: &str = "CASE WHEN key GLOB '[0-9]*' THEN 0 ELSE 1 END, CAST(key AS INTEGER), key";

fn push_ordering(builder: &mut QueryBuilder<'_, Sqlite>, query: &Query) {
    builder.push(" ORDER BY ");
    if let Some(order) = &query.order {
        builder
            .push("json_extract(fields, ")
            .push_bind(json_path(&order.field))
            .push(if order.descending { ") DESC, " } else { ") ASC, " });
    }
    builder.push(KEY_ORDER);
}

fn decode_row(row: SqliteRow) -> Result<StoredRow> {
    let key = row.get::<String, _>(0);
    let fields = serde_json::from_str::<FieldMap>(&row.get::<String, _>(1))
        .with_context(|| format!("record '{key}' does not hold a JSON object"))?;
    Ok(StoredRow {
        key: RecordKey::new(key),
        fields,
        created_at: row.get::<DateTime<Utc>, _>(2),
        updated_at: row.get::<DateTime<Utc>, _>(3),
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with(MEMORY_URL) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
