//! SQLite-backed storage for layout records and selection history.
//!
//! Records are partitioned by namespace. Writes are upserts keyed on
//! `(namespace, id)` and run in a transaction, so each key is updated
//! atomically. Reads skip records that cannot be decoded instead of failing.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

use super::migration::{self, CURRENT_RECORD_VERSION};
use crate::error::StoreError;
use crate::models::{Layout, LayoutHistory, LayoutId, Namespace};

/// Durable per-namespace store of layouts and the "last used" history.
#[derive(Debug, Clone)]
pub struct LocalLayoutStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct LayoutRow {
    namespace: String,
    parent: String,
    id: String,
    version: i64,
    record: String,
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    parent: String,
    layout_id: String,
    selected_at: String,
}

impl LocalLayoutStore {
    /// Opens (or creates) the store at `path`.
    ///
    /// Runs the SQL schema migrations, then upgrades records written by older
    /// engine versions. Records that cannot be upgraded are dropped with a
    /// warning; they never fail initialization.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Initializes the store on an existing connection pool.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations").run(&pool).await?;

        let store = Self { pool };
        store.upgrade_records().await?;
        Ok(store)
    }

    /// Rewrites every record older than the current version.
    ///
    /// Returns the number of records upgraded.
    async fn upgrade_records(&self) -> Result<usize, StoreError> {
        let rows: Vec<LayoutRow> = sqlx::query_as(
            "SELECT namespace, parent, id, version, record FROM layouts WHERE version < ?",
        )
        .bind(CURRENT_RECORD_VERSION)
        .fetch_all(&self.pool)
        .await?;

        let mut upgraded = 0;
        for row in rows {
            match decode(&row) {
                Ok(layout) => {
                    self.put(&Namespace::new(row.namespace.clone()), &layout)
                        .await?;
                    upgraded += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        namespace = %row.namespace,
                        id = %row.id,
                        version = row.version,
                        "Dropping layout record that cannot be migrated: {}",
                        e
                    );
                    sqlx::query("DELETE FROM layouts WHERE namespace = ? AND parent = ? AND id = ?")
                        .bind(&row.namespace)
                        .bind(&row.parent)
                        .bind(&row.id)
                        .execute(&self.pool)
                        .await?;
                }
            }
        }

        if upgraded > 0 {
            tracing::info!("Upgraded {} layout record(s) to version {}", upgraded, CURRENT_RECORD_VERSION);
        }

        Ok(upgraded)
    }

    /// Lists all layouts in a namespace, skipping unreadable records.
    pub async fn list(&self, namespace: &Namespace) -> Result<Vec<Layout>, StoreError> {
        let rows: Vec<LayoutRow> = sqlx::query_as(
            "SELECT namespace, parent, id, version, record FROM layouts WHERE namespace = ? ORDER BY parent, id",
        )
        .bind(namespace.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(decode_or_skip).collect())
    }

    pub async fn get(
        &self,
        namespace: &Namespace,
        id: &LayoutId,
    ) -> Result<Option<Layout>, StoreError> {
        let row: Option<LayoutRow> = sqlx::query_as(
            "SELECT namespace, parent, id, version, record FROM layouts WHERE namespace = ? AND id = ?",
        )
        .bind(namespace.as_str())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().and_then(decode_or_skip))
    }

    /// Inserts or replaces the layout with the same `(namespace, id)`.
    pub async fn put(&self, namespace: &Namespace, layout: &Layout) -> Result<Layout, StoreError> {
        let record = migration::serialize(layout)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM layouts WHERE namespace = ? AND id = ?")
            .bind(namespace.as_str())
            .bind(layout.id.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO layouts (namespace, parent, id, version, record) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(namespace.as_str())
        .bind(&layout.parent)
        .bind(layout.id.as_str())
        .bind(CURRENT_RECORD_VERSION)
        .bind(&record)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(layout.clone())
    }

    /// Removes a layout record. Removing a missing record is not an error.
    pub async fn delete(&self, namespace: &Namespace, id: &LayoutId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM layouts WHERE namespace = ? AND id = ?")
            .bind(namespace.as_str())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_history(
        &self,
        namespace: &Namespace,
        parent: &str,
    ) -> Result<Option<LayoutHistory>, StoreError> {
        let row: Option<HistoryRow> = sqlx::query_as(
            "SELECT parent, layout_id, selected_at FROM layout_history WHERE namespace = ? AND parent = ?",
        )
        .bind(namespace.as_str())
        .bind(parent)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        match DateTime::parse_from_rfc3339(&row.selected_at) {
            Ok(selected_at) => Ok(Some(LayoutHistory {
                parent: row.parent,
                layout_id: LayoutId::from(row.layout_id),
                selected_at: selected_at.with_timezone(&Utc),
            })),
            Err(e) => {
                tracing::warn!(namespace = %namespace, parent = %parent, "Skipping corrupt history record: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn put_history(
        &self,
        namespace: &Namespace,
        history: &LayoutHistory,
    ) -> Result<LayoutHistory, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO layout_history (namespace, parent, layout_id, selected_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(namespace, parent) DO UPDATE
            SET layout_id = excluded.layout_id, selected_at = excluded.selected_at
            "#,
        )
        .bind(namespace.as_str())
        .bind(&history.parent)
        .bind(history.layout_id.as_str())
        .bind(history.selected_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(history.clone())
    }
}

fn decode(row: &LayoutRow) -> Result<Layout, StoreError> {
    let mut layout = migration::migrate(row.version, &row.record)?;
    // Key columns are authoritative over the record body.
    layout.id = LayoutId::from(row.id.clone());
    if layout.parent.is_empty() {
        layout.parent = row.parent.clone();
    }
    Ok(layout)
}

fn decode_or_skip(row: &LayoutRow) -> Option<Layout> {
    match decode(row) {
        Ok(layout) => Some(layout),
        Err(e) => {
            tracing::warn!(
                namespace = %row.namespace,
                id = %row.id,
                record_id = ?migration::record_id(&row.record),
                "Skipping unreadable layout record: {}",
                e
            );
            None
        }
    }
}
