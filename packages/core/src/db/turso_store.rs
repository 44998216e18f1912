//! TursoStore - NodeStore Implementation for the libsql Backend
//!
//! TursoStore wraps `DatabaseService` and delegates to its `db_*` methods,
//! adding row conversion and the translation of [`NodeQuery`] filters into
//! SQL predicates over the configured position columns.
//!
//! # Examples
//!
//! ```rust,no_run
//! use nestedset_core::config::TreeConfig;
//! use nestedset_core::db::{DatabaseService, NodeStore, TursoStore};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/tree.db"), TreeConfig::default()).await?);
//!     let store: Arc<dyn NodeStore> = Arc::new(TursoStore::new(db));
//!     let node = store.get_node(1).await?;
//!     Ok(())
//! }
//! ```

use crate::db::node_store::{NodeOrder, NodeQuery, NodeStore, RangeFilter};
use crate::db::{DatabaseError, DatabaseService};
use crate::models::TreeNode;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::Row;
use serde_json::Value;
use std::sync::Arc;

/// NodeStore implementation for libsql
pub struct TursoStore {
    db: Arc<DatabaseService>,
}

impl TursoStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Parse timestamp from database - handles both SQLite and RFC3339 formats
    ///
    /// SQLite CURRENT_TIMESTAMP returns: "YYYY-MM-DD HH:MM:SS"
    pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Ok(naive.and_utc());
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }

        Err(anyhow::anyhow!(
            "Unable to parse timestamp '{}' as SQLite or RFC3339 format",
            s
        ))
    }

    /// Convert libsql::Row to TreeNode
    ///
    /// # Row Format
    ///
    /// Columns as produced by `DatabaseService::node_columns()`:
    /// id, name, parent, lft, rgt, depth, properties, created_at,
    /// modified_at, deleted_at
    fn row_to_node(row: &Row) -> Result<TreeNode> {
        let id: i64 = row.get(0).context("Failed to get id")?;
        let name: String = row.get(1).context("Failed to get name")?;
        let parent_id: Option<i64> = row.get(2).context("Failed to get parent_id")?;
        let lft: Option<i64> = row.get(3).context("Failed to get lft")?;
        let rgt: Option<i64> = row.get(4).context("Failed to get rgt")?;
        let depth: Option<i64> = row.get(5).context("Failed to get depth")?;
        let properties_json: String = row.get(6).context("Failed to get properties")?;
        let created_at_str: String = row.get(7).context("Failed to get created_at")?;
        let modified_at_str: String = row.get(8).context("Failed to get modified_at")?;
        let deleted_at_str: Option<String> = row.get(9).context("Failed to get deleted_at")?;

        let created_at =
            Self::parse_timestamp(&created_at_str).context("Failed to parse created_at")?;
        let modified_at =
            Self::parse_timestamp(&modified_at_str).context("Failed to parse modified_at")?;
        let deleted_at = deleted_at_str
            .as_deref()
            .map(Self::parse_timestamp)
            .transpose()
            .context("Failed to parse deleted_at")?;

        let properties: Value =
            serde_json::from_str(&properties_json).context("Failed to parse properties JSON")?;

        Ok(TreeNode {
            id,
            name,
            parent_id,
            lft,
            rgt,
            depth,
            properties,
            created_at,
            modified_at,
            deleted_at,
        })
    }

    /// Translate a query into a WHERE clause, ORDER BY clause and parameters
    fn build_filter(&self, query: &NodeQuery) -> (String, String, Vec<i64>) {
        let config = self.db.config();
        let c = &config.columns;
        let mut predicates: Vec<String> = Vec::new();
        let mut params: Vec<i64> = Vec::new();

        if !query.include_trashed {
            predicates.push("deleted_at IS NULL".to_string());
        }

        if query.exclude_root {
            predicates.push("id <> ?".to_string());
            params.push(config.root_id);
        }

        match query.range {
            Some(RangeFilter::AncestorsOf { lft, rgt }) => {
                predicates.push(format!("{} < ? AND {} > ?", c.lft, c.rgt));
                params.extend([lft, rgt]);
            }
            Some(RangeFilter::DescendantsOf { lft, rgt }) => {
                predicates.push(format!("{} > ? AND {} < ?", c.lft, c.rgt));
                params.extend([lft, rgt]);
            }
            None => {}
        }

        if let Some(parent_id) = query.parent_id {
            predicates.push(format!("{} = ?", c.parent_id));
            params.push(parent_id);
        }

        if query.leaves_only {
            predicates.push(format!("{} = {} - 1", c.lft, c.rgt));
        }

        let where_clause = if predicates.is_empty() {
            "1 = 1".to_string()
        } else {
            predicates.join(" AND ")
        };

        let order_clause = match query.order {
            NodeOrder::LftAscending => format!("ORDER BY {} IS NULL, {}, id", c.lft, c.lft),
            NodeOrder::LftDescending => format!("ORDER BY {} DESC, id", c.lft),
        };

        (where_clause, order_clause, params)
    }
}

#[async_trait]
impl NodeStore for TursoStore {
    async fn create_node(
        &self,
        name: &str,
        parent_id: i64,
        properties: &Value,
    ) -> Result<TreeNode, DatabaseError> {
        let properties_json = serde_json::to_string(properties)
            .context("Failed to serialize properties")
            .map_err(DatabaseError::row_conversion)?;

        let id = self
            .db
            .db_insert_node(name, parent_id, &properties_json)
            .await?;

        self.get_node(id).await?.ok_or_else(|| {
            DatabaseError::sql_execution(format!("Node {} not found after creation", id))
        })
    }

    async fn get_node(&self, id: i64) -> Result<Option<TreeNode>, DatabaseError> {
        match self.db.db_get_node(id).await? {
            Some(row) => Ok(Some(
                Self::row_to_node(&row).map_err(DatabaseError::row_conversion)?,
            )),
            None => Ok(None),
        }
    }

    async fn update_node(
        &self,
        id: i64,
        name: &str,
        properties: &Value,
    ) -> Result<Option<TreeNode>, DatabaseError> {
        let properties_json = serde_json::to_string(properties)
            .context("Failed to serialize properties")
            .map_err(DatabaseError::row_conversion)?;

        let rows_affected = self.db.db_update_node(id, name, &properties_json).await?;
        if rows_affected == 0 {
            return Ok(None);
        }

        self.get_node(id).await
    }

    async fn soft_delete_node(&self, id: i64) -> Result<bool, DatabaseError> {
        Ok(self.db.db_soft_delete_node(id).await? > 0)
    }

    async fn restore_node(&self, id: i64) -> Result<bool, DatabaseError> {
        Ok(self.db.db_restore_node(id).await? > 0)
    }

    async fn delete_node(&self, id: i64) -> Result<bool, DatabaseError> {
        Ok(self.db.db_delete_node(id).await? > 0)
    }

    async fn query_nodes(&self, query: &NodeQuery) -> Result<Vec<TreeNode>, DatabaseError> {
        let (where_clause, order_clause, params) = self.build_filter(query);

        let mut rows = self
            .db
            .db_query_nodes(&where_clause, &order_clause, params)
            .await?;

        let mut nodes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            nodes.push(Self::row_to_node(&row).map_err(DatabaseError::row_conversion)?);
        }

        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use serde_json::json;
    use tempfile::TempDir;

    async fn create_test_store(config: TreeConfig) -> Result<(TursoStore, TempDir)> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("test.db");
        let db = Arc::new(DatabaseService::new(db_path, config).await?);
        Ok((TursoStore::new(db), temp_dir))
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let sqlite = TursoStore::parse_timestamp("2024-03-01 12:30:00").unwrap();
        let rfc = TursoStore::parse_timestamp("2024-03-01T12:30:00Z").unwrap();
        assert_eq!(sqlite, rfc);
        assert!(TursoStore::parse_timestamp("yesterday").is_err());
    }

    #[tokio::test]
    async fn test_create_and_get_node() -> Result<()> {
        let (store, _temp_dir) = create_test_store(TreeConfig::default()).await?;

        let created = store
            .create_node("Books", 1, &json!({"slug": "books"}))
            .await?;
        assert_eq!(created.id, 2);
        assert_eq!(created.parent_id, Some(1));
        assert!(created.lft.is_none());
        assert_eq!(created.properties["slug"], "books");

        let root = store.get_node(1).await?.unwrap();
        assert_eq!((root.lft, root.rgt, root.depth), (Some(1), Some(2), Some(0)));

        Ok(())
    }

    #[tokio::test]
    async fn test_update_and_delete_node() -> Result<()> {
        let (store, _temp_dir) = create_test_store(TreeConfig::default()).await?;
        let created = store.create_node("Books", 1, &json!({})).await?;

        let updated = store
            .update_node(created.id, "Novels", &json!({"count": 3}))
            .await?
            .unwrap();
        assert_eq!(updated.name, "Novels");
        assert_eq!(updated.properties["count"], 3);

        assert!(store.update_node(999, "Ghost", &json!({})).await?.is_none());

        assert!(store.soft_delete_node(created.id).await?);
        assert!(store.get_node(created.id).await?.unwrap().is_trashed());
        assert!(store.restore_node(created.id).await?);
        assert!(!store.get_node(created.id).await?.unwrap().is_trashed());

        assert!(store.delete_node(created.id).await?);
        assert!(!store.delete_node(created.id).await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_scoped_query_hides_root_and_trashed() -> Result<()> {
        let (store, _temp_dir) = create_test_store(TreeConfig::default()).await?;
        let a = store.create_node("A", 1, &json!({})).await?;
        let b = store.create_node("B", 1, &json!({})).await?;
        store.soft_delete_node(b.id).await?;

        let all = store.query_nodes(&NodeQuery::all()).await?;
        let ids: Vec<i64> = all.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, a.id]);

        let scoped = store.query_nodes(&NodeQuery::scoped()).await?;
        assert_eq!(scoped.len(), 1);

        let with_trashed = store.query_nodes(&NodeQuery::scoped().with_trashed()).await?;
        assert_eq!(with_trashed.len(), 2);

        let children = store.query_nodes(&NodeQuery::all().children_of(1)).await?;
        assert_eq!(children.len(), 1);

        Ok(())
    }
}
