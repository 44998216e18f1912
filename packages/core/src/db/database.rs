//! Database Connection Management
//!
//! This module provides the database connection and initialization for one
//! nested-set hierarchy stored in libsql (embedded SQLite).
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf
//! - **Configured table**: Table and position column names come from [`TreeConfig`]
//! - **WAL mode**: Write-Ahead Logging for better concurrency
//! - **Seeded root**: The synthetic root row is inserted on first start
//!
//! # Database Connection Patterns
//!
//! **Always use `connect_with_timeout()` in async functions.** The 5-second
//! busy timeout lets a writer wait for the lock held by another structural
//! operation instead of failing immediately with `SQLITE_BUSY`.
//!
//! ```no_run
//! # use nestedset_core::config::TreeConfig;
//! # use nestedset_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/tree.db"), TreeConfig::default()).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```
//!
//! `connect()` is only for synchronous, single-threaded contexts where the
//! connection never crosses an `.await`.

use crate::config::TreeConfig;
use crate::db::error::DatabaseError;
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Name given to the seeded root row
pub const ROOT_NODE_NAME: &str = "root";

/// Database service for managing the libsql connection and hierarchy schema
///
/// # Examples
///
/// ```no_run
/// use nestedset_core::config::TreeConfig;
/// use nestedset_core::db::DatabaseService;
/// use std::path::PathBuf;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = TreeConfig::new("categories").with_soft_delete(true);
///     let db_service = DatabaseService::new(PathBuf::from("/path/to/tree.db"), config).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,

    config: Arc<TreeConfig>,
}

impl DatabaseService {
    /// Create a new DatabaseService for the given path and hierarchy
    ///
    /// This will:
    /// 1. Validate the tree configuration
    /// 2. Ensure the parent directory exists (create if needed)
    /// 3. Open/create the database file
    /// 4. Create the hierarchy table and indexes (CREATE ... IF NOT EXISTS)
    /// 5. Seed the synthetic root row
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - The configuration is invalid
    /// - The path is empty or the parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf, config: TreeConfig) -> Result<Self, DatabaseError> {
        config.validate()?;

        if db_path.as_os_str().is_empty() {
            return Err(DatabaseError::invalid_path(db_path));
        }

        let is_new_database = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
            config: Arc::new(config),
        };

        service.initialize_schema(is_new_database).await?;

        Ok(service)
    }

    /// Hierarchy configuration bound to this database
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// Idempotent: safe to call against an existing database.
    ///
    /// # Schema
    ///
    /// - `id`: INTEGER PRIMARY KEY AUTOINCREMENT (the root takes the configured id)
    /// - `name`, `properties`: caller payload
    /// - position columns: nullable until the engine attaches the row
    /// - `created_at`, `modified_at`, `deleted_at`: timestamps
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        let c = &self.config.columns;
        let table = &self.config.table;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL DEFAULT '',
                    {parent} INTEGER,
                    {lft} INTEGER,
                    {rgt} INTEGER,
                    {depth} INTEGER,
                    properties JSON NOT NULL DEFAULT '{{}}',
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                    modified_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                    deleted_at DATETIME
                )",
                table = table,
                parent = c.parent_id,
                lft = c.lft,
                rgt = c.rgt,
                depth = c.depth,
            ),
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create {} table: {}", table, e))
        })?;

        self.create_core_indexes(&conn).await?;
        self.seed_root(&conn).await?;

        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    /// Create the indexes range predicates and parent lookups rely on
    async fn create_core_indexes(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        let c = &self.config.columns;
        let table = &self.config.table;

        let indexes = [
            (format!("idx_{}_parent", table), c.parent_id.clone()),
            (format!("idx_{}_bounds", table), format!("{}, {}", c.lft, c.rgt)),
            (format!("idx_{}_rgt", table), c.rgt.clone()),
            (format!("idx_{}_deleted", table), "deleted_at".to_string()),
        ];

        for (name, columns) in indexes {
            conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {}({})",
                    name, table, columns
                ),
                (),
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to create index '{}': {}", name, e))
            })?;
        }

        Ok(())
    }

    /// Insert the synthetic root if it is missing
    ///
    /// Uses INSERT OR IGNORE so repeated initialization keeps existing bounds.
    async fn seed_root(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        let c = &self.config.columns;
        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (id, name, {}, {}, {}, {}) VALUES (?, ?, ?, 1, 2, 0)",
                self.config.table, c.parent_id, c.lft, c.rgt, c.depth
            ),
            (
                self.config.root_id,
                ROOT_NODE_NAME,
                self.config.root_parent_sentinel,
            ),
        )
        .await
        .map_err(|e| DatabaseError::initialization_failed(format!("Failed to seed root: {}", e)))?;

        Ok(())
    }

    /// Get a synchronous connection to the database
    ///
    /// Only use this in synchronous, single-threaded contexts. In async
    /// functions use `connect_with_timeout()`.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get an async connection with busy timeout configured
    ///
    /// Sets a 5-second busy timeout so concurrent structural operations wait
    /// for the write lock instead of failing immediately.
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;

        Ok(conn)
    }

    /// Column list shared by every full-row select
    pub fn node_columns(&self) -> String {
        let c = &self.config.columns;
        format!(
            "id, name, {}, {}, {}, {}, properties, created_at, modified_at, deleted_at",
            c.parent_id, c.lft, c.rgt, c.depth
        )
    }

    //
    // RECORD OPERATIONS
    // Payload writes for hierarchy rows. Position columns are never written
    // here; new rows start with NULL bounds until the engine attaches them.
    //

    /// Insert a hierarchy row with unset bounds
    ///
    /// # Returns
    ///
    /// The id assigned by SQLite.
    pub async fn db_insert_node(
        &self,
        name: &str,
        parent_id: i64,
        properties: &str,
    ) -> Result<i64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute(
            &format!(
                "INSERT INTO {} (name, {}, properties) VALUES (?, ?, ?)",
                self.config.table, self.config.columns.parent_id
            ),
            (name, parent_id, properties),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to insert node: {}", e)))?;

        Ok(conn.last_insert_rowid())
    }

    /// Retrieve a single row by id, trashed rows included
    pub async fn db_get_node(&self, id: i64) -> Result<Option<libsql::Row>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM {} WHERE id = ?",
                self.node_columns(),
                self.config.table
            ))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare get_node query: {}", e))
            })?;

        let mut rows = stmt.query([id]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute get_node query: {}", e))
        })?;

        rows.next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))
    }

    /// Update the caller payload of a row
    ///
    /// # Returns
    ///
    /// Number of rows affected (0 when the id does not exist)
    pub async fn db_update_node(
        &self,
        id: i64,
        name: &str,
        properties: &str,
    ) -> Result<u64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute(
            &format!(
                "UPDATE {} SET name = ?, properties = ?, modified_at = CURRENT_TIMESTAMP WHERE id = ?",
                self.config.table
            ),
            (name, properties, id),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to update node: {}", e)))
    }

    /// Mark a row as trashed
    ///
    /// Bounds are untouched; they stay in the hierarchy until the row is
    /// detached.
    pub async fn db_soft_delete_node(&self, id: i64) -> Result<u64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute(
            &format!(
                "UPDATE {} SET deleted_at = CURRENT_TIMESTAMP WHERE id = ? AND deleted_at IS NULL",
                self.config.table
            ),
            [id],
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to soft delete node: {}", e)))
    }

    /// Clear `deleted_at` on a trashed row
    pub async fn db_restore_node(&self, id: i64) -> Result<u64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute(
            &format!(
                "UPDATE {} SET deleted_at = NULL WHERE id = ? AND deleted_at IS NOT NULL",
                self.config.table
            ),
            [id],
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to restore node: {}", e)))
    }

    /// Remove a row permanently
    pub async fn db_delete_node(&self, id: i64) -> Result<u64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute(
            &format!("DELETE FROM {} WHERE id = ?", self.config.table),
            [id],
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to delete node: {}", e)))
    }

    /// Select full rows with a caller-built filter
    ///
    /// `where_clause` and `order_clause` are SQL fragments built from
    /// validated identifiers; all values are bound through `params`.
    pub async fn db_query_nodes(
        &self,
        where_clause: &str,
        order_clause: &str,
        params: Vec<i64>,
    ) -> Result<libsql::Rows, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let sql = format!(
            "SELECT {} FROM {} WHERE {} {}",
            self.node_columns(),
            self.config.table,
            where_clause,
            order_clause
        );

        let mut stmt = conn.prepare(&sql).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to prepare query_nodes query: {}", e))
        })?;

        stmt.query(libsql::params_from_iter(params))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to execute query_nodes query: {}", e))
            })
    }

    /// Flush the WAL to the main database file
    ///
    /// Call before closing the application or handing the file to another
    /// process.
    pub async fn db_close(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
            .await?;
        Ok(())
    }
}
