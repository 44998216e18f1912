//! Position Repository
//!
//! Applies interval plans to storage as range-qualified `UPDATE` statements.
//! Every method except [`PositionRepository::begin`] takes the connection of
//! an open transaction; the tree engine owns commit and rollback.
//!
//! # Detached Rows
//!
//! Range updates select rows by bounds alone. Detaching a row clears its own
//! `lft`, `rgt` and `depth`, and NULL bounds never match a range predicate,
//! so a detached row drops out of the hierarchy whatever its removal policy.
//! A row trashed ahead of a queued detach keeps its bounds and keeps moving
//! with the tree until that detach runs.
//!
//! # Quiet Writes
//!
//! Position writes never touch `modified_at`; they are bookkeeping, not edits
//! of the caller's payload.

use crate::config::{RelocateStrategy, TreeConfig};
use crate::db::{DatabaseError, DatabaseService};
use crate::models::{Position, PositionRow, PositionedNode};
use crate::operations::{DetachPlan, RelocatePlan};
use libsql::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What happens to a detached row once the surrounding bounds are closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Removal {
    /// The row was already removed or trashed by the caller
    #[default]
    Keep,
    /// Set `deleted_at`
    SoftDelete,
    /// Delete the row
    Delete,
}

/// Position columns of one stored row, as read inside a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRecord {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub lft: Option<i64>,
    pub rgt: Option<i64>,
    pub depth: Option<i64>,
    pub trashed: bool,
}

impl PositionedNode for PositionRecord {
    fn node_id(&self) -> i64 {
        self.id
    }

    fn parent_id(&self) -> Option<i64> {
        self.parent_id
    }

    fn set_parent_id(&mut self, parent_id: Option<i64>) {
        self.parent_id = parent_id;
    }

    fn lft(&self) -> Option<i64> {
        self.lft
    }

    fn set_lft(&mut self, lft: Option<i64>) {
        self.lft = lft;
    }

    fn rgt(&self) -> Option<i64> {
        self.rgt
    }

    fn set_rgt(&mut self, rgt: Option<i64>) {
        self.rgt = rgt;
    }

    fn depth(&self) -> Option<i64> {
        self.depth
    }

    fn set_depth(&mut self, depth: Option<i64>) {
        self.depth = depth;
    }
}

/// SQL generation and execution for position maintenance
#[derive(Debug, Clone)]
pub struct PositionRepository {
    db: Arc<DatabaseService>,
}

impl PositionRepository {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    pub fn config(&self) -> &TreeConfig {
        self.db.config()
    }

    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }

    async fn exec(
        &self,
        conn: &Connection,
        what: &str,
        sql: &str,
        params: Vec<i64>,
    ) -> Result<u64, DatabaseError> {
        conn.execute(sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to {}: {}", what, e)))
    }

    //
    // TRANSACTIONS
    //

    /// Open a connection and take the write lock up front
    ///
    /// `BEGIN IMMEDIATE` serializes structural operations at the start
    /// instead of failing on lock upgrade halfway through.
    pub async fn begin(&self) -> Result<Connection, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        conn.execute("BEGIN IMMEDIATE TRANSACTION", ())
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
            })?;
        Ok(conn)
    }

    pub async fn commit(&self, conn: &Connection) -> Result<(), DatabaseError> {
        if let Err(e) = conn.execute("COMMIT", ()).await {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to commit transaction: {}",
                e
            )));
        }
        Ok(())
    }

    pub async fn rollback(&self, conn: &Connection) -> Result<(), DatabaseError> {
        conn.execute("ROLLBACK", ())
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to roll back transaction: {}", e))
            })?;
        Ok(())
    }

    //
    // READS
    //

    fn record_columns(&self) -> String {
        let c = &self.config().columns;
        format!(
            "id, {}, {}, {}, {}, deleted_at IS NOT NULL",
            c.parent_id, c.lft, c.rgt, c.depth
        )
    }

    fn row_to_record(row: &libsql::Row) -> Result<PositionRecord, DatabaseError> {
        let convert = |e: libsql::Error| DatabaseError::sql_execution(format!("Failed to read position row: {}", e));
        let trashed: i64 = row.get(5).map_err(convert)?;
        Ok(PositionRecord {
            id: row.get(0).map_err(convert)?,
            parent_id: row.get(1).map_err(convert)?,
            lft: row.get(2).map_err(convert)?,
            rgt: row.get(3).map_err(convert)?,
            depth: row.get(4).map_err(convert)?,
            trashed: trashed != 0,
        })
    }

    /// Read the persisted position of one row, trashed rows included
    pub async fn fetch(
        &self,
        conn: &Connection,
        id: i64,
    ) -> Result<Option<PositionRecord>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?",
            self.record_columns(),
            self.config().table
        );
        let mut rows = conn
            .query(&sql, [id])
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to fetch position: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => Ok(Some(Self::row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    /// Every row that belongs to the hierarchy, root included, in rebuild order
    ///
    /// That is every live row plus trashed rows that still hold bounds
    /// because their detach has not run yet. Order: current `lft` ascending,
    /// unpositioned rows last, then id.
    pub async fn fetch_hierarchy(
        &self,
        conn: &Connection,
    ) -> Result<Vec<PositionRecord>, DatabaseError> {
        let c = &self.config().columns;
        let sql = format!(
            "SELECT {columns} FROM {table} WHERE deleted_at IS NULL OR {lft} IS NOT NULL
             ORDER BY {lft} IS NULL, {lft}, id",
            columns = self.record_columns(),
            table = self.config().table,
            lft = c.lft
        );
        let mut rows = conn
            .query(&sql, ())
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to load positions: {}", e)))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            records.push(Self::row_to_record(&row)?);
        }
        Ok(records)
    }

    //
    // WRITES
    //

    /// Write the four position columns of one row
    pub async fn save_position_quietly(
        &self,
        conn: &Connection,
        id: i64,
        position: &Position,
    ) -> Result<(), DatabaseError> {
        let c = &self.config().columns;
        let sql = format!(
            "UPDATE {} SET {} = ?, {} = ?, {} = ?, {} = ? WHERE id = ?",
            self.config().table,
            c.parent_id,
            c.lft,
            c.rgt,
            c.depth
        );
        self.exec(
            conn,
            "save position",
            &sql,
            vec![position.parent_id, position.lft, position.rgt, position.depth, id],
        )
        .await?;
        Ok(())
    }

    /// Open a width-2 slot at `gap_at` (the parent's current `rgt`)
    pub async fn open_gap(&self, conn: &Connection, gap_at: i64) -> Result<(), DatabaseError> {
        let c = &self.config().columns;
        let table = &self.config().table;

        let sql = format!(
            "UPDATE {table} SET {rgt} = {rgt} + 2 WHERE {rgt} >= ?",
            table = table,
            rgt = c.rgt
        );
        self.exec(conn, "shift rgt for attach", &sql, vec![gap_at]).await?;

        let sql = format!(
            "UPDATE {table} SET {lft} = {lft} + 2 WHERE {lft} > ?",
            table = table,
            lft = c.lft
        );
        self.exec(conn, "shift lft for attach", &sql, vec![gap_at]).await?;

        Ok(())
    }

    /// Move a subtree and shift the bounds between its old and new slot
    pub async fn relocate(
        &self,
        conn: &Connection,
        plan: &RelocatePlan,
    ) -> Result<(), DatabaseError> {
        match self.config().relocate_strategy {
            RelocateStrategy::ExcludedRange => self.relocate_excluded_range(conn, plan).await,
            RelocateStrategy::SignFlip => self.relocate_sign_flip(conn, plan).await,
        }
    }

    /// Single statement; all `CASE` arms read pre-update values
    async fn relocate_excluded_range(
        &self,
        conn: &Connection,
        plan: &RelocatePlan,
    ) -> Result<(), DatabaseError> {
        let c = &self.config().columns;
        // ?1 subtree lft, ?2 subtree rgt, ?3 range start, ?4 range end,
        // ?5 shift, ?6 distance, ?7 depth change
        let sql = format!(
            "UPDATE {table} SET
                {lft} = CASE
                    WHEN {lft} >= ?1 AND {rgt} <= ?2 THEN {lft} + ?6
                    WHEN {lft} >= ?3 AND {lft} < ?4 THEN {lft} + ?5
                    ELSE {lft} END,
                {rgt} = CASE
                    WHEN {lft} >= ?1 AND {rgt} <= ?2 THEN {rgt} + ?6
                    WHEN {rgt} >= ?3 AND {rgt} < ?4 THEN {rgt} + ?5
                    ELSE {rgt} END,
                {depth} = CASE
                    WHEN {lft} >= ?1 AND {rgt} <= ?2 THEN {depth} + ?7
                    ELSE {depth} END
             WHERE (({lft} >= ?1 AND {rgt} <= ?2)
                 OR ({lft} >= ?3 AND {lft} < ?4)
                 OR ({rgt} >= ?3 AND {rgt} < ?4))",
            table = self.config().table,
            lft = c.lft,
            rgt = c.rgt,
            depth = c.depth
        );
        self.exec(
            conn,
            "relocate subtree",
            &sql,
            vec![
                plan.subtree_lft,
                plan.subtree_rgt,
                plan.range.start,
                plan.range.end,
                plan.shift,
                plan.distance,
                plan.depth_change,
            ],
        )
        .await?;
        Ok(())
    }

    /// Negate the subtree, shift the range, restore with `ABS(x) + distance`
    async fn relocate_sign_flip(
        &self,
        conn: &Connection,
        plan: &RelocatePlan,
    ) -> Result<(), DatabaseError> {
        let c = &self.config().columns;
        let table = &self.config().table;

        let sql = format!(
            "UPDATE {table} SET {lft} = -{lft}, {rgt} = -{rgt} WHERE {lft} >= ? AND {rgt} <= ?",
            table = table,
            lft = c.lft,
            rgt = c.rgt
        );
        self.exec(
            conn,
            "negate subtree",
            &sql,
            vec![plan.subtree_lft, plan.subtree_rgt],
        )
        .await?;

        for column in [&c.rgt, &c.lft] {
            let sql = format!(
                "UPDATE {table} SET {col} = {col} + ? WHERE {col} >= ? AND {col} < ?",
                table = table,
                col = column
            );
            self.exec(
                conn,
                "shift range",
                &sql,
                vec![plan.shift, plan.range.start, plan.range.end],
            )
            .await?;
        }

        let sql = format!(
            "UPDATE {table} SET {lft} = ABS({lft}) + ?, {rgt} = ABS({rgt}) + ?, {depth} = {depth} + ?
             WHERE {lft} <= ? AND {rgt} >= ?",
            table = table,
            lft = c.lft,
            rgt = c.rgt,
            depth = c.depth
        );
        self.exec(
            conn,
            "restore subtree",
            &sql,
            vec![
                plan.distance,
                plan.distance,
                plan.depth_change,
                -plan.subtree_lft,
                -plan.subtree_rgt,
            ],
        )
        .await?;

        Ok(())
    }

    /// Set the parent column of one row
    pub async fn set_parent(
        &self,
        conn: &Connection,
        id: i64,
        parent_id: i64,
    ) -> Result<(), DatabaseError> {
        let sql = format!(
            "UPDATE {} SET {} = ? WHERE id = ?",
            self.config().table,
            self.config().columns.parent_id
        );
        self.exec(conn, "set parent", &sql, vec![parent_id, id]).await?;
        Ok(())
    }

    /// Promote a node's children and close its width-2 gap
    ///
    /// Statement order matters: descendants move by -1 before the trailing
    /// bounds move by -2, and both predicates use the node's pre-detach bounds.
    pub async fn detach(&self, conn: &Connection, plan: &DetachPlan) -> Result<(), DatabaseError> {
        let c = &self.config().columns;
        let table = &self.config().table;

        let sql = format!(
            "UPDATE {table} SET {parent} = ? WHERE {parent} = ?",
            table = table,
            parent = c.parent_id
        );
        self.exec(conn, "re-point children", &sql, vec![plan.parent_id, plan.node_id])
            .await?;

        let sql = format!(
            "UPDATE {table} SET {lft} = {lft} - 1, {rgt} = {rgt} - 1, {depth} = {depth} - 1
             WHERE {lft} > ? AND {rgt} < ?",
            table = table,
            lft = c.lft,
            rgt = c.rgt,
            depth = c.depth
        );
        self.exec(conn, "shrink descendants", &sql, vec![plan.lft, plan.rgt])
            .await?;

        let sql = format!(
            "UPDATE {table} SET {rgt} = {rgt} - 2 WHERE {rgt} > ?",
            table = table,
            rgt = c.rgt
        );
        self.exec(conn, "close rgt gap", &sql, vec![plan.rgt]).await?;

        let sql = format!(
            "UPDATE {table} SET {lft} = {lft} - 2 WHERE {lft} > ?",
            table = table,
            lft = c.lft
        );
        self.exec(conn, "close lft gap", &sql, vec![plan.rgt]).await?;

        let sql = format!(
            "UPDATE {table} SET {lft} = NULL, {rgt} = NULL, {depth} = NULL WHERE id = ?",
            table = table,
            lft = c.lft,
            rgt = c.rgt,
            depth = c.depth
        );
        self.exec(conn, "clear detached bounds", &sql, vec![plan.node_id])
            .await?;

        Ok(())
    }

    /// Apply the removal policy to a detached row
    pub async fn remove(
        &self,
        conn: &Connection,
        id: i64,
        removal: Removal,
    ) -> Result<(), DatabaseError> {
        let table = &self.config().table;
        match removal {
            Removal::Keep => {}
            Removal::SoftDelete => {
                let sql = format!(
                    "UPDATE {} SET deleted_at = CURRENT_TIMESTAMP WHERE id = ? AND deleted_at IS NULL",
                    table
                );
                self.exec(conn, "soft delete row", &sql, vec![id]).await?;
            }
            Removal::Delete => {
                let sql = format!("DELETE FROM {} WHERE id = ?", table);
                self.exec(conn, "delete row", &sql, vec![id]).await?;
            }
        }
        Ok(())
    }

    /// Persist recomputed positions in chunks of `position_batch_size`
    ///
    /// Each chunk is one `execute_batch` call of integer-only statements.
    pub async fn write_positions(
        &self,
        conn: &Connection,
        rows: &[PositionRow],
    ) -> Result<(), DatabaseError> {
        let c = &self.config().columns;
        let table = &self.config().table;

        for chunk in rows.chunks(self.config().position_batch_size) {
            let batch: String = chunk
                .iter()
                .map(|row| {
                    format!(
                        "UPDATE {} SET {} = {}, {} = {}, {} = {}, {} = {} WHERE id = {};\n",
                        table,
                        c.parent_id,
                        row.parent_id,
                        c.lft,
                        row.lft,
                        c.rgt,
                        row.rgt,
                        c.depth,
                        row.depth,
                        row.id
                    )
                })
                .collect();

            conn.execute_batch(&batch).await.map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to write position batch: {}", e))
            })?;
        }

        Ok(())
    }
}
