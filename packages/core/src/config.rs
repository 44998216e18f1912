//! Per-hierarchy configuration
//!
//! Every nested-set table is described by one [`TreeConfig`]: the table and
//! column names, the synthetic root, the soft-delete mode, optional deferred
//! execution, and the relocation strategy. The configuration is bound into the
//! database and engine layers at construction time; nothing is looked up
//! ambiently.
//!
//! Column and table names are interpolated into SQL, so [`TreeConfig::validate`]
//! only accepts plain identifiers (`[A-Za-z_][A-Za-z0-9_]*`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default id of the synthetic root node
pub const DEFAULT_ROOT_ID: i64 = 1;

/// Default `parent_id` stored on the synthetic root
pub const DEFAULT_ROOT_PARENT_SENTINEL: i64 = 0;

/// Default number of position statements per rebuild chunk
pub const DEFAULT_POSITION_BATCH_SIZE: usize = 1000;

/// Invalid tree configuration, detected at setup time
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid tree configuration: {reason}")]
pub struct ConfigError {
    pub reason: String,
}

impl ConfigError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Names of the four position columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeColumns {
    pub parent_id: String,
    pub lft: String,
    pub rgt: String,
    pub depth: String,
}

impl Default for TreeColumns {
    fn default() -> Self {
        Self {
            parent_id: "parent_id".to_string(),
            lft: "lft".to_string(),
            rgt: "rgt".to_string(),
            depth: "depth".to_string(),
        }
    }
}

/// How the moving subtree is kept out of the surrounding range shifts
/// during a relocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelocateStrategy {
    /// One `UPDATE` whose `CASE` arms select the subtree by its pre-move interval
    #[default]
    ExcludedRange,
    /// Negate the subtree bounds, shift the range, restore with `ABS(x) + distance`.
    /// Only valid while every real bound is positive.
    SignFlip,
}

/// Deferred execution target for tree commands
///
/// Mirrors the envelope a task queue needs: an optional connection name, an
/// optional queue name, and whether the command waits for the outer commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeferralConfig {
    pub connection: Option<String>,
    pub queue: Option<String>,
    pub after_commit: bool,
}

impl Default for DeferralConfig {
    fn default() -> Self {
        Self {
            connection: None,
            queue: None,
            after_commit: true,
        }
    }
}

impl DeferralConfig {
    /// Deferral is active once a connection or a queue is named
    pub fn is_enabled(&self) -> bool {
        self.connection.as_deref().is_some_and(|c| !c.is_empty())
            || self.queue.as_deref().is_some_and(|q| !q.is_empty())
    }
}

/// Configuration of one nested-set hierarchy
///
/// # Examples
///
/// ```
/// use nestedset_core::config::{TreeConfig, RelocateStrategy};
///
/// let config = TreeConfig::new("categories")
///     .with_soft_delete(true)
///     .with_relocate_strategy(RelocateStrategy::SignFlip);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Table holding the hierarchy rows
    pub table: String,

    /// Position column names
    pub columns: TreeColumns,

    /// Id of the synthetic root (hidden from scoped queries)
    pub root_id: i64,

    /// `parent_id` value stored on the root row
    pub root_parent_sentinel: i64,

    /// Rows are soft-deleted (`deleted_at`) instead of removed
    pub soft_delete: bool,

    /// Optional deferred execution of tree commands
    pub deferral: Option<DeferralConfig>,

    pub relocate_strategy: RelocateStrategy,

    /// Statements per chunk when persisting a rebuild
    pub position_batch_size: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            table: "nodes".to_string(),
            columns: TreeColumns::default(),
            root_id: DEFAULT_ROOT_ID,
            root_parent_sentinel: DEFAULT_ROOT_PARENT_SENTINEL,
            soft_delete: false,
            deferral: None,
            relocate_strategy: RelocateStrategy::default(),
            position_batch_size: DEFAULT_POSITION_BATCH_SIZE,
        }
    }
}

impl TreeConfig {
    /// Default configuration for the given table
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn with_columns(mut self, columns: TreeColumns) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_root_id(mut self, root_id: i64) -> Self {
        self.root_id = root_id;
        self
    }

    pub fn with_soft_delete(mut self, soft_delete: bool) -> Self {
        self.soft_delete = soft_delete;
        self
    }

    pub fn with_deferral(mut self, deferral: DeferralConfig) -> Self {
        self.deferral = Some(deferral);
        self
    }

    pub fn with_relocate_strategy(mut self, strategy: RelocateStrategy) -> Self {
        self.relocate_strategy = strategy;
        self
    }

    pub fn with_position_batch_size(mut self, batch_size: usize) -> Self {
        self.position_batch_size = batch_size;
        self
    }

    /// Whether tree commands are handed to a task submitter instead of run inline
    pub fn queue_enabled(&self) -> bool {
        self.deferral.as_ref().is_some_and(DeferralConfig::is_enabled)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// - a table or column name is not a plain SQL identifier
    /// - two position columns share a name
    /// - `position_batch_size` is zero
    /// - the root id equals the root parent sentinel
    /// - deferred execution is enabled without soft delete (a queued detach
    ///   must still find the record after the caller removed it)
    pub fn validate(&self) -> Result<(), ConfigError> {
        let identifiers = [
            ("table", &self.table),
            ("parent_id column", &self.columns.parent_id),
            ("lft column", &self.columns.lft),
            ("rgt column", &self.columns.rgt),
            ("depth column", &self.columns.depth),
        ];
        for (what, name) in identifiers {
            if !is_sql_identifier(name) {
                return Err(ConfigError::new(format!(
                    "{} name '{}' is not a valid SQL identifier",
                    what, name
                )));
            }
        }

        let mut columns = vec![
            &self.columns.parent_id,
            &self.columns.lft,
            &self.columns.rgt,
            &self.columns.depth,
        ];
        columns.sort();
        columns.dedup();
        if columns.len() != 4 {
            return Err(ConfigError::new("position column names must be distinct"));
        }

        if self.position_batch_size == 0 {
            return Err(ConfigError::new(
                "position_batch_size must be greater than 0",
            ));
        }

        if self.root_id == self.root_parent_sentinel {
            return Err(ConfigError::new(
                "root_id must differ from root_parent_sentinel",
            ));
        }

        if self.queue_enabled() && !self.soft_delete {
            return Err(ConfigError::new(
                "soft delete is required when deferred execution is enabled",
            ));
        }

        Ok(())
    }
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TreeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.root_id, 1);
        assert_eq!(config.columns.lft, "lft");
        assert!(!config.queue_enabled());
    }

    #[test]
    fn test_rejects_injected_identifiers() {
        let config = TreeConfig::new("nodes; DROP TABLE nodes");
        assert!(config.validate().is_err());

        let columns = TreeColumns {
            lft: "1lft".to_string(),
            ..Default::default()
        };
        assert!(TreeConfig::default().with_columns(columns).validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_columns() {
        let columns = TreeColumns {
            rgt: "lft".to_string(),
            ..Default::default()
        };
        let err = TreeConfig::default()
            .with_columns(columns)
            .validate()
            .unwrap_err();
        assert!(err.reason.contains("distinct"));
    }

    #[test]
    fn test_deferral_requires_soft_delete() {
        let deferral = DeferralConfig {
            queue: Some("tree".to_string()),
            ..Default::default()
        };
        let config = TreeConfig::new("categories").with_deferral(deferral.clone());
        assert!(config.queue_enabled());
        assert!(config.validate().is_err());

        let config = config.with_soft_delete(true);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_deferral_is_disabled() {
        let deferral = DeferralConfig {
            connection: Some(String::new()),
            queue: None,
            after_commit: false,
        };
        let config = TreeConfig::default().with_deferral(deferral);
        assert!(!config.queue_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: TreeConfig = serde_json::from_str(
            r#"{"table": "menus", "columns": {"lft": "left_bound"}, "relocate_strategy": "sign_flip"}"#,
        )
        .unwrap();
        assert_eq!(config.table, "menus");
        assert_eq!(config.columns.lft, "left_bound");
        assert_eq!(config.columns.rgt, "rgt");
        assert_eq!(config.relocate_strategy, RelocateStrategy::SignFlip);
        assert_eq!(config.position_batch_size, DEFAULT_POSITION_BATCH_SIZE);
    }
}
