//! Runtime configuration for the authorization engine

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration
///
/// Controls hierarchy expansion depth, snapshot cache sizing, and table
/// naming. Built with [`Config::default`] plus `with_*` setters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum depth followed when flattening role/group parent chains.
    /// Nodes beyond this depth are silently dropped, which is also the
    /// termination guarantee for cyclic parent graphs.
    pub max_group_role_levels: u32,

    /// Maximum number of principal snapshots held in memory
    pub snapshot_cache_capacity: usize,

    /// Time-to-live for cached principal snapshots
    pub snapshot_cache_ttl: Duration,

    /// Prefix prepended to every base table name
    pub table_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_group_role_levels: 5,
            snapshot_cache_capacity: 10_000,
            snapshot_cache_ttl: Duration::from_secs(60),
            table_prefix: String::new(),
        }
    }
}

impl Config {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum hierarchy expansion depth
    pub fn with_max_group_role_levels(mut self, levels: u32) -> Self {
        self.max_group_role_levels = levels;
        self
    }

    /// Set the snapshot cache capacity
    pub fn with_snapshot_cache_capacity(mut self, capacity: usize) -> Self {
        self.snapshot_cache_capacity = capacity;
        self
    }

    /// Set the snapshot cache TTL
    pub fn with_snapshot_cache_ttl(mut self, ttl: Duration) -> Self {
        self.snapshot_cache_ttl = ttl;
        self
    }

    /// Set the table-name prefix
    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_group_role_levels == 0 {
            return Err(CoreError::configuration(
                "max_group_role_levels must be at least 1",
            ));
        }
        if self.snapshot_cache_capacity == 0 {
            return Err(CoreError::configuration(
                "snapshot_cache_capacity must be at least 1",
            ));
        }
        Ok(())
    }

    /// Full table name for a base table
    pub fn table_name(&self, base_table: &str) -> String {
        if self.table_prefix.is_empty() {
            base_table.to_string()
        } else {
            format!("{}_{}", self.table_prefix, base_table)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_group_role_levels, 5);
        assert_eq!(config.snapshot_cache_capacity, 10_000);
        assert_eq!(config.snapshot_cache_ttl, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = Config::new()
            .with_max_group_role_levels(3)
            .with_table_prefix("test");

        assert_eq!(config.max_group_role_levels, 3);
        assert_eq!(config.table_name("roles"), "test_roles");
    }

    #[test]
    fn test_validation_rejects_zero_depth() {
        let config = Config::new().with_max_group_role_levels(0);
        assert!(config.validate().is_err());
    }
}
