//! In-memory reference backend
//!
//! One `BTreeMap` per `(base_table, tenant, namespace)` partition, held in a
//! `DashMap` keyed by the flattened partition key. BTreeMap keeps ids in
//! stable order so query pagination tokens are deterministic.

use super::{
    field_as_string, DataStore, QueryPage, QueryPredicate, StoreScope, VersionedValue, ANY_VERSION,
};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Thread-safe in-memory store
#[derive(Default)]
pub struct MemoryStore {
    partitions: DashMap<String, BTreeMap<String, VersionedValue>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn expires_at(ttl: Option<Duration>) -> Option<chrono::DateTime<Utc>> {
        ttl.and_then(|d| ChronoDuration::from_std(d).ok())
            .map(|d| Utc::now() + d)
    }

    fn matches(predicate: &QueryPredicate, value: &serde_json::Value) -> bool {
        predicate.iter().all(|(field, expected)| {
            value
                .get(field)
                .map(|v| field_as_string(v) == *expected)
                .unwrap_or(false)
        })
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn get(
        &self,
        scope: &StoreScope,
        ids: &[String],
    ) -> Result<HashMap<String, VersionedValue>> {
        let now = Utc::now();
        let mut found = HashMap::new();
        if let Some(partition) = self.partitions.get(&scope.partition_key()) {
            for id in ids {
                if let Some(row) = partition.get(id) {
                    if !row.is_expired(now) {
                        found.insert(id.clone(), row.clone());
                    }
                }
            }
        }
        Ok(found)
    }

    async fn query(
        &self,
        scope: &StoreScope,
        predicate: &QueryPredicate,
        offset: Option<&str>,
        limit: usize,
    ) -> Result<QueryPage> {
        let now = Utc::now();
        let mut items: Vec<(String, VersionedValue)> = Vec::new();
        let mut next_offset = None;

        if let Some(partition) = self.partitions.get(&scope.partition_key()) {
            let live = partition
                .iter()
                .filter(|(id, row)| {
                    !row.is_expired(now)
                        && offset.map(|tok| id.as_str() > tok).unwrap_or(true)
                        && Self::matches(predicate, &row.value)
                });

            for (id, row) in live {
                if limit > 0 && items.len() == limit {
                    next_offset = items.last().map(|(last_id, _)| last_id.clone());
                    break;
                }
                items.push((id.clone(), row.clone()));
            }
        }

        Ok(QueryPage { items, next_offset })
    }

    async fn create(
        &self,
        scope: &StoreScope,
        id: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<u64> {
        let mut partition = self.partitions.entry(scope.partition_key()).or_default();
        let now = Utc::now();

        if let Some(existing) = partition.get(id) {
            if !existing.is_expired(now) {
                return Err(CoreError::database(format!(
                    "id '{}' already exists in table '{}'",
                    id, scope.base_table
                )));
            }
        }

        partition.insert(
            id.to_string(),
            VersionedValue {
                version: 1,
                value,
                expires_at: Self::expires_at(ttl),
            },
        );
        Ok(1)
    }

    async fn update(
        &self,
        scope: &StoreScope,
        id: &str,
        expected_version: u64,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<u64> {
        let mut partition = self.partitions.entry(scope.partition_key()).or_default();
        let now = Utc::now();

        let current = match partition.get(id) {
            Some(row) if !row.is_expired(now) => row.version,
            _ => {
                return Err(CoreError::not_found(format!(
                    "id '{}' in table '{}'",
                    id, scope.base_table
                )))
            }
        };

        if expected_version != ANY_VERSION && expected_version != current {
            return Err(CoreError::database(format!(
                "version conflict for id '{}': expected {}, found {}",
                id, expected_version, current
            )));
        }

        let next = current + 1;
        partition.insert(
            id.to_string(),
            VersionedValue {
                version: next,
                value,
                expires_at: Self::expires_at(ttl),
            },
        );
        Ok(next)
    }

    async fn delete(&self, scope: &StoreScope, id: &str) -> Result<()> {
        let mut partition = self.partitions.entry(scope.partition_key()).or_default();
        if partition.remove(id).is_none() {
            return Err(CoreError::not_found(format!(
                "id '{}' in table '{}'",
                id, scope.base_table
            )));
        }
        Ok(())
    }

    async fn size(&self, scope: &StoreScope) -> Result<usize> {
        let now = Utc::now();
        Ok(self
            .partitions
            .get(&scope.partition_key())
            .map(|p| p.values().filter(|row| !row.is_expired(now)).count())
            .unwrap_or(0))
    }
}
