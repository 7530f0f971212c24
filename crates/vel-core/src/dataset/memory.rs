//! In-memory dataset accessor
use super::{DatasetAccessor, RowSet};
use crate::data_model::Scope;
use crate::error::PipelineError;
use crate::row::Row;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

type TableKey = (Scope, String);

/// Tables held in process memory.
///
/// A version is inserted as a complete `Arc` snapshot under the write lock, so
/// readers see either nothing or the whole version.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<TableKey, Arc<Vec<Row>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DatasetAccessor for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn read_version(
        &self,
        scope: &Scope,
        version: &str,
        limit: u64,
    ) -> Result<RowSet, PipelineError> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(&(scope.clone(), version.to_string()))
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(format!("{}/{}", scope, version)))?;
        Ok(RowSet::new(version, rows, limit))
    }

    async fn write_version(
        &self,
        scope: &Scope,
        version: &str,
        rows: Vec<Row>,
        overwrite: bool,
    ) -> Result<u64, PipelineError> {
        let written = rows.len() as u64;
        let snapshot = Arc::new(rows);
        let key = (scope.clone(), version.to_string());

        let mut tables = self.tables.write().await;
        if !overwrite && tables.contains_key(&key) {
            return Err(PipelineError::Conflict(format!(
                "{}/{} already exists",
                scope, version
            )));
        }
        tables.insert(key, snapshot);
        debug!(scope = %scope, version, rows = written, "published version");
        Ok(written)
    }

    async fn list_versions(&self, scope: &Scope) -> Result<Vec<String>, PipelineError> {
        let tables = self.tables.read().await;
        let mut versions: Vec<String> = tables
            .keys()
            .filter(|(s, _)| s == scope)
            .map(|(_, v)| v.clone())
            .collect();
        versions.sort();
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Scope {
        Scope::new("proj", "ds")
    }

    fn rows(n: i64) -> Vec<Row> {
        (1..=n).map(|i| Row::new().with("id", i).with("amt", i * 10)).collect()
    }

    #[tokio::test]
    async fn test_read_missing_version() {
        let store = MemoryStore::new();
        let err = store.read_version(&scope(), "v1", 10).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_write_then_read_with_limit() {
        let store = MemoryStore::new();
        assert_eq!(store.write_version(&scope(), "v1", rows(5), false).await.unwrap(), 5);
        let set = store.read_version(&scope(), "v1", 2).await.unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.version(), "v1");
    }

    #[tokio::test]
    async fn test_conflict_and_overwrite() {
        let store = MemoryStore::new();
        store.write_version(&scope(), "v1", rows(2), false).await.unwrap();
        let err = store.write_version(&scope(), "v1", rows(3), false).await.unwrap_err();
        assert!(matches!(err, PipelineError::Conflict(_)));

        store.write_version(&scope(), "v1", rows(3), true).await.unwrap();
        assert_eq!(store.read_version(&scope(), "v1", 100).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_scopes_are_isolated() {
        let store = MemoryStore::new();
        store.write_version(&scope(), "v1", rows(1), false).await.unwrap();
        let other = Scope::new("proj", "other");
        assert!(store.list_versions(&other).await.unwrap().is_empty());
        assert!(!store.version_exists(&other, "v1").await.unwrap());
        assert!(store.version_exists(&scope(), "v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_writers_one_wins() {
        let store = Arc::new(MemoryStore::new());
        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.write_version(&scope(), "race", rows(3), false).await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.write_version(&scope(), "race", rows(4), false).await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(PipelineError::Conflict(_))))
            .count();
        assert_eq!((ok, conflicts), (1, 1));
    }
}
