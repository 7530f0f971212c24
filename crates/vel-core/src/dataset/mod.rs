//! Dataset accessor abstraction
//!
//! Stages never talk to a warehouse directly. They go through the
//! [`DatasetAccessor`] trait, which has two implementations:
//! - [`MemoryStore`]: in-process tables, used by tests and the `memory` backend
//! - [`FileStore`]: a directory-backed warehouse with atomic version publish
//!
//! Table versions are immutable once published. A write either creates a new
//! version or, when the caller asks for it explicitly, replaces one wholesale.

mod filesystem;
mod memory;

pub use filesystem::FileStore;
pub use memory::MemoryStore;

use crate::data_model::Scope;
use crate::error::PipelineError;
use crate::row::Row;
use async_trait::async_trait;
use std::sync::Arc;

/// Read/write access to versioned tables scoped by project and dataset.
#[async_trait]
pub trait DatasetAccessor: Send + Sync {
    /// Short backend name used in logs.
    fn backend(&self) -> &'static str;

    /// Read at most `limit` rows of `version`.
    ///
    /// Fails with [`PipelineError::NotFound`] when the version does not exist.
    async fn read_version(
        &self,
        scope: &Scope,
        version: &str,
        limit: u64,
    ) -> Result<RowSet, PipelineError>;

    /// Publish `rows` as `version` and return the number of rows written.
    ///
    /// Fails with [`PipelineError::Conflict`] when the version exists and
    /// `overwrite` is false. Of two concurrent writers of a fresh version,
    /// exactly one wins.
    async fn write_version(
        &self,
        scope: &Scope,
        version: &str,
        rows: Vec<Row>,
        overwrite: bool,
    ) -> Result<u64, PipelineError>;

    /// Published version labels in the scope, sorted.
    async fn list_versions(&self, scope: &Scope) -> Result<Vec<String>, PipelineError>;

    async fn version_exists(&self, scope: &Scope, version: &str) -> Result<bool, PipelineError> {
        Ok(self
            .list_versions(scope)
            .await?
            .iter()
            .any(|v| v == version))
    }
}

/// A bounded view over a published table version.
///
/// Iteration is lazy and restartable: every call to [`RowSet::iter`] starts
/// from the first row and stops after `limit` rows.
#[derive(Debug, Clone)]
pub struct RowSet {
    version: String,
    rows: Arc<Vec<Row>>,
    limit: usize,
}

impl RowSet {
    pub fn new(version: impl Into<String>, rows: Arc<Vec<Row>>, limit: u64) -> Self {
        Self {
            version: version.into(),
            rows,
            limit: usize::try_from(limit).unwrap_or(usize::MAX),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn iter(&self) -> impl Iterator<Item = &Row> + '_ {
        self.rows.iter().take(self.limit)
    }

    pub fn len(&self) -> usize {
        self.rows.len().min(self.limit)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<Row> {
        self.iter().cloned().collect()
    }
}

/// Whether `label` is usable as a project, dataset or version name.
///
/// Labels are ASCII alphanumerics plus `_`, `-` and `.`, and may not start
/// with a dot. This also keeps labels safe as path components.
pub fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && !label.starts_with('.')
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
