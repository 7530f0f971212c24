//! File system dataset accessor
//!
//! Each table version is a single JSON-lines file at
//! `<root>/<project>/<dataset>/<version>.jsonl`. The first line is a manifest
//! (row count, column names, blake3 checksum of the row lines); every further
//! line is one row object with its columns in order.
//!
//! Versions are staged in a hidden temp file and published in one step:
//! `hard_link` for new versions (fails if the name is taken, so exactly one of
//! two racing writers wins) and `rename` for explicit overwrites.

use super::{is_valid_label, DatasetAccessor, RowSet};
use crate::data_model::Scope;
use crate::error::PipelineError;
use crate::row::Row;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

const FORMAT: &str = "vel.table.v1";
const EXTENSION: &str = "jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    format: String,
    version: String,
    row_count: u64,
    columns: Vec<String>,
    checksum: String,
    created_at: DateTime<Utc>,
}

/// Directory-backed warehouse.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn scope_dir(&self, scope: &Scope) -> Result<PathBuf, PipelineError> {
        for (what, label) in [("project", &scope.project_id), ("dataset", &scope.dataset)] {
            if !is_valid_label(label) {
                return Err(PipelineError::Storage(format!("invalid {} name '{}'", what, label)));
            }
        }
        Ok(self.root.join(&scope.project_id).join(&scope.dataset))
    }

    fn version_path(&self, scope: &Scope, version: &str) -> Result<PathBuf, PipelineError> {
        if !is_valid_label(version) {
            return Err(PipelineError::Storage(format!("invalid version name '{}'", version)));
        }
        Ok(self
            .scope_dir(scope)?
            .join(format!("{}.{}", version, EXTENSION)))
    }
}

fn checksum(body: &str) -> String {
    format!("blake3:{}", blake3::hash(body.as_bytes()))
}

/// Serialize rows into the on-disk layout: manifest line, then row lines.
fn encode(version: &str, rows: &[Row]) -> Result<String, PipelineError> {
    let mut body = String::new();
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for name in row.column_names() {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.to_string());
            }
        }
        body.push_str(&serde_json::to_string(row)?);
        body.push('\n');
    }

    let manifest = Manifest {
        format: FORMAT.to_string(),
        version: version.to_string(),
        row_count: rows.len() as u64,
        columns,
        checksum: checksum(&body),
        created_at: Utc::now(),
    };

    let mut out = serde_json::to_string(&manifest)?;
    out.push('\n');
    out.push_str(&body);
    Ok(out)
}

/// Parse at most `limit` rows after verifying the manifest checksum.
fn decode(path: &Path, contents: &str, limit: u64) -> Result<Vec<Row>, PipelineError> {
    let (header, body) = contents.split_once('\n').unwrap_or((contents, ""));
    let manifest: Manifest = serde_json::from_str(header).map_err(|e| {
        PipelineError::Storage(format!("{}: unreadable manifest: {}", path.display(), e))
    })?;

    if manifest.format != FORMAT {
        return Err(PipelineError::Storage(format!(
            "{}: unsupported table format '{}'",
            path.display(),
            manifest.format
        )));
    }
    if checksum(body) != manifest.checksum {
        warn!(path = %path.display(), "table checksum mismatch");
        return Err(PipelineError::Storage(format!(
            "{}: checksum mismatch, table is corrupt",
            path.display()
        )));
    }

    let take = usize::try_from(limit).unwrap_or(usize::MAX);
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .take(take)
        .map(|line| serde_json::from_str::<Row>(line).map_err(PipelineError::from))
        .collect()
}

/// Write `bytes` to a fresh file and flush it to disk before returning.
async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// Persist directory entries (the published link or rename).
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl DatasetAccessor for FileStore {
    fn backend(&self) -> &'static str {
        "filesystem"
    }

    async fn read_version(
        &self,
        scope: &Scope,
        version: &str,
        limit: u64,
    ) -> Result<RowSet, PipelineError> {
        let path = self.version_path(scope, version)?;
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PipelineError::NotFound(format!("{}/{}", scope, version)));
            }
            Err(e) => return Err(e.into()),
        };
        let rows = decode(&path, &contents, limit)?;
        debug!(path = %path.display(), rows = rows.len(), "read version");
        Ok(RowSet::new(version, Arc::new(rows), limit))
    }

    async fn write_version(
        &self,
        scope: &Scope,
        version: &str,
        rows: Vec<Row>,
        overwrite: bool,
    ) -> Result<u64, PipelineError> {
        let target = self.version_path(scope, version)?;
        let dir = self.scope_dir(scope)?;
        fs::create_dir_all(&dir).await?;

        let staged = dir.join(format!(".{}.{}.tmp", version, Uuid::new_v4().simple()));
        if let Err(e) = write_synced(&staged, encode(version, &rows)?.as_bytes()).await {
            let _ = fs::remove_file(&staged).await;
            return Err(e.into());
        }

        let published = if overwrite {
            fs::rename(&staged, &target).await
        } else {
            let linked = fs::hard_link(&staged, &target).await;
            let _ = fs::remove_file(&staged).await;
            linked
        };

        match published {
            Ok(()) => {
                sync_dir(&dir).await?;
                debug!(path = %target.display(), rows = rows.len(), overwrite, "published version");
                Ok(rows.len() as u64)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(PipelineError::Conflict(format!("{}/{} already exists", scope, version)))
            }
            Err(e) => {
                let _ = fs::remove_file(&staged).await;
                Err(e.into())
            }
        }
    }

    async fn list_versions(&self, scope: &Scope) -> Result<Vec<String>, PipelineError> {
        let dir = self.scope_dir(scope)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            if let Some(version) = name.strip_suffix(&format!(".{}", EXTENSION)) {
                versions.push(version.to_string());
            }
        }
        versions.sort();
        Ok(versions)
    }

    async fn version_exists(&self, scope: &Scope, version: &str) -> Result<bool, PipelineError> {
        Ok(fs::try_exists(self.version_path(scope, version)?).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Value;
    use tempfile::TempDir;

    fn scope() -> Scope {
        Scope::new("proj", "ds")
    }

    fn rows() -> Vec<Row> {
        vec![
            Row::new().with("id", 1).with("amt", 10).with("note", "a"),
            Row::new().with("id", 2).with("amt", 20.5).with("note", Value::Null),
        ]
    }

    #[tokio::test]
    async fn test_roundtrip_preserves_order_and_types() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        assert_eq!(store.write_version(&scope(), "v1", rows(), false).await.unwrap(), 2);

        let set = store.read_version(&scope(), "v1", 10).await.unwrap();
        assert_eq!(set.to_vec(), rows());
        let names: Vec<_> = set.iter().next().unwrap().column_names().collect();
        assert_eq!(names, vec!["id", "amt", "note"]);
    }

    #[tokio::test]
    async fn test_publish_leaves_only_the_version_file() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        assert_eq!(store.backend(), "filesystem");
        store.write_version(&scope(), "v1", rows(), false).await.unwrap();
        store.write_version(&scope(), "v1", rows()[..1].to_vec(), true).await.unwrap();

        let scope_dir = dir.path().join("proj").join("ds");
        let mut names: Vec<_> = std::fs::read_dir(&scope_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["v1.jsonl"]);

        let set = store.read_version(&scope(), "v1", 10).await.unwrap();
        assert_eq!(set.to_vec(), rows()[..1].to_vec());
    }

    #[tokio::test]
    async fn test_limit_and_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        store.write_version(&scope(), "v1", rows(), false).await.unwrap();
        assert_eq!(store.read_version(&scope(), "v1", 1).await.unwrap().len(), 1);

        let err = store.read_version(&scope(), "v2", 1).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_conflict_then_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        store.write_version(&scope(), "v1", rows(), false).await.unwrap();

        let err = store.write_version(&scope(), "v1", vec![], false).await.unwrap_err();
        assert!(matches!(err, PipelineError::Conflict(_)));

        store
            .write_version(&scope(), "v1", vec![Row::new().with("id", 9)], true)
            .await
            .unwrap();
        let set = store.read_version(&scope(), "v1", 10).await.unwrap();
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn test_list_versions_skips_staging_files() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        store.write_version(&scope(), "b", rows(), false).await.unwrap();
        store.write_version(&scope(), "a", rows(), false).await.unwrap();
        std::fs::write(dir.path().join("proj/ds/.c.123.tmp"), "partial").unwrap();

        assert_eq!(store.list_versions(&scope()).await.unwrap(), vec!["a", "b"]);
        assert!(store.version_exists(&scope(), "a").await.unwrap());
        assert!(!store.version_exists(&scope(), "c").await.unwrap());
    }

    #[tokio::test]
    async fn test_corruption_is_detected() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        store.write_version(&scope(), "v1", rows(), false).await.unwrap();

        let path = dir.path().join("proj/ds/v1.jsonl");
        let tampered = std::fs::read_to_string(&path).unwrap().replace("\"amt\":10", "\"amt\":11");
        std::fs::write(&path, tampered).unwrap();

        let err = store.read_version(&scope(), "v1", 10).await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage(ref m) if m.contains("checksum")));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let err = store
            .write_version(&Scope::new("..", "ds"), "v1", rows(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
    }

    #[tokio::test]
    async fn test_concurrent_writers_one_wins() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::new(dir.path()));
        let mut handles = Vec::new();
        for n in 0..2 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let rows = vec![Row::new().with("id", n)];
                store.write_version(&scope(), "race", rows, false).await
            }));
        }
        let mut ok = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(PipelineError::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!((ok, conflicts), (1, 1));
    }
}
