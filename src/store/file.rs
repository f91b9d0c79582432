//! JSON file persistence with atomic writes.
//!
//! Each collection lives in `<dir>/<collection>.json` as a JSON array in
//! insertion order. The whole collection is rewritten after every mutation.
//!
//! # Safety
//! - Uses atomic file writes (write to temp, fsync, rename) for durability
//! - A mutation is only kept in memory once it has been persisted

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::{Filter, MemoryStore, Record, RecordId, Store, StoreError};

/// File-backed store for one collection.
pub struct JsonFileStore<R: Record> {
    path: PathBuf,
    inner: MemoryStore<R>,
    /// Serializes mutate-then-persist sequences
    write_lock: Mutex<()>,
}

impl<R: Record> JsonFileStore<R> {
    /// Open (or create) the collection file under `dir`.
    ///
    /// A missing file is an empty collection. A file that cannot be parsed is
    /// an error; it is never silently replaced.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        let path = dir.join(format!("{}.json", R::COLLECTION));

        let load_path = path.clone();
        let records: Vec<R> = tokio::task::spawn_blocking(move || -> Result<Vec<R>, StoreError> {
            fs::create_dir_all(&dir)?;
            match fs::read_to_string(&load_path) {
                Ok(data) => Ok(serde_json::from_str(&data)?),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("load task failed: {}", e)))??;

        info!(
            collection = R::COLLECTION,
            path = %path.display(),
            records = records.len(),
            "Opened JSON store"
        );

        Ok(Self {
            path,
            inner: MemoryStore::from_records(records)?,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let snapshot = self.inner.snapshot().await;
        let json = serde_json::to_vec_pretty(&snapshot)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| StoreError::Unavailable(format!("persist task failed: {}", e)))??;

        debug!(collection = R::COLLECTION, records = snapshot.len(), "Collection persisted");
        Ok(())
    }

    /// Persist, rolling memory back to `before` if the write fails.
    async fn commit(&self, before: Vec<R>) -> Result<(), StoreError> {
        if let Err(e) = self.persist().await {
            error!(
                collection = R::COLLECTION,
                error = %e,
                "Failed to persist collection, rolling back in-memory change"
            );
            self.inner.restore(before).await;
            return Err(e);
        }
        Ok(())
    }
}

/// Write to a temp file, fsync, then rename over the target.
///
/// POSIX guarantees rename is atomic on the same filesystem, so a crash leaves
/// either the old or the new file, never a partial one.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let temp_path = path.with_extension("json.tmp");

    let mut file = fs::File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;

    fs::rename(&temp_path, path)?;
    Ok(())
}

#[async_trait]
impl<R: Record> Store<R> for JsonFileStore<R> {
    async fn insert(&self, record: R) -> Result<RecordId, StoreError> {
        let _guard = self.write_lock.lock().await;
        let before = self.inner.snapshot().await;
        let id = self.inner.insert(record).await?;
        self.commit(before).await?;
        Ok(id)
    }

    async fn get(&self, id: &RecordId) -> Result<Option<R>, StoreError> {
        self.inner.get(id).await
    }

    async fn update(&self, id: &RecordId, patch: R::Patch) -> Result<R, StoreError> {
        let _guard = self.write_lock.lock().await;
        let before = self.inner.snapshot().await;
        let updated = self.inner.update(id, patch).await?;
        self.commit(before).await?;
        Ok(updated)
    }

    async fn delete(&self, id: &RecordId) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let before = self.inner.snapshot().await;
        self.inner.delete(id).await?;
        self.commit(before).await
    }

    async fn list(&self, filter: &Filter<R::Status>) -> Result<Vec<R>, StoreError> {
        self.inner.list(filter).await
    }
}
