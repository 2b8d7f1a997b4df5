//! Content-addressed mesh asset store.
//!
//! Meshes are written once to `<assets_dir>/<hash>.stl` and referenced by
//! that file name. Reads happen on the background executor; lookups wait a
//! bounded time and report `Pending` instead of blocking indefinitely.

pub mod stl;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use shared::AssetRef;

use crate::error::PersistenceError;
use crate::geometry::SharedMesh;
use crate::schedule::Executor;
use crate::settings::EngineSettings;

/// Outcome of [`AssetCache::resolve`].
#[derive(Debug, Clone)]
pub enum AssetStatus {
    Ready(SharedMesh),
    /// Still loading when the wait timed out; ask again later.
    Pending,
    Missing,
}

impl AssetStatus {
    pub fn mesh(&self) -> Option<SharedMesh> {
        match self {
            AssetStatus::Ready(mesh) => Some(mesh.clone()),
            AssetStatus::Pending | AssetStatus::Missing => None,
        }
    }
}

type MemoryMap = Arc<Mutex<HashMap<AssetRef, SharedMesh>>>;

fn lock(memory: &MemoryMap) -> MutexGuard<'_, HashMap<AssetRef, SharedMesh>> {
    memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
pub struct AssetCache {
    dir: PathBuf,
    memory: MemoryMap,
    executor: Executor,
    timeout: Duration,
}

impl AssetCache {
    pub fn new(dir: impl Into<PathBuf>, executor: Executor, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            memory: Arc::new(Mutex::new(HashMap::new())),
            executor,
            timeout,
        }
    }

    pub fn from_settings(settings: &EngineSettings, executor: Executor) -> Self {
        Self::new(settings.resolved_assets_dir(), executor, settings.asset_timeout())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Asset name for a mesh: its content hash.
    pub fn asset_ref(mesh: &SharedMesh) -> AssetRef {
        format!("{:016x}.stl", mesh.long_hash())
    }

    /// Store `mesh` on disk (once per content) and in memory.
    pub fn persist(&self, mesh: &SharedMesh) -> Result<AssetRef, PersistenceError> {
        let asset = Self::asset_ref(mesh);
        let path = self.dir.join(&asset);
        if !path.exists() {
            std::fs::create_dir_all(&self.dir)?;
            std::fs::write(&path, stl::to_bytes(mesh))?;
            tracing::debug!("wrote asset {}", path.display());
        }
        lock(&self.memory).entry(asset.clone()).or_insert_with(|| mesh.clone());
        Ok(asset)
    }

    /// Make `mesh` resolvable as `asset` without touching the disk.
    pub fn insert(&self, asset: impl Into<AssetRef>, mesh: SharedMesh) {
        lock(&self.memory).insert(asset.into(), mesh);
    }

    pub fn contains(&self, asset: &str) -> bool {
        lock(&self.memory).contains_key(asset)
    }

    /// Look up an asset, reading it from disk in the background if needed.
    pub fn resolve(&self, asset: &str) -> AssetStatus {
        if let Some(mesh) = lock(&self.memory).get(asset) {
            return AssetStatus::Ready(mesh.clone());
        }
        // asset names are file names; never leave the store
        if Path::new(asset).components().count() != 1 {
            tracing::warn!("rejecting asset reference {:?}", asset);
            return AssetStatus::Missing;
        }
        let path = self.dir.join(asset);
        if !path.is_file() {
            return AssetStatus::Missing;
        }

        let (tx, rx) = mpsc::channel();
        let memory = self.memory.clone();
        let key = asset.to_string();
        self.executor.spawn_blocking(move || {
            let result = std::fs::read(&path)
                .map_err(PersistenceError::from)
                .and_then(|bytes| stl::read(&bytes))
                .map(Arc::new);
            if let Ok(mesh) = &result {
                lock(&memory).insert(key, mesh.clone());
            }
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(mesh)) => AssetStatus::Ready(mesh),
            Ok(Err(e)) => {
                tracing::warn!("failed to load asset {}: {}", asset, e);
                AssetStatus::Missing
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::info!("asset {} still loading after {:?}", asset, self.timeout);
                AssetStatus::Pending
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => AssetStatus::Missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Mesh;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("design-scene-assets-{}-{}", name, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_persist_then_resolve_from_disk() {
        let dir = temp_dir("disk");
        let mesh: SharedMesh = Arc::new(Mesh::cube(1.0, 2.0, 3.0));
        let writer = AssetCache::new(&dir, Executor::Inline, Duration::from_secs(1));
        let asset = writer.persist(&mesh).unwrap();
        assert!(asset.ends_with(".stl"));
        assert!(dir.join(&asset).is_file());

        // fresh cache: nothing in memory
        let reader = AssetCache::new(&dir, Executor::new(), Duration::from_secs(5));
        assert!(!reader.contains(&asset));
        let loaded = reader.resolve(&asset).mesh().unwrap();
        assert_eq!(loaded.long_hash(), mesh.long_hash());
        assert!(reader.contains(&asset));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_same_content_same_asset() {
        let dir = temp_dir("dedup");
        let cache = AssetCache::new(&dir, Executor::Inline, Duration::from_secs(1));
        let a = cache.persist(&Arc::new(Mesh::cube(1.0, 1.0, 1.0))).unwrap();
        let b = cache.persist(&Arc::new(Mesh::cube(1.0, 1.0, 1.0))).unwrap();
        assert_eq!(a, b);
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_and_escaping_refs() {
        let dir = temp_dir("missing");
        let cache = AssetCache::new(&dir, Executor::Inline, Duration::from_secs(1));
        assert!(matches!(cache.resolve("nope.stl"), AssetStatus::Missing));
        assert!(matches!(cache.resolve("../outside.stl"), AssetStatus::Missing));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_corrupt_file_is_missing() {
        let dir = temp_dir("corrupt");
        std::fs::write(dir.join("bad.stl"), b"garbage").unwrap();
        let cache = AssetCache::new(&dir, Executor::Inline, Duration::from_secs(1));
        assert!(matches!(cache.resolve("bad.stl"), AssetStatus::Missing));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_inserted_asset_resolves_without_disk() {
        let cache = AssetCache::new(temp_dir("memory"), Executor::Inline, Duration::from_secs(1));
        cache.insert("virtual.stl", Arc::new(Mesh::cube(1.0, 1.0, 1.0)));
        assert!(matches!(cache.resolve("virtual.stl"), AssetStatus::Ready(_)));
    }
}
