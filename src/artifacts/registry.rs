//! In-memory artifact cache
//!
//! Entries are immutable `Arc`s. Reloading or publishing swaps the pointer,
//! so callers still holding the previous artifact keep a consistent view.

use super::{ArtifactStore, TrainedArtifact};
use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub struct ArtifactRegistry {
    store: ArtifactStore,
    loaded: RwLock<HashMap<String, Arc<TrainedArtifact>>>,
}

impl ArtifactRegistry {
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Cached artifact for `key`, loading the current version on first use
    pub fn get(&self, key: &str) -> Result<Arc<TrainedArtifact>> {
        if let Some(artifact) = self.loaded.read().get(key) {
            return Ok(artifact.clone());
        }

        let artifact = Arc::new(self.store.load_latest(key)?);
        let mut loaded = self.loaded.write();
        // another caller may have loaded it meanwhile
        let entry = loaded.entry(key.to_string()).or_insert(artifact);
        Ok(entry.clone())
    }

    /// Re-read the current version from disk and swap it in
    pub fn reload(&self, key: &str) -> Result<Arc<TrainedArtifact>> {
        let artifact = Arc::new(self.store.load_latest(key)?);
        self.loaded.write().insert(key.to_string(), artifact.clone());
        info!("Reloaded artifact {} v{:04}", key, artifact.version());
        Ok(artifact)
    }

    /// Save a new version and make it the cached one
    pub fn publish(&self, artifact: TrainedArtifact) -> Result<Arc<TrainedArtifact>> {
        let artifact = Arc::new(self.store.save(artifact)?);
        let key = artifact.key().to_string();
        self.loaded.write().insert(key.clone(), artifact.clone());
        info!("Published artifact {} v{:04}", key, artifact.version());
        Ok(artifact)
    }

    /// Drop a cached entry; returns whether one existed
    pub fn evict(&self, key: &str) -> bool {
        self.loaded.write().remove(key).is_some()
    }
}
