//! In-memory [`CheckpointStore`] for tests and single-process demos.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::traits::CheckpointStore;

/// Thread-safe, process-local checkpoint store.
///
/// Data does not survive past the process — useful for exercising the
/// barrier protocol in tests without touching the filesystem.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    markers: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryCheckpointStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, name: &str) -> Result<Option<String>> {
        let mut markers = self.markers.write().await;
        Ok(markers.remove(name))
    }

    async fn store(&self, name: &str, marker: &str) -> Result<()> {
        let mut markers = self.markers.write().await;
        markers.insert(name.to_string(), marker.to_string());
        Ok(())
    }
}
