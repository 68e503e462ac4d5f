use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use crate::sensors::SensorSnapshot;

/// Most recent `SensorSnapshot` per room, fed by the monitor.
///
/// Clones share the same map.
#[derive(Clone, Default)]
pub struct SnapshotCache {
    inner: Arc<RwLock<HashMap<String, SensorSnapshot>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the cached snapshot for `snapshot.room_id`.
    pub async fn update(&self, snapshot: SensorSnapshot) {
        self.inner
            .write()
            .await
            .insert(snapshot.room_id.clone(), snapshot);
    }

    pub async fn get(&self, room_id: &str) -> Option<SensorSnapshot> {
        self.inner.read().await.get(room_id).cloned()
    }

    /// Latest snapshot of every room, ordered by room id.
    pub async fn all(&self) -> Vec<SensorSnapshot> {
        let mut all: Vec<_> = self.inner.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        all
    }
}
