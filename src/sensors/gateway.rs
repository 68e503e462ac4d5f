use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::realtime::{self, RealtimeError, RealtimeStore};

use super::snapshot::SensorSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("unknown room: {0:?}")]
    UnknownRoom(String),
    #[error(transparent)]
    Realtime(#[from] RealtimeError),
}

type Registry = Arc<Mutex<HashMap<String, Registered>>>;

struct Registered {
    id: u64,
    cancel: CancellationToken,
}

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<String, Registered>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Delivers live sensor snapshots for rooms.
///
/// A gateway keeps at most one open subscription per room: subscribing to a
/// room again closes the previous subscription first.
#[derive(Clone)]
pub struct SensorGateway {
    store: Arc<dyn RealtimeStore>,
    registry: Registry,
    next_id: Arc<AtomicU64>,
}

impl SensorGateway {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self {
            store,
            registry: Registry::default(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Start watching `room_id`'s sensors.
    ///
    /// `on_snapshot` runs for the current reading and every later push.
    /// `on_error` runs at most once, when the stream fails; the subscription
    /// is closed afterwards. An empty or malformed room id fails right away
    /// without opening anything.
    pub async fn subscribe<F, E>(
        &self,
        room_id: &str,
        mut on_snapshot: F,
        on_error: E,
    ) -> Result<Subscription, GatewayError>
    where
        F: FnMut(SensorSnapshot) + Send + 'static,
        E: FnOnce(GatewayError) + Send + 'static,
    {
        if !realtime::is_valid_key(room_id) {
            return Err(GatewayError::UnknownRoom(room_id.to_owned()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        let previous = lock(&self.registry).insert(
            room_id.to_owned(),
            Registered { id, cancel: cancel.clone() },
        );
        if let Some(previous) = previous {
            debug!(room_id = %room_id, "Replacing open sensor subscription");
            previous.cancel.cancel();
        }

        let mut rx = match self
            .store
            .listen(&realtime::sensors_path(room_id), cancel.clone())
            .await
        {
            Ok(rx) => rx,
            Err(e) => {
                cancel.cancel();
                release(&self.registry, room_id, id);
                return Err(e.into());
            }
        };

        info!(room_id = %room_id, "Sensor subscription opened");

        let room = room_id.to_owned();
        let registry = Arc::clone(&self.registry);
        let token = cancel.clone();
        tokio::spawn(async move {
            let failure = loop {
                let item = tokio::select! {
                    _ = token.cancelled() => break None,
                    item = rx.recv() => item,
                };
                match item {
                    Some(Ok(node)) => match SensorSnapshot::from_node(&room, &node) {
                        Some(snapshot) => {
                            debug!(
                                room_id = %room,
                                temperature = ?snapshot.temperature,
                                humidity = ?snapshot.humidity,
                                air_quality = ?snapshot.air_quality,
                                "Sensor update"
                            );
                            on_snapshot(snapshot);
                        }
                        None => warn!(room_id = %room, "No sensor data available for room"),
                    },
                    Some(Err(e)) => break Some(e),
                    None => break None,
                }
            };

            release(&registry, &room, id);
            if let Some(e) = failure {
                error!(room_id = %room, error = %e, "Sensor stream failed");
                on_error(GatewayError::Realtime(e));
            }
        });

        Ok(Subscription {
            room_id: room_id.to_owned(),
            id,
            cancel,
            registry: Arc::clone(&self.registry),
            released: AtomicBool::new(false),
        })
    }

    /// One-shot read of `room_id`'s sensors. `None` when the room has not
    /// reported anything.
    pub async fn current(&self, room_id: &str) -> Result<Option<SensorSnapshot>, GatewayError> {
        if !realtime::is_valid_key(room_id) {
            return Err(GatewayError::UnknownRoom(room_id.to_owned()));
        }
        let node = self.store.get(&realtime::sensors_path(room_id)).await?;
        Ok(SensorSnapshot::from_node(room_id, &node))
    }

    /// Rooms with an open subscription.
    #[cfg(test)]
    pub fn open_rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = lock(&self.registry).keys().cloned().collect();
        rooms.sort();
        rooms
    }
}

/// Drop the registry entry for `room_id` if it still belongs to `id`.
fn release(registry: &Registry, room_id: &str, id: u64) {
    let mut map = lock(registry);
    if map.get(room_id).is_some_and(|r| r.id == id) {
        map.remove(room_id);
    }
}

/// Handle to an open sensor subscription.
///
/// Closing is idempotent and also happens on drop.
pub struct Subscription {
    room_id: String,
    id: u64,
    cancel: CancellationToken,
    registry: Registry,
    released: AtomicBool,
}

impl Subscription {
    /// Whether the subscription is still delivering snapshots.
    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        !self.cancel.is_cancelled() && lock(&self.registry).get(&self.room_id).is_some_and(|r| r.id == self.id)
    }

    pub fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        release(&self.registry, &self.room_id, self.id);
        info!(room_id = %self.room_id, "Sensor subscription closed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
