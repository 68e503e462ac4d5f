pub mod client;
pub mod memory;
pub mod sse;
pub mod tree;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use self::client::RealtimeClient;
pub use self::memory::MemoryRealtimeStore;

#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("realtime request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed realtime payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("malformed stream event: {0}")]
    Protocol(String),
    #[error("realtime stream closed by server")]
    StreamClosed,
    #[error("realtime listener cancelled by server: {0}")]
    Cancelled(String),
    #[error("realtime credentials revoked")]
    AuthRevoked,
    #[error("realtime store unavailable: {0}")]
    Unavailable(String),
}

/// Items delivered by [`RealtimeStore::listen`]. An `Err` is always the last
/// item before the channel closes.
pub type ListenReceiver = mpsc::Receiver<Result<Value, RealtimeError>>;

/// Hierarchical key-value store pushing changes to listeners.
///
/// Paths are `/`-separated keys relative to the database root. Writing
/// `null` removes a node.
#[async_trait]
pub trait RealtimeStore: Send + Sync + 'static {
    /// Read the node at `path` (`Value::Null` when absent).
    async fn get(&self, path: &str) -> Result<Value, RealtimeError>;

    /// Replace the node at `path`.
    async fn set(&self, path: &str, value: Value) -> Result<(), RealtimeError>;

    /// Replace the listed children of the node at `path`, leaving others alone.
    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), RealtimeError>;

    /// Watch the node at `path`.
    ///
    /// The receiver first yields the current value, then the full value again
    /// after every change. Background work stops when `cancel` fires or the
    /// receiver is dropped.
    async fn listen(
        &self,
        path: &str,
        cancel: CancellationToken,
    ) -> Result<ListenReceiver, RealtimeError>;
}

/// Whether `key` can be used as a single path segment.
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
        && !key
            .chars()
            .any(|c| matches!(c, '.' | '$' | '#' | '[' | ']' | '/') || c.is_control())
}

pub fn room_path(room_id: &str) -> String {
    format!("salles/{room_id}")
}

pub fn sensors_path(room_id: &str) -> String {
    format!("salles/{room_id}/capteurs")
}

pub fn alerts_path(room_id: &str) -> String {
    format!("salles/{room_id}/alertes")
}

pub fn alert_path(room_id: &str, alert_id: &str) -> String {
    format!("salles/{room_id}/alertes/{alert_id}")
}

pub fn equipment_path(room_id: &str, key: &str) -> String {
    format!("salles/{room_id}/equipements/{key}")
}
