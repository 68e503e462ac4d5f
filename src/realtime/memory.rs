use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::{tree, ListenReceiver, RealtimeError, RealtimeStore};

/// In-memory [`RealtimeStore`] with the same listen semantics as the hosted
/// database. Clones share state.
///
/// Failure injection (`fail_writes_under`, `break_streams`) lets tests drive
/// the error paths of the services built on top of it.
#[derive(Clone)]
pub struct MemoryRealtimeStore {
    inner: Arc<Shared>,
}

struct Shared {
    root: Mutex<Value>,
    version: watch::Sender<u64>,
    stream_failure: watch::Sender<Option<String>>,
    failing_prefixes: Mutex<Vec<String>>,
    listeners: AtomicUsize,
}

impl Shared {
    fn root(&self) -> MutexGuard<'_, Value> {
        self.root.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self, path: &str) -> Value {
        tree::get(&self.root(), path)
    }

    fn check_write(&self, path: &str) -> Result<(), RealtimeError> {
        let path = path.trim_matches('/');
        let failing = self
            .failing_prefixes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if failing.iter().any(|prefix| path.starts_with(prefix.as_str())) {
            return Err(RealtimeError::Unavailable(format!("write to {path} refused")));
        }
        Ok(())
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

impl Default for MemoryRealtimeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRealtimeStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        let (stream_failure, _) = watch::channel(None);
        Self {
            inner: Arc::new(Shared {
                root: Mutex::new(Value::Null),
                version,
                stream_failure,
                failing_prefixes: Mutex::new(Vec::new()),
                listeners: AtomicUsize::new(0),
            }),
        }
    }
}

#[cfg(test)]
impl MemoryRealtimeStore {
    /// Synchronous read, for assertions.
    pub fn snapshot(&self, path: &str) -> Value {
        self.inner.read(path)
    }

    /// Refuse every write whose path starts with `prefix`.
    pub fn fail_writes_under(&self, prefix: &str) {
        self.inner
            .failing_prefixes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(prefix.trim_matches('/').to_owned());
    }

    pub fn clear_failures(&self) {
        self.inner
            .failing_prefixes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Terminate every open listener with [`RealtimeError::Cancelled`].
    pub fn break_streams(&self, reason: &str) {
        self.inner.stream_failure.send_replace(Some(reason.to_owned()));
    }

    /// Number of listener tasks still running.
    pub fn active_listeners(&self) -> usize {
        self.inner.listeners.load(Ordering::SeqCst)
    }
}

struct ListenerGuard(Arc<Shared>);

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.0.listeners.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RealtimeStore for MemoryRealtimeStore {
    async fn get(&self, path: &str) -> Result<Value, RealtimeError> {
        Ok(self.inner.read(path))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), RealtimeError> {
        self.inner.check_write(path)?;
        tree::set(&mut self.inner.root(), path, value);
        self.inner.bump();
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), RealtimeError> {
        self.inner.check_write(path)?;
        tree::update(&mut self.inner.root(), path, fields);
        self.inner.bump();
        Ok(())
    }

    async fn listen(
        &self,
        path: &str,
        cancel: CancellationToken,
    ) -> Result<ListenReceiver, RealtimeError> {
        if let Some(reason) = self.inner.stream_failure.borrow().clone() {
            return Err(RealtimeError::Cancelled(reason));
        }

        let (tx, rx) = mpsc::channel(16);
        let shared = Arc::clone(&self.inner);
        let path = path.to_owned();
        let mut version = shared.version.subscribe();
        let mut failure = shared.stream_failure.subscribe();

        shared.listeners.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let _guard = ListenerGuard(Arc::clone(&shared));

            let mut last = shared.read(&path);
            if tx.send(Ok(last.clone())).await.is_err() {
                return;
            }

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tx.closed() => return,
                    changed = version.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        let current = shared.read(&path);
                        if current != last {
                            last = current.clone();
                            if tx.send(Ok(current)).await.is_err() {
                                return;
                            }
                        }
                    }
                    changed = failure.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        let reason = failure.borrow_and_update().clone();
                        if let Some(reason) = reason {
                            let _ = tx.send(Err(RealtimeError::Cancelled(reason))).await;
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}
