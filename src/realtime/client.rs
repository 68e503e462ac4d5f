use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header::ACCEPT, Client, RequestBuilder};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;

use super::{
    sse::{SseDecoder, StreamEvent},
    tree, ListenReceiver, RealtimeError, RealtimeStore,
};

/// REST client for the hosted realtime database.
///
/// Nodes are addressed as `{base_url}/{path}.json`; listening uses the
/// server-sent-events variant of the same endpoint.
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    base_url: String,
    auth: Option<String>,
}

impl RealtimeClient {
    pub fn new(config: &Config) -> Self {
        Self::with_base_url(&config.realtime_db_url, config.realtime_db_auth.clone())
    }

    pub fn with_base_url(base_url: &str, auth: Option<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                http: Client::new(),
                base_url: base_url.trim_end_matches('/').to_owned(),
                auth,
            }),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.inner.base_url, path.trim_matches('/'))
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.inner.auth {
            Some(token) => req.query(&[("auth", token)]),
            None => req,
        }
    }
}

#[async_trait]
impl RealtimeStore for RealtimeClient {
    async fn get(&self, path: &str) -> Result<Value, RealtimeError> {
        let url = self.url(path);
        debug!(url = %url, "Reading realtime node");

        let value = self
            .authorize(self.inner.http.get(&url))
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(value)
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), RealtimeError> {
        let url = self.url(path);
        debug!(url = %url, "Writing realtime node");

        self.authorize(self.inner.http.put(&url))
            .query(&[("print", "silent")])
            .json(&value)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), RealtimeError> {
        let url = self.url(path);
        debug!(url = %url, "Patching realtime node");

        self.authorize(self.inner.http.patch(&url))
            .query(&[("print", "silent")])
            .json(&fields)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn listen(
        &self,
        path: &str,
        cancel: CancellationToken,
    ) -> Result<ListenReceiver, RealtimeError> {
        let url = self.url(path);
        info!(url = %url, "Opening realtime stream");

        let response = self
            .authorize(self.inner.http.get(&url))
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?
            .error_for_status()?;

        let (tx, rx) = mpsc::channel(16);
        let path = path.to_owned();

        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut decoder = SseDecoder::new();
            // The stream reports changes relative to the watched node; keep a
            // local copy so listeners always receive the whole node.
            let mut node = Value::Null;

            loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => break,
                    chunk = body.next() => chunk,
                };

                let bytes = match chunk {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => {
                        let _ = tx.send(Err(e.into())).await;
                        break;
                    }
                    None => {
                        let _ = tx.send(Err(RealtimeError::StreamClosed)).await;
                        break;
                    }
                };

                let events = match decoder.push(&bytes) {
                    Ok(events) => events,
                    Err(e) => {
                        warn!(path = %path, error = %e, "Dropping realtime stream");
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };

                for raw in events {
                    let changed = match StreamEvent::try_from(&raw) {
                        Ok(StreamEvent::Put { path, data }) => {
                            tree::set(&mut node, &path, data);
                            true
                        }
                        Ok(StreamEvent::Patch { path, data }) => {
                            tree::update(&mut node, &path, data);
                            true
                        }
                        Ok(StreamEvent::KeepAlive) => false,
                        Ok(StreamEvent::Cancel(reason)) => {
                            let _ = tx.send(Err(RealtimeError::Cancelled(reason))).await;
                            return;
                        }
                        Ok(StreamEvent::AuthRevoked) => {
                            let _ = tx.send(Err(RealtimeError::AuthRevoked)).await;
                            return;
                        }
                        Err(e) => {
                            warn!(path = %path, error = %e, "Dropping realtime stream");
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    };

                    if changed && tx.send(Ok(node.clone())).await.is_err() {
                        return;
                    }
                }
            }

            debug!(path = %path, "Realtime stream closed");
        });

        Ok(rx)
    }
}
