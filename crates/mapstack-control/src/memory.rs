//! In-process control plane.
//!
//! Keeps the key/value state and the full publish history in memory and
//! fans channel messages out through a broadcast bus. Used by tests to
//! drive and observe a service, and by single-process setups.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use crate::command::decode_logged;
use crate::error::ControlResult;
use crate::plane::{CommandStream, ControlPlane};

const BUS_CAPACITY: usize = 64;
const STREAM_CAPACITY: usize = 32;

struct MemoryInner {
    values: Mutex<HashMap<String, String>>,
    history: Mutex<Vec<(String, String)>>,
    bus: broadcast::Sender<(String, String)>,
}

/// Cloneable handle; clones share the same state and bus.
#[derive(Clone)]
pub struct MemoryControlPlane {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                values: Mutex::new(HashMap::new()),
                history: Mutex::new(Vec::new()),
                bus,
            }),
        }
    }

    /// Current value of `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner
            .values
            .lock()
            .ok()
            .and_then(|values| values.get(key).cloned())
    }

    /// Every publish so far, in order.
    pub fn history(&self) -> Vec<(String, String)> {
        self.inner
            .history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    /// Every value published to `key`, in order.
    pub fn history_for(&self, key: &str) -> Vec<String> {
        self.history()
            .into_iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v)
            .collect()
    }

    /// Send a raw payload on `channel`. Returns the number of subscribers reached.
    pub fn send(&self, channel: &str, payload: &str) -> usize {
        self.inner
            .bus
            .send((channel.to_string(), payload.to_string()))
            .unwrap_or(0)
    }
}

#[async_trait]
impl ControlPlane for MemoryControlPlane {
    async fn publish(&self, key: &str, value: &str) -> ControlResult<()> {
        if let Ok(mut values) = self.inner.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
        if let Ok(mut history) = self.inner.history.lock() {
            history.push((key.to_string(), value.to_string()));
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> ControlResult<CommandStream> {
        let mut bus = self.inner.bus.subscribe();
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        let channel = channel.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = bus.recv() => match received {
                        Ok((ch, payload)) if ch == channel => {
                            if let Some(cmd) = decode_logged(&payload) {
                                if tx.send(cmd).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(%channel, skipped, "command subscriber lagged, messages lost");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = tx.closed() => break,
                }
            }
        });

        Ok(rx)
    }
}
