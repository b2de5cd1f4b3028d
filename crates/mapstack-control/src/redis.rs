//! Redis-backed control plane.
//!
//! Keys are written with `SET`, commands arrive via `SUBSCRIBE`.
//!
//! ```text
//!  publish() ──record──► latest value per key ──wake──► writer task ──SET──► Redis
//!                              ▲                             │
//!                              └──── re-marked on failure ◄──┘
//! ```
//!
//! `publish` never waits on the network: it records the value and wakes
//! a background writer. The writer and the subscriber both reconnect
//! forever with a fixed delay. Every remembered key is written again
//! after each (re)connection, so the shared cache is rebuilt if the
//! control plane restarts.

use std::collections::{BTreeMap, BTreeSet};
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info, warn};

use crate::command::{CommandEnvelope, decode_logged};
use crate::error::{ControlError, ControlResult};
use crate::plane::{CommandStream, ControlPlane};

/// Delay between reconnection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Upper bound on a single connect or `SET`.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

const STREAM_CAPACITY: usize = 32;

/// Values the writer still has to deliver.
#[derive(Default)]
struct Pending {
    latest: BTreeMap<String, String>,
    dirty: BTreeSet<String>,
}

struct RedisInner {
    client: redis::Client,
    retry_delay: Duration,
    io_timeout: Duration,
    pending: Mutex<Pending>,
    wake: Notify,
    writer_started: AtomicBool,
}

/// Control plane over a Redis (or Valkey) server.
#[derive(Clone)]
pub struct RedisControlPlane {
    inner: Arc<RedisInner>,
}

pub struct RedisControlPlaneBuilder {
    url: String,
    retry_delay: Duration,
    io_timeout: Duration,
}

impl RedisControlPlaneBuilder {
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Validate the URL; no connection is made until first use.
    pub fn build(self) -> ControlResult<RedisControlPlane> {
        let client = redis::Client::open(self.url.as_str())
            .map_err(|e| ControlError::InvalidUrl(e.to_string()))?;
        Ok(RedisControlPlane {
            inner: Arc::new(RedisInner {
                client,
                retry_delay: self.retry_delay,
                io_timeout: self.io_timeout,
                pending: Mutex::new(Pending::default()),
                wake: Notify::new(),
                writer_started: AtomicBool::new(false),
            }),
        })
    }
}

impl RedisControlPlane {
    pub fn builder(url: impl Into<String>) -> RedisControlPlaneBuilder {
        RedisControlPlaneBuilder {
            url: url.into(),
            retry_delay: DEFAULT_RETRY_DELAY,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    /// Default delays; no connection is made until first use.
    pub fn new(url: &str) -> ControlResult<Self> {
        Self::builder(url).build()
    }
}

impl RedisInner {
    // ── Pending values ──────────────────────────────────────────

    fn record(&self, key: &str, value: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.latest.insert(key.to_string(), value.to_string());
            pending.dirty.insert(key.to_string());
        }
    }

    fn mark_all_dirty(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            let keys: Vec<String> = pending.latest.keys().cloned().collect();
            pending.dirty.extend(keys);
        }
    }

    fn mark_dirty<'a>(&self, keys: impl IntoIterator<Item = &'a String>) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.dirty.extend(keys.into_iter().cloned());
        }
    }

    fn has_dirty(&self) -> bool {
        self.pending
            .lock()
            .map(|pending| !pending.dirty.is_empty())
            .unwrap_or(false)
    }

    /// Take the latest value of every dirty key.
    fn take_dirty(&self) -> Vec<(String, String)> {
        let Ok(mut pending) = self.pending.lock() else {
            return Vec::new();
        };
        let dirty = std::mem::take(&mut pending.dirty);
        dirty
            .into_iter()
            .filter_map(|key| pending.latest.get(&key).cloned().map(|value| (key, value)))
            .collect()
    }

    // ── Writer ──────────────────────────────────────────────────

    fn ensure_writer(self: &Arc<Self>) {
        if !self.writer_started.swap(true, Ordering::SeqCst) {
            tokio::spawn(Arc::clone(self).run_writer());
        }
    }

    async fn connect(&self) -> ControlResult<ConnectionManager> {
        match tokio::time::timeout(self.io_timeout, ConnectionManager::new(self.client.clone()))
            .await
        {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(ControlError::Connection(e.to_string())),
            Err(_) => Err(ControlError::Connection(format!(
                "timed out after {}s",
                self.io_timeout.as_secs_f32()
            ))),
        }
    }

    async fn set(&self, conn: &mut ConnectionManager, key: &str, value: &str) -> ControlResult<()> {
        let publish_err = |reason: String| ControlError::Publish {
            key: key.to_string(),
            reason,
        };
        match tokio::time::timeout(self.io_timeout, conn.set::<_, _, ()>(key, value)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(publish_err(e.to_string())),
            Err(_) => Err(publish_err("timed out".to_string())),
        }
    }

    /// Deliver dirty keys until the handle is gone, reconnecting as needed.
    async fn run_writer(self: Arc<Self>) {
        let mut conn: Option<ConnectionManager> = None;

        loop {
            if !self.has_dirty() {
                self.wake.notified().await;
                continue;
            }

            let Some(mut current) = conn.clone() else {
                match self.connect().await {
                    Ok(fresh) => {
                        debug!("control plane writer connected");
                        self.mark_all_dirty();
                        conn = Some(fresh);
                    }
                    Err(e) => {
                        warn!(
                            error = %e,
                            delay_secs = self.retry_delay.as_secs(),
                            "control plane unreachable, publish deferred"
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                continue;
            };

            let batch = self.take_dirty();
            for (i, (key, value)) in batch.iter().enumerate() {
                if let Err(e) = self.set(&mut current, key, value).await {
                    warn!(%key, error = %e, "failed to publish to control plane, retrying");
                    self.mark_dirty(batch[i..].iter().map(|(key, _)| key));
                    conn = None;
                    tokio::time::sleep(self.retry_delay).await;
                    break;
                }
            }
        }
    }

    // ── Subscriber ──────────────────────────────────────────────

    /// Subscriber loop: connect, subscribe, forward, repeat on disconnect.
    async fn run_subscriber(self: Arc<Self>, channel: String, tx: mpsc::Sender<CommandEnvelope>) {
        let mut attempt: u64 = 0;

        loop {
            match tokio::time::timeout(self.io_timeout, self.client.get_async_pubsub()).await {
                Ok(Ok(mut pubsub)) => match pubsub.subscribe(&channel).await {
                    Ok(()) => {
                        attempt = 0;
                        info!(%channel, "subscribed to control channel, waiting for commands");
                        self.mark_all_dirty();
                        self.ensure_writer();
                        self.wake.notify_one();

                        let mut messages = pin!(pubsub.on_message());
                        loop {
                            tokio::select! {
                                msg = messages.next() => match msg {
                                    Some(msg) => match msg.get_payload::<String>() {
                                        Ok(payload) => {
                                            if let Some(cmd) = decode_logged(&payload) {
                                                if tx.send(cmd).await.is_err() {
                                                    return;
                                                }
                                            }
                                        }
                                        Err(e) => {
                                            warn!(%channel, error = %e, "undecodable message payload, dropping");
                                        }
                                    },
                                    None => {
                                        warn!(%channel, "control plane connection lost");
                                        break;
                                    }
                                },
                                _ = tx.closed() => {
                                    debug!(%channel, "command stream dropped, unsubscribing");
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => warn!(%channel, error = %e, "failed to subscribe to control channel"),
                },
                Ok(Err(e)) => warn!(error = %e, "could not connect to control plane"),
                Err(_) => warn!(
                    timeout_secs = self.io_timeout.as_secs(),
                    "control plane connection timed out"
                ),
            }

            if tx.is_closed() {
                return;
            }

            attempt += 1;
            info!(
                attempt,
                delay_secs = self.retry_delay.as_secs(),
                "control plane connection retry scheduled"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.retry_delay) => {}
                _ = tx.closed() => return,
            }
        }
    }
}

#[async_trait]
impl ControlPlane for RedisControlPlane {
    /// Record `value` and hand it to the writer; never waits on the network.
    async fn publish(&self, key: &str, value: &str) -> ControlResult<()> {
        self.inner.record(key, value);
        self.inner.ensure_writer();
        self.inner.wake.notify_one();
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> ControlResult<CommandStream> {
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        tokio::spawn(Arc::clone(&self.inner).run_subscriber(channel.to_string(), tx));
        Ok(rx)
    }
}
