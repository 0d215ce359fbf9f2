//! Per-workload broadcast hub
//!
//! One reader task pulls lines from the source, appends them to the replay
//! buffer and offers them to every subscriber's bounded queue. Append and
//! delivery happen under the same lock that `subscribe` takes, so a new
//! subscriber's snapshot and its live feed meet exactly: nothing is skipped,
//! nothing is delivered twice.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::buffer::ReplayBuffer;
use crate::config::StreamConfig;
use crate::models::{LogLine, WorkloadId};
use crate::source::LogSource;

pub type SubscriberId = Uuid;

/// Why a hub's reader stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The workload's log stream ended (workload stopped)
    SourceFinished,
    /// The workload did not exist or was not running
    NotFound,
    /// Transport or decoding failure while reading
    SourceFailed,
    /// Torn down by the registry
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum HubStatus {
    Idle,
    Running,
    Ended(EndReason),
}

/// Outcome of offering one line to one subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Queue full: the subscriber is not keeping up
    Lagging,
    /// Receiver dropped: the session is gone
    Disconnected,
}

struct Subscriber {
    tx: mpsc::Sender<LogLine>,
    evicted: Arc<AtomicBool>,
}

impl Subscriber {
    fn deliver(&self, line: &LogLine) -> Delivery {
        match self.tx.try_send(line.clone()) {
            Ok(()) => Delivery::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Lagging,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Disconnected,
        }
    }
}

/// Attachment handed to a new subscriber
pub struct Subscription {
    pub id: SubscriberId,
    /// Buffered history at the moment of subscribing, oldest first
    pub snapshot: Vec<LogLine>,
    /// Live lines appended after the snapshot; closes when the hub ends or
    /// drops this subscriber
    pub receiver: mpsc::Receiver<LogLine>,
    /// Set before the receiver closes if the subscriber was dropped for
    /// lagging
    pub evicted: Arc<AtomicBool>,
}

impl Subscription {
    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub workload: WorkloadId,
    pub status: HubStatus,
    pub subscribers: usize,
    pub buffered: usize,
    pub capacity: usize,
    pub last_seq: u64,
}

struct HubState {
    buffer: ReplayBuffer,
    subscribers: HashMap<SubscriberId, Subscriber>,
    status: HubStatus,
    last_seq: u64,
    /// Set while there are no subscribers, and when the hub ends
    idle_since: Option<Instant>,
}

impl HubState {
    fn mark_idle_if_empty(&mut self) {
        if self.subscribers.is_empty() && self.idle_since.is_none() {
            self.idle_since = Some(Instant::now());
        }
    }
}

#[derive(Default)]
struct ReaderSlot {
    started: bool,
    handle: Option<JoinHandle<()>>,
}

/// Fan-out point for one workload
pub struct Hub {
    workload: WorkloadId,
    config: StreamConfig,
    source: Arc<dyn LogSource>,
    state: Mutex<HubState>,
    reader: Mutex<ReaderSlot>,
    shutdown_tx: watch::Sender<bool>,
}

impl Hub {
    pub fn new(workload: WorkloadId, source: Arc<dyn LogSource>, config: StreamConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            workload,
            config,
            source,
            state: Mutex::new(HubState {
                buffer: ReplayBuffer::new(config.buffer_capacity),
                subscribers: HashMap::new(),
                status: HubStatus::Idle,
                last_seq: 0,
                idle_since: Some(Instant::now()),
            }),
            reader: Mutex::new(ReaderSlot::default()),
            shutdown_tx,
        }
    }

    pub fn workload(&self) -> &WorkloadId {
        &self.workload
    }

    pub fn status(&self) -> HubStatus {
        self.state.lock().status
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.status(), HubStatus::Ended(_))
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Start the reader task unless one was already started
    ///
    /// A hub runs at most one reader over its lifetime.
    pub fn ensure_started(self: &Arc<Self>) {
        let mut reader = self.reader.lock();
        if reader.started {
            return;
        }
        reader.started = true;
        self.state.lock().status = HubStatus::Running;

        let hub = Arc::clone(self);
        let shutdown = self.shutdown_tx.subscribe();
        reader.handle = Some(tokio::spawn(async move {
            hub.read_loop(shutdown).await;
        }));
    }

    /// Register a subscriber and return the history it should replay first
    pub fn subscribe(&self) -> Subscription {
        let (tx, receiver) = mpsc::channel(self.config.subscriber_queue);
        let id = Uuid::new_v4();
        let evicted = Arc::new(AtomicBool::new(false));

        let mut state = self.state.lock();
        let snapshot = state.buffer.snapshot();
        if matches!(state.status, HubStatus::Ended(_)) {
            // Dropping tx closes the receiver right after the snapshot.
            debug!(workload = %self.workload, subscriber = %id, "Subscribed to ended hub");
        } else {
            state.subscribers.insert(
                id,
                Subscriber {
                    tx,
                    evicted: Arc::clone(&evicted),
                },
            );
            state.idle_since = None;
            debug!(
                workload = %self.workload,
                subscriber = %id,
                subscribers = state.subscribers.len(),
                "Subscriber added"
            );
        }

        Subscription {
            id,
            snapshot,
            receiver,
            evicted,
        }
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut state = self.state.lock();
        if state.subscribers.remove(&id).is_some() {
            debug!(
                workload = %self.workload,
                subscriber = %id,
                subscribers = state.subscribers.len(),
                "Subscriber removed"
            );
        }
        state.mark_idle_if_empty();
    }

    /// Whether the registry may drop this hub
    pub fn is_reapable(&self, now: Instant, idle_timeout: Duration) -> bool {
        let state = self.state.lock();
        state.subscribers.is_empty()
            && state
                .idle_since
                .is_some_and(|since| now.saturating_duration_since(since) >= idle_timeout)
    }

    /// Whether a new subscriber should get a fresh hub instead of this one
    pub fn is_replaceable(&self, now: Instant, idle_timeout: Duration) -> bool {
        match self.status() {
            HubStatus::Ended(EndReason::NotFound | EndReason::SourceFailed) => true,
            HubStatus::Ended(_) => self.is_reapable(now, idle_timeout),
            HubStatus::Idle | HubStatus::Running => false,
        }
    }

    /// Signal the reader to stop and hand back its task for joining
    pub fn shutdown(&self) -> Option<JoinHandle<()>> {
        self.shutdown_tx.send_replace(true);
        let mut reader = self.reader.lock();
        if !reader.started {
            reader.started = true;
            self.finish(EndReason::Shutdown);
        }
        reader.handle.take()
    }

    pub fn stats(&self) -> HubStats {
        let state = self.state.lock();
        HubStats {
            workload: self.workload.clone(),
            status: state.status,
            subscribers: state.subscribers.len(),
            buffered: state.buffer.len(),
            capacity: state.buffer.capacity(),
            last_seq: state.last_seq,
        }
    }

    #[instrument(skip(self, shutdown), fields(workload = %self.workload))]
    async fn read_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("Starting log reader");
        let reason = self.pump(&mut shutdown).await;
        self.finish(reason);
    }

    async fn pump(&self, shutdown: &mut watch::Receiver<bool>) -> EndReason {
        if *shutdown.borrow() {
            return EndReason::Shutdown;
        }

        let opened = tokio::select! {
            opened = self.source.open(&self.workload) => opened,
            _ = shutdown.changed() => return EndReason::Shutdown,
        };

        let mut lines = match opened {
            Ok(lines) => lines,
            Err(e) if e.is_not_found() => {
                debug!("Workload not running, nothing to stream");
                return EndReason::NotFound;
            }
            Err(e) => {
                error!("Failed to open log stream: {}", e);
                return EndReason::SourceFailed;
            }
        };

        loop {
            tokio::select! {
                _ = shutdown.changed() => return EndReason::Shutdown,
                next = lines.next() => match next {
                    Some(Ok(line)) => self.publish(line),
                    Some(Err(e)) if e.is_not_found() => {
                        debug!("Workload went away mid-stream");
                        return EndReason::NotFound;
                    }
                    Some(Err(e)) => {
                        warn!("Log stream failed: {}", e);
                        return EndReason::SourceFailed;
                    }
                    None => return EndReason::SourceFinished,
                },
            }
        }
    }

    /// Append one line and offer it to every subscriber
    fn publish(&self, line: LogLine) {
        let mut state = self.state.lock();
        state.last_seq += 1;
        let line = line.with_seq(state.last_seq);
        state.buffer.append(line.clone());

        let workload = &self.workload;
        state.subscribers.retain(|id, subscriber| match subscriber.deliver(&line) {
            Delivery::Delivered => true,
            Delivery::Lagging => {
                warn!(workload = %workload, subscriber = %id, "Subscriber queue full, disconnecting");
                subscriber.evicted.store(true, Ordering::Release);
                false
            }
            Delivery::Disconnected => {
                debug!(workload = %workload, subscriber = %id, "Subscriber gone");
                false
            }
        });
        state.mark_idle_if_empty();
    }

    fn finish(&self, reason: EndReason) {
        let mut state = self.state.lock();
        state.status = HubStatus::Ended(reason);
        let released = state.subscribers.len();
        state.subscribers.clear();
        state.idle_since = Some(Instant::now());
        info!(
            workload = %self.workload,
            ?reason,
            released,
            buffered = state.buffer.len(),
            "Log reader stopped"
        );
    }
}
