//! One viewer's attachment to a workload's log stream

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::debug;

use super::hub::{Hub, SubscriberId};
use super::registry::Registry;
use crate::models::{LogLine, WorkloadId};

/// How a session finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The viewer disconnected or could no longer be written to
    ViewerGone,
    /// The workload's log stream ended
    StreamEnded,
    /// The viewer fell too far behind and was dropped
    Evicted,
}

/// A viewer subscribed to one hub
///
/// Replays the buffered history, then relays live lines. Dropping the session
/// unsubscribes it, so every exit path (including cancellation) deregisters.
pub struct Session {
    hub: Arc<Hub>,
    id: SubscriberId,
    backlog: Vec<LogLine>,
    live: mpsc::Receiver<LogLine>,
    evicted: Arc<AtomicBool>,
    send_timeout: Duration,
}

impl Session {
    pub fn attach(registry: &Registry, workload: &WorkloadId) -> Self {
        let (hub, subscription) = registry.subscribe(workload);
        Self {
            hub,
            id: subscription.id,
            backlog: subscription.snapshot,
            live: subscription.receiver,
            evicted: subscription.evicted,
            send_timeout: registry.config().send_timeout,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn workload(&self) -> &WorkloadId {
        self.hub.workload()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Forward history then live lines to `viewer` until the stream ends or
    /// the viewer goes away
    ///
    /// `inbound` is only watched for liveness: its items are ignored and its
    /// end means the viewer disconnected.
    pub async fn run<Tx, Rx>(mut self, mut viewer: Tx, mut inbound: Rx) -> SessionEnd
    where
        Tx: Sink<String> + Unpin,
        Rx: Stream + Unpin,
    {
        for line in std::mem::take(&mut self.backlog) {
            if let Err(end) = self.send(&mut viewer, line).await {
                return end;
            }
        }

        loop {
            tokio::select! {
                frame = inbound.next() => {
                    if frame.is_none() {
                        debug!(subscriber = %self.id, "Viewer closed");
                        return SessionEnd::ViewerGone;
                    }
                }
                line = self.live.recv() => match line {
                    Some(line) => {
                        if let Err(end) = self.send(&mut viewer, line).await {
                            return end;
                        }
                    }
                    None if self.evicted.load(Ordering::Acquire) => {
                        debug!(subscriber = %self.id, "Dropped by hub for lagging");
                        return SessionEnd::Evicted;
                    }
                    None => return SessionEnd::StreamEnded,
                },
            }
        }
    }

    async fn send<Tx>(&self, viewer: &mut Tx, line: LogLine) -> Result<(), SessionEnd>
    where
        Tx: Sink<String> + Unpin,
    {
        match timeout(self.send_timeout, viewer.send(line.text.to_string())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SessionEnd::ViewerGone),
            Err(_) => {
                debug!(subscriber = %self.id, "Viewer write timed out");
                Err(SessionEnd::Evicted)
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}
