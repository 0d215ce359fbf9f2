//! In-memory log source for pipeline tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{Result, TailError};
use crate::models::{LogLine, WorkloadId};
use crate::source::{LogSource, LogStream};

pub(crate) type Feed = mpsc::UnboundedSender<Result<LogLine>>;

/// Source whose workloads are fed by the test
///
/// Each `feed` call registers one stream for the next `open` of that
/// workload; unregistered workloads open as not found. Dropping the feed ends
/// the stream.
#[derive(Default)]
pub(crate) struct ScriptedSource {
    streams: Mutex<HashMap<String, mpsc::UnboundedReceiver<Result<LogLine>>>>,
    opens: AtomicUsize,
}

impl ScriptedSource {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn feed(&self, workload: &str) -> Feed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.lock().insert(workload.to_string(), rx);
        tx
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogSource for ScriptedSource {
    async fn open(&self, workload: &WorkloadId) -> Result<LogStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        // Let concurrent openers pile up if single-flight is broken.
        tokio::task::yield_now().await;
        match self.streams.lock().remove(workload.as_str()) {
            Some(rx) => Ok(UnboundedReceiverStream::new(rx).boxed()),
            None => Err(TailError::WorkloadNotFound(workload.to_string())),
        }
    }
}

pub(crate) fn texts(lines: &[LogLine]) -> Vec<String> {
    lines.iter().map(|l| l.to_string()).collect()
}

/// Poll `cond` until it holds, failing the test after two seconds
pub(crate) async fn wait_until(mut cond: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached in time");
}
