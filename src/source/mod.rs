//! Workload log sources
//!
//! A source turns a workload id into a live, ordered stream of log lines.
//! The stream is not restartable; call `open` again to resume.

pub mod decode;
pub mod docker;

pub use decode::{LineSplitter, OutputStream};
pub use docker::DockerClient;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::models::{LogLine, WorkloadId, WorkloadSummary};

/// Live line stream of one workload
///
/// Ends when the workload stops. An `Err` item is terminal.
pub type LogStream = BoxStream<'static, Result<LogLine>>;

/// Produces live log streams for workloads
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Open the workload's log stream at the live edge
    ///
    /// Fails with `WorkloadNotFound` if the workload is absent or stopped.
    async fn open(&self, workload: &WorkloadId) -> Result<LogStream>;
}

/// Read-only view of the workloads currently running
#[async_trait]
pub trait WorkloadCatalog: Send + Sync {
    async fn list_running(&self) -> Result<Vec<WorkloadSummary>>;
}
