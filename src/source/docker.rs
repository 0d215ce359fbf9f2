//! Docker Engine client
//!
//! Thin adapter from `bollard` to the log source and catalog traits: inspect
//! to check the container runs, follow its logs, list running containers.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions, LogOutput, LogsOptions};
use bollard::models::ContainerSummary;
use bollard::{ClientVersion, Docker, API_DEFAULT_VERSION};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tracing::{debug, instrument};

use super::decode::LineSplitter;
use super::{LogSource, LogStream, WorkloadCatalog};
use crate::config::{DockerConfig, DockerEndpoint};
use crate::error::{Result, TailError};
use crate::models::{LogLine, WorkloadId, WorkloadSummary};

impl From<ContainerSummary> for WorkloadSummary {
    fn from(container: ContainerSummary) -> Self {
        let name = container
            .names
            .as_ref()
            .and_then(|names| names.first())
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default();
        Self {
            id: container.id.unwrap_or_default(),
            name,
            image: container.image.unwrap_or_default(),
            status: container.state.unwrap_or_default(),
        }
    }
}

/// Docker Engine API client
#[derive(Debug, Clone)]
pub struct DockerClient {
    docker: Docker,
    log_tail: String,
}

impl DockerClient {
    /// Build a client for the configured endpoint
    ///
    /// Nothing is dialed yet; an unreachable daemon shows up on first use.
    pub fn new(config: DockerConfig) -> Result<Self> {
        let timeout = config.request_timeout.as_secs().max(1);
        let version = client_version(config.api_version.as_deref())?;

        let docker = match &config.endpoint {
            #[cfg(unix)]
            DockerEndpoint::Unix(path) => {
                Docker::connect_with_unix(&path.to_string_lossy(), timeout, &version)?
            }
            #[cfg(not(unix))]
            DockerEndpoint::Unix(path) => {
                return Err(TailError::InvalidConfig(format!(
                    "unix sockets are not supported on this platform: {}",
                    path.display()
                )))
            }
            DockerEndpoint::Tcp(addr) => {
                Docker::connect_with_http(&format!("http://{}", addr), timeout, &version)?
            }
        };

        Ok(Self {
            docker,
            log_tail: config.log_tail,
        })
    }
}

#[async_trait]
impl LogSource for DockerClient {
    #[instrument(skip(self), fields(workload = %workload))]
    async fn open(&self, workload: &WorkloadId) -> Result<LogStream> {
        let inspect = self
            .docker
            .inspect_container(workload.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(|e| workload_error(e, workload))?;

        let running = inspect
            .state
            .as_ref()
            .and_then(|state| state.running)
            .unwrap_or(false);
        if !running {
            return Err(TailError::WorkloadNotFound(workload.to_string()));
        }

        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            tail: self.log_tail.clone(),
            ..Default::default()
        };
        let chunks = self.docker.logs(workload.as_str(), Some(options)).boxed();
        debug!("Log stream opened");

        Ok(follow_lines(chunks, workload.clone()))
    }
}

#[async_trait]
impl WorkloadCatalog for DockerClient {
    #[instrument(skip(self))]
    async fn list_running(&self) -> Result<Vec<WorkloadSummary>> {
        let mut filters = HashMap::new();
        filters.insert("status".to_string(), vec!["running".to_string()]);

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: false,
                filters,
                ..Default::default()
            }))
            .await?;
        Ok(containers.into_iter().map(WorkloadSummary::from).collect())
    }
}

/// Parse "1.43" into a client version; unset means the client default
fn client_version(raw: Option<&str>) -> Result<ClientVersion> {
    let Some(raw) = raw else {
        return Ok(API_DEFAULT_VERSION.clone());
    };

    let invalid =
        || TailError::InvalidConfig(format!("DOCKER_API_VERSION must look like 1.43: {}", raw));
    let (major, minor) = raw.split_once('.').ok_or_else(invalid)?;
    Ok(ClientVersion {
        major_version: major.parse().map_err(|_| invalid())?,
        minor_version: minor.parse().map_err(|_| invalid())?,
    })
}

/// Map a Docker error for a request about `workload`; 404 means it is gone
fn workload_error(err: bollard::errors::Error, workload: &WorkloadId) -> TailError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => TailError::WorkloadNotFound(workload.to_string()),
        other => other.into(),
    }
}

type Chunks = BoxStream<'static, std::result::Result<LogOutput, bollard::errors::Error>>;

struct FollowState {
    chunks: Chunks,
    splitter: LineSplitter,
    pending: VecDeque<LogLine>,
    workload: WorkloadId,
    done: bool,
}

/// Turn the client's chunk stream into a line stream
fn follow_lines(chunks: Chunks, workload: WorkloadId) -> LogStream {
    let state = FollowState {
        chunks,
        splitter: LineSplitter::new(),
        pending: VecDeque::new(),
        workload,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.pending.pop_front() {
                return Some((Ok(line), state));
            }
            if state.done {
                return None;
            }
            match state.chunks.next().await {
                Some(Ok(output)) => {
                    let lines = state.splitter.feed(output);
                    state.pending.extend(lines);
                }
                Some(Err(e)) => {
                    state.done = true;
                    let err = match workload_error(e, &state.workload) {
                        TailError::WorkloadNotFound(id) => TailError::WorkloadNotFound(id),
                        other => TailError::Source(format!("log stream read failed: {}", other)),
                    };
                    return Some((Err(err), state));
                }
                None => {
                    state.done = true;
                    let rest = state.splitter.finish();
                    state.pending.extend(rest);
                }
            }
        }
    })
    .boxed()
}
