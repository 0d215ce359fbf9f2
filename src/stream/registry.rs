//! Process-wide map from workload to hub
//!
//! Created once at startup and shared through the API state. Creation is
//! single-flight through the map's entry lock, and subscribing happens under
//! the same lock so the idle sweeper can never reap a hub between lookup and
//! subscribe.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, instrument};

use super::hub::{Hub, HubStats, Subscription};
use crate::config::StreamConfig;
use crate::models::WorkloadId;
use crate::source::LogSource;

pub struct Registry {
    hubs: DashMap<WorkloadId, Arc<Hub>>,
    source: Arc<dyn LogSource>,
    config: StreamConfig,
}

impl Registry {
    pub fn new(source: Arc<dyn LogSource>, config: StreamConfig) -> Self {
        Self {
            hubs: DashMap::new(),
            source,
            config,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    fn new_hub(&self, workload: &WorkloadId) -> Arc<Hub> {
        debug!(workload = %workload, "Creating hub");
        Arc::new(Hub::new(
            workload.clone(),
            Arc::clone(&self.source),
            self.config,
        ))
    }

    /// Look up the workload's hub, creating it on first use
    ///
    /// The hub's reader is not started here; `subscribe` does that.
    pub fn get_or_create(&self, workload: &WorkloadId) -> Arc<Hub> {
        self.hubs
            .entry(workload.clone())
            .or_insert_with(|| self.new_hub(workload))
            .clone()
    }

    pub fn get(&self, workload: &WorkloadId) -> Option<Arc<Hub>> {
        self.hubs.get(workload).map(|hub| hub.clone())
    }

    /// Attach a new subscriber to the workload's hub, starting its reader
    ///
    /// A hub that ended on a missing workload or a failed source is replaced
    /// so a reconnecting viewer gets a fresh attempt; one that ended normally
    /// is reused until its retention runs out.
    pub fn subscribe(&self, workload: &WorkloadId) -> (Arc<Hub>, Subscription) {
        let mut entry = self
            .hubs
            .entry(workload.clone())
            .or_insert_with(|| self.new_hub(workload));

        if entry.is_replaceable(Instant::now(), self.config.idle_timeout) {
            let fresh = self.new_hub(workload);
            let stale = std::mem::replace(entry.value_mut(), fresh);
            // Already ended, so there is no reader left to join.
            let _ = stale.shutdown();
        }

        let hub = entry.value().clone();
        let subscription = hub.subscribe();
        hub.ensure_started();
        (hub, subscription)
    }

    /// Drop hubs that have had no subscribers (or have ended) for longer than
    /// the idle timeout, stopping and joining their readers
    pub async fn reap_idle(&self, now: Instant) -> usize {
        let mut reaped = Vec::new();
        self.hubs.retain(|_, hub| {
            if hub.is_reapable(now, self.config.idle_timeout) {
                reaped.push(Arc::clone(hub));
                false
            } else {
                true
            }
        });

        let count = reaped.len();
        for hub in reaped {
            debug!(workload = %hub.workload(), "Reaping idle hub");
            if let Some(reader) = hub.shutdown() {
                let _ = reader.await;
            }
        }
        count
    }

    /// Periodically reap idle hubs until shutdown
    #[instrument(skip(self, shutdown))]
    pub async fn run_sweeper(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting hub sweeper (idle timeout: {}s)",
            self.config.idle_timeout.as_secs()
        );

        let mut sweep_interval = interval(self.config.sweep_interval);
        sweep_interval.tick().await; // Skip immediate tick

        loop {
            tokio::select! {
                _ = sweep_interval.tick() => {
                    let reaped = self.reap_idle(Instant::now()).await;
                    if reaped > 0 {
                        info!("Reaped {} idle hubs, {} remaining", reaped, self.hubs.len());
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Hub sweeper shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Stop every reader and empty the map
    pub async fn shutdown(&self) {
        let workloads: Vec<WorkloadId> = self.hubs.iter().map(|e| e.key().clone()).collect();
        let mut readers = Vec::new();
        for workload in workloads {
            if let Some((_, hub)) = self.hubs.remove(&workload) {
                readers.extend(hub.shutdown());
            }
        }

        info!("Stopping {} log readers", readers.len());
        for reader in readers {
            let _ = reader.await;
        }
    }

    pub fn stats(&self) -> Vec<HubStats> {
        let mut stats: Vec<HubStats> = self.hubs.iter().map(|e| e.value().stats()).collect();
        stats.sort_by(|a, b| a.workload.cmp(&b.workload));
        stats
    }

    pub fn len(&self) -> usize {
        self.hubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hubs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::hub::{EndReason, HubStatus};
    use crate::stream::testing::{wait_until, ScriptedSource};
    use std::time::Duration;

    fn id(raw: &str) -> WorkloadId {
        WorkloadId::new(raw).unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_hub() {
        let registry = Registry::new(ScriptedSource::new(), StreamConfig::default());
        let a = registry.get_or_create(&id("abc"));
        let b = registry.get_or_create(&id("abc"));
        let other = registry.get_or_create(&id("def"));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(registry.len(), 2);
        assert_eq!(a.status(), HubStatus::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_subscribers_open_source_once() {
        let source = ScriptedSource::new();
        let feed = source.feed("abc");
        let registry = Arc::new(Registry::new(source.clone(), StreamConfig::default()));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move { registry.subscribe(&id("abc")) }));
        }
        let mut attached = Vec::new();
        for task in tasks {
            attached.push(task.await.unwrap());
        }

        feed.send(Ok("hello".into())).unwrap();
        for (_, subscription) in attached.iter_mut() {
            let line = subscription.receiver.recv().await.unwrap();
            assert_eq!(line.as_str(), "hello");
        }

        let first = &attached[0].0;
        assert!(attached.iter().all(|(hub, _)| Arc::ptr_eq(hub, first)));
        assert_eq!(source.opens(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(first.subscriber_count(), 16);
    }

    #[tokio::test]
    async fn test_reap_skips_hubs_with_subscribers() {
        let source = ScriptedSource::new();
        let _feed = source.feed("abc");
        let registry = Registry::new(source, StreamConfig::default());
        let later = Instant::now() + Duration::from_secs(61);

        let (hub, subscription) = registry.subscribe(&id("abc"));
        assert_eq!(registry.reap_idle(later).await, 0);

        hub.unsubscribe(subscription.id);
        assert_eq!(registry.reap_idle(Instant::now()).await, 0);
        assert_eq!(registry.reap_idle(later).await, 1);

        assert!(registry.is_empty());
        assert_eq!(hub.status(), HubStatus::Ended(EndReason::Shutdown));
    }

    #[tokio::test]
    async fn test_ended_hub_is_kept_warm_then_reaped() {
        let source = ScriptedSource::new();
        let feed = source.feed("abc");
        let registry = Registry::new(source.clone(), StreamConfig::default());

        let (hub, _subscription) = registry.subscribe(&id("abc"));
        feed.send(Ok("a".into())).unwrap();
        drop(feed);
        wait_until(|| hub.is_ended()).await;

        // Within retention the same hub (and buffer) is handed out again.
        let (again, late) = registry.subscribe(&id("abc"));
        assert!(Arc::ptr_eq(&hub, &again));
        assert_eq!(late.snapshot.len(), 1);
        assert_eq!(source.opens(), 1);

        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(registry.reap_idle(later).await, 1);
        assert!(registry.get(&id("abc")).is_none());
    }

    #[tokio::test]
    async fn test_failed_hub_is_replaced_on_next_subscribe() {
        let source = ScriptedSource::new();
        let registry = Registry::new(source.clone(), StreamConfig::default());

        let (missing, _) = registry.subscribe(&id("abc"));
        wait_until(|| missing.is_ended()).await;
        assert_eq!(missing.status(), HubStatus::Ended(EndReason::NotFound));

        let feed = source.feed("abc");
        let (fresh, mut subscription) = registry.subscribe(&id("abc"));
        assert!(!Arc::ptr_eq(&missing, &fresh));

        feed.send(Ok("back".into())).unwrap();
        assert_eq!(subscription.receiver.recv().await.unwrap().as_str(), "back");
        assert_eq!(source.opens(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_joins_all_readers() {
        let source = ScriptedSource::new();
        let _abc = source.feed("abc");
        let _def = source.feed("def");
        let registry = Registry::new(source, StreamConfig::default());

        let (abc, mut abc_sub) = registry.subscribe(&id("abc"));
        let (def, _) = registry.subscribe(&id("def"));

        registry.shutdown().await;

        assert!(registry.is_empty());
        assert_eq!(abc.status(), HubStatus::Ended(EndReason::Shutdown));
        assert_eq!(def.status(), HubStatus::Ended(EndReason::Shutdown));
        assert!(abc_sub.receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown_signal() {
        let registry = Arc::new(Registry::new(ScriptedSource::new(), StreamConfig::default()));
        let (tx, rx) = watch::channel(false);

        let sweeper = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.run_sweeper(rx).await })
        };
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), sweeper)
            .await
            .expect("sweeper should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_stats_sorted_by_workload() {
        let registry = Registry::new(ScriptedSource::new(), StreamConfig::default());
        registry.get_or_create(&id("zeta"));
        registry.get_or_create(&id("alpha"));

        let names: Vec<String> = registry
            .stats()
            .into_iter()
            .map(|s| s.workload.to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
