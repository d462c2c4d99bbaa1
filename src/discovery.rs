//! The periodic discovery loop.
//!
//! One task owns the loop. Each cycle enumerates the live instances, maps
//! them to target groups, diffs the produced sources against the snapshot
//! of the previous successful cycle, and hands the full batch (live groups
//! plus tombstones for sources that disappeared) to the sink channel as one
//! unit. A failed listing increments the failure counter and skips the
//! cycle without touching the snapshot, so the published document simply
//! goes stale until the next successful cycle.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::ecs::Instance;
use crate::metrics::Metrics;
use crate::target::{TargetBuilder, TargetGroup};

/// The one capability the loop needs from the inventory side.
pub trait InstanceLister {
    fn list_instances(&self) -> impl Future<Output = crate::ecs::Result<Vec<Instance>>> + Send;
}

pub struct Discoverer<C> {
    client: C,
    builder: TargetBuilder,
    metrics: Metrics,
    refresh: Duration,
    /// Sources published by the most recent successful cycle. Replaced
    /// wholesale after each successful cycle, untouched by failed ones.
    last: HashSet<String>,
}

impl<C> Discoverer<C>
where
    C: InstanceLister + Sync,
{
    pub fn new(client: C, builder: TargetBuilder, metrics: Metrics, refresh: Duration) -> Self {
        Self {
            client,
            builder,
            metrics,
            refresh,
            last: HashSet::default(),
        }
    }

    /// Runs one discovery cycle.
    ///
    /// Returns the full batch to emit, or `None` if the listing failed and
    /// the cycle is skipped.
    async fn refresh(&mut self) -> Option<Vec<TargetGroup>> {
        let start = Instant::now();
        let result = self.client.list_instances().await;
        self.metrics
            .request_duration
            .observe(start.elapsed().as_secs_f64());

        let instances = match result {
            Ok(instances) => instances,
            Err(err) => {
                self.metrics.request_failures.inc();
                log::warn!("instance listing failed, skipping cycle: {err}");
                return None;
            }
        };
        log::debug!("listed {} instances", instances.len());

        let mut groups = Vec::with_capacity(instances.len());
        let mut current = HashSet::with_capacity(instances.len());
        for instance in &instances {
            let group = self.builder.build(instance);
            log::debug!("instance present: source={}", group.source);
            current.insert(group.source.clone());
            groups.push(group);
        }

        // Tombstones for sources that were published last cycle but are
        // gone now.
        for source in &self.last {
            if !current.contains(source) {
                log::debug!("instance removed: source={source}");
                groups.push(TargetGroup::tombstone(source.clone()));
            }
        }
        self.last = current;

        Some(groups)
    }

    /// Drives the loop until shutdown.
    ///
    /// Waits on whichever comes first: the refresh tick (the first tick
    /// fires immediately, so a cycle runs at startup) or the shutdown
    /// signal. A signal arriving mid-cycle takes effect once the cycle
    /// finishes; ticks missed during a long cycle collapse into one.
    pub async fn run(
        mut self,
        tx: mpsc::Sender<Vec<TargetGroup>>,
        mut shutdown: watch::Receiver<()>,
    ) {
        let mut interval = tokio::time::interval(self.refresh);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Some(batch) = self.refresh().await {
                        if tx.send(batch).await.is_err() {
                            log::error!("target writer is gone, stopping discovery");
                            return;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    log::info!("shutdown signal received, stopping discovery");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::ecs::model::{IpAddressList, VpcAttributes};

    struct QueuedLister {
        responses: Mutex<VecDeque<crate::ecs::Result<Vec<Instance>>>>,
    }

    impl QueuedLister {
        fn new(responses: Vec<crate::ecs::Result<Vec<Instance>>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    impl InstanceLister for QueuedLister {
        async fn list_instances(&self) -> crate::ecs::Result<Vec<Instance>> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected extra listing call")
        }
    }

    fn instance(id: &str) -> Instance {
        Instance {
            instance_id: id.to_owned(),
            status: "Running".to_owned(),
            vpc_attributes: VpcAttributes {
                vpc_id: "vpc-1".to_owned(),
                private_ip_address: IpAddressList {
                    ip_address: vec!["10.0.0.1".to_owned()],
                },
            },
            ..Instance::default()
        }
    }

    fn api_error() -> crate::ecs::Error {
        crate::ecs::Error::Api {
            status: 500,
            code: "InternalError".to_owned(),
            message: "boom".to_owned(),
            request_id: String::new(),
        }
    }

    fn discoverer(
        responses: Vec<crate::ecs::Result<Vec<Instance>>>,
    ) -> Discoverer<QueuedLister> {
        Discoverer::new(
            QueuedLister::new(responses),
            TargetBuilder::new(9100),
            Metrics::new().unwrap(),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_removed_instance_becomes_tombstone() {
        let mut discoverer = discoverer(vec![
            Ok(vec![instance("i-1"), instance("i-2")]),
            Ok(vec![instance("i-1")]),
        ]);

        let first = discoverer.refresh().await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|g| !g.is_tombstone()));

        let second = discoverer.refresh().await.unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].source, "ecs/i-1");
        assert!(!second[0].is_tombstone());
        assert_eq!(second[1].source, "ecs/i-2");
        assert!(second[1].is_tombstone());

        assert_eq!(discoverer.last, HashSet::from(["ecs/i-1".to_owned()]));
    }

    #[tokio::test]
    async fn test_no_spurious_tombstones() {
        let mut discoverer = discoverer(vec![
            Ok(vec![instance("i-1")]),
            Ok(vec![instance("i-1"), instance("i-2")]),
        ]);

        discoverer.refresh().await.unwrap();
        let second = discoverer.refresh().await.unwrap();
        assert_eq!(second.len(), 2);
        assert!(second.iter().all(|g| !g.is_tombstone()));
    }

    #[tokio::test]
    async fn test_failed_cycle_leaves_snapshot_and_counts_failure() {
        let mut discoverer = discoverer(vec![
            Ok(vec![instance("i-1"), instance("i-2")]),
            Err(api_error()),
            Ok(vec![instance("i-1")]),
        ]);

        discoverer.refresh().await.unwrap();
        let snapshot = discoverer.last.clone();

        assert!(discoverer.refresh().await.is_none());
        assert_eq!(discoverer.last, snapshot);
        assert_eq!(discoverer.metrics.request_failures.get(), 1);

        // The next successful cycle diffs against the last successful one.
        let batch = discoverer.refresh().await.unwrap();
        let tombstones: Vec<_> = batch.iter().filter(|g| g.is_tombstone()).collect();
        assert_eq!(tombstones.len(), 1);
        assert_eq!(tombstones[0].source, "ecs/i-2");
    }

    #[tokio::test]
    async fn test_first_cycle_emits_no_tombstones() {
        let mut discoverer = discoverer(vec![Ok(vec![instance("i-1")])]);
        let batch = discoverer.refresh().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert!(!batch[0].is_tombstone());
    }

    #[tokio::test]
    async fn test_all_instances_gone_emits_only_tombstones() {
        let mut discoverer = discoverer(vec![
            Ok(vec![instance("i-1"), instance("i-2")]),
            Ok(Vec::new()),
        ]);

        discoverer.refresh().await.unwrap();
        let batch = discoverer.refresh().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|g| g.is_tombstone()));
        assert!(discoverer.last.is_empty());
    }

    #[tokio::test]
    async fn test_latency_is_observed_on_success_and_failure() {
        let mut discoverer = discoverer(vec![Ok(Vec::new()), Err(api_error())]);
        discoverer.refresh().await;
        discoverer.refresh().await;
        assert_eq!(discoverer.metrics.request_duration.get_sample_count(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_after_current_cycle() {
        let discoverer = discoverer(vec![Ok(vec![instance("i-1")])]);
        let (tx, mut rx) = mpsc::channel(10);
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let handle = tokio::spawn(discoverer.run(tx, shutdown_rx));

        // The first tick fires immediately, so one batch arrives.
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.len(), 1);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
