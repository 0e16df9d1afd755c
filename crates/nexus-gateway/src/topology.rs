//! Topology cache: operation-name map and live service set.
//!
//! Both views are built together from one discovery pass and published as a
//! single [`TopologySnapshot`] through an [`ArcSwap`], so readers always see
//! the operation map and the service set of the *same* refresh cycle.
//!
//! ```text
//! discovery ──► try_refresh() ──► TopologySnapshot ──store──► ArcSwap
//!                                                               │ load
//!                                   resolve(op) / is_active ◄───┘
//! ```

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use nexus_kernel::gateway::{DiscoveryClient, DiscoveryError};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Immutable view of the topology as of one refresh cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TopologySnapshot {
    /// Operation name to lower-cased service id.
    pub operations: HashMap<String, String>,
    /// Lower-cased ids of every discovered service.
    pub active_services: BTreeSet<String>,
    /// `None` until the first successful refresh.
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Shared topology state, owned by the gateway and handed to the routing engine.
pub struct TopologyCache {
    discovery: Arc<dyn DiscoveryClient>,
    metadata_key: String,
    snapshot: ArcSwap<TopologySnapshot>,
    initial_load: OnceCell<()>,
    refresh_lock: Mutex<()>,
    refresh_pending: AtomicBool,
}

impl TopologyCache {
    pub fn new(discovery: Arc<dyn DiscoveryClient>, metadata_key: impl Into<String>) -> Self {
        Self {
            discovery,
            metadata_key: metadata_key.into(),
            snapshot: ArcSwap::from_pointee(TopologySnapshot::default()),
            initial_load: OnceCell::new(),
            refresh_lock: Mutex::new(()),
            refresh_pending: AtomicBool::new(false),
        }
    }

    /// Current snapshot.  Never waits on a refresh in progress.
    pub fn snapshot(&self) -> Arc<TopologySnapshot> {
        self.snapshot.load_full()
    }

    /// Service id owning `operation`, if advertised.
    pub fn resolve(&self, operation: &str) -> Option<String> {
        self.snapshot.load().operations.get(operation).cloned()
    }

    /// `true` if `service_id` was discovered in the current cycle.
    pub fn is_active(&self, service_id: &str) -> bool {
        self.snapshot
            .load()
            .active_services
            .contains(&service_id.to_lowercase())
    }

    /// Query discovery and publish a new snapshot.
    ///
    /// On any discovery error the previous snapshot stays in place and the
    /// error is returned.  Refreshes are serialized so an older pass can
    /// never overwrite a newer one.
    pub async fn try_refresh(&self) -> Result<(), DiscoveryError> {
        let _guard = self.refresh_lock.lock().await;

        let service_ids = self.discovery.services().await?;
        let per_service = try_join_all(
            service_ids
                .iter()
                .map(|id| self.discovery.instances(id)),
        )
        .await?;

        let mut next = TopologySnapshot {
            refreshed_at: Some(Utc::now()),
            ..TopologySnapshot::default()
        };
        for (service_id, instances) in service_ids.iter().zip(per_service) {
            next.active_services.insert(service_id.to_lowercase());
            for instance in instances {
                let owner = instance.normalized_id();
                next.active_services.insert(owner.clone());
                for op in instance.advertised_operations(&self.metadata_key) {
                    if let Some(previous) = next.operations.insert(op.clone(), owner.clone()) {
                        if previous != owner {
                            warn!(
                                operation = %op,
                                previous = %previous,
                                current = %owner,
                                "operation advertised by several services, last one wins"
                            );
                        }
                    }
                }
            }
        }

        info!(
            services = next.active_services.len(),
            operations = next.operations.len(),
            "topology refreshed"
        );
        self.snapshot.store(Arc::new(next));
        Ok(())
    }

    /// [`try_refresh`](Self::try_refresh) with the error logged instead of returned.
    pub async fn refresh(&self) -> bool {
        match self.try_refresh().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "topology refresh failed, keeping previous snapshot");
                false
            }
        }
    }

    /// Resolve once the first refresh has completed.
    ///
    /// The first caller runs the refresh; concurrent callers await the same
    /// result.  A failed first refresh still completes initialization with
    /// an empty snapshot.
    pub async fn ensure_initialized(&self) {
        self.initial_load
            .get_or_init(|| async {
                self.refresh().await;
            })
            .await;
    }

    /// `true` once [`ensure_initialized`](Self::ensure_initialized) has completed.
    pub fn is_initialized(&self) -> bool {
        self.initial_load.initialized()
    }

    /// Start a background refresh without waiting for it.
    ///
    /// Triggers arriving while one is already pending are coalesced.
    pub fn trigger_refresh(self: &Arc<Self>) {
        if self
            .refresh_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("topology refresh already pending");
            return;
        }
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            cache.refresh().await;
            cache.refresh_pending.store(false, Ordering::Release);
        });
    }

    /// Run the initial load, then refresh every `interval` until `shutdown`.
    ///
    /// Failed cycles are logged and the schedule continues.
    pub fn spawn_refresh_loop(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = cache.ensure_initialized() => {}
            }

            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("topology refresher stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        cache.refresh().await;
                    }
                }
            }
        })
    }
}
