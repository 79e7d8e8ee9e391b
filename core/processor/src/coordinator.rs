/* Licensed to the Apache Software Foundation (ASF) under one
 * or more contributor license agreements.  See the NOTICE file
 * distributed with this work for additional information
 * regarding copyright ownership.  The ASF licenses this file
 * to you under the Apache License, Version 2.0 (the
 * "License"); you may not use this file except in compliance
 * with the License.  You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing,
 * software distributed under the License is distributed on an
 * "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
 * KIND, either express or implied.  See the License for the
 * specific language governing permissions and limitations
 * under the License.
 */

use crate::lease::PartitionLease;
use dashmap::DashMap;
use eventhub_common::PartitionId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lease state changes reported by the [`LeaseCoordinator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseEvent {
    Acquired(PartitionId),
    Lost(PartitionId),
    Released(PartitionId),
}

#[derive(Debug)]
struct ManagedLease {
    lease: Arc<PartitionLease>,
    cancellation: CancellationToken,
    task: JoinHandle<()>,
}

/// Keeps a set of partition leases acquired and renewed.
///
/// Each managed lease gets its own task. Acquisition is attempted at once
/// and then once per lease duration until it succeeds; a held lease is
/// renewed every quarter of the duration. When a renewal fails and at most
/// one renewal period of the tracked expiry is left, the lease would expire
/// before the next tick: it is considered lost and re-acquired two renewal
/// periods later.
#[derive(Debug)]
pub struct LeaseCoordinator {
    lease_duration: Duration,
    events: mpsc::UnboundedSender<LeaseEvent>,
    managed: DashMap<PartitionId, ManagedLease>,
}

impl LeaseCoordinator {
    pub fn new(lease_duration: Duration) -> (Self, mpsc::UnboundedReceiver<LeaseEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let coordinator = Self {
            lease_duration,
            events,
            managed: DashMap::new(),
        };
        (coordinator, receiver)
    }

    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    pub fn renewal_period(&self) -> Duration {
        self.lease_duration / 4
    }

    pub fn is_managed(&self, partition_id: &PartitionId) -> bool {
        self.managed.contains_key(partition_id)
    }

    pub fn managed_partitions(&self) -> Vec<PartitionId> {
        self.managed.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn manage(&self, lease: Arc<PartitionLease>) {
        let partition_id = lease.partition_id().clone();
        if self.is_managed(&partition_id) {
            warn!("Lease for partition {partition_id} is already managed");
            return;
        }

        debug!("Managing lease for partition {partition_id}");
        self.drive(lease, Instant::now());
    }

    /// Gives a held lease back to the store without leaving the competition:
    /// acquisition is attempted again one lease duration later, so that other
    /// hosts get the first chance. No event is emitted.
    pub async fn relinquish(&self, partition_id: &PartitionId) {
        let Some((_, managed)) = self.managed.remove(partition_id) else {
            return;
        };
        managed.cancellation.cancel();
        if let Err(error) = managed.task.await {
            warn!("Lease task for partition {partition_id} ended abnormally: {error}");
        }

        if managed.lease.lease_id().await.is_some() {
            match managed.lease.release().await {
                Ok(()) => info!("Relinquished lease for partition {partition_id}"),
                Err(error) => {
                    warn!("Failed to relinquish lease for partition {partition_id}: {error}")
                }
            }
        }
        self.drive(managed.lease, Instant::now() + self.lease_duration);
    }

    fn drive(&self, lease: Arc<PartitionLease>, first_attempt: Instant) {
        let cancellation = CancellationToken::new();
        let task = tokio::spawn(drive_lease(
            lease.clone(),
            self.lease_duration,
            first_attempt,
            self.events.clone(),
            cancellation.clone(),
        ));
        self.managed.insert(
            lease.partition_id().clone(),
            ManagedLease {
                lease,
                cancellation,
                task,
            },
        );
    }

    /// Stops driving the lease and releases it best-effort. `Released` is
    /// emitted whether or not the release succeeded.
    pub async fn unmanage(&self, partition_id: &PartitionId) {
        let Some((_, managed)) = self.managed.remove(partition_id) else {
            return;
        };
        managed.cancellation.cancel();
        if let Err(error) = managed.task.await {
            warn!("Lease task for partition {partition_id} ended abnormally: {error}");
        }

        if managed.lease.lease_id().await.is_some() {
            match managed.lease.release().await {
                Ok(()) => info!("Released lease for partition {partition_id}"),
                Err(error) => warn!("Failed to release lease for partition {partition_id}: {error}"),
            }
        }
        let _ = self.events.send(LeaseEvent::Released(partition_id.clone()));
    }

    pub async fn unmanage_all(&self) {
        for partition_id in self.managed_partitions() {
            self.unmanage(&partition_id).await;
        }
    }
}

async fn drive_lease(
    lease: Arc<PartitionLease>,
    duration: Duration,
    first_attempt: Instant,
    events: mpsc::UnboundedSender<LeaseEvent>,
    cancellation: CancellationToken,
) {
    let partition_id = lease.partition_id().clone();
    let renewal_period = duration / 4;
    let mut next_attempt = first_attempt;

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => return,
            _ = sleep_until(next_attempt) => {}
        }
        if let Err(error) = lease.acquire(duration).await {
            debug!("Could not acquire lease for partition {partition_id}: {error}");
            next_attempt = Instant::now() + duration;
            continue;
        }
        info!("Acquired lease for partition {partition_id}");
        let _ = events.send(LeaseEvent::Acquired(partition_id.clone()));

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => return,
                _ = sleep(renewal_period) => {}
            }
            let Err(error) = lease.renew(duration).await else {
                continue;
            };

            let now = Instant::now();
            let expires_at = lease.expires_at().await;
            if expires_at.is_none_or(|expires_at| expires_at <= now + renewal_period) {
                warn!("Lost lease for partition {partition_id}, last renewal failed: {error}");
                lease.mark_lost();
                let _ = events.send(LeaseEvent::Lost(partition_id.clone()));
                next_attempt = now + renewal_period * 2;
                break;
            }
            warn!(
                "Failed to renew lease for partition {partition_id}, retrying on the next tick: {error}"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::{LeaseStore, MemoryLeaseStore};

    const DURATION: Duration = Duration::from_secs(20);

    #[tokio::test(start_paused = true)]
    async fn should_acquire_immediately_and_keep_renewing() {
        let store = Arc::new(MemoryLeaseStore::new());
        let (coordinator, mut events) = LeaseCoordinator::new(DURATION);
        coordinator.manage(Arc::new(PartitionLease::new("0", "leases", store.clone())));

        assert_eq!(
            events.recv().await,
            Some(LeaseEvent::Acquired(PartitionId::from("0")))
        );
        tokio::time::sleep(DURATION).await;

        assert!(store.renew_calls() >= 3);
        assert!(store.lease_holder("leases/0").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn should_retry_acquisition_once_per_lease_duration() {
        let store = Arc::new(MemoryLeaseStore::new());
        store.create_if_not_exists("leases/0").await.unwrap();
        store.acquire("leases/0", DURATION * 3, "other-host").await.unwrap();
        let (coordinator, _events) = LeaseCoordinator::new(DURATION);
        coordinator.manage(Arc::new(PartitionLease::new("0", "leases", store.clone())));

        tokio::time::sleep(DURATION * 2 + Duration::from_secs(1)).await;

        assert_eq!(store.acquire_calls(), 1 + 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unmanage_should_release_and_report() {
        let store = Arc::new(MemoryLeaseStore::new());
        let (coordinator, mut events) = LeaseCoordinator::new(DURATION);
        let partition_id = PartitionId::from("0");
        coordinator.manage(Arc::new(PartitionLease::new("0", "leases", store.clone())));
        assert_eq!(
            events.recv().await,
            Some(LeaseEvent::Acquired(partition_id.clone()))
        );

        coordinator.unmanage(&partition_id).await;

        assert_eq!(events.recv().await, Some(LeaseEvent::Released(partition_id.clone())));
        assert!(!coordinator.is_managed(&partition_id));
        assert_eq!(store.lease_holder("leases/0"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn relinquished_lease_should_be_released_and_competed_for_again() {
        let store = Arc::new(MemoryLeaseStore::new());
        let (coordinator, mut events) = LeaseCoordinator::new(DURATION);
        let partition_id = PartitionId::from("0");
        coordinator.manage(Arc::new(PartitionLease::new("0", "leases", store.clone())));
        assert_eq!(
            events.recv().await,
            Some(LeaseEvent::Acquired(partition_id.clone()))
        );
        let relinquished_at = Instant::now();

        coordinator.relinquish(&partition_id).await;

        assert_eq!(store.lease_holder("leases/0"), None);
        assert!(coordinator.is_managed(&partition_id));
        assert_eq!(
            events.recv().await,
            Some(LeaseEvent::Acquired(partition_id.clone()))
        );
        assert!(Instant::now() - relinquished_at >= DURATION);
        assert!(store.lease_holder("leases/0").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn unmanage_should_report_release_for_never_acquired_leases() {
        let store = Arc::new(MemoryLeaseStore::new());
        store.set_fail_acquisitions(true);
        let (coordinator, mut events) = LeaseCoordinator::new(DURATION);
        let partition_id = PartitionId::from("0");
        coordinator.manage(Arc::new(PartitionLease::new("0", "leases", store)));
        tokio::time::sleep(Duration::from_secs(1)).await;

        coordinator.unmanage(&partition_id).await;

        assert_eq!(events.recv().await, Some(LeaseEvent::Released(partition_id)));
    }
}
