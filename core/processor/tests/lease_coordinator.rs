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

mod common;

use async_trait::async_trait;
use eventhub::prelude::*;
use eventhub_processor::{
    LeaseCoordinator, LeaseEvent, LeaseStore, MemoryLeaseStore, PartitionLease,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const LEASE_DURATION: Duration = Duration::from_secs(20);
const RENEWAL_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Acquire,
    Renew,
}

/// Wraps the memory store and timestamps every acquire and renew.
#[derive(Debug, Default)]
struct RecordingStore {
    inner: MemoryLeaseStore,
    calls: Mutex<Vec<(Call, Instant)>>,
}

impl RecordingStore {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push((call, Instant::now()));
    }

    fn calls_between(&self, call: Call, from: Instant, to: Instant) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(recorded, at)| *recorded == call && *at > from && *at < to)
            .count()
    }
}

#[async_trait]
impl LeaseStore for RecordingStore {
    async fn create_if_not_exists(&self, resource: &str) -> Result<(), EventHubError> {
        self.inner.create_if_not_exists(resource).await
    }

    async fn acquire(
        &self,
        resource: &str,
        duration: Duration,
        proposed_lease_id: &str,
    ) -> Result<String, EventHubError> {
        self.record(Call::Acquire);
        self.inner.acquire(resource, duration, proposed_lease_id).await
    }

    async fn renew(
        &self,
        resource: &str,
        lease_id: &str,
        duration: Duration,
    ) -> Result<(), EventHubError> {
        self.record(Call::Renew);
        self.inner.renew(resource, lease_id, duration).await
    }

    async fn release(&self, resource: &str, lease_id: &str) -> Result<(), EventHubError> {
        self.inner.release(resource, lease_id).await
    }

    async fn set_content(
        &self,
        resource: &str,
        lease_id: &str,
        content: &str,
    ) -> Result<(), EventHubError> {
        self.inner.set_content(resource, lease_id, content).await
    }

    async fn get_content(&self, resource: &str) -> Result<String, EventHubError> {
        self.inner.get_content(resource).await
    }
}

#[tokio::test(start_paused = true)]
async fn lease_should_be_lost_while_one_renewal_period_is_left() {
    common::init_tracing();
    let store = Arc::new(RecordingStore::default());
    let (coordinator, mut events) = LeaseCoordinator::new(LEASE_DURATION);
    assert_eq!(coordinator.renewal_period(), RENEWAL_PERIOD);
    let lease = Arc::new(PartitionLease::new("0", "leases", store.clone()));
    let partition_id = PartitionId::from("0");

    coordinator.manage(lease.clone());
    assert_eq!(
        events.recv().await,
        Some(LeaseEvent::Acquired(partition_id.clone()))
    );
    let acquired_at = Instant::now();
    store.inner.set_fail_renewals(true);

    assert_eq!(
        events.recv().await,
        Some(LeaseEvent::Lost(partition_id.clone()))
    );
    let lost_at = Instant::now();
    assert!(!lease.is_held_locally());
    let expires_at = lease.expires_at().await.unwrap();
    assert_eq!(expires_at, acquired_at + LEASE_DURATION);
    assert!(expires_at <= lost_at + RENEWAL_PERIOD);
    // Declared before the lease runs out on the store.
    assert!(expires_at > lost_at);
    // Failures with headroom were retried on later ticks.
    assert!(store.calls_between(Call::Renew, acquired_at, lost_at + Duration::from_millis(1)) >= 3);

    store.inner.set_fail_renewals(false);
    assert_eq!(
        events.recv().await,
        Some(LeaseEvent::Acquired(partition_id.clone()))
    );
    let reacquired_at = Instant::now();

    assert!(reacquired_at - lost_at >= RENEWAL_PERIOD * 2);
    assert_eq!(store.calls_between(Call::Renew, lost_at, reacquired_at), 0);
    assert!(lease.is_held_locally());
    coordinator.unmanage_all().await;
}

#[tokio::test(start_paused = true)]
async fn single_renewal_failure_with_headroom_should_keep_the_lease() {
    common::init_tracing();
    let store = Arc::new(RecordingStore::default());
    let (coordinator, mut events) = LeaseCoordinator::new(LEASE_DURATION);
    let lease = Arc::new(PartitionLease::new("0", "leases", store.clone()));
    coordinator.manage(lease.clone());
    assert!(matches!(events.recv().await, Some(LeaseEvent::Acquired(_))));

    store.inner.set_fail_renewals(true);
    tokio::time::sleep(RENEWAL_PERIOD + Duration::from_millis(10)).await;
    store.inner.set_fail_renewals(false);
    tokio::time::sleep(RENEWAL_PERIOD * 4).await;

    assert!(lease.is_held_locally());
    assert!(events.try_recv().is_err());
    coordinator.unmanage_all().await;
    assert!(matches!(events.recv().await, Some(LeaseEvent::Released(_))));
}

#[tokio::test(start_paused = true)]
async fn lease_taken_over_after_expiry_should_stay_lost() {
    common::init_tracing();
    let store = Arc::new(MemoryLeaseStore::new());
    let (coordinator, mut events) = LeaseCoordinator::new(LEASE_DURATION);
    let lease = Arc::new(PartitionLease::new("0", "leases", store.clone()));
    coordinator.manage(lease.clone());
    assert!(matches!(events.recv().await, Some(LeaseEvent::Acquired(_))));

    store.set_fail_renewals(true);
    tokio::time::sleep(LEASE_DURATION + Duration::from_millis(10)).await;
    store.acquire("leases/0", LEASE_DURATION * 10, "intruder").await.unwrap();
    store.set_fail_renewals(false);

    assert!(matches!(events.recv().await, Some(LeaseEvent::Lost(_))));
    tokio::time::sleep(LEASE_DURATION * 2).await;
    assert!(!lease.is_held_locally());
    assert_eq!(store.lease_holder("leases/0").as_deref(), Some("intruder"));
    coordinator.unmanage_all().await;
}
