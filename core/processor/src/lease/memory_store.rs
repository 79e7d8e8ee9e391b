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

use crate::lease::LeaseStore;
use async_trait::async_trait;
use dashmap::DashMap;
use eventhub_common::EventHubError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Default)]
struct Blob {
    content: String,
    lease: Option<ActiveLease>,
}

#[derive(Debug, Clone)]
struct ActiveLease {
    id: String,
    expires_at: Instant,
}

impl Blob {
    /// The lease currently in force, if any.
    fn holder(&self, now: Instant) -> Option<&ActiveLease> {
        self.lease.as_ref().filter(|lease| lease.expires_at > now)
    }

    fn check_holder(
        &self,
        resource: &str,
        lease_id: &str,
        now: Instant,
    ) -> Result<(), EventHubError> {
        match self.holder(now) {
            Some(lease) if lease.id == lease_id => Ok(()),
            Some(lease) => Err(EventHubError::LeaseConflict(format!(
                "{resource} is leased by {}",
                lease.id
            ))),
            None => Err(EventHubError::LeaseLost(format!(
                "{resource} has no active lease {lease_id}"
            ))),
        }
    }
}

/// A [`LeaseStore`] kept in process memory. Expiry follows the tokio clock,
/// so paused-time tests control it. Failures can be injected for renew and
/// acquire calls.
#[derive(Debug, Default)]
pub struct MemoryLeaseStore {
    blobs: DashMap<String, Blob>,
    fail_renewals: AtomicBool,
    fail_acquisitions: AtomicBool,
    acquire_calls: AtomicUsize,
    renew_calls: AtomicUsize,
    content_writes: AtomicUsize,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `renew` fail until reset.
    pub fn set_fail_renewals(&self, fail: bool) {
        self.fail_renewals.store(fail, Ordering::SeqCst);
    }

    /// Makes every following `acquire` fail until reset.
    pub fn set_fail_acquisitions(&self, fail: bool) {
        self.fail_acquisitions.store(fail, Ordering::SeqCst);
    }

    pub fn acquire_calls(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }

    pub fn renew_calls(&self) -> usize {
        self.renew_calls.load(Ordering::SeqCst)
    }

    pub fn content_writes(&self) -> usize {
        self.content_writes.load(Ordering::SeqCst)
    }

    /// Id of the unexpired lease on `resource`.
    pub fn lease_holder(&self, resource: &str) -> Option<String> {
        let now = Instant::now();
        self.blobs
            .get(resource)
            .and_then(|blob| blob.holder(now).map(|lease| lease.id.clone()))
    }

    pub fn content(&self, resource: &str) -> Option<String> {
        self.blobs.get(resource).map(|blob| blob.content.clone())
    }
}

fn missing(resource: &str) -> EventHubError {
    EventHubError::Store(format!("lease resource {resource} does not exist"))
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn create_if_not_exists(&self, resource: &str) -> Result<(), EventHubError> {
        self.blobs.entry(resource.to_owned()).or_default();
        Ok(())
    }

    async fn acquire(
        &self,
        resource: &str,
        duration: Duration,
        proposed_lease_id: &str,
    ) -> Result<String, EventHubError> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_acquisitions.load(Ordering::SeqCst) {
            return Err(EventHubError::Store(format!(
                "acquire of {resource} failed"
            )));
        }

        let now = Instant::now();
        let mut blob = self.blobs.get_mut(resource).ok_or_else(|| missing(resource))?;
        if let Some(lease) = blob.holder(now)
            && lease.id != proposed_lease_id
        {
            return Err(EventHubError::LeaseConflict(format!(
                "{resource} is leased by {}",
                lease.id
            )));
        }
        blob.lease = Some(ActiveLease {
            id: proposed_lease_id.to_owned(),
            expires_at: now + duration,
        });
        trace!("Lease {proposed_lease_id} acquired on {resource}");
        Ok(proposed_lease_id.to_owned())
    }

    async fn renew(
        &self,
        resource: &str,
        lease_id: &str,
        duration: Duration,
    ) -> Result<(), EventHubError> {
        self.renew_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_renewals.load(Ordering::SeqCst) {
            return Err(EventHubError::Store(format!("renew of {resource} failed")));
        }

        let now = Instant::now();
        let mut blob = self.blobs.get_mut(resource).ok_or_else(|| missing(resource))?;
        // An expired lease can be renewed by its holder until someone else
        // acquires the resource.
        if let Some(lease) = blob.lease.as_mut()
            && lease.id == lease_id
        {
            lease.expires_at = now + duration;
            return Ok(());
        }
        blob.check_holder(resource, lease_id, now)
    }

    async fn release(&self, resource: &str, lease_id: &str) -> Result<(), EventHubError> {
        let now = Instant::now();
        let mut blob = self.blobs.get_mut(resource).ok_or_else(|| missing(resource))?;
        if blob.lease.as_ref().is_some_and(|lease| lease.id == lease_id) {
            blob.lease = None;
            return Ok(());
        }
        blob.check_holder(resource, lease_id, now)
    }

    async fn set_content(
        &self,
        resource: &str,
        lease_id: &str,
        content: &str,
    ) -> Result<(), EventHubError> {
        let now = Instant::now();
        let mut blob = self.blobs.get_mut(resource).ok_or_else(|| missing(resource))?;
        blob.check_holder(resource, lease_id, now)?;
        blob.content = content.to_owned();
        self.content_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_content(&self, resource: &str) -> Result<String, EventHubError> {
        self.content(resource).ok_or_else(|| missing(resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESOURCE: &str = "leases/0";
    const DURATION: Duration = Duration::from_secs(30);

    async fn store_with_resource() -> MemoryLeaseStore {
        let store = MemoryLeaseStore::new();
        store.create_if_not_exists(RESOURCE).await.unwrap();
        store
    }

    #[tokio::test]
    async fn should_reject_acquire_while_another_lease_is_active() {
        let store = store_with_resource().await;
        store.acquire(RESOURCE, DURATION, "a").await.unwrap();

        let result = store.acquire(RESOURCE, DURATION, "b").await;

        assert!(matches!(result, Err(EventHubError::LeaseConflict(_))));
        assert_eq!(store.lease_holder(RESOURCE).as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn should_allow_takeover_after_expiry() {
        let store = store_with_resource().await;
        store.acquire(RESOURCE, DURATION, "a").await.unwrap();
        tokio::time::advance(DURATION + Duration::from_millis(1)).await;

        store.acquire(RESOURCE, DURATION, "b").await.unwrap();

        assert_eq!(store.lease_holder(RESOURCE).as_deref(), Some("b"));
        let renew = store.renew(RESOURCE, "a", DURATION).await;
        assert!(matches!(renew, Err(EventHubError::LeaseConflict(_))));
    }

    #[tokio::test]
    async fn should_write_content_only_under_the_active_lease() {
        let store = store_with_resource().await;
        store.acquire(RESOURCE, DURATION, "a").await.unwrap();

        store.set_content(RESOURCE, "a", "{}").await.unwrap();
        let foreign = store.set_content(RESOURCE, "b", "{\"x\":1}").await;

        assert!(matches!(foreign, Err(EventHubError::LeaseConflict(_))));
        assert_eq!(store.get_content(RESOURCE).await.unwrap(), "{}");
        assert_eq!(store.content_writes(), 1);
    }

    #[tokio::test]
    async fn create_should_not_reset_existing_content() {
        let store = store_with_resource().await;
        store.acquire(RESOURCE, DURATION, "a").await.unwrap();
        store.set_content(RESOURCE, "a", "kept").await.unwrap();

        store.create_if_not_exists(RESOURCE).await.unwrap();

        assert_eq!(store.content(RESOURCE).as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn injected_failures_should_surface_as_store_errors() {
        let store = store_with_resource().await;
        store.acquire(RESOURCE, DURATION, "a").await.unwrap();
        store.set_fail_renewals(true);

        let result = store.renew(RESOURCE, "a", DURATION).await;

        assert!(matches!(result, Err(EventHubError::Store(_))));
        assert_eq!(store.renew_calls(), 1);
    }
}
