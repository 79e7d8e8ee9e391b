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
use eventhub_common::{EventHubError, PartitionId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
struct LeaseState {
    lease_id: Option<String>,
    expires_at: Option<Instant>,
}

/// Fencing handle over the store resource of one partition.
///
/// `is_held_locally` is this host's belief, not a guarantee: the
/// coordinator drops it without a store round trip once renewals have been
/// missed for too long.
#[derive(Debug)]
pub struct PartitionLease {
    partition_id: PartitionId,
    resource: String,
    store: Arc<dyn LeaseStore>,
    held: AtomicBool,
    state: Mutex<LeaseState>,
}

impl PartitionLease {
    pub fn new(
        partition_id: impl Into<PartitionId>,
        container: &str,
        store: Arc<dyn LeaseStore>,
    ) -> Self {
        let partition_id = partition_id.into();
        Self {
            resource: format!("{container}/{partition_id}"),
            partition_id,
            store,
            held: AtomicBool::new(false),
            state: Mutex::new(LeaseState::default()),
        }
    }

    pub fn partition_id(&self) -> &PartitionId {
        &self.partition_id
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn is_held_locally(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    pub async fn lease_id(&self) -> Option<String> {
        self.state.lock().await.lease_id.clone()
    }

    pub async fn expires_at(&self) -> Option<Instant> {
        self.state.lock().await.expires_at
    }

    /// Takes the lease, creating the backing resource on first use. A
    /// previously cached lease id is proposed again so the holder can
    /// reclaim its own lease.
    pub async fn acquire(&self, duration: Duration) -> Result<(), EventHubError> {
        self.store.create_if_not_exists(&self.resource).await?;

        let mut state = self.state.lock().await;
        let proposed = state
            .lease_id
            .clone()
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        let requested_at = Instant::now();
        let lease_id = self
            .store
            .acquire(&self.resource, duration, &proposed)
            .await?;

        debug!("Acquired lease {lease_id} on {}", self.resource);
        state.lease_id = Some(lease_id);
        state.expires_at = Some(requested_at + duration);
        self.held.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Extends the lease. The tracked expiry only moves forward, and only
    /// when the store accepted the renewal.
    pub async fn renew(&self, duration: Duration) -> Result<(), EventHubError> {
        let mut state = self.state.lock().await;
        let lease_id = self.cached_lease_id(&state)?;
        let requested_at = Instant::now();
        self.store
            .renew(&self.resource, &lease_id, duration)
            .await?;

        let renewed_until = requested_at + duration;
        state.expires_at = Some(
            state
                .expires_at
                .map_or(renewed_until, |current| current.max(renewed_until)),
        );
        Ok(())
    }

    pub async fn release(&self) -> Result<(), EventHubError> {
        let mut state = self.state.lock().await;
        let lease_id = self.cached_lease_id(&state)?;
        self.held.store(false, Ordering::SeqCst);
        self.store.release(&self.resource, &lease_id).await?;

        debug!("Released lease {lease_id} on {}", self.resource);
        state.lease_id = None;
        state.expires_at = None;
        Ok(())
    }

    pub async fn update_content(&self, content: &str) -> Result<(), EventHubError> {
        let state = self.state.lock().await;
        let lease_id = self.cached_lease_id(&state)?;
        self.store
            .set_content(&self.resource, &lease_id, content)
            .await
    }

    pub async fn get_content(&self) -> Result<String, EventHubError> {
        let state = self.state.lock().await;
        self.cached_lease_id(&state)?;
        self.store.get_content(&self.resource).await
    }

    /// Drops the local belief of holding the lease. The lease id stays cached
    /// for the next acquisition attempt.
    pub(crate) fn mark_lost(&self) {
        self.held.store(false, Ordering::SeqCst);
    }

    fn cached_lease_id(&self, state: &LeaseState) -> Result<String, EventHubError> {
        state
            .lease_id
            .clone()
            .ok_or_else(|| EventHubError::LeaseNotHeld(self.partition_id.to_string()))
    }
}
