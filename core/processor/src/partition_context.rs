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
use eventhub::EventData;
use eventhub_common::{CheckpointInfo, EventHubError, PartitionId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Pairs a partition lease with the in-memory checkpoint of the current
/// acquisition.
#[derive(Debug)]
pub struct PartitionContext {
    owner: String,
    lease: Arc<PartitionLease>,
    checkpoint: Mutex<CheckpointInfo>,
}

impl PartitionContext {
    pub fn new(lease: Arc<PartitionLease>, owner: impl Into<String>) -> Self {
        let checkpoint = CheckpointInfo::new(lease.partition_id());
        Self {
            owner: owner.into(),
            lease,
            checkpoint: Mutex::new(checkpoint),
        }
    }

    pub fn partition_id(&self) -> &PartitionId {
        self.lease.partition_id()
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn lease(&self) -> &Arc<PartitionLease> {
        &self.lease
    }

    pub async fn checkpoint_info(&self) -> CheckpointInfo {
        self.checkpoint.lock().await.clone()
    }

    /// Reads the checkpoint stored as lease content. Empty content means the
    /// partition was never checkpointed.
    pub async fn load_checkpoint(&self) -> Result<Option<CheckpointInfo>, EventHubError> {
        let content = self.lease.get_content().await?;
        CheckpointInfo::from_json(&content)
    }

    /// Starts a new ownership term: fresh token, next epoch, this host as
    /// owner. The stored position carries over.
    pub async fn begin_acquisition(&self, stored: Option<CheckpointInfo>) -> CheckpointInfo {
        let mut checkpoint =
            stored.unwrap_or_else(|| CheckpointInfo::new(self.partition_id()));
        checkpoint.partition_id = self.partition_id().clone();
        checkpoint.owner = self.owner.clone();
        checkpoint.token = Uuid::now_v7().to_string();
        checkpoint.epoch += 1;

        *self.checkpoint.lock().await = checkpoint.clone();
        checkpoint
    }

    /// Moves the in-memory position to `event`. Nothing is persisted.
    pub async fn update_position(&self, event: &EventData) {
        let (Some(offset), Some(sequence_number)) = (event.offset(), event.sequence_number())
        else {
            warn!(
                "Event on partition {} carries no position, checkpoint unchanged",
                self.partition_id()
            );
            return;
        };
        let mut checkpoint = self.checkpoint.lock().await;
        checkpoint.offset = offset.to_owned();
        checkpoint.sequence_number = sequence_number;
    }

    /// Persists the in-memory position. Fails without touching the store
    /// when this host no longer believes it holds the lease.
    pub async fn checkpoint(&self) -> Result<(), EventHubError> {
        if !self.lease.is_held_locally() {
            return Err(EventHubError::LeaseNotHeld(self.partition_id().to_string()));
        }
        let checkpoint = self.checkpoint.lock().await.clone();
        self.lease.update_content(&checkpoint.to_json()?).await?;
        debug!(
            "Checkpointed partition {} at offset {}, sequence number {}",
            checkpoint.partition_id, checkpoint.offset, checkpoint.sequence_number
        );
        Ok(())
    }

    pub async fn checkpoint_from_event(&self, event: &EventData) -> Result<(), EventHubError> {
        self.update_position(event).await;
        self.checkpoint().await
    }
}
