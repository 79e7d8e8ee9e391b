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

use crate::partition_context::PartitionContext;
use async_trait::async_trait;
use eventhub::EventData;
use eventhub_common::EventHubError;
use std::fmt::{Display, Formatter};

/// Why a partition stopped being processed by this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The lease could not be renewed in time.
    LeaseLost,
    /// The host is stopping and gave the partition up.
    Shutdown,
}

impl Display for CloseReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::LeaseLost => write!(f, "lease lost"),
            CloseReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Callbacks invoked by the processor host. Events of one partition are
/// delivered in order, one at a time; partitions run concurrently.
#[async_trait]
pub trait EventProcessor: Send + Sync {
    async fn on_opened(&self, _context: &PartitionContext) -> Result<(), EventHubError> {
        Ok(())
    }

    async fn on_message(
        &self,
        context: &PartitionContext,
        event: EventData,
    ) -> Result<(), EventHubError>;

    async fn on_closed(
        &self,
        _context: &PartitionContext,
        _reason: CloseReason,
    ) -> Result<(), EventHubError> {
        Ok(())
    }

    async fn on_error(&self, _context: &PartitionContext, _error: &EventHubError) {}
}
