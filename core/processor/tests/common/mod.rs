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

use async_trait::async_trait;
use eventhub::prelude::*;
use eventhub_processor::{CloseReason, EventProcessor, PartitionContext, ProcessorHostConfig};
use eventhub_simulator::EventHubSimulator;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{Instant, interval};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_test_writer()
        .try_init();
}

pub fn client(simulator: &EventHubSimulator) -> Arc<EventHubClient> {
    Arc::new(
        EventHubClient::from_connection_string(
            &simulator.connection_string(),
            None,
            simulator.connector(),
        )
        .expect("client should be created"),
    )
}

pub fn host_config(host_name: &str) -> ProcessorHostConfig {
    ProcessorHostConfig {
        lease_duration: EventHubDuration::from_secs(4),
        receive_wait: EventHubDuration::from_millis(100),
        receive_batch_size: 10,
        ..ProcessorHostConfig::new(host_name)
    }
}

/// Polls `condition` until it returns true, or panics after `timeout`.
#[allow(dead_code)]
pub async fn eventually<F>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    let mut ticker = interval(Duration::from_millis(20));
    loop {
        ticker.tick().await;
        if condition() {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "eventually: condition not met within {timeout:?}"
        );
    }
}

/// Records every callback; optionally checkpoints after each event.
#[derive(Debug, Default)]
pub struct RecordingProcessor {
    checkpoint_each_event: bool,
    opened: Mutex<Vec<PartitionId>>,
    closed: Mutex<Vec<(PartitionId, CloseReason)>>,
    events: Mutex<Vec<(PartitionId, String)>>,
    errors: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl RecordingProcessor {
    pub fn checkpointing() -> Self {
        Self {
            checkpoint_each_event: true,
            ..Default::default()
        }
    }

    pub fn opened(&self) -> Vec<PartitionId> {
        self.opened.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<(PartitionId, CloseReason)> {
        self.closed.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<(PartitionId, String)> {
        self.events.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventProcessor for RecordingProcessor {
    async fn on_opened(&self, context: &PartitionContext) -> Result<(), EventHubError> {
        self.opened
            .lock()
            .unwrap()
            .push(context.partition_id().clone());
        Ok(())
    }

    async fn on_message(
        &self,
        context: &PartitionContext,
        event: EventData,
    ) -> Result<(), EventHubError> {
        if self.checkpoint_each_event {
            context.checkpoint_from_event(&event).await?;
        }
        let body = String::from_utf8_lossy(event.body()).into_owned();
        self.events
            .lock()
            .unwrap()
            .push((context.partition_id().clone(), body));
        Ok(())
    }

    async fn on_closed(
        &self,
        context: &PartitionContext,
        reason: CloseReason,
    ) -> Result<(), EventHubError> {
        self.closed
            .lock()
            .unwrap()
            .push((context.partition_id().clone(), reason));
        Ok(())
    }

    async fn on_error(&self, _context: &PartitionContext, error: &EventHubError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}
