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

use crate::config::ProcessorHostConfig;
use crate::coordinator::{LeaseCoordinator, LeaseEvent};
use crate::lease::{LeaseStore, PartitionLease};
use crate::partition_context::PartitionContext;
use crate::processor::{CloseReason, EventProcessor};
use dashmap::DashMap;
use eventhub::{EventHubClient, EventReceiver, ReceiverOptions};
use eventhub_common::{EventHubError, EventPosition, PartitionId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct Running {
    coordinator: Arc<LeaseCoordinator>,
    cancellation: CancellationToken,
    dispatcher: JoinHandle<()>,
}

struct PartitionPump {
    id: Uuid,
    receiver: Arc<EventReceiver>,
    cancellation: CancellationToken,
    task: JoinHandle<()>,
}

/// Distributes the partitions of one consumer group across processor
/// hosts through leases, and runs one receive pump per partition this host
/// holds.
pub struct EventProcessorHost {
    config: ProcessorHostConfig,
    client: Arc<EventHubClient>,
    store: Arc<dyn LeaseStore>,
    processor: Arc<dyn EventProcessor>,
    running: Mutex<Option<Running>>,
    contexts: DashMap<PartitionId, Arc<PartitionContext>>,
    pumps: DashMap<PartitionId, PartitionPump>,
}

impl EventProcessorHost {
    pub fn new(
        config: ProcessorHostConfig,
        client: Arc<EventHubClient>,
        store: Arc<dyn LeaseStore>,
        processor: Arc<dyn EventProcessor>,
    ) -> Result<Arc<Self>, EventHubError> {
        config.validate()?;
        Ok(Arc::new(Self {
            config,
            client,
            store,
            processor,
            running: Mutex::new(None),
            contexts: DashMap::new(),
            pumps: DashMap::new(),
        }))
    }

    pub fn config(&self) -> &ProcessorHostConfig {
        &self.config
    }

    pub fn host_name(&self) -> &str {
        &self.config.host_name
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Partitions this host is currently receiving from.
    pub fn owned_partitions(&self) -> Vec<PartitionId> {
        let mut partitions: Vec<_> = self.pumps.iter().map(|pump| pump.key().clone()).collect();
        partitions.sort();
        partitions
    }

    pub fn partition_context(&self, partition_id: &PartitionId) -> Option<Arc<PartitionContext>> {
        self.contexts
            .get(partition_id)
            .map(|context| context.value().clone())
    }

    pub async fn start(self: &Arc<Self>) -> Result<(), EventHubError> {
        self.start_with_filter(|_| true).await
    }

    /// Competes for the leases of every partition accepted by `filter`.
    pub async fn start_with_filter(
        self: &Arc<Self>,
        filter: impl Fn(&PartitionId) -> bool,
    ) -> Result<(), EventHubError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(EventHubError::InvalidArgument(format!(
                "processor host {} is already running",
                self.config.host_name
            )));
        }

        let partition_ids: Vec<_> = self
            .client
            .get_partition_ids()
            .await?
            .into_iter()
            .filter(|partition_id| filter(partition_id))
            .collect();
        info!(
            "Starting processor host {} for consumer group {} on partitions {partition_ids:?}",
            self.config.host_name, self.config.consumer_group
        );

        let (coordinator, events) =
            LeaseCoordinator::new(self.config.lease_duration.get_duration());
        let coordinator = Arc::new(coordinator);
        for partition_id in partition_ids {
            let lease = Arc::new(PartitionLease::new(
                partition_id.clone(),
                &self.config.lease_container,
                self.store.clone(),
            ));
            let context = Arc::new(PartitionContext::new(
                lease.clone(),
                &self.config.host_name,
            ));
            self.contexts.insert(partition_id, context);
            coordinator.manage(lease);
        }

        let cancellation = CancellationToken::new();
        let dispatcher = tokio::spawn(self.clone().dispatch(
            coordinator.clone(),
            events,
            cancellation.clone(),
        ));
        *running = Some(Running {
            coordinator,
            cancellation,
            dispatcher,
        });
        Ok(())
    }

    /// Closes every pump, checkpointing if configured, then releases every
    /// lease and waits for all of it to finish.
    pub async fn stop(&self) -> Result<(), EventHubError> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };
        info!("Stopping processor host {}", self.config.host_name);

        running.cancellation.cancel();
        if let Err(error) = running.dispatcher.await {
            warn!("Lease event dispatcher ended abnormally: {error}");
        }

        let owned: Vec<_> = self.pumps.iter().map(|pump| pump.key().clone()).collect();
        for partition_id in owned {
            self.close_partition(&partition_id, CloseReason::Shutdown)
                .await;
        }
        running.coordinator.unmanage_all().await;

        self.pumps.clear();
        self.contexts.clear();
        info!("Processor host {} stopped", self.config.host_name);
        Ok(())
    }

    async fn dispatch(
        self: Arc<Self>,
        coordinator: Arc<LeaseCoordinator>,
        mut events: mpsc::UnboundedReceiver<LeaseEvent>,
        cancellation: CancellationToken,
    ) {
        let (stopped, mut stopped_pumps) = mpsc::unbounded_channel();
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => break,
                event = events.recv() => match event {
                    Some(LeaseEvent::Acquired(partition_id)) => {
                        self.open_partition(&partition_id, &coordinator, &stopped)
                            .await
                    }
                    Some(LeaseEvent::Lost(partition_id)) => {
                        self.close_partition(&partition_id, CloseReason::LeaseLost)
                            .await;
                    }
                    Some(LeaseEvent::Released(partition_id)) => {
                        self.close_partition(&partition_id, CloseReason::Shutdown)
                            .await;
                    }
                    None => break,
                },
                Some((partition_id, pump_id)) = stopped_pumps.recv() => {
                    self.abandon_partition(&partition_id, pump_id, &coordinator)
                        .await
                }
            }
        }
        debug!("Lease event dispatcher of {} stopped", self.config.host_name);
    }

    async fn open_partition(
        &self,
        partition_id: &PartitionId,
        coordinator: &LeaseCoordinator,
        stopped: &mpsc::UnboundedSender<(PartitionId, Uuid)>,
    ) {
        let Some(context) = self.partition_context(partition_id) else {
            warn!("Acquired lease for unknown partition {partition_id}");
            return;
        };
        if self.pumps.contains_key(partition_id) {
            return;
        }

        match self.start_pump(&context, stopped).await {
            Ok(pump) => {
                self.pumps.insert(partition_id.clone(), pump);
            }
            Err(error) => {
                error!("Failed to open partition {partition_id}, giving up its lease: {error}");
                self.processor.on_error(&context, &error).await;
                coordinator.relinquish(partition_id).await;
            }
        }
    }

    /// The receiver of an open partition ended on its own, typically taken
    /// over by a higher epoch. The partition is closed and its lease handed
    /// back.
    async fn abandon_partition(
        &self,
        partition_id: &PartitionId,
        pump_id: Uuid,
        coordinator: &LeaseCoordinator,
    ) {
        let current = self
            .pumps
            .get(partition_id)
            .is_some_and(|pump| pump.id == pump_id);
        if !current {
            return;
        }
        warn!(
            "Receiver of partition {partition_id} on host {} stopped, giving up its lease",
            self.config.host_name
        );
        if self
            .close_partition(partition_id, CloseReason::LeaseLost)
            .await
        {
            coordinator.relinquish(partition_id).await;
        }
    }

    async fn start_pump(
        &self,
        context: &Arc<PartitionContext>,
        stopped: &mpsc::UnboundedSender<(PartitionId, Uuid)>,
    ) -> Result<PartitionPump, EventHubError> {
        let partition_id = context.partition_id();
        let stored = context.load_checkpoint().await?;
        let checkpoint = context.begin_acquisition(stored).await;
        // Persisting the new token and epoch fences out the previous owner.
        context.checkpoint().await?;

        let position = if checkpoint.has_position() {
            EventPosition::after_offset(checkpoint.offset.clone())
        } else {
            self.config.initial_position()?
        };
        let receiver = self.client.create_receiver(
            &self.config.consumer_group,
            partition_id,
            ReceiverOptions::new(position).with_epoch(checkpoint.epoch),
        )?;
        let opened = match receiver.init().await {
            Ok(()) => self.processor.on_opened(context).await,
            Err(error) => Err(error),
        };
        if let Err(error) = opened {
            if let Err(close_error) = receiver.close().await {
                warn!("Failed to close receiver of partition {partition_id}: {close_error}");
            }
            return Err(error);
        }
        info!(
            "Opened partition {partition_id} on host {} with epoch {}",
            self.config.host_name, checkpoint.epoch
        );

        let id = Uuid::now_v7();
        let cancellation = CancellationToken::new();
        let stopped = stopped.clone();
        let pumped = context.clone();
        let processor = self.processor.clone();
        let batch_size = self.config.receive_batch_size;
        let wait = self.config.receive_wait.get_duration();
        let pump_receiver = receiver.clone();
        let pump_cancellation = cancellation.clone();
        let task = tokio::spawn(async move {
            let partition_id = pumped.partition_id().clone();
            let ended = pump_events(
                pump_receiver,
                pumped,
                processor,
                batch_size,
                wait,
                pump_cancellation,
            )
            .await;
            if ended == PumpExit::LinkEnded {
                let _ = stopped.send((partition_id, id));
            }
        });
        Ok(PartitionPump {
            id,
            receiver,
            cancellation,
            task,
        })
    }

    /// Returns whether an open partition was closed.
    async fn close_partition(&self, partition_id: &PartitionId, reason: CloseReason) -> bool {
        let Some((_, pump)) = self.pumps.remove(partition_id) else {
            return false;
        };
        let Some(context) = self.partition_context(partition_id) else {
            return false;
        };

        pump.cancellation.cancel();
        if let Err(error) = pump.task.await {
            warn!("Pump of partition {partition_id} ended abnormally: {error}");
        }
        if reason == CloseReason::Shutdown
            && self.config.checkpoint_on_close
            && context.lease().is_held_locally()
            && let Err(error) = context.checkpoint().await
        {
            warn!("Failed to checkpoint partition {partition_id} on close: {error}");
        }
        if let Err(error) = pump.receiver.close().await {
            warn!("Failed to close receiver of partition {partition_id}: {error}");
        }

        info!(
            "Closed partition {partition_id} on host {}, reason: {reason}",
            self.config.host_name
        );
        if let Err(error) = self.processor.on_closed(&context, reason).await {
            self.processor.on_error(&context, &error).await;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpExit {
    Cancelled,
    LinkEnded,
}

async fn pump_events(
    receiver: Arc<EventReceiver>,
    context: Arc<PartitionContext>,
    processor: Arc<dyn EventProcessor>,
    batch_size: usize,
    wait: Duration,
    cancellation: CancellationToken,
) -> PumpExit {
    let partition_id = context.partition_id().clone();
    let exit = loop {
        let batch = tokio::select! {
            _ = cancellation.cancelled() => break PumpExit::Cancelled,
            batch = receiver.receive(batch_size, wait) => batch,
        };
        match batch {
            Ok(events) => {
                for event in events {
                    context.update_position(&event).await;
                    if let Err(error) = processor.on_message(&context, event).await {
                        processor.on_error(&context, &error).await;
                    }
                }
            }
            Err(error @ (EventHubError::LinkStolen(_) | EventHubError::LinkClosed(_))) => {
                warn!("Receiver of partition {partition_id} stopped: {error}");
                processor.on_error(&context, &error).await;
                break PumpExit::LinkEnded;
            }
            Err(error) => {
                warn!("Receive on partition {partition_id} failed: {error}");
                processor.on_error(&context, &error).await;
                tokio::select! {
                    _ = cancellation.cancelled() => break PumpExit::Cancelled,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }
    };
    debug!("Pump of partition {partition_id} stopped: {exit:?}");
    exit
}
