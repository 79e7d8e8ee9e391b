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

use crate::auth::{SasTokenProvider, TokenProvider};
use crate::config::EventHubClientConfig;
use crate::connection::ClientContext;
use crate::connection_string::ConnectionString;
use crate::management::{HubRuntimeInformation, PartitionRuntimeInformation};
use crate::receiver::{EventReceiver, ReceiverOptions};
use crate::sender::EventSender;
use dashmap::DashMap;
use eventhub_amqp::AmqpConnector;
use eventhub_common::{EventHubError, PartitionId};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

/// Entry point of the client. Owns one lazily opened connection and every
/// link created through it.
#[derive(Debug)]
pub struct EventHubClient {
    context: Arc<ClientContext>,
    senders: DashMap<String, Arc<EventSender>>,
    receivers: DashMap<String, Arc<EventReceiver>>,
}

impl EventHubClient {
    pub fn new(
        config: EventHubClientConfig,
        token_provider: Arc<dyn TokenProvider>,
        connector: Arc<dyn AmqpConnector>,
    ) -> Result<Self, EventHubError> {
        config.validate()?;
        info!(
            "Creating event hub client for {}{}",
            config.normalized_endpoint(),
            config.entity_path
        );
        Ok(Self {
            context: Arc::new(ClientContext::new(
                Arc::new(config),
                connector,
                token_provider,
            )),
            senders: DashMap::new(),
            receivers: DashMap::new(),
        })
    }

    /// Builds a client authenticated with the shared access key of the
    /// connection string. `entity_path` is required when the connection
    /// string has no `EntityPath`.
    pub fn from_connection_string(
        connection_string: &str,
        entity_path: Option<&str>,
        connector: Arc<dyn AmqpConnector>,
    ) -> Result<Self, EventHubError> {
        let connection_string = ConnectionString::from_str(connection_string)?;
        let entity_path = entity_path
            .or(connection_string.entity_path())
            .ok_or_else(|| {
                EventHubError::InvalidArgument(
                    "entity path must be given in the connection string or explicitly".to_owned(),
                )
            })?;
        let token_provider = SasTokenProvider::new(
            connection_string.shared_access_key_name(),
            connection_string.shared_access_key(),
        )?;
        let config = EventHubClientConfig::new(connection_string.endpoint(), entity_path);
        Self::new(config, Arc::new(token_provider), connector)
    }

    pub fn config(&self) -> &EventHubClientConfig {
        self.context.config()
    }

    /// Creates a sender for the whole hub (`None`) or for one partition.
    /// The link attaches on `init` or on the first send.
    pub fn create_sender(&self, partition_id: Option<PartitionId>) -> Arc<EventSender> {
        let sender = Arc::new(EventSender::new(self.context.clone(), partition_id));
        self.senders
            .insert(sender.name().to_owned(), sender.clone());
        sender
    }

    /// Creates a receiver for one partition of `consumer_group`. The link
    /// attaches on `init` or on the first receive.
    pub fn create_receiver(
        &self,
        consumer_group: &str,
        partition_id: impl Into<PartitionId>,
        options: ReceiverOptions,
    ) -> Result<Arc<EventReceiver>, EventHubError> {
        if consumer_group.is_empty() {
            return Err(EventHubError::InvalidArgument(
                "consumer group cannot be empty".to_owned(),
            ));
        }
        let receiver = Arc::new(EventReceiver::new(
            self.context.clone(),
            consumer_group,
            partition_id.into(),
            options,
        ));
        self.receivers
            .insert(receiver.name().to_owned(), receiver.clone());
        Ok(receiver)
    }

    pub async fn get_hub_runtime_information(
        &self,
    ) -> Result<HubRuntimeInformation, EventHubError> {
        let connection = self.context.connection().await?;
        connection
            .management()
            .hub_runtime_information(&connection)
            .await
    }

    pub async fn get_partition_ids(&self) -> Result<Vec<PartitionId>, EventHubError> {
        Ok(self.get_hub_runtime_information().await?.partition_ids)
    }

    pub async fn get_partition_information(
        &self,
        partition_id: impl Into<PartitionId>,
    ) -> Result<PartitionRuntimeInformation, EventHubError> {
        let partition_id = partition_id.into();
        let connection = self.context.connection().await?;
        connection
            .management()
            .partition_information(&connection, &partition_id)
            .await
    }

    /// Number of `$cbs` sessions opened on the current connection.
    pub fn cbs_sessions_created(&self) -> usize {
        self.context
            .opened_connection()
            .map_or(0, |connection| connection.cbs_sessions_created())
    }

    /// Closes every link created by this client, then the connection.
    pub async fn close(&self) -> Result<(), EventHubError> {
        let senders = self
            .senders
            .iter()
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>();
        for sender in senders {
            if let Err(error) = sender.close().await {
                error!("Failed to close sender {}: {error}", sender.name());
            }
        }
        self.senders.clear();

        let receivers = self
            .receivers
            .iter()
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>();
        for receiver in receivers {
            if let Err(error) = receiver.close().await {
                error!("Failed to close receiver {}: {error}", receiver.name());
            }
        }
        self.receivers.clear();

        self.context.close().await?;
        info!("Closed event hub client for {}", self.config().entity_path);
        Ok(())
    }
}
