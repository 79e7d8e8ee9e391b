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

use crate::batch;
use crate::connection::ClientContext;
use crate::event_data::EventData;
use crate::renewal::{RenewableLink, TokenRenewalScheduler};
use crate::retry::with_retry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eventhub_amqp::{
    AmqpMessage, AmqpSenderLink, AmqpSession, AmqpValue, Delivery, DeliveryOutcome,
    PARTITION_KEY_ANNOTATION, SenderLinkOptions,
};
use eventhub_common::{EventHubError, PartitionId, TokenInfo};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, trace};
use uuid::Uuid;

/// Settlement of one transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub link_name: String,
    pub delivered_at: DateTime<Utc>,
    pub event_count: usize,
    pub payload_size: usize,
}

#[derive(Debug, Default)]
struct SenderState {
    session: Option<Arc<dyn AmqpSession>>,
    link: Option<Arc<dyn AmqpSenderLink>>,
}

/// Producer link to the hub or to a single partition.
#[derive(Debug)]
pub struct EventSender {
    name: String,
    address: String,
    audience: String,
    partition_id: Option<PartitionId>,
    context: Arc<ClientContext>,
    state: Mutex<SenderState>,
    renewal: TokenRenewalScheduler,
    closed: AtomicBool,
}

impl EventSender {
    pub(crate) fn new(context: Arc<ClientContext>, partition_id: Option<PartitionId>) -> Self {
        let entity_path = &context.config().entity_path;
        let address = match &partition_id {
            Some(partition_id) => format!("{entity_path}/Partitions/{partition_id}"),
            None => entity_path.clone(),
        };
        let audience = context.config().audience(&address);
        Self {
            name: format!("sender-{}", Uuid::now_v7()),
            address,
            audience,
            partition_id,
            context,
            state: Mutex::new(SenderState::default()),
            renewal: TokenRenewalScheduler::default(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn partition_id(&self) -> Option<&PartitionId> {
        self.partition_id.as_ref()
    }

    pub async fn is_active(&self) -> bool {
        let state = self.state.lock().await;
        state.link.as_ref().is_some_and(|link| link.is_open())
    }

    /// Negotiates the claim and attaches the link. A no-op while active.
    pub async fn init(self: &Arc<Self>) -> Result<(), EventHubError> {
        self.active_link().await.map(|_| ())
    }

    /// Sends one event, optionally routed by `partition_key`.
    pub async fn send(
        self: &Arc<Self>,
        event: EventData,
        partition_key: Option<&str>,
    ) -> Result<DeliveryReceipt, EventHubError> {
        let link = self.active_link().await?;
        let codec = self.context.connection().await?.codec();
        let message = stamp_partition_key(event.into_message(), partition_key);
        let delivery = batch::encode_single(codec.as_ref(), &message)?;
        self.transmit(link, delivery, 1).await
    }

    /// Sends all events as one batch delivery.
    pub async fn send_batch(
        self: &Arc<Self>,
        events: Vec<EventData>,
        partition_key: Option<&str>,
    ) -> Result<DeliveryReceipt, EventHubError> {
        if events.is_empty() {
            return Err(EventHubError::InvalidArgument(
                "cannot send an empty batch".to_owned(),
            ));
        }

        let link = self.active_link().await?;
        let codec = self.context.connection().await?.codec();
        let event_count = events.len();
        let messages = events
            .into_iter()
            .map(|event| stamp_partition_key(event.into_message(), partition_key))
            .collect::<Vec<_>>();
        let delivery = batch::encode_batch(codec.as_ref(), &messages)?;
        self.transmit(link, delivery, event_count).await
    }

    pub async fn close(&self) -> Result<(), EventHubError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.renewal.cancel();

        let mut state = self.state.lock().await;
        if let Some(link) = state.link.take() {
            link.detach().await?;
        }
        if let Some(session) = state.session.take() {
            session.end().await?;
        }
        info!("Closed sender {} on {}", self.name, self.address);
        Ok(())
    }

    async fn active_link(self: &Arc<Self>) -> Result<Arc<dyn AmqpSenderLink>, EventHubError> {
        if self.is_closed() {
            return Err(EventHubError::LinkClosed(format!(
                "sender {} is closed",
                self.name
            )));
        }

        let mut state = self.state.lock().await;
        if let Some(link) = state.link.as_ref().filter(|link| link.is_open()) {
            return Ok(link.clone());
        }

        let config = self.context.config();
        let (session, link, token) =
            with_retry(&config.retry, "sender initialization", || self.attach()).await?;
        state.session = Some(session);
        state.link = Some(link.clone());
        self.renewal.schedule(
            Arc::downgrade(self),
            &token,
            config.token_renewal_margin.get_duration(),
        );
        info!("Sender {} attached to {}", self.name, self.address);
        Ok(link)
    }

    async fn attach(
        &self,
    ) -> Result<(Arc<dyn AmqpSession>, Arc<dyn AmqpSenderLink>, TokenInfo), EventHubError> {
        let connection = self.context.connection().await?;
        let token = connection.negotiate_claim(&self.audience).await?;
        let session = connection.create_session().await?;
        let link = session
            .attach_sender(SenderLinkOptions::new(&self.name, &self.address))
            .await?;
        Ok((session, link, token))
    }

    async fn transmit(
        &self,
        link: Arc<dyn AmqpSenderLink>,
        delivery: Delivery,
        event_count: usize,
    ) -> Result<DeliveryReceipt, EventHubError> {
        let payload_size = delivery.size();
        if let Some(max_message_size) = link.max_message_size()
            && payload_size as u64 > max_message_size
        {
            return Err(EventHubError::MessageTooLarge(format!(
                "attempted to send {payload_size} bytes, but the link allows at most {max_message_size} bytes"
            )));
        }

        let config = self.context.config();
        let deadline = Instant::now() + config.send_timeout.get_duration();
        while link.credit() == 0 {
            let now = Instant::now();
            if now >= deadline {
                return Err(EventHubError::OperationTimeout(format!(
                    "sender {} had no credit within {}",
                    self.name, config.send_timeout
                )));
            }
            trace!(
                "Sender {} has no credit, retrying in {}",
                self.name, config.credit_retry_interval
            );
            let wait = config.credit_retry_interval.get_duration().min(deadline - now);
            tokio::time::sleep(wait).await;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let outcome = tokio::time::timeout(remaining, link.send(delivery))
            .await
            .map_err(|_| {
                EventHubError::OperationTimeout(format!(
                    "delivery on {} was not settled within {}",
                    self.name, config.send_timeout
                ))
            })??;

        match outcome {
            DeliveryOutcome::Accepted => {
                debug!(
                    "Sender {} delivered {event_count} event(s), {payload_size} bytes",
                    self.name
                );
                Ok(DeliveryReceipt {
                    link_name: self.name.clone(),
                    delivered_at: Utc::now(),
                    event_count,
                    payload_size,
                })
            }
            DeliveryOutcome::Rejected(Some(rejection)) => {
                error!("Delivery on {} was rejected: {rejection}", self.name);
                Err(rejection.into_error())
            }
            outcome => Err(EventHubError::Protocol {
                condition: "amqp:rejected".to_owned(),
                description: format!("delivery on {} was not accepted: {outcome:?}", self.name),
            }),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.context.is_closed()
    }
}

#[async_trait]
impl RenewableLink for EventSender {
    fn audience(&self) -> &str {
        &self.audience
    }

    fn is_closed(&self) -> bool {
        EventSender::is_closed(self)
    }

    async fn renew_claim(&self) -> Result<TokenInfo, EventHubError> {
        let connection = self.context.connection().await?;
        connection.negotiate_claim(&self.audience).await
    }
}

fn stamp_partition_key(mut message: AmqpMessage, partition_key: Option<&str>) -> AmqpMessage {
    if let Some(partition_key) = partition_key {
        message.message_annotations.insert(
            PARTITION_KEY_ANNOTATION.to_owned(),
            AmqpValue::from(partition_key),
        );
    }
    message
}
