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

use crate::connection::ClientContext;
use crate::event_data::EventData;
use crate::renewal::{RenewableLink, TokenRenewalScheduler};
use crate::retry::with_retry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eventhub_amqp::{
    AmqpErrorInfo, AmqpReceiverLink, AmqpSession, LinkEvent, ReceiverLinkHandle, ReceiverLinkOptions,
    SelectorFilter,
};
use eventhub_common::{EventHubError, EventPosition, PartitionId, TokenInfo};
use futures::Stream;
use serde::Serialize;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_CONSUMER_GROUP: &str = "$default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverOptions {
    pub position: EventPosition,
    /// Exclusive ownership of the partition at this epoch.
    pub epoch: Option<i64>,
    /// Overrides the client prefetch.
    pub prefetch: Option<u32>,
    /// Track the last observed event of the partition.
    pub track_last_enqueued_event: bool,
}

impl Default for ReceiverOptions {
    fn default() -> Self {
        Self {
            position: EventPosition::StartOfStream,
            epoch: None,
            prefetch: None,
            track_last_enqueued_event: false,
        }
    }
}

impl ReceiverOptions {
    pub fn new(position: EventPosition) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn with_epoch(mut self, epoch: i64) -> Self {
        self.epoch = Some(epoch);
        self
    }

    pub fn with_prefetch(mut self, prefetch: u32) -> Self {
        self.prefetch = Some(prefetch);
        self
    }

    pub fn with_runtime_metrics(mut self) -> Self {
        self.track_last_enqueued_event = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReceiverStatus {
    Uninitialized,
    Initializing,
    Active,
    Closed,
}

/// Last event observed by a receiver running with runtime metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReceiverRuntimeInfo {
    pub partition_id: PartitionId,
    pub last_sequence_number: Option<i64>,
    pub last_enqueued_offset: Option<String>,
    pub last_enqueued_time_utc: Option<DateTime<Utc>>,
    pub retrieval_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct ReceiverState {
    session: Option<Arc<dyn AmqpSession>>,
    link: Option<Arc<dyn AmqpReceiverLink>>,
}

/// Delivered events waiting to be handed out, plus an error that arrived
/// after a partial batch and is reported by the next call.
#[derive(Debug, Default)]
struct Inbox {
    events: Option<mpsc::Receiver<LinkEvent>>,
    pending_error: Option<EventHubError>,
}

/// Consumer link for one partition of one consumer group.
#[derive(Debug)]
pub struct EventReceiver {
    name: String,
    address: String,
    audience: String,
    partition_id: PartitionId,
    consumer_group: String,
    options: ReceiverOptions,
    context: Arc<ClientContext>,
    status: StdMutex<ReceiverStatus>,
    state: Mutex<ReceiverState>,
    inbox: Mutex<Inbox>,
    renewal: TokenRenewalScheduler,
    runtime_info: StdMutex<Option<ReceiverRuntimeInfo>>,
}

impl EventReceiver {
    pub(crate) fn new(
        context: Arc<ClientContext>,
        consumer_group: &str,
        partition_id: PartitionId,
        options: ReceiverOptions,
    ) -> Self {
        let address = format!(
            "{}/ConsumerGroups/{consumer_group}/Partitions/{partition_id}",
            context.config().entity_path
        );
        let audience = context.config().audience(&address);
        let runtime_info = options.track_last_enqueued_event.then(|| ReceiverRuntimeInfo {
            partition_id: partition_id.clone(),
            ..Default::default()
        });
        Self {
            name: format!("receiver-{}", Uuid::now_v7()),
            address,
            audience,
            partition_id,
            consumer_group: consumer_group.to_owned(),
            options,
            context,
            status: StdMutex::new(ReceiverStatus::Uninitialized),
            state: Mutex::new(ReceiverState::default()),
            inbox: Mutex::new(Inbox::default()),
            renewal: TokenRenewalScheduler::default(),
            runtime_info: StdMutex::new(runtime_info),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn partition_id(&self) -> &PartitionId {
        &self.partition_id
    }

    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    pub fn epoch(&self) -> Option<i64> {
        self.options.epoch
    }

    pub fn status(&self) -> ReceiverStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: ReceiverStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    pub fn runtime_info(&self) -> Option<ReceiverRuntimeInfo> {
        self.runtime_info.lock().ok().and_then(|info| info.clone())
    }

    /// Negotiates the claim and attaches the link with the configured filter.
    /// A no-op while a link is attached. A link detached by the service stays
    /// attached until its buffered events and the detach error are consumed.
    pub async fn init(self: &Arc<Self>) -> Result<(), EventHubError> {
        let mut state = self.state.lock().await;
        match self.status() {
            ReceiverStatus::Closed => return Err(self.closed_error()),
            ReceiverStatus::Active if state.link.is_some() => return Ok(()),
            _ => {}
        }

        if self.context.is_closed() {
            return Err(EventHubError::NotConnected);
        }

        self.set_status(ReceiverStatus::Initializing);
        let config = self.context.config();
        let attached =
            with_retry(&config.retry, "receiver initialization", || self.attach()).await;
        let (session, handle, token) = match attached {
            Ok(attached) => attached,
            Err(error) => {
                self.set_status(ReceiverStatus::Uninitialized);
                return Err(error);
            }
        };

        state.session = Some(session);
        state.link = Some(handle.link);
        {
            let mut inbox = self.inbox.lock().await;
            inbox.events = Some(handle.events);
            inbox.pending_error = None;
        }
        self.set_status(ReceiverStatus::Active);
        self.renewal.schedule(
            Arc::downgrade(self),
            &token,
            config.token_renewal_margin.get_duration(),
        );
        info!(
            "Receiver {} attached to {} at {:?}, epoch: {:?}",
            self.name, self.address, self.options.position, self.options.epoch
        );
        Ok(())
    }

    /// Collects up to `max_count` events, waiting at most `max_wait`. Returns
    /// early once `max_count` is reached; may return an empty batch.
    pub async fn receive(
        self: &Arc<Self>,
        max_count: usize,
        max_wait: Duration,
    ) -> Result<Vec<EventData>, EventHubError> {
        if max_count == 0 {
            return Err(EventHubError::InvalidArgument(
                "max count must be greater than zero".to_owned(),
            ));
        }
        self.take_pending_error().await?;
        self.init().await?;

        let mut inbox = self.inbox.lock().await;
        let deadline = Instant::now() + max_wait;
        let mut batch = Vec::with_capacity(max_count.min(self.prefetch() as usize));
        while batch.len() < max_count {
            let Some(events) = inbox.events.as_mut() else {
                return Err(self.closed_error());
            };
            let event = match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(event) => event,
                Err(_) => break,
            };

            match event {
                Some(LinkEvent::Message(message)) => batch.push(self.accept(message.into())),
                Some(LinkEvent::Detached(error)) => {
                    let error = self.on_detached(error, &mut inbox);
                    if batch.is_empty() {
                        return Err(error);
                    }
                    inbox.pending_error = Some(error);
                    break;
                }
                None => {
                    let error = self.on_detached(None, &mut inbox);
                    if batch.is_empty() {
                        return Err(error);
                    }
                    break;
                }
            }
        }

        debug!(
            "Receiver {} returned {} event(s) from partition {}",
            self.name,
            batch.len(),
            self.partition_id
        );
        Ok(batch)
    }

    /// Waits for the next event.
    pub async fn recv(self: &Arc<Self>) -> Result<EventData, EventHubError> {
        self.take_pending_error().await?;
        self.init().await?;

        let mut inbox = self.inbox.lock().await;
        let Some(events) = inbox.events.as_mut() else {
            return Err(self.closed_error());
        };

        match events.recv().await {
            Some(LinkEvent::Message(message)) => Ok(self.accept(message.into())),
            Some(LinkEvent::Detached(error)) => Err(self.on_detached(error, &mut inbox)),
            None => Err(self.on_detached(None, &mut inbox)),
        }
    }

    /// Continuous stream of events. A link error is yielded once, after
    /// which the stream ends.
    pub fn into_stream(self: Arc<Self>) -> impl Stream<Item = Result<EventData, EventHubError>> {
        futures::stream::unfold(Some(self), |receiver| async move {
            let Some(receiver) = receiver else {
                return None;
            };
            match receiver.recv().await {
                Ok(event) => Some((Ok(event), Some(receiver))),
                Err(EventHubError::LinkClosed(_)) => None,
                Err(error) => Some((Err(error), None)),
            }
        })
    }

    /// Cancels the renewal timer and detaches the link. In-flight receives
    /// observe the detach as a closed link.
    pub async fn close(&self) -> Result<(), EventHubError> {
        self.renewal.cancel();
        let (session, link) = {
            let mut state = self.state.lock().await;
            self.set_status(ReceiverStatus::Closed);
            (state.session.take(), state.link.take())
        };
        if link.is_none() && session.is_none() {
            return Ok(());
        }

        if let Some(link) = link {
            link.detach().await?;
        }
        if let Some(session) = session {
            session.end().await?;
        }
        info!("Closed receiver {} on {}", self.name, self.address);
        Ok(())
    }

    async fn attach(
        &self,
    ) -> Result<(Arc<dyn AmqpSession>, ReceiverLinkHandle, TokenInfo), EventHubError> {
        let connection = self.context.connection().await?;
        let token = connection.negotiate_claim(&self.audience).await?;
        let session = connection.create_session().await?;

        let mut options = ReceiverLinkOptions::new(&self.name, &self.address, self.prefetch())
            .with_filter(SelectorFilter::new(
                self.options.position.to_filter_expression(),
            ));
        if let Some(epoch) = self.options.epoch {
            options = options.with_epoch(epoch);
        }
        let handle = session.attach_receiver(options).await?;
        Ok((session, handle, token))
    }

    /// Reports, once, the error that ended the link after a partial batch.
    async fn take_pending_error(&self) -> Result<(), EventHubError> {
        match self.inbox.lock().await.pending_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn prefetch(&self) -> u32 {
        self.options
            .prefetch
            .unwrap_or(self.context.config().prefetch)
    }

    fn accept(&self, event: EventData) -> EventData {
        if let Ok(mut runtime_info) = self.runtime_info.lock()
            && let Some(info) = runtime_info.as_mut()
        {
            info.last_sequence_number = event.sequence_number();
            info.last_enqueued_offset = event.offset().map(str::to_owned);
            info.last_enqueued_time_utc = event.enqueued_time();
            info.retrieval_time = Some(Utc::now());
        }
        event
    }

    /// The link is gone for good; session and link handles are released by
    /// `close`.
    fn on_detached(&self, error: Option<AmqpErrorInfo>, inbox: &mut Inbox) -> EventHubError {
        inbox.events = None;
        self.renewal.cancel();
        self.set_status(ReceiverStatus::Closed);

        match error {
            Some(error) => {
                warn!(
                    "Receiver {} on {} was detached by the service: {error}",
                    self.name, self.address
                );
                error.into_error()
            }
            None => self.closed_error(),
        }
    }

    fn closed_error(&self) -> EventHubError {
        EventHubError::LinkClosed(format!("receiver {} is closed", self.name))
    }
}

#[async_trait]
impl RenewableLink for EventReceiver {
    fn audience(&self) -> &str {
        &self.audience
    }

    fn is_closed(&self) -> bool {
        self.context.is_closed() || self.status() == ReceiverStatus::Closed
    }

    async fn renew_claim(&self) -> Result<TokenInfo, EventHubError> {
        let connection = self.context.connection().await?;
        connection.negotiate_claim(&self.audience).await
    }
}
