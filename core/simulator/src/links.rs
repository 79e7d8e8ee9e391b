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

use crate::codec::PostcardCodec;
use crate::connection::ConnectionState;
use crate::hub::{LinkStop, Partition};
use crate::responders;
use async_trait::async_trait;
use eventhub_amqp::{
    AmqpErrorInfo, AmqpMessage, AmqpReceiverLink, AmqpSenderLink, BATCH_MESSAGE_FORMAT, Delivery,
    DeliveryOutcome, LinkEvent, MessageBody, MessageCodec,
};
use eventhub_common::{ErrorCondition, EventHubError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// What a sender link is attached to.
#[derive(Debug)]
pub(crate) enum Node {
    Cbs,
    Management,
    /// The hub itself, or one fixed partition.
    Entity(Option<Arc<Partition>>),
}

#[derive(Debug)]
pub(crate) struct SimSenderLink {
    name: String,
    node: Node,
    connection: Arc<ConnectionState>,
    open: AtomicBool,
}

impl SimSenderLink {
    pub fn new(name: String, node: Node, connection: Arc<ConnectionState>) -> Self {
        Self {
            name,
            node,
            connection,
            open: AtomicBool::new(true),
        }
    }

    async fn reply(&self, request: &AmqpMessage, reply: AmqpMessage) {
        let Some(reply_to) = request.properties.reply_to.as_deref() else {
            warn!("Dropping reply to a request without a reply address");
            return;
        };
        let route = self
            .connection
            .reply_routes
            .get(reply_to)
            .map(|route| route.value().clone());
        match route {
            Some(route) => {
                if route.send(LinkEvent::Message(reply)).await.is_err() {
                    debug!("Reply link {reply_to} went away before the reply was delivered");
                }
            }
            None => warn!("No reply link is attached at {reply_to}"),
        }
    }

    fn append(
        &self,
        partition: &Option<Arc<Partition>>,
        delivery: &Delivery,
    ) -> Result<(), EventHubError> {
        let codec = PostcardCodec;
        let envelope = codec.decode(&delivery.payload)?;
        let events = if delivery.message_format == BATCH_MESSAGE_FORMAT {
            let MessageBody::Data(sections) = &envelope.body else {
                return Err(EventHubError::DecodeError(
                    "batch envelope does not carry data sections".to_owned(),
                ));
            };
            sections
                .iter()
                .map(|section| Ok((codec.decode(section)?, section.len())))
                .collect::<Result<Vec<_>, EventHubError>>()?
        } else {
            vec![(envelope, delivery.size())]
        };

        // A batch lands on a single partition, chosen by its first event.
        let target = match (partition, events.first()) {
            (Some(partition), _) => partition.clone(),
            (None, Some((first, _))) => self.connection.hub.route(first).clone(),
            (None, None) => return Ok(()),
        };
        for (event, size) in events {
            target.append(event, size);
        }
        Ok(())
    }
}

#[async_trait]
impl AmqpSenderLink for SimSenderLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.connection.is_open()
    }

    fn credit(&self) -> u32 {
        self.connection.hub.sender_credit.load(Ordering::SeqCst)
    }

    fn max_message_size(&self) -> Option<u64> {
        self.connection.hub.max_message_size
    }

    async fn send(&self, delivery: Delivery) -> Result<DeliveryOutcome, EventHubError> {
        if !self.is_open() {
            return Err(EventHubError::LinkClosed(format!(
                "sender link {} is detached",
                self.name
            )));
        }
        if let Some(max) = self.max_message_size()
            && delivery.size() as u64 > max
        {
            return Ok(DeliveryOutcome::Rejected(Some(AmqpErrorInfo::new(
                ErrorCondition::MessageSizeExceeded.to_string(),
                format!(
                    "the message of {} bytes exceeds the limit of {max} bytes",
                    delivery.size()
                ),
            ))));
        }

        match &self.node {
            Node::Cbs => {
                let request = PostcardCodec.decode(&delivery.payload)?;
                let reply = responders::put_token(&self.connection, &request);
                self.reply(&request, reply).await;
            }
            Node::Management => {
                let request = PostcardCodec.decode(&delivery.payload)?;
                let reply = responders::management(&self.connection, &request);
                self.reply(&request, reply).await;
            }
            Node::Entity(partition) => {
                if let Err(error) = self.append(partition, &delivery) {
                    warn!("Rejecting delivery on {}: {error}", self.name);
                    let condition = error.condition().unwrap_or(ErrorCondition::DecodeError);
                    return Ok(DeliveryOutcome::Rejected(Some(AmqpErrorInfo::new(
                        condition.to_string(),
                        error.to_string(),
                    ))));
                }
            }
        }
        Ok(DeliveryOutcome::Accepted)
    }

    async fn detach(&self) -> Result<(), EventHubError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct SimReceiverLink {
    name: String,
    open: AtomicBool,
    stop: Option<Arc<LinkStop>>,
    reply_route: Option<(Arc<ConnectionState>, String)>,
}

impl SimReceiverLink {
    pub fn partition(name: String, stop: Arc<LinkStop>) -> Self {
        Self {
            name,
            open: AtomicBool::new(true),
            stop: Some(stop),
            reply_route: None,
        }
    }

    pub fn reply_route(name: String, connection: Arc<ConnectionState>, reply_to: String) -> Self {
        Self {
            name,
            open: AtomicBool::new(true),
            stop: None,
            reply_route: Some((connection, reply_to)),
        }
    }
}

#[async_trait]
impl AmqpReceiverLink for SimReceiverLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        let stopped = self
            .stop
            .as_ref()
            .is_some_and(|stop| stop.token.is_cancelled());
        let route_open = self
            .reply_route
            .as_ref()
            .is_none_or(|(connection, _)| connection.is_open());
        self.open.load(Ordering::SeqCst) && !stopped && route_open
    }

    async fn detach(&self) -> Result<(), EventHubError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(stop) = &self.stop {
            stop.stop(None);
        }
        if let Some((connection, reply_to)) = &self.reply_route {
            connection.reply_routes.remove(reply_to);
        }
        debug!("Simulator detached receiver {}", self.name);
        Ok(())
    }
}

/// Streams a partition to a receiver link starting at `start` until the link
/// is stopped or the client drops its end. A stop with a reason is reported
/// as a detach. `on_exit` runs once the pump has finished.
pub(crate) fn spawn_pump(
    partition: Arc<Partition>,
    start: usize,
    events: mpsc::Sender<LinkEvent>,
    stop: Arc<LinkStop>,
    on_exit: impl FnOnce() + Send + 'static,
) {
    tokio::spawn(async move {
        let mut appended = partition.subscribe();
        let mut next = start;
        'pump: loop {
            while let Some(message) = partition.get(next) {
                tokio::select! {
                    biased;
                    _ = stop.token.cancelled() => break 'pump,
                    sent = events.send(LinkEvent::Message(message)) => {
                        if sent.is_err() {
                            break 'pump;
                        }
                    }
                }
                next += 1;
            }
            tokio::select! {
                biased;
                _ = stop.token.cancelled() => break,
                changed = appended.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        if let Some(reason) = stop.reason() {
            let _ = events.send(LinkEvent::Detached(Some(reason))).await;
        }
        on_exit();
    });
}
