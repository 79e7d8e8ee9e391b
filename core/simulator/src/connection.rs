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
use crate::filter::StartPosition;
use crate::hub::{HubState, LinkStop};
use crate::links::{self, Node, SimReceiverLink, SimSenderLink};
use async_trait::async_trait;
use dashmap::DashMap;
use eventhub_amqp::{
    AmqpConnection, AmqpConnector, AmqpSenderLink, AmqpSession, ConnectionOptions, LinkEvent,
    MessageCodec, ReceiverLinkHandle, ReceiverLinkOptions, SenderLinkOptions,
};
use eventhub_common::{EventHubError, timestamp};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub(crate) const CBS_NODE: &str = "$cbs";
pub(crate) const MANAGEMENT_NODE: &str = "$management";

#[derive(Debug)]
pub(crate) struct SimulatorConnector {
    hub: Arc<HubState>,
}

impl SimulatorConnector {
    pub fn new(hub: Arc<HubState>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl AmqpConnector for SimulatorConnector {
    async fn connect(
        &self,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn AmqpConnection>, EventHubError> {
        if options.host != self.hub.host {
            return Err(EventHubError::Transport(format!(
                "cannot resolve host {}",
                options.host
            )));
        }
        self.hub.connections.fetch_add(1, Ordering::SeqCst);
        info!("Simulator accepted connection {}", options.container_id);
        Ok(Arc::new(SimConnection {
            state: Arc::new(ConnectionState {
                hub: self.hub.clone(),
                container_id: options.container_id.clone(),
                open: AtomicBool::new(true),
                shutdown: CancellationToken::new(),
                claims: DashMap::new(),
                reply_routes: DashMap::new(),
            }),
        }))
    }
}

#[derive(Debug)]
pub(crate) struct ConnectionState {
    pub hub: Arc<HubState>,
    pub container_id: String,
    open: AtomicBool,
    shutdown: CancellationToken,
    /// Authorized audience to token expiry in unix seconds.
    pub claims: DashMap<String, i64>,
    /// Reply address to the receiver link listening on it.
    pub reply_routes: DashMap<String, mpsc::Sender<LinkEvent>>,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Whether an unexpired claim covers `address`. A claim on the hub
    /// covers its partitions and consumer groups.
    pub fn is_authorized(&self, address: &str) -> bool {
        let audience = format!("sb://{}/{address}", self.hub.host);
        let now = timestamp::unix_seconds_now();
        self.claims.iter().any(|claim| {
            let claimed = claim.key().trim_end_matches('/');
            *claim.value() > now
                && (audience == claimed || audience.starts_with(&format!("{claimed}/")))
        })
    }

    pub fn ensure_open(&self) -> Result<(), EventHubError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(EventHubError::NotConnected)
        }
    }
}

#[derive(Debug)]
pub(crate) struct SimConnection {
    state: Arc<ConnectionState>,
}

#[async_trait]
impl AmqpConnection for SimConnection {
    fn container_id(&self) -> &str {
        &self.state.container_id
    }

    fn is_open(&self) -> bool {
        self.state.is_open()
    }

    fn codec(&self) -> Arc<dyn MessageCodec> {
        Arc::new(PostcardCodec)
    }

    async fn create_session(&self) -> Result<Arc<dyn AmqpSession>, EventHubError> {
        self.state.ensure_open()?;
        Ok(Arc::new(SimSession {
            connection: self.state.clone(),
            open: AtomicBool::new(true),
        }))
    }

    async fn close(&self) -> Result<(), EventHubError> {
        if self.state.open.swap(false, Ordering::SeqCst) {
            self.state.shutdown.cancel();
            self.state.reply_routes.clear();
            info!("Simulator closed connection {}", self.state.container_id);
        }
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct SimSession {
    connection: Arc<ConnectionState>,
    open: AtomicBool,
}

impl SimSession {
    fn ensure_open(&self) -> Result<(), EventHubError> {
        self.connection.ensure_open()?;
        if !self.open.load(Ordering::SeqCst) {
            return Err(EventHubError::Transport("session has ended".to_owned()));
        }
        Ok(())
    }

    fn ensure_authorized(&self, address: &str) -> Result<(), EventHubError> {
        if self.connection.is_authorized(address) {
            Ok(())
        } else {
            Err(EventHubError::Unauthorized(format!(
                "no valid claim for {address}"
            )))
        }
    }
}

#[async_trait]
impl AmqpSession for SimSession {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.connection.is_open()
    }

    async fn attach_sender(
        &self,
        options: SenderLinkOptions,
    ) -> Result<Arc<dyn AmqpSenderLink>, EventHubError> {
        self.ensure_open()?;
        let hub = &self.connection.hub;
        let node = match options.target.as_str() {
            CBS_NODE => {
                let created = hub.cbs_sessions.fetch_add(1, Ordering::SeqCst) + 1;
                debug!("Simulator attached CBS sender #{created}");
                Node::Cbs
            }
            MANAGEMENT_NODE => Node::Management,
            address => {
                let partition = match address.split('/').collect::<Vec<_>>().as_slice() {
                    [name] if *name == hub.name => None,
                    [name, "Partitions", id] if *name == hub.name => {
                        Some(hub.partition(id).cloned().ok_or_else(|| {
                            EventHubError::NotFound(format!("partition {id} does not exist"))
                        })?)
                    }
                    _ => {
                        return Err(EventHubError::NotFound(format!(
                            "entity {address} does not exist"
                        )));
                    }
                };
                self.ensure_authorized(address)?;
                Node::Entity(partition)
            }
        };

        debug!("Simulator attached sender {} to {}", options.name, options.target);
        Ok(Arc::new(SimSenderLink::new(
            options.name,
            node,
            self.connection.clone(),
        )))
    }

    async fn attach_receiver(
        &self,
        options: ReceiverLinkOptions,
    ) -> Result<ReceiverLinkHandle, EventHubError> {
        self.ensure_open()?;
        let (events, receiver) = mpsc::channel(options.prefetch.max(1) as usize);

        if options.source == CBS_NODE || options.source == MANAGEMENT_NODE {
            let reply_to = options.target.clone().ok_or_else(|| {
                EventHubError::InvalidField(format!(
                    "receiver on {} requires a reply address",
                    options.source
                ))
            })?;
            self.connection
                .reply_routes
                .insert(reply_to.clone(), events);
            let link = SimReceiverLink::reply_route(
                options.name,
                self.connection.clone(),
                reply_to,
            );
            return Ok(ReceiverLinkHandle {
                link: Arc::new(link),
                events: receiver,
            });
        }

        let hub = self.connection.hub.clone();
        let (consumer_group, partition) =
            match options.source.split('/').collect::<Vec<_>>().as_slice() {
                [name, "ConsumerGroups", group, "Partitions", id] if *name == hub.name => (
                    group.to_string(),
                    hub.partition(id).cloned().ok_or_else(|| {
                        EventHubError::NotFound(format!("partition {id} does not exist"))
                    })?,
                ),
                _ => {
                    return Err(EventHubError::NotFound(format!(
                        "entity {} does not exist",
                        options.source
                    )));
                }
            };
        self.ensure_authorized(&options.source)?;

        let position = match &options.filter {
            Some(filter) => StartPosition::parse(&filter.expression)?,
            None => StartPosition::Beginning,
        };
        let link_id = hub.next_link_id();
        let stop = Arc::new(LinkStop::child_of(&self.connection.shutdown));
        let epoch = options.epoch();
        if let Some(epoch) = epoch {
            hub.claim_epoch(&consumer_group, &partition.id, epoch, link_id, stop.clone())?;
        }

        let start = partition.start_index(&position);
        debug!(
            "Simulator attached receiver {} to {} at index {start}, epoch: {epoch:?}",
            options.name, options.source
        );
        let partition_id = partition.id.clone();
        links::spawn_pump(partition, start, events, stop.clone(), move || {
            if epoch.is_some() {
                hub.release_epoch(&consumer_group, &partition_id, link_id);
            }
        });

        Ok(ReceiverLinkHandle {
            link: Arc::new(SimReceiverLink::partition(options.name, stop)),
            events: receiver,
        })
    }

    async fn end(&self) -> Result<(), EventHubError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}
