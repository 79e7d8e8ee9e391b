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

use crate::codec::MessageCodec;
use crate::link::{
    Delivery, DeliveryOutcome, ReceiverLinkHandle, ReceiverLinkOptions, SenderLinkOptions,
};
use async_trait::async_trait;
use eventhub_common::EventHubError;
use std::fmt::Debug;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    /// Host name of the namespace, without scheme.
    pub host: String,
    pub container_id: String,
}

/// Opens physical connections.
#[async_trait]
pub trait AmqpConnector: Send + Sync + Debug {
    async fn connect(
        &self,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn AmqpConnection>, EventHubError>;
}

#[async_trait]
pub trait AmqpConnection: Send + Sync + Debug {
    fn container_id(&self) -> &str;

    fn is_open(&self) -> bool;

    fn codec(&self) -> Arc<dyn MessageCodec>;

    async fn create_session(&self) -> Result<Arc<dyn AmqpSession>, EventHubError>;

    async fn close(&self) -> Result<(), EventHubError>;
}

#[async_trait]
pub trait AmqpSession: Send + Sync + Debug {
    fn is_open(&self) -> bool;

    async fn attach_sender(
        &self,
        options: SenderLinkOptions,
    ) -> Result<Arc<dyn AmqpSenderLink>, EventHubError>;

    async fn attach_receiver(
        &self,
        options: ReceiverLinkOptions,
    ) -> Result<ReceiverLinkHandle, EventHubError>;

    async fn end(&self) -> Result<(), EventHubError>;
}

#[async_trait]
pub trait AmqpSenderLink: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Deliveries the peer currently allows.
    fn credit(&self) -> u32;

    /// Limit advertised on attach, if any.
    fn max_message_size(&self) -> Option<u64>;

    /// Transfers one delivery and waits for its settlement.
    async fn send(&self, delivery: Delivery) -> Result<DeliveryOutcome, EventHubError>;

    async fn detach(&self) -> Result<(), EventHubError>;
}

#[async_trait]
pub trait AmqpReceiverLink: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn is_open(&self) -> bool;

    async fn detach(&self) -> Result<(), EventHubError>;
}
