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

use crate::filter::SelectorFilter;
use crate::message::{AmqpMessage, AmqpValue};
use crate::transport::AmqpReceiverLink;
use bytes::Bytes;
use eventhub_common::EventHubError;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const EPOCH_PROPERTY: &str = "com.microsoft:epoch";
pub const DEFAULT_MESSAGE_FORMAT: u32 = 0;
/// Format code of a delivery whose data sections are encoded envelopes.
pub const BATCH_MESSAGE_FORMAT: u32 = 0x8001_3700;

#[derive(Debug, Clone, Default)]
pub struct SenderLinkOptions {
    pub name: String,
    pub target: String,
    pub properties: BTreeMap<String, AmqpValue>,
}

impl SenderLinkOptions {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            properties: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReceiverLinkOptions {
    pub name: String,
    pub source: String,
    /// Reply address for request/response links.
    pub target: Option<String>,
    pub filter: Option<SelectorFilter>,
    pub properties: BTreeMap<String, AmqpValue>,
    /// Link credit granted up front, also the capacity of the event channel.
    pub prefetch: u32,
}

impl ReceiverLinkOptions {
    pub fn new(name: impl Into<String>, source: impl Into<String>, prefetch: u32) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            prefetch,
            ..Default::default()
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_filter(mut self, filter: SelectorFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_epoch(mut self, epoch: i64) -> Self {
        self.properties
            .insert(EPOCH_PROPERTY.to_owned(), AmqpValue::Int(epoch));
        self
    }

    pub fn epoch(&self) -> Option<i64> {
        self.properties.get(EPOCH_PROPERTY).and_then(AmqpValue::as_i64)
    }
}

/// One outgoing transfer: the encoded envelope and its message format code.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub payload: Bytes,
    pub message_format: u32,
}

impl Delivery {
    pub fn new(payload: Bytes, message_format: u32) -> Self {
        Self {
            payload,
            message_format,
        }
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Error information carried by a rejected outcome or a detach frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmqpErrorInfo {
    pub condition: String,
    pub description: String,
}

impl AmqpErrorInfo {
    pub fn new(condition: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            description: description.into(),
        }
    }

    pub fn into_error(self) -> EventHubError {
        EventHubError::from_condition(&self.condition, self.description)
    }
}

impl Display for AmqpErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.condition, self.description)
    }
}

/// Terminal delivery state reported by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Accepted,
    Rejected(Option<AmqpErrorInfo>),
    Released,
    Modified { delivery_failed: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Message(AmqpMessage),
    /// The peer detached the link. `None` means a clean detach.
    Detached(Option<AmqpErrorInfo>),
}

/// An attached receiving link together with its inbound event stream.
#[derive(Debug)]
pub struct ReceiverLinkHandle {
    pub link: Arc<dyn AmqpReceiverLink>,
    pub events: mpsc::Receiver<LinkEvent>,
}
