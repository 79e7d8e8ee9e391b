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

use bytes::Bytes;
use chrono::{DateTime, Utc};
use eventhub_amqp::{
    AmqpMessage, AmqpValue, ENQUEUED_TIME_ANNOTATION, MessageBody, MessageProperties,
    OFFSET_ANNOTATION, PARTITION_KEY_ANNOTATION, SEQUENCE_NUMBER_ANNOTATION,
};
use eventhub_common::{EventHubError, timestamp};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

const JSON_CONTENT_TYPE: &str = "application/json";

/// A single event, either built for sending or decoded from a delivery.
///
/// Decoded events are immutable; outgoing events are assembled with the
/// consuming `with_*` methods.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventData {
    body: Bytes,
    partition_key: Option<String>,
    sequence_number: Option<i64>,
    enqueued_time: Option<DateTime<Utc>>,
    offset: Option<String>,
    properties: MessageProperties,
    system_properties: BTreeMap<String, AmqpValue>,
    application_properties: BTreeMap<String, AmqpValue>,
}

impl EventData {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    /// Serializes `value` as the body and marks the content type as JSON.
    pub fn from_json<T: Serialize>(value: &T) -> Result<Self, EventHubError> {
        let body = serde_json::to_vec(value)?;
        let mut event = Self::new(body);
        event.properties.content_type = Some(JSON_CONTENT_TYPE.to_owned());
        Ok(event)
    }

    pub fn with_partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    pub fn with_application_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<AmqpValue>,
    ) -> Self {
        self.application_properties.insert(key.into(), value.into());
        self
    }

    pub fn with_properties(mut self, properties: MessageProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn body_as_json<T: DeserializeOwned>(&self) -> Result<T, EventHubError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn partition_key(&self) -> Option<&str> {
        self.partition_key.as_deref()
    }

    pub fn sequence_number(&self) -> Option<i64> {
        self.sequence_number
    }

    pub fn enqueued_time(&self) -> Option<DateTime<Utc>> {
        self.enqueued_time
    }

    pub fn offset(&self) -> Option<&str> {
        self.offset.as_deref()
    }

    pub fn properties(&self) -> &MessageProperties {
        &self.properties
    }

    /// Service annotations (`x-opt-*`) of a received event.
    pub fn system_properties(&self) -> &BTreeMap<String, AmqpValue> {
        &self.system_properties
    }

    pub fn application_properties(&self) -> &BTreeMap<String, AmqpValue> {
        &self.application_properties
    }

    pub fn application_property(&self, key: &str) -> Option<&AmqpValue> {
        self.application_properties.get(key)
    }

    pub(crate) fn into_message(self) -> AmqpMessage {
        let mut message = AmqpMessage::with_data(self.body);
        message.properties = self.properties;
        message.application_properties = self.application_properties;
        if let Some(partition_key) = self.partition_key {
            message.message_annotations.insert(
                PARTITION_KEY_ANNOTATION.to_owned(),
                AmqpValue::String(partition_key),
            );
        }
        message
    }
}

impl From<AmqpMessage> for EventData {
    fn from(message: AmqpMessage) -> Self {
        let annotations = message.message_annotations;
        let body = match message.body {
            MessageBody::Data(sections) if sections.len() == 1 => sections[0].clone(),
            MessageBody::Data(sections) => Bytes::from(sections.concat()),
            MessageBody::Value(AmqpValue::Binary(bytes)) => bytes,
            MessageBody::Value(AmqpValue::String(text)) => Bytes::from(text),
            MessageBody::Value(_) | MessageBody::Empty => Bytes::new(),
        };

        Self {
            body,
            partition_key: annotations
                .get(PARTITION_KEY_ANNOTATION)
                .and_then(AmqpValue::as_str)
                .map(str::to_owned),
            sequence_number: annotations
                .get(SEQUENCE_NUMBER_ANNOTATION)
                .and_then(AmqpValue::as_i64),
            enqueued_time: annotations
                .get(ENQUEUED_TIME_ANNOTATION)
                .and_then(AmqpValue::as_i64)
                .and_then(timestamp::from_unix_millis),
            offset: annotations.get(OFFSET_ANNOTATION).and_then(|value| match value {
                AmqpValue::String(offset) => Some(offset.clone()),
                other => other.as_i64().map(|offset| offset.to_string()),
            }),
            properties: message.properties,
            system_properties: annotations,
            application_properties: message.application_properties,
        }
    }
}
