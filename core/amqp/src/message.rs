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
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PARTITION_KEY_ANNOTATION: &str = "x-opt-partition-key";
pub const SEQUENCE_NUMBER_ANNOTATION: &str = "x-opt-sequence-number";
pub const OFFSET_ANNOTATION: &str = "x-opt-offset";
pub const ENQUEUED_TIME_ANNOTATION: &str = "x-opt-enqueued-time";

/// Primitive and compound values carried in annotations, application
/// properties and value bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AmqpValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(String),
    Symbol(String),
    Binary(Bytes),
    /// Milliseconds since the unix epoch.
    Timestamp(i64),
    List(Vec<AmqpValue>),
    Map(BTreeMap<String, AmqpValue>),
}

impl AmqpValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmqpValue::String(value) | AmqpValue::Symbol(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AmqpValue::Int(value) | AmqpValue::Timestamp(value) => Some(*value),
            AmqpValue::UInt(value) => i64::try_from(*value).ok(),
            AmqpValue::String(value) => value.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AmqpValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, AmqpValue>> {
        match self {
            AmqpValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[AmqpValue]> {
        match self {
            AmqpValue::List(list) => Some(list),
            _ => None,
        }
    }
}

impl From<&str> for AmqpValue {
    fn from(value: &str) -> Self {
        AmqpValue::String(value.to_owned())
    }
}

impl From<String> for AmqpValue {
    fn from(value: String) -> Self {
        AmqpValue::String(value)
    }
}

impl From<i64> for AmqpValue {
    fn from(value: i64) -> Self {
        AmqpValue::Int(value)
    }
}

impl From<i32> for AmqpValue {
    fn from(value: i32) -> Self {
        AmqpValue::Int(value as i64)
    }
}

impl From<u64> for AmqpValue {
    fn from(value: u64) -> Self {
        AmqpValue::UInt(value)
    }
}

impl From<bool> for AmqpValue {
    fn from(value: bool) -> Self {
        AmqpValue::Bool(value)
    }
}

impl From<Bytes> for AmqpValue {
    fn from(value: Bytes) -> Self {
        AmqpValue::Binary(value)
    }
}

/// The bare-message `properties` section.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageProperties {
    pub message_id: Option<String>,
    pub user_id: Option<Bytes>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub reply_to: Option<String>,
    pub correlation_id: Option<String>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub absolute_expiry_time: Option<i64>,
    pub creation_time: Option<i64>,
    pub group_id: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageBody {
    /// One or more opaque data sections.
    Data(Vec<Bytes>),
    Value(AmqpValue),
    #[default]
    Empty,
}

/// An envelope as exchanged with the transport.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmqpMessage {
    pub properties: MessageProperties,
    pub message_annotations: BTreeMap<String, AmqpValue>,
    pub application_properties: BTreeMap<String, AmqpValue>,
    pub body: MessageBody,
}

impl AmqpMessage {
    pub fn with_data(data: Bytes) -> Self {
        Self {
            body: MessageBody::Data(vec![data]),
            ..Default::default()
        }
    }

    pub fn with_value(value: AmqpValue) -> Self {
        Self {
            body: MessageBody::Value(value),
            ..Default::default()
        }
    }

    pub fn application_property(&self, key: &str) -> Option<&AmqpValue> {
        self.application_properties.get(key)
    }

    pub fn annotation(&self, key: &str) -> Option<&AmqpValue> {
        self.message_annotations.get(key)
    }

    /// All data sections concatenated; empty for non-data bodies.
    pub fn data(&self) -> Bytes {
        match &self.body {
            MessageBody::Data(sections) if sections.len() == 1 => sections[0].clone(),
            MessageBody::Data(sections) => Bytes::from(sections.concat()),
            _ => Bytes::new(),
        }
    }
}
