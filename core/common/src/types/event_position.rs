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

use crate::error::eventhub_error::EventHubError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const OFFSET_ANNOTATION: &str = "amqp.annotation.x-opt-offset";
const SEQUENCE_NUMBER_ANNOTATION: &str = "amqp.annotation.x-opt-sequence-number";
const ENQUEUED_TIME_ANNOTATION: &str = "amqp.annotation.x-opt-enqueued-time";
const START_OF_STREAM_OFFSET: &str = "-1";
const END_OF_STREAM_OFFSET: &str = "@latest";

/// Where a receiver starts reading a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPosition {
    StartOfStream,
    EndOfStream,
    Offset { offset: String, inclusive: bool },
    SequenceNumber { sequence_number: i64, inclusive: bool },
    EnqueuedTime(DateTime<Utc>),
    Custom(String),
}

impl EventPosition {
    pub fn after_offset(offset: impl Into<String>) -> Self {
        EventPosition::Offset {
            offset: offset.into(),
            inclusive: false,
        }
    }

    pub fn after_sequence_number(sequence_number: i64) -> Self {
        EventPosition::SequenceNumber {
            sequence_number,
            inclusive: false,
        }
    }

    /// Compiles the position into the selector expression attached to the
    /// receive source.
    pub fn to_filter_expression(&self) -> String {
        match self {
            EventPosition::StartOfStream => {
                format!("{OFFSET_ANNOTATION} > '{START_OF_STREAM_OFFSET}'")
            }
            EventPosition::EndOfStream => {
                format!("{OFFSET_ANNOTATION} > '{END_OF_STREAM_OFFSET}'")
            }
            EventPosition::Offset { offset, inclusive } => {
                format!("{OFFSET_ANNOTATION} {} '{offset}'", operator(*inclusive))
            }
            EventPosition::SequenceNumber {
                sequence_number,
                inclusive,
            } => format!(
                "{SEQUENCE_NUMBER_ANNOTATION} {} '{sequence_number}'",
                operator(*inclusive)
            ),
            EventPosition::EnqueuedTime(time) => {
                format!(
                    "{ENQUEUED_TIME_ANNOTATION} > '{}'",
                    time.timestamp_millis()
                )
            }
            EventPosition::Custom(expression) => expression.clone(),
        }
    }
}

fn operator(inclusive: bool) -> &'static str {
    if inclusive { ">=" } else { ">" }
}

/// Flat, deserializable form of a receive filter as it appears in
/// configuration. At most one position may be selected.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiveFilterOptions {
    pub start_of_stream: bool,
    pub end_of_stream: bool,
    pub offset: Option<String>,
    pub sequence_number: Option<i64>,
    pub enqueued_time: Option<DateTime<Utc>>,
    pub custom_filter: Option<String>,
    pub inclusive: bool,
}

impl TryFrom<&ReceiveFilterOptions> for EventPosition {
    type Error = EventHubError;

    fn try_from(options: &ReceiveFilterOptions) -> Result<Self, Self::Error> {
        let mut selected = Vec::with_capacity(1);
        if options.start_of_stream {
            selected.push(EventPosition::StartOfStream);
        }
        if options.end_of_stream {
            selected.push(EventPosition::EndOfStream);
        }
        if let Some(offset) = &options.offset {
            selected.push(EventPosition::Offset {
                offset: offset.clone(),
                inclusive: options.inclusive,
            });
        }
        if let Some(sequence_number) = options.sequence_number {
            selected.push(EventPosition::SequenceNumber {
                sequence_number,
                inclusive: options.inclusive,
            });
        }
        if let Some(time) = options.enqueued_time {
            selected.push(EventPosition::EnqueuedTime(time));
        }
        if let Some(expression) = &options.custom_filter {
            if expression.trim().is_empty() {
                return Err(EventHubError::InvalidArgument(
                    "custom filter expression cannot be empty".to_owned(),
                ));
            }
            selected.push(EventPosition::Custom(expression.clone()));
        }

        match selected.len() {
            0 => Ok(EventPosition::StartOfStream),
            1 => Ok(selected.remove(0)),
            count => Err(EventHubError::InvalidArgument(format!(
                "only one receive filter may be set, got {count}"
            ))),
        }
    }
}
