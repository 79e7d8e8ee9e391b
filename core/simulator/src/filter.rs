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

use eventhub_common::EventHubError;

const OFFSET_FIELD: &str = "amqp.annotation.x-opt-offset";
const SEQUENCE_NUMBER_FIELD: &str = "amqp.annotation.x-opt-sequence-number";
const ENQUEUED_TIME_FIELD: &str = "amqp.annotation.x-opt-enqueued-time";

/// Parsed `<field> <op> '<value>'` selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StartPosition {
    Beginning,
    Latest,
    Offset { offset: i64, inclusive: bool },
    SequenceNumber { sequence_number: i64, inclusive: bool },
    EnqueuedTime { millis: i64, inclusive: bool },
}

impl StartPosition {
    pub fn parse(expression: &str) -> Result<Self, EventHubError> {
        let mut parts = expression.split_whitespace();
        let (Some(field), Some(operator), Some(value), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid(expression));
        };

        let inclusive = match operator {
            ">" => false,
            ">=" => true,
            _ => return Err(invalid(expression)),
        };
        let value = value
            .strip_prefix('\'')
            .and_then(|value| value.strip_suffix('\''))
            .ok_or_else(|| invalid(expression))?;

        match field {
            OFFSET_FIELD => match value {
                "-1" => Ok(StartPosition::Beginning),
                "@latest" => Ok(StartPosition::Latest),
                offset => Ok(StartPosition::Offset {
                    offset: offset.parse().map_err(|_| invalid(expression))?,
                    inclusive,
                }),
            },
            SEQUENCE_NUMBER_FIELD => Ok(StartPosition::SequenceNumber {
                sequence_number: value.parse().map_err(|_| invalid(expression))?,
                inclusive,
            }),
            ENQUEUED_TIME_FIELD => Ok(StartPosition::EnqueuedTime {
                millis: value.parse().map_err(|_| invalid(expression))?,
                inclusive,
            }),
            _ => Err(invalid(expression)),
        }
    }
}

fn invalid(expression: &str) -> EventHubError {
    EventHubError::InvalidField(format!("unsupported selector filter: {expression}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_well_known_positions() {
        assert_eq!(
            StartPosition::parse("amqp.annotation.x-opt-offset > '-1'").unwrap(),
            StartPosition::Beginning
        );
        assert_eq!(
            StartPosition::parse("amqp.annotation.x-opt-offset > '@latest'").unwrap(),
            StartPosition::Latest
        );
        assert_eq!(
            StartPosition::parse("amqp.annotation.x-opt-sequence-number >= '5'").unwrap(),
            StartPosition::SequenceNumber {
                sequence_number: 5,
                inclusive: true
            }
        );
    }

    #[test]
    fn should_reject_unknown_fields() {
        assert!(matches!(
            StartPosition::parse("amqp.annotation.x-opt-unknown > '1'"),
            Err(EventHubError::InvalidField(_))
        ));
        assert!(StartPosition::parse("garbage").is_err());
    }
}
