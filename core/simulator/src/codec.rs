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
use eventhub_amqp::{AmqpMessage, MessageCodec};
use eventhub_common::EventHubError;

/// Envelope codec of the simulator. Compact, but not AMQP wire encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostcardCodec;

impl MessageCodec for PostcardCodec {
    fn encode(&self, message: &AmqpMessage) -> Result<Bytes, EventHubError> {
        postcard::to_allocvec(message)
            .map(Bytes::from)
            .map_err(|error| EventHubError::Serialization(error.to_string()))
    }

    fn decode(&self, payload: &[u8]) -> Result<AmqpMessage, EventHubError> {
        postcard::from_bytes(payload).map_err(|error| EventHubError::DecodeError(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventhub_amqp::AmqpValue;

    #[test]
    fn should_decode_what_it_encodes() {
        let mut message = AmqpMessage::with_data(Bytes::from_static(b"body"));
        message
            .application_properties
            .insert("marker".to_owned(), AmqpValue::Bool(true));
        message
            .message_annotations
            .insert("x-opt-offset".to_owned(), AmqpValue::from("128"));

        let codec = PostcardCodec;
        let decoded = codec.decode(&codec.encode(&message).unwrap()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn should_fail_on_garbage() {
        assert!(matches!(
            PostcardCodec.decode(&[0xff, 0xff, 0xff]),
            Err(EventHubError::DecodeError(_))
        ));
    }
}
