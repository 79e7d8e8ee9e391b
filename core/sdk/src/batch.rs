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

//! Batch envelopes.
//!
//! Every inner envelope is encoded on its own and carried as one data
//! section of an outer envelope. The outer envelope borrows the annotations,
//! properties and application properties of the first inner envelope so the
//! service can route the batch without opening it.

use eventhub_amqp::{
    AmqpMessage, BATCH_MESSAGE_FORMAT, DEFAULT_MESSAGE_FORMAT, Delivery, MessageBody, MessageCodec,
};
use eventhub_common::EventHubError;

pub fn encode_batch(
    codec: &dyn MessageCodec,
    messages: &[AmqpMessage],
) -> Result<Delivery, EventHubError> {
    let Some(first) = messages.first() else {
        return Err(EventHubError::InvalidArgument(
            "cannot send an empty batch".to_owned(),
        ));
    };

    let sections = messages
        .iter()
        .map(|message| codec.encode(message))
        .collect::<Result<Vec<_>, _>>()?;
    let envelope = AmqpMessage {
        properties: first.properties.clone(),
        message_annotations: first.message_annotations.clone(),
        application_properties: first.application_properties.clone(),
        body: MessageBody::Data(sections),
    };
    Ok(Delivery::new(codec.encode(&envelope)?, BATCH_MESSAGE_FORMAT))
}

/// Splits a delivery back into its envelopes. Non-batch deliveries yield a
/// single envelope.
pub fn decode_batch(
    codec: &dyn MessageCodec,
    delivery: &Delivery,
) -> Result<Vec<AmqpMessage>, EventHubError> {
    let envelope = codec.decode(&delivery.payload)?;
    if delivery.message_format != BATCH_MESSAGE_FORMAT {
        return Ok(vec![envelope]);
    }

    match envelope.body {
        MessageBody::Data(sections) => sections
            .iter()
            .map(|section| codec.decode(section))
            .collect(),
        _ => Err(EventHubError::DecodeError(
            "batch envelope does not carry data sections".to_owned(),
        )),
    }
}

pub(crate) fn encode_single(
    codec: &dyn MessageCodec,
    message: &AmqpMessage,
) -> Result<Delivery, EventHubError> {
    Ok(Delivery::new(codec.encode(message)?, DEFAULT_MESSAGE_FORMAT))
}
