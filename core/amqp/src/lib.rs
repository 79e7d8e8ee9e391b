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

mod codec;
mod filter;
mod link;
mod message;
mod transport;

pub use codec::MessageCodec;
pub use filter::{SELECTOR_FILTER_CODE, SELECTOR_FILTER_NAME, SelectorFilter};
pub use link::{
    AmqpErrorInfo, BATCH_MESSAGE_FORMAT, DEFAULT_MESSAGE_FORMAT, Delivery, DeliveryOutcome,
    EPOCH_PROPERTY, LinkEvent, ReceiverLinkHandle, ReceiverLinkOptions, SenderLinkOptions,
};
pub use message::{
    AmqpMessage, AmqpValue, ENQUEUED_TIME_ANNOTATION, MessageBody, MessageProperties,
    OFFSET_ANNOTATION, PARTITION_KEY_ANNOTATION, SEQUENCE_NUMBER_ANNOTATION,
};
pub use transport::{
    AmqpConnection, AmqpConnector, AmqpSenderLink, AmqpReceiverLink, AmqpSession,
    ConnectionOptions,
};
