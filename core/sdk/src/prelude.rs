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

//! Prelude module for the event hub client.
//!
//! Re-exports the types needed by most producers and consumers.
//!
//! ```
//! use eventhub::prelude::*;
//! ```

pub use crate::auth::{JwtTokenProvider, SasTokenProvider, TokenProvider};
pub use crate::{
    ConnectionString, DEFAULT_CONSUMER_GROUP, DeliveryReceipt, EventData, EventHubClient,
    EventHubClientConfig, EventReceiver, EventSender, HubRuntimeInformation,
    PartitionRuntimeInformation, ReceiverOptions, ReceiverRuntimeInfo, ReceiverStatus,
    RetryConfig,
};
pub use eventhub_amqp::{AmqpConnector, AmqpValue, MessageProperties};
pub use eventhub_common::{
    CheckpointInfo, EventHubDuration, EventHubError, EventPosition, PartitionId,
    ReceiveFilterOptions, TokenInfo, TokenType,
};
