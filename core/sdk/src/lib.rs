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

pub mod auth;
pub mod batch;
mod cbs;
mod client;
mod config;
mod connection;
mod connection_string;
mod event_data;
mod management;
pub mod prelude;
mod receiver;
mod renewal;
mod request_response;
mod retry;
mod sender;

pub use client::EventHubClient;
pub use config::{EventHubClientConfig, RetryConfig};
pub use connection_string::ConnectionString;
pub use event_data::EventData;
pub use management::{HubRuntimeInformation, PartitionRuntimeInformation};
pub use receiver::{
    DEFAULT_CONSUMER_GROUP, EventReceiver, ReceiverOptions, ReceiverRuntimeInfo, ReceiverStatus,
};
pub use sender::{DeliveryReceipt, EventSender};
