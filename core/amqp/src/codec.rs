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

use crate::message::AmqpMessage;
use bytes::Bytes;
use eventhub_common::EventHubError;
use std::fmt::Debug;

/// Turns envelopes into delivery payloads and back.
///
/// The transport owns the concrete encoding; the client only needs it to
/// build batch envelopes, where each inner envelope is encoded on its own
/// and carried as a data section of the outer one.
pub trait MessageCodec: Send + Sync + Debug {
    fn encode(&self, message: &AmqpMessage) -> Result<Bytes, EventHubError>;

    fn decode(&self, payload: &[u8]) -> Result<AmqpMessage, EventHubError>;
}
