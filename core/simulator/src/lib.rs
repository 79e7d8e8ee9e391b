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

//! An in-memory event hub that speaks the client transport traits.
//!
//! The simulator keeps partitions as append-only vectors, answers `$cbs`
//! and `$management` requests, honors selector filters and epochs, and
//! exposes knobs for credit, token denial and message size so client
//! behavior can be exercised without a live namespace.

mod codec;
mod connection;
mod filter;
mod hub;
mod links;
mod responders;

pub use codec::PostcardCodec;
pub use hub::{
    DEFAULT_HOST, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_SENDER_CREDIT, EventHubSimulator,
    SIMULATOR_KEY, SIMULATOR_KEY_NAME, SimulatorOptions,
};
