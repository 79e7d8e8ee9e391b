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

//! Lease-coordinated event processing.
//!
//! An [`EventProcessorHost`] competes with other hosts for one lease per
//! partition. For every lease it holds it opens an epoch receiver positioned
//! after the last checkpoint and feeds the events to an [`EventProcessor`].
//! Checkpoints are stored as lease content, so only the current holder can
//! write them.

mod config;
mod coordinator;
mod host;
mod lease;
mod partition_context;
mod processor;

pub use config::ProcessorHostConfig;
pub use coordinator::{LeaseCoordinator, LeaseEvent};
pub use host::EventProcessorHost;
pub use lease::{LeaseStore, MemoryLeaseStore, PartitionLease};
pub use partition_context::PartitionContext;
pub use processor::{CloseReason, EventProcessor};
