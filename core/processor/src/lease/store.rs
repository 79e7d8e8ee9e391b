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

use async_trait::async_trait;
use eventhub_common::EventHubError;
use std::fmt::Debug;
use std::time::Duration;

/// Durable, lease-protected blobs. One resource backs one partition: the
/// lease fences writers and the content carries the checkpoint.
///
/// Implementations follow blob-lease semantics. While an unexpired lease is
/// held under one id, `acquire`, `renew`, `release` and `set_content` with a
/// different id fail with [`EventHubError::LeaseConflict`].
#[async_trait]
pub trait LeaseStore: Send + Sync + Debug {
    /// Creates an empty resource. An existing resource is left untouched.
    async fn create_if_not_exists(&self, resource: &str) -> Result<(), EventHubError>;

    /// Takes the lease on `resource` under `proposed_lease_id` for
    /// `duration` and returns the lease id now in force.
    async fn acquire(
        &self,
        resource: &str,
        duration: Duration,
        proposed_lease_id: &str,
    ) -> Result<String, EventHubError>;

    async fn renew(
        &self,
        resource: &str,
        lease_id: &str,
        duration: Duration,
    ) -> Result<(), EventHubError>;

    async fn release(&self, resource: &str, lease_id: &str) -> Result<(), EventHubError>;

    async fn set_content(
        &self,
        resource: &str,
        lease_id: &str,
        content: &str,
    ) -> Result<(), EventHubError>;

    async fn get_content(&self, resource: &str) -> Result<String, EventHubError>;
}
