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

use crate::config::RetryConfig;
use eventhub_common::EventHubError;
use std::future::Future;
use tracing::warn;

/// Runs `operation`, retrying retryable errors up to `config.max_retries`
/// times with a fixed interval in between.
pub(crate) async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, EventHubError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EventHubError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                warn!(
                    "{operation_name} failed with a retryable error: {error}, retrying ({attempt}/{}) in {}",
                    config.max_retries, config.interval
                );
                tokio::time::sleep(config.interval.get_duration()).await;
            }
            Err(error) => return Err(error),
        }
    }
}
