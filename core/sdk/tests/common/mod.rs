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

use eventhub::EventHubClient;
use eventhub::EventHubClientConfig;
use eventhub::auth::SasTokenProvider;
use eventhub_simulator::{EventHubSimulator, SIMULATOR_KEY, SIMULATOR_KEY_NAME};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, interval};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_test_writer()
        .try_init();
}

pub fn client(simulator: &EventHubSimulator) -> EventHubClient {
    EventHubClient::from_connection_string(
        &simulator.connection_string(),
        None,
        simulator.connector(),
    )
    .expect("client should be created")
}

pub fn client_with(
    simulator: &EventHubSimulator,
    configure: impl FnOnce(EventHubClientConfig) -> EventHubClientConfig,
) -> EventHubClient {
    let config = configure(EventHubClientConfig::new(
        simulator.endpoint(),
        simulator.name(),
    ));
    let token_provider = SasTokenProvider::new(SIMULATOR_KEY_NAME, SIMULATOR_KEY)
        .expect("token provider should be created");
    EventHubClient::new(config, Arc::new(token_provider), simulator.connector())
        .expect("client should be created")
}

/// Polls `condition` until it returns true, or panics after `timeout`.
#[allow(dead_code)]
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    let mut ticker = interval(Duration::from_millis(20));
    loop {
        ticker.tick().await;
        if condition().await {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "eventually: condition not met within {timeout:?}"
        );
    }
}
