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

use bon::Builder;
use eventhub_common::{EventHubDuration, EventHubError};
use serde::{Deserialize, Serialize};

const DEFAULT_PREFETCH: u32 = 500;

/// Options shared by every link of an [`EventHubClient`](crate::EventHubClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct EventHubClientConfig {
    /// Namespace endpoint, e.g. `sb://my-namespace.servicebus.windows.net/`.
    #[builder(into)]
    pub endpoint: String,
    /// Name of the event hub.
    #[builder(into)]
    pub entity_path: String,
    #[serde(default = "default_operation_timeout")]
    #[builder(default = default_operation_timeout())]
    pub operation_timeout: EventHubDuration,
    /// Upper bound for a send, including the time spent waiting for credit.
    #[serde(default = "default_send_timeout")]
    #[builder(default = default_send_timeout())]
    pub send_timeout: EventHubDuration,
    #[serde(default = "default_credit_retry_interval")]
    #[builder(default = default_credit_retry_interval())]
    pub credit_retry_interval: EventHubDuration,
    /// How long before token expiry the claim is renewed.
    #[serde(default = "default_token_renewal_margin")]
    #[builder(default = default_token_renewal_margin())]
    pub token_renewal_margin: EventHubDuration,
    #[serde(default = "default_prefetch")]
    #[builder(default = DEFAULT_PREFETCH)]
    pub prefetch: u32,
    #[serde(default)]
    #[builder(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub interval: EventHubDuration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            interval: EventHubDuration::from_secs(1),
        }
    }
}

impl EventHubClientConfig {
    pub fn new(endpoint: impl Into<String>, entity_path: impl Into<String>) -> Self {
        Self::builder()
            .endpoint(endpoint)
            .entity_path(entity_path)
            .build()
    }

    pub fn validate(&self) -> Result<(), EventHubError> {
        if self.endpoint.is_empty() {
            return Err(EventHubError::InvalidConfiguration(
                "endpoint cannot be empty".to_owned(),
            ));
        }
        if self.entity_path.is_empty() {
            return Err(EventHubError::InvalidConfiguration(
                "entity path cannot be empty".to_owned(),
            ));
        }
        if self.prefetch == 0 {
            return Err(EventHubError::InvalidConfiguration(
                "prefetch must be greater than zero".to_owned(),
            ));
        }
        if self.operation_timeout.is_zero() || self.send_timeout.is_zero() {
            return Err(EventHubError::InvalidConfiguration(
                "timeouts must be greater than zero".to_owned(),
            ));
        }
        if self.credit_retry_interval.is_zero() {
            return Err(EventHubError::InvalidConfiguration(
                "credit retry interval must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }

    /// Endpoint with a guaranteed trailing slash.
    pub fn normalized_endpoint(&self) -> String {
        if self.endpoint.ends_with('/') {
            self.endpoint.clone()
        } else {
            format!("{}/", self.endpoint)
        }
    }

    /// Claim audience for a link address.
    pub fn audience(&self, address: &str) -> String {
        format!("{}{address}", self.normalized_endpoint())
    }

    /// Host part of the endpoint, without scheme or path.
    pub fn host(&self) -> Result<String, EventHubError> {
        let url = url::Url::parse(&self.endpoint).map_err(|error| {
            EventHubError::InvalidConfiguration(format!(
                "invalid endpoint '{}': {error}",
                self.endpoint
            ))
        })?;
        url.host_str().map(str::to_owned).ok_or_else(|| {
            EventHubError::InvalidConfiguration(format!("endpoint '{}' has no host", self.endpoint))
        })
    }
}

fn default_operation_timeout() -> EventHubDuration {
    EventHubDuration::from_secs(60)
}

fn default_send_timeout() -> EventHubDuration {
    EventHubDuration::from_secs(60)
}

fn default_credit_retry_interval() -> EventHubDuration {
    EventHubDuration::from_millis(100)
}

fn default_token_renewal_margin() -> EventHubDuration {
    EventHubDuration::from_secs(900)
}

fn default_prefetch() -> u32 {
    DEFAULT_PREFETCH
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn builder_should_fill_defaults() {
        let config = EventHubClientConfig::builder()
            .endpoint("sb://ns.servicebus.windows.net")
            .entity_path("hub")
            .prefetch(10)
            .build();

        assert_eq!(config.prefetch, 10);
        assert_eq!(config.send_timeout.get_duration(), Duration::from_secs(60));
        assert_eq!(config.token_renewal_margin.as_secs(), 900);
        assert_eq!(config.retry.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_deserialize_human_readable_durations() {
        let config: EventHubClientConfig = serde_json::from_str(
            r#"{"endpoint":"sb://ns/","entity_path":"hub","send_timeout":"5s","credit_retry_interval":"20ms"}"#,
        )
        .unwrap();

        assert_eq!(config.send_timeout.get_duration(), Duration::from_secs(5));
        assert_eq!(
            config.credit_retry_interval.get_duration(),
            Duration::from_millis(20)
        );
        assert_eq!(config.prefetch, 500);
    }

    #[test]
    fn audience_should_join_endpoint_and_address() {
        let config = EventHubClientConfig::new("sb://ns.servicebus.windows.net", "hub");
        assert_eq!(
            config.audience("hub/Partitions/0"),
            "sb://ns.servicebus.windows.net/hub/Partitions/0"
        );
        assert_eq!(config.host().unwrap(), "ns.servicebus.windows.net");
    }

    #[test]
    fn should_reject_zero_prefetch() {
        let mut config = EventHubClientConfig::new("sb://ns/", "hub");
        config.prefetch = 0;
        assert!(matches!(
            config.validate(),
            Err(EventHubError::InvalidConfiguration(_))
        ));
    }
}
