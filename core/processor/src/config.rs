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

use eventhub_common::{EventHubDuration, EventHubError, EventPosition, ReceiveFilterOptions};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

const ENV_PREFIX: &str = "EVENTHUB_PROCESSOR_";
const ENV_SEPARATOR: &str = "__";
const MIN_LEASE_DURATION: EventHubDuration = EventHubDuration::from_secs(4);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorHostConfig {
    /// Recorded as the owner of every checkpoint this host writes.
    pub host_name: String,
    pub consumer_group: String,
    pub lease_duration: EventHubDuration,
    pub receive_batch_size: usize,
    pub receive_wait: EventHubDuration,
    /// Where a partition without a checkpoint starts.
    pub initial_position: ReceiveFilterOptions,
    pub lease_container: String,
    pub checkpoint_on_close: bool,
}

impl Default for ProcessorHostConfig {
    fn default() -> Self {
        Self {
            host_name: format!("host-{}", Uuid::now_v7()),
            consumer_group: "$default".to_owned(),
            lease_duration: EventHubDuration::from_secs(30),
            receive_batch_size: 100,
            receive_wait: EventHubDuration::from_secs(1),
            initial_position: ReceiveFilterOptions {
                start_of_stream: true,
                ..Default::default()
            },
            lease_container: "leases".to_owned(),
            checkpoint_on_close: true,
        }
    }
}

impl ProcessorHostConfig {
    pub fn new(host_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
            ..Default::default()
        }
    }

    /// Loads defaults, then the TOML file at `path` if it exists, then
    /// `EVENTHUB_PROCESSOR_*` environment variables. Nested keys use `__`,
    /// e.g. `EVENTHUB_PROCESSOR_INITIAL_POSITION__OFFSET`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EventHubError> {
        let path = path.as_ref();
        info!("Loading processor host configuration from {}", path.display());
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split(ENV_SEPARATOR))
            .extract()
            .map_err(|error| EventHubError::InvalidConfiguration(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EventHubError> {
        if self.host_name.trim().is_empty() {
            return Err(EventHubError::InvalidConfiguration(
                "host name cannot be empty".to_owned(),
            ));
        }
        if self.consumer_group.is_empty() {
            return Err(EventHubError::InvalidConfiguration(
                "consumer group cannot be empty".to_owned(),
            ));
        }
        if self.lease_container.is_empty() {
            return Err(EventHubError::InvalidConfiguration(
                "lease container cannot be empty".to_owned(),
            ));
        }
        if self.lease_duration < MIN_LEASE_DURATION {
            return Err(EventHubError::InvalidConfiguration(format!(
                "lease duration must be at least {MIN_LEASE_DURATION}, got {}",
                self.lease_duration
            )));
        }
        if self.receive_batch_size == 0 {
            return Err(EventHubError::InvalidConfiguration(
                "receive batch size must be greater than zero".to_owned(),
            ));
        }
        if self.receive_wait.is_zero() {
            return Err(EventHubError::InvalidConfiguration(
                "receive wait cannot be zero".to_owned(),
            ));
        }
        self.initial_position()?;
        Ok(())
    }

    pub fn initial_position(&self) -> Result<EventPosition, EventHubError> {
        EventPosition::try_from(&self.initial_position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use test_case::test_case;

    #[test]
    fn defaults_should_be_valid() {
        let config = ProcessorHostConfig::new("host-a");
        assert!(config.validate().is_ok());
        assert_eq!(config.lease_duration.as_secs(), 30);
        assert_eq!(config.initial_position().unwrap(), EventPosition::StartOfStream);
    }

    #[test]
    fn should_load_toml_file_over_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
host_name = "host-b"
consumer_group = "analytics"
lease_duration = "20s"
receive_wait = "250ms"
checkpoint_on_close = false

[initial_position]
start_of_stream = false
offset = "4096"
"#
        )
        .unwrap();

        let config = ProcessorHostConfig::load(file.path()).unwrap();

        assert_eq!(config.host_name, "host-b");
        assert_eq!(config.consumer_group, "analytics");
        assert_eq!(config.lease_duration, EventHubDuration::from_secs(20));
        assert_eq!(config.receive_wait, EventHubDuration::from_millis(250));
        assert_eq!(config.receive_batch_size, 100);
        assert!(!config.checkpoint_on_close);
        assert_eq!(
            config.initial_position().unwrap(),
            EventPosition::after_offset("4096")
        );
    }

    #[test]
    fn conflicting_initial_positions_should_fail_to_load() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[initial_position]\nsequence_number = 10").unwrap();

        let result = ProcessorHostConfig::load(file.path());

        assert!(matches!(result, Err(EventHubError::InvalidArgument(_))));
    }

    #[test]
    fn missing_file_should_yield_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProcessorHostConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.consumer_group, "$default");
        assert_eq!(config.lease_container, "leases");
    }

    #[test_case(|c: &mut ProcessorHostConfig| c.host_name = " ".into(); "blank host name")]
    #[test_case(|c: &mut ProcessorHostConfig| c.consumer_group.clear(); "empty consumer group")]
    #[test_case(|c: &mut ProcessorHostConfig| c.lease_duration = EventHubDuration::from_secs(1); "short lease")]
    #[test_case(|c: &mut ProcessorHostConfig| c.receive_batch_size = 0; "empty batch")]
    #[test_case(|c: &mut ProcessorHostConfig| c.receive_wait = EventHubDuration::ZERO; "zero wait")]
    fn should_reject_invalid_settings(change: fn(&mut ProcessorHostConfig)) {
        let mut config = ProcessorHostConfig::new("host-a");
        change(&mut config);
        assert!(matches!(
            config.validate(),
            Err(EventHubError::InvalidConfiguration(_))
        ));
    }
}
