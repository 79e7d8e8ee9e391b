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

use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

/// Human-readable duration used throughout the configuration
/// (`"30s"`, `"500ms"`, `"1h 15m"`). Bare integers are read as seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EventHubDuration {
    duration: Duration,
}

impl EventHubDuration {
    pub const ZERO: EventHubDuration = EventHubDuration {
        duration: Duration::ZERO,
    };

    pub const fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    pub fn get_duration(&self) -> Duration {
        self.duration
    }

    pub fn as_secs(&self) -> u64 {
        self.duration.as_secs()
    }

    pub fn is_zero(&self) -> bool {
        self.duration.is_zero()
    }
}

impl FromStr for EventHubDuration {
    type Err = humantime::DurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if let Ok(secs) = value.parse::<u64>() {
            return Ok(Self::from_secs(secs));
        }
        Ok(Self::new(humantime::parse_duration(value)?))
    }
}

impl Display for EventHubDuration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", humantime::format_duration(self.duration))
    }
}

impl From<Duration> for EventHubDuration {
    fn from(duration: Duration) -> Self {
        Self::new(duration)
    }
}

impl From<EventHubDuration> for Duration {
    fn from(value: EventHubDuration) -> Self {
        value.duration
    }
}

impl Serialize for EventHubDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

struct EventHubDurationVisitor;

impl Visitor<'_> for EventHubDurationVisitor {
    type Value = EventHubDuration;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a duration such as \"30s\" or a number of seconds")
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(EventHubDuration::from_secs(value))
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        u64::try_from(value)
            .map(EventHubDuration::from_secs)
            .map_err(|_| E::custom("duration cannot be negative"))
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        EventHubDuration::from_str(value).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for EventHubDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(EventHubDurationVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_human_readable_values() {
        assert_eq!(
            EventHubDuration::from_str("500ms").unwrap().get_duration(),
            Duration::from_millis(500)
        );
        assert_eq!(
            EventHubDuration::from_str("1m 30s").unwrap().get_duration(),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn should_parse_bare_numbers_as_seconds() {
        assert_eq!(EventHubDuration::from_str("45").unwrap().as_secs(), 45);
    }

    #[test]
    fn should_deserialize_from_string_and_number() {
        let from_string: EventHubDuration = serde_json::from_str("\"2s\"").unwrap();
        let from_number: EventHubDuration = serde_json::from_str("2").unwrap();
        assert_eq!(from_string, from_number);
    }

    #[test]
    fn should_reject_garbage() {
        assert!(EventHubDuration::from_str("soon").is_err());
    }
}
