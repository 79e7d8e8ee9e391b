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

use eventhub_common::EventHubError;
use std::fmt::{Debug, Display};
use std::str::FromStr;
use url::Url;

const ENDPOINT: &str = "endpoint";
const SHARED_ACCESS_KEY_NAME: &str = "sharedaccesskeyname";
const SHARED_ACCESS_KEY: &str = "sharedaccesskey";
const ENTITY_PATH: &str = "entitypath";

/// `Endpoint=sb://<namespace>/;SharedAccessKeyName=<name>;SharedAccessKey=<key>[;EntityPath=<hub>]`
///
/// Keys are case-insensitive and may appear in any order.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    endpoint: String,
    host: String,
    shared_access_key_name: String,
    shared_access_key: String,
    entity_path: Option<String>,
}

impl ConnectionString {
    /// Normalized endpoint, always ending with `/`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn shared_access_key_name(&self) -> &str {
        &self.shared_access_key_name
    }

    pub fn shared_access_key(&self) -> &str {
        &self.shared_access_key
    }

    pub fn entity_path(&self) -> Option<&str> {
        self.entity_path.as_deref()
    }
}

impl FromStr for ConnectionString {
    type Err = EventHubError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut endpoint = None;
        let mut key_name = None;
        let mut key = None;
        let mut entity_path = None;

        for part in value.split(';').map(str::trim).filter(|part| !part.is_empty()) {
            let Some((name, value)) = part.split_once('=') else {
                return Err(EventHubError::InvalidArgument(format!(
                    "connection string segment '{part}' is not a key=value pair"
                )));
            };
            let value = value.trim().to_owned();
            match name.trim().to_ascii_lowercase().as_str() {
                ENDPOINT => endpoint = Some(value),
                SHARED_ACCESS_KEY_NAME => key_name = Some(value),
                SHARED_ACCESS_KEY => key = Some(value),
                ENTITY_PATH => entity_path = Some(value).filter(|path| !path.is_empty()),
                _ => {}
            }
        }

        let endpoint = endpoint.filter(|endpoint| !endpoint.is_empty()).ok_or_else(|| {
            EventHubError::InvalidArgument("connection string is missing Endpoint".to_owned())
        })?;
        let shared_access_key_name = key_name.filter(|name| !name.is_empty()).ok_or_else(|| {
            EventHubError::InvalidArgument(
                "connection string is missing SharedAccessKeyName".to_owned(),
            )
        })?;
        let shared_access_key = key.filter(|key| !key.is_empty()).ok_or_else(|| {
            EventHubError::InvalidArgument("connection string is missing SharedAccessKey".to_owned())
        })?;

        let url = Url::parse(&endpoint).map_err(|error| {
            EventHubError::InvalidArgument(format!("invalid endpoint '{endpoint}': {error}"))
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| {
                EventHubError::InvalidArgument(format!("endpoint '{endpoint}' has no host"))
            })?
            .to_owned();
        let endpoint = if endpoint.ends_with('/') {
            endpoint
        } else {
            format!("{endpoint}/")
        };

        Ok(Self {
            endpoint,
            host,
            shared_access_key_name,
            shared_access_key,
            entity_path,
        })
    }
}

impl Display for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Endpoint={};SharedAccessKeyName={};SharedAccessKey=***",
            self.endpoint, self.shared_access_key_name
        )?;
        if let Some(entity_path) = &self.entity_path {
            write!(f, ";EntityPath={entity_path}")?;
        }
        Ok(())
    }
}

impl Debug for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConnectionString({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn should_parse_all_segments() {
        let connection_string = ConnectionString::from_str(
            "Endpoint=sb://ns.servicebus.windows.net/;SharedAccessKeyName=Root;SharedAccessKey=abc=;EntityPath=hub",
        )
        .unwrap();

        assert_eq!(connection_string.endpoint(), "sb://ns.servicebus.windows.net/");
        assert_eq!(connection_string.host(), "ns.servicebus.windows.net");
        assert_eq!(connection_string.shared_access_key_name(), "Root");
        assert_eq!(connection_string.shared_access_key(), "abc=");
        assert_eq!(connection_string.entity_path(), Some("hub"));
    }

    #[test]
    fn keys_should_be_case_insensitive_and_order_free() {
        let connection_string = ConnectionString::from_str(
            "sharedaccesskey=k;ENTITYPATH=hub;endpoint=sb://ns.example.net;SHAREDACCESSKEYNAME=n",
        )
        .unwrap();
        assert_eq!(connection_string.endpoint(), "sb://ns.example.net/");
        assert_eq!(connection_string.entity_path(), Some("hub"));
    }

    #[test_case("SharedAccessKeyName=n;SharedAccessKey=k"; "missing endpoint")]
    #[test_case("Endpoint=sb://ns/;SharedAccessKey=k"; "missing key name")]
    #[test_case("Endpoint=sb://ns/;SharedAccessKeyName=n"; "missing key")]
    #[test_case("Endpoint=sb://ns/;SharedAccessKeyName=n;SharedAccessKey"; "segment without value")]
    fn should_reject_incomplete_connection_strings(value: &str) {
        assert!(matches!(
            ConnectionString::from_str(value),
            Err(EventHubError::InvalidArgument(_))
        ));
    }

    #[test]
    fn should_not_display_the_key() {
        let connection_string =
            ConnectionString::from_str("Endpoint=sb://ns/;SharedAccessKeyName=n;SharedAccessKey=secret")
                .unwrap();
        assert!(!connection_string.to_string().contains("secret"));
    }
}
