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

use crate::auth::{TokenProvider, redact};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use eventhub_common::{EventHubError, TokenInfo, TokenType, timestamp};
use ring::hmac;
use std::fmt::Debug;
use std::time::Duration;

pub const DEFAULT_TOKEN_VALIDITY: Duration = Duration::from_secs(3600);

/// Shared access signature provider.
///
/// The signature is `HMAC-SHA256(key, urlencode(audience) + "\n" + expiry)`,
/// base64 encoded and url encoded again inside the token.
pub struct SasTokenProvider {
    key_name: String,
    key: String,
    validity: Duration,
}

impl SasTokenProvider {
    pub fn new(key_name: impl Into<String>, key: impl Into<String>) -> Result<Self, EventHubError> {
        let key_name = key_name.into();
        let key = key.into();
        if key_name.is_empty() {
            return Err(EventHubError::InvalidArgument(
                "shared access key name cannot be empty".to_owned(),
            ));
        }
        if key.is_empty() {
            return Err(EventHubError::InvalidArgument(
                "shared access key cannot be empty".to_owned(),
            ));
        }
        Ok(Self {
            key_name,
            key,
            validity: DEFAULT_TOKEN_VALIDITY,
        })
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    fn sign(&self, audience: &str, expiry: i64) -> String {
        let encoded_audience = encode(audience);
        let string_to_sign = format!("{encoded_audience}\n{expiry}");
        let key = hmac::Key::new(hmac::HMAC_SHA256, self.key.as_bytes());
        let signature = STANDARD.encode(hmac::sign(&key, string_to_sign.as_bytes()).as_ref());
        format!(
            "SharedAccessSignature sr={encoded_audience}&sig={}&se={expiry}&skn={}",
            encode(&signature),
            self.key_name
        )
    }
}

impl TokenProvider for SasTokenProvider {
    fn get_token(&self, audience: &str) -> Result<TokenInfo, EventHubError> {
        if audience.is_empty() {
            return Err(EventHubError::InvalidArgument(
                "token audience cannot be empty".to_owned(),
            ));
        }
        let expiry = timestamp::unix_seconds_now() + self.validity.as_secs() as i64;
        Ok(TokenInfo::new(
            self.sign(audience, expiry),
            TokenType::SasToken,
            expiry,
        ))
    }
}

impl Debug for SasTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SasTokenProvider")
            .field("key_name", &self.key_name)
            .field("key", &redact(&self.key))
            .field("validity", &self.validity)
            .finish()
    }
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
