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

use crate::utils::timestamp;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum TokenType {
    #[strum(serialize = "jwt")]
    #[serde(rename = "jwt")]
    Jwt,
    #[strum(serialize = "servicebus.windows.net:sastoken")]
    #[serde(rename = "servicebus.windows.net:sastoken")]
    SasToken,
}

/// A security token for one audience. Never mutated: renewal asks the
/// provider for a fresh one.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenInfo {
    token: String,
    token_type: TokenType,
    expiry: i64,
}

impl TokenInfo {
    /// `expiry` is expressed in unix seconds.
    pub fn new(token: impl Into<String>, token_type: TokenType, expiry: i64) -> Self {
        Self {
            token: token.into(),
            token_type,
            expiry,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    pub fn expiry(&self) -> i64 {
        self.expiry
    }

    /// Time left until expiry, zero once expired.
    pub fn valid_for(&self) -> Duration {
        let remaining = self.expiry - timestamp::unix_seconds_now();
        Duration::from_secs(remaining.max(0) as u64)
    }
}

impl Debug for TokenInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = self.token.chars().take(3).collect::<String>();
        f.debug_struct("TokenInfo")
            .field("token", &format!("{redacted}***"))
            .field("token_type", &self.token_type)
            .field("expiry", &self.expiry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn should_use_wire_names_for_token_types() {
        assert_eq!(TokenType::Jwt.to_string(), "jwt");
        assert_eq!(
            TokenType::from_str("servicebus.windows.net:sastoken").unwrap(),
            TokenType::SasToken
        );
    }

    #[test]
    fn debug_output_should_not_leak_the_token() {
        let info = TokenInfo::new("SharedAccessSignature sr=secret", TokenType::SasToken, 0);
        let debug = format!("{info:?}");
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn expired_token_should_have_no_validity_left() {
        let info = TokenInfo::new("t", TokenType::Jwt, 0);
        assert_eq!(info.valid_for(), Duration::ZERO);
    }
}
