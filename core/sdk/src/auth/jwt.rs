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
use eventhub_common::{EventHubError, TokenInfo, TokenType};
use std::fmt::Debug;

/// Wraps a bearer token obtained elsewhere. The same token is presented for
/// every audience until it expires.
#[derive(Clone)]
pub struct JwtTokenProvider {
    token: String,
    expiry: i64,
}

impl JwtTokenProvider {
    pub fn new(token: impl Into<String>, expiry: i64) -> Self {
        Self {
            token: token.into(),
            expiry,
        }
    }
}

impl TokenProvider for JwtTokenProvider {
    fn get_token(&self, _audience: &str) -> Result<TokenInfo, EventHubError> {
        if self.token.is_empty() {
            return Err(EventHubError::InvalidArgument(
                "bearer token cannot be empty".to_owned(),
            ));
        }
        Ok(TokenInfo::new(self.token.clone(), TokenType::Jwt, self.expiry))
    }
}

impl Debug for JwtTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtTokenProvider")
            .field("token", &redact(&self.token))
            .field("expiry", &self.expiry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_return_wrapped_token() {
        let provider = JwtTokenProvider::new("eyJhbGciOi", 1_900_000_000);
        let token = provider.get_token("sb://ns/hub").unwrap();
        assert_eq!(token.token(), "eyJhbGciOi");
        assert_eq!(token.token_type(), TokenType::Jwt);
        assert_eq!(token.expiry(), 1_900_000_000);
    }
}
