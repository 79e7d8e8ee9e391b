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

mod jwt;
mod sas;

pub use jwt::JwtTokenProvider;
pub use sas::SasTokenProvider;

use eventhub_common::{EventHubError, TokenInfo};
use std::fmt::Debug;

/// Issues security tokens for an audience. Implementations hold key material
/// only; every call produces a fresh token.
pub trait TokenProvider: Send + Sync + Debug {
    fn get_token(&self, audience: &str) -> Result<TokenInfo, EventHubError>;
}

/// Keeps the first three characters of a secret for log output.
pub(crate) fn redact(secret: &str) -> String {
    format!("{}***", secret.chars().take(3).collect::<String>())
}
