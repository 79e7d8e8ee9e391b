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

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Partition identifier. The service exposes partitions as strings, so
/// numeric ids are normalized into the same representation at the boundary.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(String);

impl PartitionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PartitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for PartitionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&String> for PartitionId {
    fn from(value: &String) -> Self {
        Self(value.clone())
    }
}

impl From<u32> for PartitionId {
    fn from(value: u32) -> Self {
        Self(value.to_string())
    }
}

impl From<&PartitionId> for PartitionId {
    fn from(value: &PartitionId) -> Self {
        value.clone()
    }
}

impl AsRef<str> for PartitionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_string_ids_should_be_equal() {
        assert_eq!(PartitionId::from(3u32), PartitionId::from("3"));
    }

    #[test]
    fn should_serialize_as_plain_string() {
        let json = serde_json::to_string(&PartitionId::from("7")).unwrap();
        assert_eq!(json, "\"7\"");
    }
}
