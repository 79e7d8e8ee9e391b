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

use crate::error::eventhub_error::EventHubError;
use crate::types::partition_id::PartitionId;
use serde::{Deserialize, Serialize};

/// Durable consumption position of a partition, stored as the lease content.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointInfo {
    pub partition_id: PartitionId,
    pub owner: String,
    pub token: String,
    pub epoch: i64,
    pub offset: String,
    pub sequence_number: i64,
}

impl CheckpointInfo {
    pub fn new(partition_id: impl Into<PartitionId>) -> Self {
        Self {
            partition_id: partition_id.into(),
            ..Default::default()
        }
    }

    /// Whether an event position was ever recorded.
    pub fn has_position(&self) -> bool {
        !self.offset.is_empty()
    }

    pub fn to_json(&self) -> Result<String, EventHubError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses lease content. Empty content means nothing was written yet.
    pub fn from_json(content: &str) -> Result<Option<Self>, EventHubError> {
        if content.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(content)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_use_camel_case_persisted_format() {
        let checkpoint = CheckpointInfo {
            partition_id: "1".into(),
            owner: "host-a".to_owned(),
            token: "t-1".to_owned(),
            epoch: 3,
            offset: "4096".to_owned(),
            sequence_number: 17,
        };
        let json: serde_json::Value =
            serde_json::from_str(&checkpoint.to_json().unwrap()).unwrap();
        assert_eq!(json["partitionId"], "1");
        assert_eq!(json["owner"], "host-a");
        assert_eq!(json["token"], "t-1");
        assert_eq!(json["epoch"], 3);
        assert_eq!(json["offset"], "4096");
        assert_eq!(json["sequenceNumber"], 17);
    }

    #[test]
    fn empty_content_should_mean_no_checkpoint() {
        assert_eq!(CheckpointInfo::from_json("").unwrap(), None);
        assert_eq!(CheckpointInfo::from_json("  \n").unwrap(), None);
    }

    #[test]
    fn malformed_content_should_fail() {
        let result = CheckpointInfo::from_json("{not json");
        assert!(matches!(result, Err(EventHubError::Serialization(_))));
    }
}
