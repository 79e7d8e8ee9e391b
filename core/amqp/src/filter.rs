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

pub const SELECTOR_FILTER_NAME: &str = "apache.org:selector-filter:string";
pub const SELECTOR_FILTER_CODE: u64 = 0x0000_468C_0000_0004;

/// Described selector filter attached to a receive source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorFilter {
    pub descriptor_name: String,
    pub descriptor_code: u64,
    pub expression: String,
}

impl SelectorFilter {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            descriptor_name: SELECTOR_FILTER_NAME.to_owned(),
            descriptor_code: SELECTOR_FILTER_CODE,
            expression: expression.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_use_well_known_descriptor() {
        let filter = SelectorFilter::new("amqp.annotation.x-opt-offset > '-1'");
        assert_eq!(filter.descriptor_name, "apache.org:selector-filter:string");
        assert_eq!(filter.descriptor_code, 77_567_109_365_764);
    }
}
