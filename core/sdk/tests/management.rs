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

mod common;

use eventhub::prelude::*;
use eventhub_simulator::EventHubSimulator;

#[tokio::test]
async fn should_return_partition_ids() {
    common::init_tracing();
    let simulator = EventHubSimulator::new("telemetry", 4);
    let client = common::client(&simulator);

    let partition_ids = client.get_partition_ids().await.unwrap();

    let expected: Vec<_> = (0..4u32).map(PartitionId::from).collect();
    assert_eq!(partition_ids, expected);
}

#[tokio::test]
async fn should_describe_the_hub() {
    common::init_tracing();
    let simulator = EventHubSimulator::new("telemetry", 2);
    let client = common::client(&simulator);

    let info = client.get_hub_runtime_information().await.unwrap();

    assert_eq!(info.path, "telemetry");
    assert_eq!(info.partition_count, 2);
    assert_eq!(info.partition_ids.len(), 2);
}

#[tokio::test]
async fn should_describe_partitions() {
    common::init_tracing();
    let simulator = EventHubSimulator::new("telemetry", 2);
    let client = common::client(&simulator);
    let sender = client.create_sender(Some(PartitionId::from("1")));
    for i in 0..3 {
        sender.send(EventData::new(format!("{i}")), None).await.unwrap();
    }

    let empty = client
        .get_partition_information(&PartitionId::from("0"))
        .await
        .unwrap();
    let filled = client
        .get_partition_information(&PartitionId::from("1"))
        .await
        .unwrap();

    assert!(empty.is_empty);
    assert_eq!(empty.last_enqueued_sequence_number, -1);
    assert!(!filled.is_empty);
    assert_eq!(filled.beginning_sequence_number, 0);
    assert_eq!(filled.last_enqueued_sequence_number, 2);
    assert!(filled.last_enqueued_time_utc.is_some());
    assert_eq!(filled.hub_path, "telemetry");
}

#[tokio::test]
async fn unknown_partition_should_be_not_found() {
    common::init_tracing();
    let simulator = EventHubSimulator::new("telemetry", 2);
    let client = common::client(&simulator);

    let result = client
        .get_partition_information(&PartitionId::from("7"))
        .await;

    assert!(matches!(result, Err(EventHubError::NotFound(_))));
}

#[tokio::test]
async fn management_queries_should_not_open_a_cbs_session() {
    common::init_tracing();
    let simulator = EventHubSimulator::new("telemetry", 2);
    let client = common::client(&simulator);

    client.get_partition_ids().await.unwrap();
    client.get_partition_ids().await.unwrap();

    assert_eq!(simulator.cbs_sessions_created(), 0);
    assert_eq!(simulator.connections_opened(), 1);
}
