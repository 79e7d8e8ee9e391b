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

use bytes::Bytes;
use eventhub::prelude::*;
use eventhub_simulator::EventHubSimulator;
use futures::StreamExt;
use std::time::Duration;

async fn send_all(sender: &std::sync::Arc<EventSender>, bodies: impl IntoIterator<Item = String>) {
    for body in bodies {
        sender.send(EventData::new(body), None).await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn receiver_at_end_of_stream_should_only_see_new_events() {
    common::init_tracing();
    let simulator = EventHubSimulator::new("telemetry", 2);
    let client = common::client(&simulator);
    let sender = client.create_sender(Some(PartitionId::from("0")));
    send_all(&sender, (0..10).map(|i| format!("old-{i}"))).await;

    let receiver = client
        .create_receiver(
            DEFAULT_CONSUMER_GROUP,
            "0",
            ReceiverOptions::new(EventPosition::EndOfStream),
        )
        .unwrap();
    receiver.init().await.unwrap();
    sender
        .send(
            EventData::new("marker").with_application_property("marker", true),
            None,
        )
        .await
        .unwrap();

    let first = receiver.receive(10, Duration::from_secs(5)).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(
        first[0]
            .application_property("marker")
            .and_then(AmqpValue::as_bool),
        Some(true)
    );
    assert_eq!(first[0].sequence_number(), Some(10));

    let second = receiver.receive(10, Duration::from_secs(10)).await.unwrap();
    assert!(second.is_empty());
}

#[tokio::test(start_paused = true)]
async fn receiver_should_read_from_start_with_positions() {
    common::init_tracing();
    let simulator = EventHubSimulator::new("telemetry", 1);
    let client = common::client(&simulator);
    let sender = client.create_sender(Some(PartitionId::from("0")));
    send_all(&sender, (0..3).map(|i| format!("event-{i}"))).await;

    let receiver = client
        .create_receiver(
            DEFAULT_CONSUMER_GROUP,
            "0",
            ReceiverOptions::new(EventPosition::StartOfStream),
        )
        .unwrap();
    let events = receiver.receive(3, Duration::from_secs(5)).await.unwrap();

    let bodies: Vec<_> = events.iter().map(|event| event.body().clone()).collect();
    assert_eq!(
        bodies,
        vec![
            Bytes::from("event-0"),
            Bytes::from("event-1"),
            Bytes::from("event-2")
        ]
    );
    let sequence_numbers: Vec<_> = events.iter().map(EventData::sequence_number).collect();
    assert_eq!(sequence_numbers, vec![Some(0), Some(1), Some(2)]);
    assert!(events.iter().all(|event| event.offset().is_some()));
    assert!(events.iter().all(|event| event.enqueued_time().is_some()));
}

#[tokio::test(start_paused = true)]
async fn receiver_after_offset_should_skip_that_event() {
    common::init_tracing();
    let simulator = EventHubSimulator::new("telemetry", 1);
    let client = common::client(&simulator);
    let sender = client.create_sender(Some(PartitionId::from("0")));
    send_all(&sender, (0..4).map(|i| format!("event-{i}"))).await;

    let start = client
        .create_receiver(
            DEFAULT_CONSUMER_GROUP,
            "0",
            ReceiverOptions::new(EventPosition::StartOfStream),
        )
        .unwrap();
    let all = start.receive(4, Duration::from_secs(5)).await.unwrap();
    let second_offset = all[1].offset().unwrap().to_owned();

    let resumed = client
        .create_receiver(
            DEFAULT_CONSUMER_GROUP,
            "0",
            ReceiverOptions::new(EventPosition::after_offset(second_offset)),
        )
        .unwrap();
    let rest = resumed.receive(10, Duration::from_secs(1)).await.unwrap();

    assert_eq!(rest.len(), 2);
    assert_eq!(rest[0].body(), &Bytes::from("event-2"));
}

#[tokio::test(start_paused = true)]
async fn higher_epoch_should_steal_the_partition() {
    common::init_tracing();
    let simulator = EventHubSimulator::new("telemetry", 1);
    let client = common::client(&simulator);
    let first = client
        .create_receiver(
            DEFAULT_CONSUMER_GROUP,
            "0",
            ReceiverOptions::new(EventPosition::EndOfStream).with_epoch(1),
        )
        .unwrap();
    first.init().await.unwrap();

    let second = client
        .create_receiver(
            DEFAULT_CONSUMER_GROUP,
            "0",
            ReceiverOptions::new(EventPosition::EndOfStream).with_epoch(2),
        )
        .unwrap();
    second.init().await.unwrap();

    let result = first.receive(10, Duration::from_secs(1)).await;
    assert!(
        matches!(result, Err(EventHubError::LinkStolen(_))),
        "unexpected result: {result:?}"
    );
    assert_eq!(second.status(), ReceiverStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn steal_during_receive_should_be_reported_by_the_next_call() {
    common::init_tracing();
    let simulator = EventHubSimulator::new("telemetry", 1);
    let client = common::client(&simulator);
    let sender = client.create_sender(Some(PartitionId::from("0")));
    send_all(&sender, (0..3).map(|i| format!("event-{i}"))).await;

    let first = client
        .create_receiver(
            DEFAULT_CONSUMER_GROUP,
            "0",
            ReceiverOptions::new(EventPosition::StartOfStream)
                .with_epoch(1)
                .with_runtime_metrics(),
        )
        .unwrap();
    first.init().await.unwrap();
    let in_flight = {
        let first = first.clone();
        tokio::spawn(async move { first.receive(10, Duration::from_secs(30)).await })
    };
    common::eventually(Duration::from_secs(5), || {
        let first = first.clone();
        async move {
            first
                .runtime_info()
                .is_some_and(|info| info.last_sequence_number == Some(2))
        }
    })
    .await;

    let second = client
        .create_receiver(
            DEFAULT_CONSUMER_GROUP,
            "0",
            ReceiverOptions::new(EventPosition::EndOfStream).with_epoch(2),
        )
        .unwrap();
    second.init().await.unwrap();

    let partial = in_flight.await.unwrap().unwrap();
    assert_eq!(partial.len(), 3);
    let next = first.receive(10, Duration::from_secs(1)).await;
    assert!(
        matches!(next, Err(EventHubError::LinkStolen(_))),
        "unexpected result: {next:?}"
    );
    assert!(matches!(
        first.receive(10, Duration::from_secs(1)).await,
        Err(EventHubError::LinkClosed(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn detached_receiver_should_hand_out_buffered_events_before_the_error() {
    common::init_tracing();
    let simulator = EventHubSimulator::new("telemetry", 1);
    let client = common::client(&simulator);
    let sender = client.create_sender(Some(PartitionId::from("0")));
    send_all(&sender, (0..3).map(|i| format!("event-{i}"))).await;

    let first = client
        .create_receiver(
            DEFAULT_CONSUMER_GROUP,
            "0",
            ReceiverOptions::new(EventPosition::StartOfStream).with_epoch(1),
        )
        .unwrap();
    let head = first.receive(1, Duration::from_secs(5)).await.unwrap();
    assert_eq!(head[0].sequence_number(), Some(0));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = client
        .create_receiver(
            DEFAULT_CONSUMER_GROUP,
            "0",
            ReceiverOptions::new(EventPosition::EndOfStream).with_epoch(2),
        )
        .unwrap();
    second.init().await.unwrap();

    let rest = first.receive(10, Duration::from_secs(1)).await.unwrap();
    assert_eq!(
        rest.iter()
            .map(|event| event.sequence_number())
            .collect::<Vec<_>>(),
        vec![Some(1), Some(2)]
    );
    let next = first.receive(10, Duration::from_secs(1)).await;
    assert!(
        matches!(next, Err(EventHubError::LinkStolen(_))),
        "unexpected result: {next:?}"
    );
    assert_eq!(first.status(), ReceiverStatus::Closed);
}

#[tokio::test]
async fn lower_epoch_should_be_refused() {
    common::init_tracing();
    let simulator = EventHubSimulator::new("telemetry", 1);
    let client = common::client(&simulator);
    let owner = client
        .create_receiver(
            DEFAULT_CONSUMER_GROUP,
            "0",
            ReceiverOptions::new(EventPosition::EndOfStream).with_epoch(5),
        )
        .unwrap();
    owner.init().await.unwrap();

    let late = client
        .create_receiver(
            DEFAULT_CONSUMER_GROUP,
            "0",
            ReceiverOptions::new(EventPosition::EndOfStream).with_epoch(4),
        )
        .unwrap();

    assert!(matches!(late.init().await, Err(EventHubError::LinkStolen(_))));
    assert_eq!(late.status(), ReceiverStatus::Uninitialized);
}

#[tokio::test]
async fn epochs_should_be_scoped_to_the_consumer_group() {
    common::init_tracing();
    let simulator = EventHubSimulator::new("telemetry", 1);
    let client = common::client(&simulator);
    let analytics = client
        .create_receiver(
            "analytics",
            "0",
            ReceiverOptions::new(EventPosition::EndOfStream).with_epoch(9),
        )
        .unwrap();
    let archive = client
        .create_receiver(
            "archive",
            "0",
            ReceiverOptions::new(EventPosition::EndOfStream).with_epoch(1),
        )
        .unwrap();

    analytics.init().await.unwrap();
    archive.init().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stream_should_yield_events_as_they_arrive() {
    common::init_tracing();
    let simulator = EventHubSimulator::new("telemetry", 1);
    let client = common::client(&simulator);
    let receiver = client
        .create_receiver(
            DEFAULT_CONSUMER_GROUP,
            "0",
            ReceiverOptions::new(EventPosition::EndOfStream),
        )
        .unwrap();
    receiver.init().await.unwrap();
    let sender = client.create_sender(Some(PartitionId::from("0")));
    send_all(&sender, (0..3).map(|i| format!("live-{i}"))).await;

    let events: Vec<_> = receiver.into_stream().take(3).collect().await;

    assert_eq!(events.len(), 3);
    assert!(events.iter().all(Result::is_ok));
}

#[tokio::test(start_paused = true)]
async fn closed_receiver_should_refuse_to_receive() {
    common::init_tracing();
    let simulator = EventHubSimulator::new("telemetry", 1);
    let client = common::client(&simulator);
    let receiver = client
        .create_receiver(
            DEFAULT_CONSUMER_GROUP,
            "0",
            ReceiverOptions::new(EventPosition::StartOfStream),
        )
        .unwrap();
    receiver.init().await.unwrap();

    receiver.close().await.unwrap();

    assert_eq!(receiver.status(), ReceiverStatus::Closed);
    assert!(matches!(
        receiver.receive(1, Duration::from_millis(100)).await,
        Err(EventHubError::LinkClosed(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn runtime_metrics_should_track_last_event() {
    common::init_tracing();
    let simulator = EventHubSimulator::new("telemetry", 1);
    let client = common::client(&simulator);
    let sender = client.create_sender(Some(PartitionId::from("0")));
    send_all(&sender, (0..2).map(|i| format!("event-{i}"))).await;
    let receiver = client
        .create_receiver(
            DEFAULT_CONSUMER_GROUP,
            "0",
            ReceiverOptions::new(EventPosition::StartOfStream).with_runtime_metrics(),
        )
        .unwrap();

    receiver.receive(2, Duration::from_secs(1)).await.unwrap();

    let info = receiver.runtime_info().unwrap();
    assert_eq!(info.partition_id, PartitionId::from("0"));
    assert_eq!(info.last_sequence_number, Some(1));
    assert!(info.retrieval_time.is_some());
}
