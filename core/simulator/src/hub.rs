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

use crate::codec::PostcardCodec;
use crate::connection::SimulatorConnector;
use crate::filter::StartPosition;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use eventhub_amqp::{
    AmqpConnector, AmqpErrorInfo, AmqpMessage, AmqpValue, ENQUEUED_TIME_ANNOTATION,
    OFFSET_ANNOTATION, PARTITION_KEY_ANNOTATION, SEQUENCE_NUMBER_ANNOTATION,
};
use eventhub_common::{EventHubError, timestamp};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_HOST: &str = "simulated.servicebus.windows.net";
pub const DEFAULT_MAX_MESSAGE_SIZE: u64 = 262_144;
pub const DEFAULT_SENDER_CREDIT: u32 = 1000;
pub const SIMULATOR_KEY_NAME: &str = "RootManageSharedAccessKey";
pub const SIMULATOR_KEY: &str = "c2ltdWxhdG9yLWtleQ==";

#[derive(Debug, Clone)]
pub struct SimulatorOptions {
    pub name: String,
    pub host: String,
    pub partition_count: u32,
    /// Advertised on every sender link; `None` disables the limit.
    pub max_message_size: Option<u64>,
    pub sender_credit: u32,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        Self {
            name: "hub".to_owned(),
            host: DEFAULT_HOST.to_owned(),
            partition_count: 4,
            max_message_size: Some(DEFAULT_MAX_MESSAGE_SIZE),
            sender_credit: DEFAULT_SENDER_CREDIT,
        }
    }
}

/// Handle to an in-memory event hub. Clones share the same hub.
#[derive(Debug, Clone)]
pub struct EventHubSimulator {
    state: Arc<HubState>,
}

impl EventHubSimulator {
    pub fn new(name: &str, partition_count: u32) -> Self {
        Self::with_options(SimulatorOptions {
            name: name.to_owned(),
            partition_count,
            ..Default::default()
        })
    }

    pub fn with_options(options: SimulatorOptions) -> Self {
        let partitions = (0..options.partition_count)
            .map(|id| Arc::new(Partition::new(id.to_string())))
            .collect();
        info!(
            "Starting event hub simulator {} with {} partition(s)",
            options.name, options.partition_count
        );
        Self {
            state: Arc::new(HubState {
                name: options.name,
                host: options.host,
                created_at: timestamp::unix_millis_now(),
                partitions,
                max_message_size: options.max_message_size,
                sender_credit: AtomicU32::new(options.sender_credit),
                deny_tokens: AtomicBool::new(false),
                cbs_sessions: AtomicUsize::new(0),
                token_requests: AtomicUsize::new(0),
                connections: AtomicUsize::new(0),
                round_robin: AtomicUsize::new(0),
                next_link_id: AtomicU64::new(1),
                epochs: DashMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn host(&self) -> &str {
        &self.state.host
    }

    pub fn endpoint(&self) -> String {
        format!("sb://{}/", self.state.host)
    }

    pub fn connection_string(&self) -> String {
        format!(
            "Endpoint={};SharedAccessKeyName={SIMULATOR_KEY_NAME};SharedAccessKey={SIMULATOR_KEY};EntityPath={}",
            self.endpoint(),
            self.state.name
        )
    }

    pub fn connector(&self) -> Arc<dyn AmqpConnector> {
        Arc::new(SimulatorConnector::new(self.state.clone()))
    }

    pub fn codec(&self) -> PostcardCodec {
        PostcardCodec
    }

    /// Credit every sender link reports from now on.
    pub fn set_sender_credit(&self, credit: u32) {
        self.state.sender_credit.store(credit, Ordering::SeqCst);
    }

    /// Makes the CBS node answer every `put-token` with 401.
    pub fn deny_tokens(&self, deny: bool) {
        self.state.deny_tokens.store(deny, Ordering::SeqCst);
    }

    /// Number of sender links ever attached to `$cbs`.
    pub fn cbs_sessions_created(&self) -> usize {
        self.state.cbs_sessions.load(Ordering::SeqCst)
    }

    pub fn token_requests(&self) -> usize {
        self.state.token_requests.load(Ordering::SeqCst)
    }

    pub fn connections_opened(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn partition_ids(&self) -> Vec<String> {
        self.state
            .partitions
            .iter()
            .map(|partition| partition.id.clone())
            .collect()
    }

    pub fn event_count(&self, partition_id: &str) -> usize {
        self.state
            .partition(partition_id)
            .map_or(0, |partition| partition.len())
    }

    /// Stored envelopes of a partition, with service annotations.
    pub fn events(&self, partition_id: &str) -> Vec<AmqpMessage> {
        self.state
            .partition(partition_id)
            .map(|partition| partition.messages())
            .unwrap_or_default()
    }

    /// Appends an envelope directly, bypassing any link.
    pub fn publish(&self, partition_id: &str, message: AmqpMessage) -> Result<(), EventHubError> {
        let partition = self.state.partition(partition_id).ok_or_else(|| {
            EventHubError::NotFound(format!("partition {partition_id} does not exist"))
        })?;
        partition.append(message, 0);
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct HubState {
    pub name: String,
    pub host: String,
    pub created_at: i64,
    pub partitions: Vec<Arc<Partition>>,
    pub max_message_size: Option<u64>,
    pub sender_credit: AtomicU32,
    pub deny_tokens: AtomicBool,
    pub cbs_sessions: AtomicUsize,
    pub token_requests: AtomicUsize,
    pub connections: AtomicUsize,
    round_robin: AtomicUsize,
    next_link_id: AtomicU64,
    epochs: DashMap<(String, String), EpochOwner>,
}

#[derive(Debug)]
struct EpochOwner {
    epoch: i64,
    link_id: u64,
    stop: Arc<LinkStop>,
}

impl HubState {
    pub fn partition(&self, partition_id: &str) -> Option<&Arc<Partition>> {
        self.partitions
            .iter()
            .find(|partition| partition.id == partition_id)
    }

    pub fn next_link_id(&self) -> u64 {
        self.next_link_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Partition for an envelope sent to the hub itself: hashed partition
    /// key if present, round robin otherwise.
    pub fn route(&self, message: &AmqpMessage) -> &Arc<Partition> {
        let count = self.partitions.len();
        let index = match message
            .annotation(PARTITION_KEY_ANNOTATION)
            .and_then(AmqpValue::as_str)
        {
            Some(partition_key) => crc32fast::hash(partition_key.as_bytes()) as usize % count,
            None => self.round_robin.fetch_add(1, Ordering::SeqCst) % count,
        };
        &self.partitions[index]
    }

    /// Registers an epoch receiver. An equal or higher epoch takes over the
    /// partition and detaches the previous owner with `amqp:link:stolen`.
    pub fn claim_epoch(
        &self,
        consumer_group: &str,
        partition_id: &str,
        epoch: i64,
        link_id: u64,
        stop: Arc<LinkStop>,
    ) -> Result<(), EventHubError> {
        let key = (consumer_group.to_owned(), partition_id.to_owned());
        match self.epochs.entry(key) {
            Entry::Occupied(mut entry) => {
                let owner = entry.get();
                if epoch < owner.epoch {
                    return Err(EventHubError::LinkStolen(format!(
                        "a receiver with epoch {} is already active on partition {partition_id}",
                        owner.epoch
                    )));
                }
                debug!(
                    "Epoch {epoch} supersedes epoch {} on partition {partition_id} of {consumer_group}",
                    owner.epoch
                );
                owner.stop.stop(Some(AmqpErrorInfo::new(
                    "amqp:link:stolen",
                    format!("a receiver with epoch {epoch} took over partition {partition_id}"),
                )));
                entry.insert(EpochOwner {
                    epoch,
                    link_id,
                    stop,
                });
            }
            Entry::Vacant(entry) => {
                entry.insert(EpochOwner {
                    epoch,
                    link_id,
                    stop,
                });
            }
        }
        Ok(())
    }

    pub fn release_epoch(&self, consumer_group: &str, partition_id: &str, link_id: u64) {
        let key = (consumer_group.to_owned(), partition_id.to_owned());
        self.epochs.remove_if(&key, |_, owner| owner.link_id == link_id);
    }
}

/// Stops a receiver link, optionally with an error sent to the client as a
/// detach.
#[derive(Debug, Default)]
pub(crate) struct LinkStop {
    pub token: CancellationToken,
    reason: Mutex<Option<AmqpErrorInfo>>,
}

impl LinkStop {
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            reason: Mutex::new(None),
        }
    }

    pub fn stop(&self, reason: Option<AmqpErrorInfo>) {
        *self.reason.lock().unwrap_or_else(PoisonError::into_inner) = reason;
        self.token.cancel();
    }

    pub fn reason(&self) -> Option<AmqpErrorInfo> {
        self.reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Clone)]
struct StoredEvent {
    message: AmqpMessage,
    offset: i64,
    sequence_number: i64,
    enqueued_time: i64,
    size: i64,
}

#[derive(Debug)]
pub(crate) struct Partition {
    pub id: String,
    events: RwLock<Vec<StoredEvent>>,
    appended: watch::Sender<usize>,
}

impl Partition {
    fn new(id: String) -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            id,
            events: RwLock::new(Vec::new()),
            appended,
        }
    }

    /// Stores an envelope and stamps offset, sequence number and enqueued
    /// time. Offsets are cumulative byte positions.
    pub fn append(&self, mut message: AmqpMessage, size: usize) {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        let (offset, sequence_number) = events.last().map_or((0, 0), |last| {
            (last.offset + last.size.max(1), last.sequence_number + 1)
        });
        let enqueued_time = timestamp::unix_millis_now();
        message.message_annotations.insert(
            SEQUENCE_NUMBER_ANNOTATION.to_owned(),
            AmqpValue::Int(sequence_number),
        );
        message.message_annotations.insert(
            OFFSET_ANNOTATION.to_owned(),
            AmqpValue::String(offset.to_string()),
        );
        message.message_annotations.insert(
            ENQUEUED_TIME_ANNOTATION.to_owned(),
            AmqpValue::Timestamp(enqueued_time),
        );
        events.push(StoredEvent {
            message,
            offset,
            sequence_number,
            enqueued_time,
            size: size as i64,
        });
        let len = events.len();
        drop(events);
        self.appended.send_replace(len);
    }

    pub fn len(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn get(&self, index: usize) -> Option<AmqpMessage> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .map(|event| event.message.clone())
    }

    pub fn messages(&self) -> Vec<AmqpMessage> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|event| event.message.clone())
            .collect()
    }

    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.appended.subscribe()
    }

    /// Index of the first event a receiver starting at `position` sees.
    pub fn start_index(&self, position: &StartPosition) -> usize {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        match *position {
            StartPosition::Beginning => 0,
            StartPosition::Latest => events.len(),
            StartPosition::Offset { offset, inclusive } => first_matching(&events, |event| {
                event.offset > offset || (inclusive && event.offset == offset)
            }),
            StartPosition::SequenceNumber {
                sequence_number,
                inclusive,
            } => first_matching(&events, |event| {
                event.sequence_number > sequence_number
                    || (inclusive && event.sequence_number == sequence_number)
            }),
            StartPosition::EnqueuedTime { millis, inclusive } => first_matching(&events, |event| {
                event.enqueued_time > millis || (inclusive && event.enqueued_time == millis)
            }),
        }
    }

    /// `(begin sequence number, last sequence number, last offset, last
    /// enqueued time)`; `None` while empty.
    pub fn runtime_information(&self) -> Option<(i64, i64, String, i64)> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        let first = events.first()?;
        let last = events.last()?;
        Some((
            first.sequence_number,
            last.sequence_number,
            last.offset.to_string(),
            last.enqueued_time,
        ))
    }
}

fn first_matching(events: &[StoredEvent], matches: impl Fn(&StoredEvent) -> bool) -> usize {
    events
        .iter()
        .position(matches)
        .unwrap_or(events.len())
}
