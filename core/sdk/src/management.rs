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

use crate::connection::Connection;
use crate::request_response::{self, RequestResponseLink};
use chrono::{DateTime, Utc};
use eventhub_amqp::{AmqpConnection, AmqpMessage, AmqpValue, MessageBody};
use eventhub_common::{EventHubError, PartitionId, timestamp};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

pub(crate) const MANAGEMENT_ADDRESS: &str = "$management";
pub(crate) const MANAGEMENT_LOCK: &str = "management";

const READ_OPERATION: &str = "READ";
const EVENTHUB_TYPE: &str = "com.microsoft:eventhub";
const PARTITION_TYPE: &str = "com.microsoft:partition";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubRuntimeInformation {
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub partition_count: u32,
    pub partition_ids: Vec<PartitionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionRuntimeInformation {
    pub hub_path: String,
    pub partition_id: PartitionId,
    pub beginning_sequence_number: i64,
    pub last_enqueued_sequence_number: i64,
    pub last_enqueued_offset: String,
    pub last_enqueued_time_utc: Option<DateTime<Utc>>,
    pub is_empty: bool,
}

/// Read-only queries against the `$management` node.
#[derive(Debug, Default)]
pub(crate) struct ManagementClient {
    link: RwLock<Option<Arc<RequestResponseLink>>>,
}

impl ManagementClient {
    pub async fn hub_runtime_information(
        &self,
        connection: &Connection,
    ) -> Result<HubRuntimeInformation, EventHubError> {
        let request = read_request(connection, EVENTHUB_TYPE, None)?;
        let body = self.execute(connection, request).await?;

        let partition_ids = required(&body, "partition_ids")?
            .as_list()
            .ok_or_else(|| invalid_field("partition_ids"))?
            .iter()
            .map(|id| {
                id.as_str()
                    .map(PartitionId::from)
                    .ok_or_else(|| invalid_field("partition_ids"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(HubRuntimeInformation {
            path: required_str(&body, "name")?,
            created_at: required_time(&body, "created_at")?,
            partition_count: u32::try_from(required_i64(&body, "partition_count")?)
                .map_err(|_| invalid_field("partition_count"))?,
            partition_ids,
        })
    }

    pub async fn partition_information(
        &self,
        connection: &Connection,
        partition_id: &PartitionId,
    ) -> Result<PartitionRuntimeInformation, EventHubError> {
        let request = read_request(connection, PARTITION_TYPE, Some(partition_id))?;
        let body = self.execute(connection, request).await?;

        Ok(PartitionRuntimeInformation {
            hub_path: required_str(&body, "name")?,
            partition_id: PartitionId::from(required_str(&body, "partition")?),
            beginning_sequence_number: required_i64(&body, "begin_sequence_number")?,
            last_enqueued_sequence_number: required_i64(&body, "last_enqueued_sequence_number")?,
            last_enqueued_offset: required_str(&body, "last_enqueued_offset")?,
            last_enqueued_time_utc: body
                .get("last_enqueued_time_utc")
                .and_then(AmqpValue::as_i64)
                .and_then(timestamp::from_unix_millis),
            is_empty: required(&body, "is_partition_empty")?
                .as_bool()
                .ok_or_else(|| invalid_field("is_partition_empty"))?,
        })
    }

    async fn execute(
        &self,
        connection: &Connection,
        request: AmqpMessage,
    ) -> Result<BTreeMap<String, AmqpValue>, EventHubError> {
        let link = connection
            .locks()
            .acquire(MANAGEMENT_LOCK, || self.ensure_link(connection.transport()))
            .await?;
        let reply = link
            .request(request, connection.config().operation_timeout.get_duration())
            .await?;
        request_response::ensure_success(&reply)?;

        match reply.body {
            MessageBody::Value(AmqpValue::Map(body)) => Ok(body),
            _ => Err(EventHubError::DecodeError(
                "management reply does not carry a map body".to_owned(),
            )),
        }
    }

    async fn ensure_link(
        &self,
        transport: &dyn AmqpConnection,
    ) -> Result<Arc<RequestResponseLink>, EventHubError> {
        if let Some(link) = self.link.read().await.as_ref()
            && link.is_open()
        {
            return Ok(link.clone());
        }

        let link = Arc::new(RequestResponseLink::open(transport, MANAGEMENT_ADDRESS).await?);
        debug!("Opened management link on {}", transport.container_id());
        *self.link.write().await = Some(link.clone());
        Ok(link)
    }

    pub async fn close(&self) -> Result<(), EventHubError> {
        if let Some(link) = self.link.write().await.take() {
            link.close().await?;
        }
        Ok(())
    }
}

fn read_request(
    connection: &Connection,
    entity_type: &str,
    partition_id: Option<&PartitionId>,
) -> Result<AmqpMessage, EventHubError> {
    let config = connection.config();
    let token = connection
        .token_provider()
        .get_token(&config.audience(&config.entity_path))?;

    let mut request = AmqpMessage::default();
    let properties = &mut request.application_properties;
    properties.insert("operation".to_owned(), AmqpValue::from(READ_OPERATION));
    properties.insert("type".to_owned(), AmqpValue::from(entity_type));
    properties.insert("name".to_owned(), AmqpValue::from(config.entity_path.as_str()));
    properties.insert(
        "security_token".to_owned(),
        AmqpValue::from(token.token()),
    );
    if let Some(partition_id) = partition_id {
        properties.insert(
            "partition".to_owned(),
            AmqpValue::from(partition_id.as_str()),
        );
    }
    Ok(request)
}

fn required<'a>(
    body: &'a BTreeMap<String, AmqpValue>,
    key: &str,
) -> Result<&'a AmqpValue, EventHubError> {
    body.get(key).ok_or_else(|| {
        EventHubError::DecodeError(format!("management reply is missing '{key}'"))
    })
}

fn required_str(body: &BTreeMap<String, AmqpValue>, key: &str) -> Result<String, EventHubError> {
    required(body, key)?
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| invalid_field(key))
}

fn required_i64(body: &BTreeMap<String, AmqpValue>, key: &str) -> Result<i64, EventHubError> {
    required(body, key)?
        .as_i64()
        .ok_or_else(|| invalid_field(key))
}

fn required_time(
    body: &BTreeMap<String, AmqpValue>,
    key: &str,
) -> Result<DateTime<Utc>, EventHubError> {
    let millis = required_i64(body, key)?;
    timestamp::from_unix_millis(millis).ok_or_else(|| invalid_field(key))
}

fn invalid_field(key: &str) -> EventHubError {
    EventHubError::DecodeError(format!("management reply has an invalid '{key}'"))
}
