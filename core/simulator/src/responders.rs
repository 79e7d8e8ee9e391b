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

//! Request/response handlers behind the `$cbs` and `$management` nodes.

use crate::connection::ConnectionState;
use eventhub_amqp::{AmqpMessage, AmqpValue, MessageBody};
use eventhub_common::timestamp;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use tracing::{debug, warn};

const STATUS_CODE: &str = "status-code";
const STATUS_DESCRIPTION: &str = "status-description";
const SAS_TOKEN_TYPE: &str = "servicebus.windows.net:sastoken";
const JWT_TOKEN_TYPE: &str = "jwt";
const SAS_TOKEN_PREFIX: &str = "SharedAccessSignature ";
const JWT_GRANT_SECS: i64 = 3600;
const EVENTHUB_TYPE: &str = "com.microsoft:eventhub";
const PARTITION_TYPE: &str = "com.microsoft:partition";

/// Handles `put-token`. An accepted token authorizes its audience on the
/// connection until the token expires.
pub(crate) fn put_token(connection: &ConnectionState, request: &AmqpMessage) -> AmqpMessage {
    let hub = &connection.hub;
    hub.token_requests.fetch_add(1, Ordering::SeqCst);

    if string_property(request, "operation") != Some("put-token") {
        return status_reply(request, 400, "unsupported CBS operation");
    }
    let (Some(audience), Some(token_type)) = (
        string_property(request, "name"),
        string_property(request, "type"),
    ) else {
        return status_reply(request, 400, "put-token requires 'name' and 'type'");
    };
    let token = match &request.body {
        MessageBody::Value(value) => value.as_str().unwrap_or_default(),
        _ => "",
    };
    if token.is_empty() {
        return status_reply(request, 400, "put-token carries no token");
    }
    if hub.deny_tokens.load(Ordering::SeqCst) {
        warn!("Simulator denied token for {audience}");
        return status_reply(request, 401, "Unauthorized");
    }

    let expiry = match token_type {
        SAS_TOKEN_TYPE => match sas_expiry(token) {
            Some(expiry) => expiry,
            None => return status_reply(request, 401, "malformed shared access signature"),
        },
        JWT_TOKEN_TYPE => timestamp::unix_seconds_now() + JWT_GRANT_SECS,
        other => return status_reply(request, 400, &format!("unsupported token type {other}")),
    };
    if expiry <= timestamp::unix_seconds_now() {
        return status_reply(request, 401, "token has expired");
    }

    connection.claims.insert(audience.to_owned(), expiry);
    debug!("Simulator accepted claim for {audience} until {expiry}");
    status_reply(request, 202, "Accepted")
}

/// Handles `READ` on the hub and its partitions.
pub(crate) fn management(connection: &ConnectionState, request: &AmqpMessage) -> AmqpMessage {
    let hub = &connection.hub;
    if string_property(request, "operation") != Some("READ") {
        return status_reply(request, 400, "unsupported management operation");
    }
    if string_property(request, "security_token").is_none_or(str::is_empty) {
        return status_reply(request, 401, "management requests require a security token");
    }
    if string_property(request, "name") != Some(hub.name.as_str()) {
        return status_reply(request, 404, "unknown entity");
    }

    let mut body = BTreeMap::new();
    body.insert("name".to_owned(), AmqpValue::from(hub.name.as_str()));
    match string_property(request, "type") {
        Some(EVENTHUB_TYPE) => {
            body.insert("created_at".to_owned(), AmqpValue::Timestamp(hub.created_at));
            body.insert(
                "partition_count".to_owned(),
                AmqpValue::Int(hub.partitions.len() as i64),
            );
            body.insert(
                "partition_ids".to_owned(),
                AmqpValue::List(
                    hub.partitions
                        .iter()
                        .map(|partition| AmqpValue::from(partition.id.as_str()))
                        .collect(),
                ),
            );
        }
        Some(PARTITION_TYPE) => {
            let Some(partition) =
                string_property(request, "partition").and_then(|id| hub.partition(id))
            else {
                return status_reply(request, 404, "unknown partition");
            };
            body.insert("partition".to_owned(), AmqpValue::from(partition.id.as_str()));
            match partition.runtime_information() {
                Some((begin, last, offset, enqueued_at)) => {
                    body.insert("begin_sequence_number".to_owned(), AmqpValue::Int(begin));
                    body.insert(
                        "last_enqueued_sequence_number".to_owned(),
                        AmqpValue::Int(last),
                    );
                    body.insert("last_enqueued_offset".to_owned(), AmqpValue::String(offset));
                    body.insert(
                        "last_enqueued_time_utc".to_owned(),
                        AmqpValue::Timestamp(enqueued_at),
                    );
                    body.insert("is_partition_empty".to_owned(), AmqpValue::Bool(false));
                }
                None => {
                    body.insert("begin_sequence_number".to_owned(), AmqpValue::Int(-1));
                    body.insert(
                        "last_enqueued_sequence_number".to_owned(),
                        AmqpValue::Int(-1),
                    );
                    body.insert("last_enqueued_offset".to_owned(), AmqpValue::from("-1"));
                    body.insert("is_partition_empty".to_owned(), AmqpValue::Bool(true));
                }
            }
        }
        _ => return status_reply(request, 400, "unsupported entity type"),
    }

    let mut reply = status_reply(request, 200, "OK");
    reply.body = MessageBody::Value(AmqpValue::Map(body));
    reply
}

fn string_property<'a>(message: &'a AmqpMessage, key: &str) -> Option<&'a str> {
    message.application_property(key).and_then(AmqpValue::as_str)
}

/// Reads the `se` field of `SharedAccessSignature sr=..&sig=..&se=..&skn=..`.
fn sas_expiry(token: &str) -> Option<i64> {
    token
        .strip_prefix(SAS_TOKEN_PREFIX)?
        .split('&')
        .find_map(|field| field.strip_prefix("se="))
        .and_then(|expiry| expiry.parse().ok())
}

fn status_reply(request: &AmqpMessage, status_code: i64, description: &str) -> AmqpMessage {
    let mut reply = AmqpMessage::default();
    reply.properties.correlation_id = request.properties.message_id.clone();
    reply
        .application_properties
        .insert(STATUS_CODE.to_owned(), AmqpValue::Int(status_code));
    reply
        .application_properties
        .insert(STATUS_DESCRIPTION.to_owned(), AmqpValue::from(description));
    reply
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_read_expiry_from_shared_access_signature() {
        let token = "SharedAccessSignature sr=sb%3A%2F%2Fhub&sig=abc%3D&se=1700000000&skn=root";
        assert_eq!(sas_expiry(token), Some(1_700_000_000));
    }

    #[test]
    fn should_reject_tokens_without_signature_prefix() {
        assert_eq!(sas_expiry("sr=hub&se=1700000000"), None);
        assert_eq!(sas_expiry("SharedAccessSignature sr=hub&sig=abc"), None);
    }

    #[test]
    fn reply_should_correlate_with_request() {
        let mut request = AmqpMessage::default();
        request.properties.message_id = Some("m-1".to_owned());
        let reply = status_reply(&request, 202, "Accepted");
        assert_eq!(reply.properties.correlation_id.as_deref(), Some("m-1"));
        assert_eq!(
            reply.application_property(STATUS_CODE).and_then(AmqpValue::as_i64),
            Some(202)
        );
    }
}
