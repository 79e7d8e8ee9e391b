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

use crate::batch;
use eventhub_amqp::{
    AmqpConnection, AmqpMessage, AmqpReceiverLink, AmqpSenderLink, AmqpSession, AmqpValue,
    Delivery, DeliveryOutcome, LinkEvent, MessageCodec, ReceiverLinkOptions, SenderLinkOptions,
};
use eventhub_common::EventHubError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

pub(crate) const STATUS_CODE: &str = "status-code";
pub(crate) const STATUS_DESCRIPTION: &str = "status-description";
pub(crate) const ERROR_CONDITION: &str = "error-condition";

const REPLY_PREFETCH: u32 = 10;

/// A sender/receiver pair bound to a request/response node such as `$cbs` or
/// `$management`. One request is in flight at a time.
#[derive(Debug)]
pub(crate) struct RequestResponseLink {
    address: String,
    reply_to: String,
    codec: Arc<dyn MessageCodec>,
    session: Arc<dyn AmqpSession>,
    sender: Arc<dyn AmqpSenderLink>,
    receiver: Arc<dyn AmqpReceiverLink>,
    replies: Mutex<mpsc::Receiver<LinkEvent>>,
}

impl RequestResponseLink {
    pub async fn open(
        connection: &dyn AmqpConnection,
        address: &str,
    ) -> Result<Self, EventHubError> {
        let id = Uuid::now_v7();
        let reply_to = format!("{address}-client-reply-to-{id}");
        let session = connection.create_session().await?;
        let sender = session
            .attach_sender(SenderLinkOptions::new(
                format!("{address}-sender-{id}"),
                address,
            ))
            .await?;
        let handle = session
            .attach_receiver(
                ReceiverLinkOptions::new(format!("{address}-receiver-{id}"), address, REPLY_PREFETCH)
                    .with_target(reply_to.clone()),
            )
            .await?;
        debug!("Opened request/response link on {address} with reply address {reply_to}");

        Ok(Self {
            address: address.to_owned(),
            reply_to,
            codec: connection.codec(),
            session,
            sender,
            receiver: handle.link,
            replies: Mutex::new(handle.events),
        })
    }

    pub fn is_open(&self) -> bool {
        self.session.is_open() && self.sender.is_open() && self.receiver.is_open()
    }

    /// Sends `request` and waits for the reply carrying its message id as
    /// correlation id. Replies for other requests are discarded.
    pub async fn request(
        &self,
        mut request: AmqpMessage,
        timeout: Duration,
    ) -> Result<AmqpMessage, EventHubError> {
        let mut replies = self.replies.lock().await;
        let message_id = Uuid::now_v7().to_string();
        request.properties.message_id = Some(message_id.clone());
        request.properties.reply_to = Some(self.reply_to.clone());

        let delivery = batch::encode_single(self.codec.as_ref(), &request)?;
        tokio::time::timeout(timeout, self.exchange(&mut replies, delivery, &message_id))
            .await
            .map_err(|_| {
                EventHubError::OperationTimeout(format!(
                    "no reply from {} within {timeout:?}",
                    self.address
                ))
            })?
    }

    async fn exchange(
        &self,
        replies: &mut mpsc::Receiver<LinkEvent>,
        delivery: Delivery,
        message_id: &str,
    ) -> Result<AmqpMessage, EventHubError> {
        match self.sender.send(delivery).await? {
            DeliveryOutcome::Accepted => {}
            DeliveryOutcome::Rejected(Some(error)) => return Err(error.into_error()),
            outcome => {
                return Err(EventHubError::Protocol {
                    condition: "amqp:rejected".to_owned(),
                    description: format!(
                        "request to {} was not accepted: {outcome:?}",
                        self.address
                    ),
                });
            }
        }

        loop {
            match replies.recv().await {
                Some(LinkEvent::Message(reply)) => {
                    if reply.properties.correlation_id.as_deref() == Some(message_id) {
                        return Ok(reply);
                    }
                    warn!(
                        "Discarding uncorrelated reply on {}: {:?}",
                        self.address, reply.properties.correlation_id
                    );
                }
                Some(LinkEvent::Detached(Some(error))) => return Err(error.into_error()),
                Some(LinkEvent::Detached(None)) | None => {
                    return Err(EventHubError::LinkClosed(format!(
                        "reply link for {} was detached",
                        self.address
                    )));
                }
            }
        }
    }

    pub async fn close(&self) -> Result<(), EventHubError> {
        self.sender.detach().await?;
        self.receiver.detach().await?;
        self.session.end().await?;
        debug!("Closed request/response link on {}", self.address);
        Ok(())
    }
}

/// Checks the reply status. Codes in `[200, 300)` are success.
pub(crate) fn ensure_success(reply: &AmqpMessage) -> Result<(), EventHubError> {
    let status_code = reply
        .application_property(STATUS_CODE)
        .and_then(AmqpValue::as_i64)
        .ok_or_else(|| {
            EventHubError::DecodeError("reply does not carry a status code".to_owned())
        })?;
    if (200..300).contains(&status_code) {
        return Ok(());
    }

    let description = reply
        .application_property(STATUS_DESCRIPTION)
        .and_then(AmqpValue::as_str)
        .unwrap_or_default();
    let condition = reply
        .application_property(ERROR_CONDITION)
        .and_then(AmqpValue::as_str);
    let status_code = u16::try_from(status_code).unwrap_or(u16::MAX);
    Err(EventHubError::from_status_code(
        status_code,
        description,
        condition,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(status: i64, condition: Option<&str>) -> AmqpMessage {
        let mut reply = AmqpMessage::default();
        reply
            .application_properties
            .insert(STATUS_CODE.to_owned(), AmqpValue::Int(status));
        reply
            .application_properties
            .insert(STATUS_DESCRIPTION.to_owned(), AmqpValue::from("text"));
        if let Some(condition) = condition {
            reply
                .application_properties
                .insert(ERROR_CONDITION.to_owned(), AmqpValue::from(condition));
        }
        reply
    }

    #[test]
    fn success_range_should_pass() {
        assert!(ensure_success(&reply(200, None)).is_ok());
        assert!(ensure_success(&reply(202, None)).is_ok());
    }

    #[test]
    fn status_code_should_map_to_error() {
        assert_eq!(
            ensure_success(&reply(401, None)),
            Err(EventHubError::Unauthorized("text".to_owned()))
        );
        assert_eq!(
            ensure_success(&reply(503, None)),
            Err(EventHubError::ServerBusy("text".to_owned()))
        );
    }

    #[test]
    fn explicit_condition_should_win() {
        assert_eq!(
            ensure_success(&reply(500, Some("amqp:not-found"))),
            Err(EventHubError::NotFound("text".to_owned()))
        );
    }

    #[test]
    fn missing_status_should_be_a_decode_error() {
        assert!(matches!(
            ensure_success(&AmqpMessage::default()),
            Err(EventHubError::DecodeError(_))
        ));
    }
}
