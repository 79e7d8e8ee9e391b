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

use crate::auth::redact;
use crate::connection::Connection;
use crate::request_response::{self, RequestResponseLink};
use eventhub_amqp::{AmqpConnection, AmqpMessage, AmqpValue};
use eventhub_common::{EventHubError, TokenInfo};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub(crate) const CBS_ADDRESS: &str = "$cbs";
pub(crate) const CBS_LOCK: &str = "negotiate-cbs";

const PUT_TOKEN_OPERATION: &str = "put-token";
const OPERATION: &str = "operation";
const NAME: &str = "name";
const TYPE: &str = "type";

/// Claims-based security for one connection.
///
/// The `$cbs` link pair is created lazily, at most once per connection, and
/// every negotiation runs inside the `negotiate-cbs` region so that parallel
/// link initializations neither race on session creation nor interleave
/// requests.
#[derive(Debug, Default)]
pub(crate) struct CbsAuthenticator {
    session: RwLock<Option<Arc<RequestResponseLink>>>,
    sessions_created: AtomicUsize,
}

impl CbsAuthenticator {
    pub async fn negotiate_claim(
        &self,
        audience: &str,
        connection: &Connection,
    ) -> Result<TokenInfo, EventHubError> {
        connection
            .locks()
            .acquire(CBS_LOCK, || self.negotiate(audience, connection))
            .await
    }

    async fn negotiate(
        &self,
        audience: &str,
        connection: &Connection,
    ) -> Result<TokenInfo, EventHubError> {
        let session = self.ensure_session(connection.transport()).await?;
        let token = connection.token_provider().get_token(audience)?;
        debug!(
            "Negotiating claim for {audience} with {} token {}",
            token.token_type(),
            redact(token.token())
        );

        let reply = session
            .request(
                put_token_request(audience, &token),
                connection.config().operation_timeout.get_duration(),
            )
            .await?;
        if let Err(error) = request_response::ensure_success(&reply) {
            warn!("Claim negotiation for {audience} failed: {error}");
            return Err(error);
        }

        debug!(
            "Claim for {audience} accepted, token valid for {:?}",
            token.valid_for()
        );
        Ok(token)
    }

    async fn ensure_session(
        &self,
        transport: &dyn AmqpConnection,
    ) -> Result<Arc<RequestResponseLink>, EventHubError> {
        if let Some(session) = self.session.read().await.as_ref()
            && session.is_open()
        {
            return Ok(session.clone());
        }

        let session = Arc::new(RequestResponseLink::open(transport, CBS_ADDRESS).await?);
        let created = self.sessions_created.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Created CBS session #{created} on connection {}",
            transport.container_id()
        );
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }

    pub async fn close(&self) -> Result<(), EventHubError> {
        if let Some(session) = self.session.write().await.take() {
            session.close().await?;
            debug!("Closed CBS session");
        }
        Ok(())
    }
}

fn put_token_request(audience: &str, token: &TokenInfo) -> AmqpMessage {
    let mut request = AmqpMessage::with_value(AmqpValue::String(token.token().to_owned()));
    request.application_properties.insert(
        OPERATION.to_owned(),
        AmqpValue::from(PUT_TOKEN_OPERATION),
    );
    request
        .application_properties
        .insert(NAME.to_owned(), AmqpValue::from(audience));
    request.application_properties.insert(
        TYPE.to_owned(),
        AmqpValue::String(token.token_type().to_string()),
    );
    request
}
