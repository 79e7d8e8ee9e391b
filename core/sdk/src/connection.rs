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

use crate::auth::TokenProvider;
use crate::cbs::CbsAuthenticator;
use crate::config::EventHubClientConfig;
use crate::management::ManagementClient;
use eventhub_amqp::{AmqpConnection, AmqpConnector, AmqpSession, ConnectionOptions, MessageCodec};
use eventhub_common::locking::NamedLocks;
use eventhub_common::{EventHubError, TokenInfo};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::OnceCell;
use tracing::{error, info};
use uuid::Uuid;

/// Everything a link needs to reach the service. The physical connection
/// is opened on first use; concurrent first uses share one attempt.
#[derive(Debug)]
pub(crate) struct ClientContext {
    config: Arc<EventHubClientConfig>,
    connector: Arc<dyn AmqpConnector>,
    token_provider: Arc<dyn TokenProvider>,
    connection: OnceCell<Arc<Connection>>,
    closed: AtomicBool,
}

impl ClientContext {
    pub fn new(
        config: Arc<EventHubClientConfig>,
        connector: Arc<dyn AmqpConnector>,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            config,
            connector,
            token_provider,
            connection: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EventHubClientConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn connection(&self) -> Result<Arc<Connection>, EventHubError> {
        if self.is_closed() {
            return Err(EventHubError::NotConnected);
        }

        self.connection
            .get_or_try_init(|| {
                Connection::open(
                    self.config.clone(),
                    self.connector.as_ref(),
                    self.token_provider.clone(),
                )
            })
            .await
            .cloned()
    }

    pub fn opened_connection(&self) -> Option<&Arc<Connection>> {
        self.connection.get()
    }

    pub async fn close(&self) -> Result<(), EventHubError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(connection) = self.connection.get() {
            connection.close().await?;
        }
        Ok(())
    }
}

/// One physical connection and the state shared by all links on it.
#[derive(Debug)]
pub(crate) struct Connection {
    transport: Arc<dyn AmqpConnection>,
    config: Arc<EventHubClientConfig>,
    token_provider: Arc<dyn TokenProvider>,
    locks: NamedLocks,
    cbs: CbsAuthenticator,
    management: ManagementClient,
}

impl Connection {
    async fn open(
        config: Arc<EventHubClientConfig>,
        connector: &dyn AmqpConnector,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Result<Arc<Self>, EventHubError> {
        let options = ConnectionOptions {
            host: config.host()?,
            container_id: format!("eventhub-{}", Uuid::now_v7()),
        };
        info!(
            "Connecting to {} as {}...",
            options.host, options.container_id
        );
        let transport = connector.connect(&options).await.inspect_err(|error| {
            error!("Failed to connect to {}: {error}", options.host);
        })?;
        info!("Connected to {}", options.host);

        Ok(Arc::new(Self {
            transport,
            config,
            token_provider,
            locks: NamedLocks::new(),
            cbs: CbsAuthenticator::default(),
            management: ManagementClient::default(),
        }))
    }

    pub fn transport(&self) -> &dyn AmqpConnection {
        self.transport.as_ref()
    }

    pub fn codec(&self) -> Arc<dyn MessageCodec> {
        self.transport.codec()
    }

    pub fn config(&self) -> &EventHubClientConfig {
        &self.config
    }

    pub fn token_provider(&self) -> &dyn TokenProvider {
        self.token_provider.as_ref()
    }

    pub fn locks(&self) -> &NamedLocks {
        &self.locks
    }

    pub fn management(&self) -> &ManagementClient {
        &self.management
    }

    pub async fn negotiate_claim(&self, audience: &str) -> Result<TokenInfo, EventHubError> {
        self.cbs.negotiate_claim(audience, self).await
    }

    pub async fn create_session(&self) -> Result<Arc<dyn AmqpSession>, EventHubError> {
        if !self.transport.is_open() {
            return Err(EventHubError::NotConnected);
        }
        self.transport.create_session().await
    }

    pub fn cbs_sessions_created(&self) -> usize {
        self.cbs.sessions_created()
    }

    pub async fn close(&self) -> Result<(), EventHubError> {
        if let Err(error) = self.cbs.close().await {
            error!("Failed to close CBS session: {error}");
        }
        if let Err(error) = self.management.close().await {
            error!("Failed to close management link: {error}");
        }
        self.transport.close().await?;
        info!("Closed connection {}", self.transport.container_id());
        Ok(())
    }
}
