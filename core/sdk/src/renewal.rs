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

use async_trait::async_trait;
use eventhub_common::{EventHubError, TokenInfo};
use std::sync::{Mutex, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

const MIN_RENEWAL_DELAY: Duration = Duration::from_secs(1);

/// A link whose claim must be renewed before the token expires.
#[async_trait]
pub(crate) trait RenewableLink: Send + Sync + 'static {
    fn audience(&self) -> &str;

    fn is_closed(&self) -> bool;

    async fn renew_claim(&self) -> Result<TokenInfo, EventHubError>;
}

/// One-shot timer per link that renews the claim and re-arms itself.
///
/// The spawned task keeps only a weak reference to the link, so a dropped
/// link stops renewing even without an explicit `cancel`.
#[derive(Debug, Default)]
pub(crate) struct TokenRenewalScheduler {
    cancellation: Mutex<Option<CancellationToken>>,
}

impl TokenRenewalScheduler {
    pub fn schedule<L: RenewableLink>(&self, link: Weak<L>, token: &TokenInfo, margin: Duration) {
        let cancellation = CancellationToken::new();
        if let Ok(mut current) = self.cancellation.lock()
            && let Some(previous) = current.replace(cancellation.clone())
        {
            previous.cancel();
        }

        let mut delay = renewal_delay(token.valid_for(), margin);
        tokio::spawn(async move {
            loop {
                trace!("Next claim renewal in {delay:?}");
                tokio::select! {
                    _ = cancellation.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }

                let Some(link) = link.upgrade() else {
                    return;
                };
                if link.is_closed() {
                    return;
                }

                delay = match link.renew_claim().await {
                    Ok(token) => {
                        debug!("Renewed claim for {}", link.audience());
                        renewal_delay(token.valid_for(), margin)
                    }
                    Err(error) => {
                        warn!("Failed to renew claim for {}: {error}", link.audience());
                        failure_retry_delay(margin)
                    }
                };
            }
        });
    }

    pub fn cancel(&self) {
        if let Ok(mut current) = self.cancellation.lock()
            && let Some(cancellation) = current.take()
        {
            cancellation.cancel();
        }
    }
}

/// Fires `margin` before expiry, never sooner than one second.
pub(crate) fn renewal_delay(valid_for: Duration, margin: Duration) -> Duration {
    valid_for.saturating_sub(margin).max(MIN_RENEWAL_DELAY)
}

fn failure_retry_delay(margin: Duration) -> Duration {
    (margin / 4).max(MIN_RENEWAL_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventhub_common::{TokenType, timestamp};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingLink {
        renewals: AtomicUsize,
        closed: AtomicBool,
    }

    #[async_trait]
    impl RenewableLink for CountingLink {
        fn audience(&self) -> &str {
            "sb://ns/hub"
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        async fn renew_claim(&self) -> Result<TokenInfo, EventHubError> {
            self.renewals.fetch_add(1, Ordering::SeqCst);
            Ok(token_valid_for(0))
        }
    }

    fn token_valid_for(secs: i64) -> TokenInfo {
        TokenInfo::new("t", TokenType::Jwt, timestamp::unix_seconds_now() + secs)
    }

    #[test]
    fn delay_should_subtract_margin() {
        assert_eq!(
            renewal_delay(Duration::from_secs(3600), Duration::from_secs(900)),
            Duration::from_secs(2700)
        );
    }

    #[test]
    fn delay_should_never_be_shorter_than_one_second() {
        assert_eq!(
            renewal_delay(Duration::from_secs(100), Duration::from_secs(900)),
            Duration::from_secs(1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_renew_and_reschedule() {
        let link = Arc::new(CountingLink::default());
        let scheduler = TokenRenewalScheduler::default();
        scheduler.schedule(Arc::downgrade(&link), &token_valid_for(0), Duration::ZERO);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(link.renewals.load(Ordering::SeqCst), 3);
        scheduler.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_schedule_should_not_fire() {
        let link = Arc::new(CountingLink::default());
        let scheduler = TokenRenewalScheduler::default();
        scheduler.schedule(Arc::downgrade(&link), &token_valid_for(0), Duration::ZERO);
        scheduler.cancel();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(link.renewals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_link_should_not_renew() {
        let link = Arc::new(CountingLink::default());
        let scheduler = TokenRenewalScheduler::default();
        scheduler.schedule(Arc::downgrade(&link), &token_valid_for(0), Duration::ZERO);
        link.closed.store(true, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(link.renewals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_link_should_stop_the_timer() {
        let link = Arc::new(CountingLink::default());
        let weak = Arc::downgrade(&link);
        let scheduler = TokenRenewalScheduler::default();
        scheduler.schedule(weak.clone(), &token_valid_for(0), Duration::ZERO);
        drop(link);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(weak.upgrade().is_none());
    }
}
