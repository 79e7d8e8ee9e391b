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

//! Named asynchronous critical sections.
//!
//! A region is identified by a string key; every caller locking the same key
//! on the same [`NamedLocks`] instance is serialized, callers on different
//! keys proceed independently.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct NamedLocks {
    regions: DashMap<String, Arc<Mutex<()>>>,
}

impl NamedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to the region `name`. The region is held
    /// until the returned guard is dropped.
    pub async fn lock(&self, name: &str) -> OwnedMutexGuard<()> {
        let region = self
            .regions
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        region.lock_owned().await
    }

    /// Runs `operation` inside the region `name`.
    pub async fn acquire<F, Fut, T>(&self, name: &str, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.lock(name).await;
        operation().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn should_serialize_callers_on_the_same_name() {
        let locks = Arc::new(NamedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            handles.push(tokio::spawn(async move {
                locks
                    .acquire("region", || async {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_names_should_not_block_each_other() {
        let locks = NamedLocks::new();
        let _first = locks.lock("a").await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.lock("b")).await;
        assert!(second.is_ok());
    }
}
