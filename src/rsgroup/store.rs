// Copyright 2026 The region-balancer Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use tokio::time;
use tracing::warn;

use crate::{metrics, Error, Result};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Key-value persistence for the group membership record. The whole record
/// is written in one `save` so membership updates are atomic with respect to
/// the store.
#[async_trait::async_trait]
pub trait GroupStore: Send + Sync {
    async fn load(&self) -> Result<Option<Vec<u8>>>;

    async fn save(&self, payload: &[u8]) -> Result<()>;
}

/// Retries transient store errors with capped exponential backoff before
/// letting them surface as `GroupStoreUnavailable`.
pub(crate) async fn with_retry<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = RETRY_BASE_DELAY;
    for attempt in 1.. {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < RETRY_ATTEMPTS => {
                warn!(attempt, error = %e, "group store operation failed, retrying");
                metrics::GROUP_STORE_RETRY_TOTAL.inc();
                time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!()
}

/// In-memory `GroupStore` for embedding and tests, with failure injection.
#[derive(Clone, Default)]
pub struct MemGroupStore {
    data: Arc<Mutex<Option<Vec<u8>>>>,
    fail_remaining: Arc<AtomicU32>,
}

impl MemGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` operations fail with `GroupStoreUnavailable`.
    pub fn fail_next_ops(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    fn check_failure(&self) -> Result<()> {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::GroupStoreUnavailable("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl GroupStore for MemGroupStore {
    async fn load(&self) -> Result<Option<Vec<u8>>> {
        self.check_failure()?;
        Ok(self.data.lock().unwrap().clone())
    }

    async fn save(&self, payload: &[u8]) -> Result<()> {
        self.check_failure()?;
        *self.data.lock().unwrap() = Some(payload.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures() {
        let store = MemGroupStore::new();
        store.save(b"v1").await.unwrap();
        store.fail_next_ops(2);
        let got = with_retry(|| store.load()).await.unwrap();
        assert_eq!(got.as_deref(), Some(&b"v1"[..]));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let store = MemGroupStore::new();
        store.fail_next_ops(10);
        let err = with_retry(|| store.load()).await.unwrap_err();
        assert!(matches!(err, Error::GroupStoreUnavailable(_)));
    }
}
