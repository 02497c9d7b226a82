use std::{sync::Arc, time::Duration};

use alloy::primitives::{Address, U256};
use moka::future::Cache;
use tokio::sync::{Mutex, OwnedMutexGuard};

const DEFAULT_MAX_SENDERS: u64 = 100_000;
const DEFAULT_SENDER_IDLE: Duration = Duration::from_secs(3_600);

/// Per-sender bookkeeping guarded by the sender lock.
#[derive(Debug, Default)]
pub struct SenderState {
    last_submitted: Option<U256>,
}

impl SenderState {
    /// Nonce for the next operation. The chain value lags until the previous
    /// submission is mined, so a nonce already handed to the relayer is never
    /// reused.
    pub fn reserve(&self, chain_nonce: U256) -> U256 {
        match self.last_submitted {
            Some(last) if last >= chain_nonce => last + U256::from(1),
            _ => chain_nonce,
        }
    }

    /// Record a nonce the relayer accepted.
    pub fn mark_submitted(&mut self, nonce: U256) {
        if self.last_submitted.is_none_or(|last| nonce > last) {
            self.last_submitted = Some(nonce);
        }
    }

    pub fn last_submitted(&self) -> Option<U256> {
        self.last_submitted
    }
}

/// Held from nonce resolution until the relayer accepted the submission.
pub type SenderGuard = OwnedMutexGuard<SenderState>;

/// One async mutex per `(chain_id, sender)`. Flows of different senders never
/// wait on each other.
///
/// Entries idle longer than the configured window are dropped together with
/// their submitted-nonce memory; the window must exceed any single lock hold.
#[derive(Debug, Clone)]
pub struct SenderLocks {
    locks: Cache<(u64, Address), Arc<Mutex<SenderState>>>,
}

impl Default for SenderLocks {
    fn default() -> Self {
        Self::bounded(DEFAULT_MAX_SENDERS, DEFAULT_SENDER_IDLE)
    }
}

impl SenderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(max_senders: u64, idle: Duration) -> Self {
        Self {
            locks: Cache::builder()
                .max_capacity(max_senders)
                .time_to_idle(idle)
                .build(),
        }
    }

    pub async fn acquire(&self, chain_id: u64, sender: Address) -> SenderGuard {
        let lock = self
            .locks
            .get_with((chain_id, sender), async {
                Arc::new(Mutex::new(SenderState::default()))
            })
            .await;

        tracing::debug!(chain_id = chain_id, sender = ?sender, "Waiting for sender lock");
        lock.lock_owned().await
    }

    /// Number of senders currently tracked, after pending evictions ran.
    pub async fn tracked(&self) -> u64 {
        self.locks.run_pending_tasks().await;
        self.locks.entry_count()
    }
}
