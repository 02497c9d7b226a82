use std::time::Duration;

use alloy::primitives::Address;
use moka::future::Cache;
use relay_aa_types::OperationHash;
use relay_core::rpc_clients::BundlerClient;
use serde::{Deserialize, Serialize};

const LINK_CACHE_CAPACITY: u64 = 10_000;
const LINK_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Result of one reconciliation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ReconcileOutcome {
    /// Relayer and client agree on the hash, nothing to link.
    NotNeeded,
    Linked,
    /// This reconciler already linked the same pair.
    AlreadyLinked,
    /// The link call failed. Polling queries both hashes independently.
    Degraded { reason: String },
}

/// Links a relayer assigned hash to the client hash so either identity
/// resolves to the same record.
///
/// Successful links are remembered per `(client_hash, relayer_hash, sender)`,
/// a repeated call for the same triple makes no network call. Failed links
/// are not remembered.
#[derive(Debug, Clone)]
pub struct HashReconciler {
    linked: Cache<(OperationHash, OperationHash, Address), ()>,
}

impl Default for HashReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl HashReconciler {
    pub fn new() -> Self {
        Self {
            linked: Cache::builder()
                .max_capacity(LINK_CACHE_CAPACITY)
                .time_to_live(LINK_CACHE_TTL)
                .build(),
        }
    }

    pub async fn reconcile(
        &self,
        bundler: &BundlerClient,
        client_hash: OperationHash,
        relayer_hash: Option<OperationHash>,
        sender: Address,
    ) -> ReconcileOutcome {
        let Some(relayer_hash) = relayer_hash.filter(|hash| *hash != client_hash) else {
            return ReconcileOutcome::NotNeeded;
        };

        let linked = self
            .linked
            .entry((client_hash, relayer_hash, sender))
            .or_try_insert_with(async {
                bundler
                    .link_hashes(client_hash, relayer_hash, sender)
                    .await
            })
            .await;

        match linked {
            Ok(entry) if entry.is_fresh() => {
                tracing::info!(
                    client_hash = ?client_hash,
                    relayer_hash = ?relayer_hash,
                    sender = ?sender,
                    "Linked relayer hash to client hash"
                );
                ReconcileOutcome::Linked
            }
            Ok(_) => {
                tracing::debug!(
                    client_hash = ?client_hash,
                    relayer_hash = ?relayer_hash,
                    "Hashes already linked"
                );
                ReconcileOutcome::AlreadyLinked
            }
            Err(e) => {
                tracing::warn!(
                    client_hash = ?client_hash,
                    relayer_hash = ?relayer_hash,
                    sender = ?sender,
                    error = %e,
                    "Failed to link hashes, continuing without link"
                );
                ReconcileOutcome::Degraded {
                    reason: e.to_string(),
                }
            }
        }
    }
}
