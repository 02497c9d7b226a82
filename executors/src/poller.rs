use std::{future::Future, time::Duration};

use alloy::primitives::B256;
use relay_aa_types::{OperationHash, RelayerStatus};
use relay_core::{
    config::PollConfig,
    error::RelayError,
    rpc_clients::{BundlerClient, RecordBackend, StatusResponse},
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Anything that reports relayer status by operation hash.
pub trait StatusSource: Send + Sync {
    fn status(
        &self,
        hash: OperationHash,
    ) -> impl Future<Output = Result<StatusResponse, RelayError>> + Send;
}

impl StatusSource for BundlerClient {
    async fn status(&self, hash: OperationHash) -> Result<StatusResponse, RelayError> {
        BundlerClient::status(self, hash).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum PollOutcome {
    Success {
        /// Identity the success was reported under.
        hash: OperationHash,
        tx_hash: Option<B256>,
        attempts: u32,
    },
    Failed {
        hash: OperationHash,
        message: Option<String>,
        attempts: u32,
    },
    /// Attempt budget spent without a terminal answer. Not a failure.
    Exhausted { attempts: u32 },
    Cancelled { attempts: u32 },
}

enum Tick {
    Done(PollOutcome),
    Pending,
}

/// Polls the relayer at a fixed interval for at most `max_attempts` ticks.
#[derive(Debug, Clone, Copy)]
pub struct StatusPoller {
    max_attempts: u32,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    pub fn from_config(config: &PollConfig) -> Self {
        Self::new(config.max_attempts, config.interval())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Poll until `Success` or `Failed`, the attempt budget runs out, or
    /// `cancel` fires. Each tick queries `client_hash` first; `relayer_hash`
    /// is consulted when the client hash reports `failed` or `unknown`, or
    /// when the query under the client hash itself errors.
    pub async fn poll<S, B>(
        &self,
        source: &S,
        backend: &B,
        client_hash: OperationHash,
        relayer_hash: Option<OperationHash>,
        cancel: &CancellationToken,
    ) -> PollOutcome
    where
        S: StatusSource,
        B: RecordBackend,
    {
        let secondary = relayer_hash.filter(|hash| *hash != client_hash);
        let mut synced = false;

        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return self.cancelled(client_hash, attempt - 1);
            }

            let tick = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(client_hash, attempt - 1),
                tick = self.tick(source, backend, client_hash, secondary, attempt, &mut synced) => tick,
            };

            if let Tick::Done(outcome) = tick {
                return outcome;
            }

            tracing::debug!(
                client_hash = ?client_hash,
                attempt = attempt,
                max_attempts = self.max_attempts,
                "Operation still pending"
            );

            if attempt < self.max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return self.cancelled(client_hash, attempt),
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        }

        tracing::warn!(
            client_hash = ?client_hash,
            relayer_hash = ?secondary,
            attempts = self.max_attempts,
            "Polling budget exhausted, operation assumed still pending"
        );
        PollOutcome::Exhausted {
            attempts: self.max_attempts,
        }
    }

    async fn tick<S, B>(
        &self,
        source: &S,
        backend: &B,
        client_hash: OperationHash,
        secondary: Option<OperationHash>,
        attempt: u32,
        synced: &mut bool,
    ) -> Tick
    where
        S: StatusSource,
        B: RecordBackend,
    {
        let primary = match query(source, client_hash, attempt).await {
            Some(response) if response.status == RelayerStatus::Success => {
                return Tick::Done(success(client_hash, response, attempt));
            }
            Some(response) if response.status == RelayerStatus::Pending => return Tick::Pending,
            other => other,
        };

        let fallback = match secondary {
            Some(hash) => Some((hash, query(source, hash, attempt).await)),
            None => None,
        };

        match (primary, fallback) {
            (_, Some((hash, Some(response)))) if response.status.is_terminal() => {
                Tick::Done(outcome(hash, response, attempt))
            }
            (_, Some((_, Some(response)))) if response.status == RelayerStatus::Pending => {
                Tick::Pending
            }
            // relayer hash unreachable, ask again next tick
            (Some(response), Some((_, None))) if response.status == RelayerStatus::Failed => {
                Tick::Pending
            }
            (Some(response), _) if response.status == RelayerStatus::Failed => {
                Tick::Done(failed(client_hash, response, attempt))
            }
            (Some(response), _) if response.status == RelayerStatus::Unknown => {
                self.sync(backend, client_hash, secondary, attempt, synced)
                    .await
            }
            _ => Tick::Pending,
        }
    }

    /// Ask the backend of record once per poll when the relayer knows
    /// neither hash.
    async fn sync<B: RecordBackend>(
        &self,
        backend: &B,
        client_hash: OperationHash,
        secondary: Option<OperationHash>,
        attempt: u32,
        synced: &mut bool,
    ) -> Tick {
        if *synced {
            return Tick::Pending;
        }
        *synced = true;

        tracing::info!(
            client_hash = ?client_hash,
            relayer_hash = ?secondary,
            attempt = attempt,
            "Relayer knows neither hash, syncing with backend of record"
        );

        match backend.sync_status(client_hash, secondary).await {
            Ok(response) if response.status.is_terminal() => {
                Tick::Done(outcome(client_hash, response, attempt))
            }
            Ok(_) => Tick::Pending,
            Err(e) => {
                tracing::warn!(
                    client_hash = ?client_hash,
                    error = %e,
                    "Backend status sync failed"
                );
                Tick::Pending
            }
        }
    }

    fn cancelled(&self, client_hash: OperationHash, attempts: u32) -> PollOutcome {
        tracing::info!(client_hash = ?client_hash, attempts = attempts, "Polling cancelled");
        PollOutcome::Cancelled { attempts }
    }
}

async fn query<S: StatusSource>(
    source: &S,
    hash: OperationHash,
    attempt: u32,
) -> Option<StatusResponse> {
    match source.status(hash).await {
        Ok(response) => Some(response),
        Err(e) => {
            tracing::warn!(
                hash = ?hash,
                attempt = attempt,
                error = %e,
                "Status query failed"
            );
            None
        }
    }
}

fn outcome(hash: OperationHash, response: StatusResponse, attempts: u32) -> PollOutcome {
    if response.status == RelayerStatus::Success {
        success(hash, response, attempts)
    } else {
        failed(hash, response, attempts)
    }
}

fn success(hash: OperationHash, response: StatusResponse, attempts: u32) -> PollOutcome {
    tracing::info!(
        hash = ?hash,
        tx_hash = ?response.tx_hash,
        attempts = attempts,
        "Operation confirmed"
    );
    PollOutcome::Success {
        hash,
        tx_hash: response.tx_hash,
        attempts,
    }
}

fn failed(hash: OperationHash, response: StatusResponse, attempts: u32) -> PollOutcome {
    tracing::info!(
        hash = ?hash,
        message = ?response.message,
        attempts = attempts,
        "Operation failed"
    );
    PollOutcome::Failed {
        hash,
        message: response.message,
        attempts,
    }
}
