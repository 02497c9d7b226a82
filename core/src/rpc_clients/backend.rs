use std::{future::Future, time::Duration};

use alloy::primitives::{Address, B256, Bytes, U256};
use relay_aa_types::{DeploymentStatus, OperationHash};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use super::{Peer, StatusResponse, endpoint, send, send_json};
use crate::{credentials::SessionKeyGrant, error::RelayError};

/// Final state of a deployment record as persisted by the backend of record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeReport {
    pub record_id: Uuid,
    pub target: String,
    pub sender: Address,
    pub status: DeploymentStatus,
    pub nonce: Option<U256>,
    pub client_hash: Option<OperationHash>,
    pub relayer_hash: Option<OperationHash>,
    pub tx_hash: Option<B256>,
    pub signature: Option<Bytes>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncRequest {
    client_hash: OperationHash,
    relayer_hash: Option<OperationHash>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionKeyRequest {
    account_address: Address,
}

/// Backend of record: reconciliation sync, outcome persistence and session
/// key issuance.
pub trait RecordBackend: Send + Sync {
    /// Last resort status lookup when the relayer knows neither hash.
    fn sync_status(
        &self,
        client_hash: OperationHash,
        relayer_hash: Option<OperationHash>,
    ) -> impl Future<Output = Result<StatusResponse, RelayError>> + Send;

    fn record_outcome(
        &self,
        report: &OutcomeReport,
    ) -> impl Future<Output = Result<(), RelayError>> + Send;

    fn issue_session_key(
        &self,
        account: Address,
    ) -> impl Future<Output = Result<SessionKeyGrant, RelayError>> + Send;
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl BackendClient {
    pub fn new(http: reqwest::Client, base_url: Url, timeout: Duration) -> Self {
        Self {
            http,
            base_url,
            timeout,
        }
    }
}

impl RecordBackend for BackendClient {
    async fn sync_status(
        &self,
        client_hash: OperationHash,
        relayer_hash: Option<OperationHash>,
    ) -> Result<StatusResponse, RelayError> {
        let url = endpoint(&self.base_url, "sync")?;
        let request = self
            .http
            .post(url.clone())
            .timeout(self.timeout)
            .json(&SyncRequest {
                client_hash,
                relayer_hash,
            });

        send_json(Peer::Backend, &url, request).await
    }

    async fn record_outcome(&self, report: &OutcomeReport) -> Result<(), RelayError> {
        let url = endpoint(&self.base_url, "outcomes")?;
        let request = self
            .http
            .post(url.clone())
            .timeout(self.timeout)
            .json(report);

        send(Peer::Backend, &url, request).await?;

        tracing::debug!(
            record_id = %report.record_id,
            status = ?report.status,
            "Recorded deployment outcome"
        );
        Ok(())
    }

    async fn issue_session_key(&self, account: Address) -> Result<SessionKeyGrant, RelayError> {
        let url = endpoint(&self.base_url, "session-keys")?;
        let request = self
            .http
            .post(url.clone())
            .timeout(self.timeout)
            .json(&SessionKeyRequest {
                account_address: account,
            });

        send_json(Peer::Backend, &url, request).await
    }
}
