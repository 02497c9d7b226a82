use std::time::Duration;

use alloy::primitives::{Address, B256};
use relay_aa_types::{Operation, OperationHash, RelayerStatus};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{Peer, endpoint, send, send_json};
use crate::error::RelayError;

/// Whether the client talks to the relayer or answers with synthetic results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    #[default]
    Disabled,
    /// `submit` accepts with the client hash and `status` reports success.
    /// Never valid in production.
    Enabled,
}

/// HTTP client for the relayer API.
///
/// Cheap to clone; clones share the connection pool. No call is retried here.
#[derive(Debug, Clone)]
pub struct BundlerClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    headers: HeaderMap,
    simulation: SimulationMode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest<'a> {
    user_operation: &'a Operation,
    client_hash: OperationHash,
    entry_point: Address,
    chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub accepted: bool,
    #[serde(default)]
    pub relayer_hash: Option<OperationHash>,
    #[serde(default)]
    pub tx_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: RelayerStatus,
    #[serde(default)]
    pub tx_hash: Option<B256>,
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusResponse {
    pub fn unknown() -> Self {
        Self {
            status: RelayerStatus::Unknown,
            tx_hash: None,
            message: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkHashesRequest {
    client_hash: OperationHash,
    relayer_hash: OperationHash,
    sender: Address,
}

impl BundlerClient {
    pub fn new(http: reqwest::Client, base_url: Url, timeout: Duration) -> Self {
        Self {
            http,
            base_url,
            timeout,
            headers: HeaderMap::new(),
            simulation: SimulationMode::Disabled,
        }
    }

    pub fn with_api_key(mut self, api_key: &str) -> Result<Self, RelayError> {
        let value = HeaderValue::from_str(api_key).map_err(|e| RelayError::ConfigError {
            message: format!("Unserialisable relayer api key: {e}"),
        })?;
        self.headers.insert("x-api-key", value);
        Ok(self)
    }

    pub fn with_simulation_mode(mut self, simulation: SimulationMode) -> Self {
        if simulation == SimulationMode::Enabled {
            tracing::warn!(relayer = %self.base_url, "Relayer simulation mode enabled");
        }
        self.simulation = simulation;
        self
    }

    pub fn simulation_mode(&self) -> SimulationMode {
        self.simulation
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Submit a signed operation together with the locally computed hash.
    ///
    /// A response with `accepted: false` is returned as
    /// [`RelayError::RelayerRejected`].
    pub async fn submit(
        &self,
        op: &Operation,
        client_hash: OperationHash,
        entry_point: Address,
        chain_id: u64,
    ) -> Result<SubmitResponse, RelayError> {
        if self.simulation == SimulationMode::Enabled {
            tracing::warn!(
                client_hash = ?client_hash,
                sender = ?op.sender,
                "Simulation mode: synthesising relayer acceptance"
            );
            return Ok(SubmitResponse {
                accepted: true,
                relayer_hash: Some(client_hash),
                tx_hash: None,
                message: None,
            });
        }

        let url = endpoint(&self.base_url, "submit")?;
        let body = SubmitRequest {
            user_operation: op,
            client_hash,
            entry_point,
            chain_id,
        };

        tracing::debug!(
            client_hash = ?client_hash,
            sender = ?op.sender,
            nonce = %op.nonce,
            "Submitting operation to relayer"
        );

        let request = self
            .http
            .post(url.clone())
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .json(&body);

        let response: SubmitResponse = send_json(Peer::Relayer, &url, request).await?;

        if !response.accepted {
            return Err(RelayError::RelayerRejected {
                message: response
                    .message
                    .unwrap_or_else(|| "relayer did not accept the operation".to_string()),
            });
        }

        tracing::info!(
            client_hash = ?client_hash,
            relayer_hash = ?response.relayer_hash,
            tx_hash = ?response.tx_hash,
            "Relayer accepted operation"
        );

        Ok(response)
    }

    pub async fn status(&self, hash: OperationHash) -> Result<StatusResponse, RelayError> {
        if self.simulation == SimulationMode::Enabled {
            tracing::warn!(hash = ?hash, "Simulation mode: reporting success");
            return Ok(StatusResponse {
                status: RelayerStatus::Success,
                tx_hash: None,
                message: None,
            });
        }

        let mut url = endpoint(&self.base_url, "status")?;
        url.query_pairs_mut()
            .append_pair("hash", &hash.to_string());

        let request = self
            .http
            .get(url.clone())
            .headers(self.headers.clone())
            .timeout(self.timeout);

        send_json(Peer::Relayer, &url, request).await
    }

    /// Ask the relayer to resolve `relayer_hash` and `client_hash` to one record.
    pub async fn link_hashes(
        &self,
        client_hash: OperationHash,
        relayer_hash: OperationHash,
        sender: Address,
    ) -> Result<(), RelayError> {
        if self.simulation == SimulationMode::Enabled {
            tracing::warn!(client_hash = ?client_hash, "Simulation mode: skipping hash link");
            return Ok(());
        }

        let url = endpoint(&self.base_url, "link-hashes")?;
        let request = self
            .http
            .post(url.clone())
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .json(&LinkHashesRequest {
                client_hash,
                relayer_hash,
                sender,
            });

        send(Peer::Relayer, &url, request).await?;
        Ok(())
    }
}
