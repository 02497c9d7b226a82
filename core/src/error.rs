use alloy::{
    primitives::{Address, B256},
    transports::{RpcError as AlloyRpcError, TransportErrorKind},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the enclosing flow must react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorClass {
    /// Abort the flow. Retrying cannot succeed without different input.
    Fatal,
    /// No on-chain state changed, the failed step may be invoked again.
    Retryable,
}

#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcErrorKind {
    /// Server returned an error response.
    #[error("server returned an error response: {0}")]
    ErrorResp(RpcErrorResponse),

    /// Server returned a null response when a non-null response was expected.
    #[error("server returned a null response when a non-null response was expected")]
    NullResp,

    #[error("unsupported feature: {message}")]
    UnsupportedFeature { message: String },

    #[error("local usage error: {message}")]
    InternalError { message: String },

    #[error("serialization error: {message}")]
    SerError { message: String },

    #[error("deserialization error: {message}, text: {text}")]
    DeserError { message: String, text: String },

    #[error("HTTP error {status}")]
    TransportHttpError { status: u16, body: String },

    #[error("Other transport error: {message}")]
    OtherTransportError { message: String },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcErrorResponse {
    pub code: i64,
    pub message: String,
    pub data: Option<String>,
}

impl std::fmt::Display for RpcErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "code {}: {}", self.code, self.message)?;
        if let Some(data) = &self.data {
            write!(f, ", data: {data}")?;
        }
        Ok(())
    }
}

/// Serialisable view of a failed HTTP exchange with the relayer or backend.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HttpErrorKind {
    #[error("operation timed out")]
    Timeout,

    #[error("connection failed")]
    Connect,

    #[error("error sending request")]
    Request,

    #[error("HTTP status {status}")]
    Status { status: u16, body_preview: String },

    #[error("error decoding response body")]
    Decode,

    #[error("builder error")]
    Builder,

    #[error("unknown error")]
    Unknown,
}

impl From<&reqwest::Error> for HttpErrorKind {
    fn from(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Connect
        } else if error.is_builder() {
            Self::Builder
        } else if error.is_request() {
            Self::Request
        } else if error.is_decode() {
            Self::Decode
        } else if let Some(status) = error.status() {
            Self::Status {
                status: status.as_u16(),
                body_preview: String::new(),
            }
        } else {
            Self::Unknown
        }
    }
}

#[derive(Error, Debug, Serialize, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum RelayError {
    #[error("RPC error on chain {chain_id} at {rpc_url}: {message}")]
    RpcError {
        chain_id: u64,
        rpc_url: String,
        message: String,
        kind: RpcErrorKind,
    },

    #[error("Contract call to {contract_address} on chain {chain_id} failed: {message}")]
    #[serde(rename_all = "camelCase")]
    ContractCallError {
        contract_address: Address,
        chain_id: u64,
        message: String,
        reverted: bool,
    },

    #[error("{operation} timed out after {timeout_ms}ms")]
    #[serde(rename_all = "camelCase")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Relayer error at {url}: {message}")]
    RelayerError {
        url: String,
        message: String,
        kind: HttpErrorKind,
    },

    #[error("Relayer rejected the operation: {message}")]
    RelayerRejected { message: String },

    #[error("Backend error at {url}: {message}")]
    BackendError {
        url: String,
        message: String,
        kind: HttpErrorKind,
    },

    #[error("Sequence number for {sender} unavailable (primary: {primary}; legacy: {legacy})")]
    NonceUnavailable {
        sender: Address,
        primary: String,
        legacy: String,
    },

    #[error("Failed to encode call to `{function}`: {message}")]
    EncodingError { function: String, message: String },

    #[error("Session key for {account} expired at {expired_at}")]
    #[serde(rename_all = "camelCase")]
    ExpiredSessionKey {
        account: Address,
        expired_at: DateTime<Utc>,
    },

    #[error("Recovered signer {recovered:?} does not match session key address {expected}")]
    SignatureMismatch {
        expected: Address,
        recovered: Option<Address>,
    },

    #[error("Contract operation hash {contract} does not match local encoding {local}")]
    HashMismatch { contract: B256, local: B256 },

    #[error("Signing error: {message}")]
    SigningError { message: String },

    #[error("Bad configuration: {message}")]
    ConfigError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl RelayError {
    pub fn class(&self) -> ErrorClass {
        let retryable = match self {
            RelayError::RpcError { kind, .. } => !is_client_error(kind),
            RelayError::ContractCallError { reverted, .. } => !reverted,
            RelayError::Timeout { .. } => true,
            RelayError::RelayerError { kind, message, .. } => {
                is_retryable_http_error(kind) && !contains_rejection_reason(message)
            }
            RelayError::BackendError { kind, .. } => is_retryable_http_error(kind),
            RelayError::RelayerRejected { .. }
            | RelayError::NonceUnavailable { .. }
            | RelayError::EncodingError { .. }
            | RelayError::ExpiredSessionKey { .. }
            | RelayError::SignatureMismatch { .. }
            | RelayError::HashMismatch { .. }
            | RelayError::SigningError { .. }
            | RelayError::ConfigError { .. }
            | RelayError::ValidationError { .. }
            | RelayError::InternalError { .. } => false,
        };

        if retryable {
            ErrorClass::Retryable
        } else {
            ErrorClass::Fatal
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        RelayError::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn relayer(url: &reqwest::Url, error: &reqwest::Error) -> Self {
        RelayError::RelayerError {
            url: url.to_string(),
            message: error.to_string(),
            kind: error.into(),
        }
    }

    pub fn backend(url: &reqwest::Url, error: &reqwest::Error) -> Self {
        RelayError::BackendError {
            url: url.to_string(),
            message: error.to_string(),
            kind: error.into(),
        }
    }
}

/// Check if an RPC error represents a client error (4xx) that shouldn't be retried
fn is_client_error(kind: &RpcErrorKind) -> bool {
    match kind {
        RpcErrorKind::TransportHttpError { status, .. } if (400..500).contains(status) => true,
        RpcErrorKind::UnsupportedFeature { .. } => true,
        RpcErrorKind::ErrorResp(resp) => resp.code == 3 || resp.message.contains("revert"),
        _ => false,
    }
}

fn is_retryable_http_error(kind: &HttpErrorKind) -> bool {
    match kind {
        HttpErrorKind::Status { status, .. } => *status >= 500 || *status == 429,
        HttpErrorKind::Builder => false,
        HttpErrorKind::Timeout
        | HttpErrorKind::Connect
        | HttpErrorKind::Request
        | HttpErrorKind::Decode
        | HttpErrorKind::Unknown => true,
    }
}

/// Relayer messages that describe a permanent validation failure, even when
/// delivered with a server error status.
fn contains_rejection_reason(message: &str) -> bool {
    const AA_CODES: &[&str] = &[
        "AA10", "AA13", "AA14", "AA15", "AA21", "AA22", "AA23", "AA24", "AA25", "AA31", "AA32",
        "AA33", "AA34", "AA40", "AA41", "AA50", "AA51",
    ];

    AA_CODES.iter().any(|code| message.contains(code))
        || message.contains("execution reverted")
        || message.contains("UserOperation reverted")
        || message.contains("invalid signature")
        || message.contains("nonce too low")
}

pub trait AlloyRpcErrorToRelayError {
    fn to_relay_error(&self, chain_id: u64, rpc_url: &str) -> RelayError;
}

fn to_rpc_error_kind(err: &AlloyRpcError<TransportErrorKind>) -> RpcErrorKind {
    match err {
        AlloyRpcError::ErrorResp(err) => RpcErrorKind::ErrorResp(RpcErrorResponse {
            code: err.code,
            message: err.message.to_string(),
            data: err.data.as_ref().map(|data| data.to_string()),
        }),
        AlloyRpcError::NullResp => RpcErrorKind::NullResp,
        AlloyRpcError::UnsupportedFeature(feature) => RpcErrorKind::UnsupportedFeature {
            message: feature.to_string(),
        },
        AlloyRpcError::LocalUsageError(err) => RpcErrorKind::InternalError {
            message: err.to_string(),
        },
        AlloyRpcError::SerError(err) => RpcErrorKind::SerError {
            message: err.to_string(),
        },
        AlloyRpcError::DeserError { err, text } => RpcErrorKind::DeserError {
            message: err.to_string(),
            text: text.to_string(),
        },
        AlloyRpcError::Transport(err) => match err {
            TransportErrorKind::HttpError(err) => RpcErrorKind::TransportHttpError {
                status: err.status,
                body: err.body.to_string(),
            },
            _ => RpcErrorKind::OtherTransportError {
                message: err.to_string(),
            },
        },
    }
}

impl AlloyRpcErrorToRelayError for AlloyRpcError<TransportErrorKind> {
    fn to_relay_error(&self, chain_id: u64, rpc_url: &str) -> RelayError {
        RelayError::RpcError {
            chain_id,
            rpc_url: rpc_url.to_string(),
            message: self.to_string(),
            kind: to_rpc_error_kind(self),
        }
    }
}

pub trait ContractErrorToRelayError {
    fn to_relay_error(self, chain_id: u64, contract_address: Address) -> RelayError;
}

impl ContractErrorToRelayError for alloy::contract::Error {
    fn to_relay_error(self, chain_id: u64, contract_address: Address) -> RelayError {
        let reverted = match &self {
            alloy::contract::Error::TransportError(err) => {
                is_client_error(&to_rpc_error_kind(err))
            }
            alloy::contract::Error::ZeroData(..)
            | alloy::contract::Error::AbiError(_)
            | alloy::contract::Error::UnknownFunction(_)
            | alloy::contract::Error::UnknownSelector(_) => true,
            _ => false,
        };

        RelayError::ContractCallError {
            contract_address,
            chain_id,
            message: self.to_string(),
            reverted,
        }
    }
}

impl From<config::ConfigError> for RelayError {
    fn from(err: config::ConfigError) -> Self {
        RelayError::ConfigError {
            message: err.to_string(),
        }
    }
}
