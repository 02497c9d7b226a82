use alloy::primitives::B256;
use relay_aa_types::DeploymentStatus;
use relay_core::error::{ErrorClass, RelayError};
use serde::{Deserialize, Serialize};

/// Why a run stopped without a terminal relayer answer.
#[derive(Serialize, Deserialize, Debug, Clone, thiserror::Error)]
#[serde(rename_all = "camelCase", tag = "errorCode")]
pub enum DeploymentError {
    /// The record is now `Failed`.
    #[error("Deployment failed at {status:?}: {error}")]
    Fatal {
        status: DeploymentStatus,
        #[source]
        error: RelayError,
    },

    /// Nothing changed on chain. The record stays at `status` and the next
    /// run resumes from that step.
    #[error("Deployment step {status:?} can be retried: {error}")]
    Retryable {
        status: DeploymentStatus,
        #[source]
        error: RelayError,
    },

    #[error("Deployment record is already {status:?}")]
    AlreadyTerminal { status: DeploymentStatus },
}

impl DeploymentError {
    pub fn from_step(status: DeploymentStatus, error: RelayError) -> Self {
        match error.class() {
            ErrorClass::Fatal => DeploymentError::Fatal { status, error },
            ErrorClass::Retryable => DeploymentError::Retryable { status, error },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, DeploymentError::Retryable { .. })
    }

    pub fn status(&self) -> DeploymentStatus {
        match self {
            DeploymentError::Fatal { status, .. }
            | DeploymentError::Retryable { status, .. }
            | DeploymentError::AlreadyTerminal { status } => *status,
        }
    }
}

/// How a run ended when no error surfaced.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum DeploymentOutcome {
    Confirmed { tx_hash: Option<B256> },
    /// The relayer reported the operation as failed.
    Reverted { message: Option<String> },
    /// Polling budget spent. Run again later to keep waiting.
    StillPending { attempts: u32 },
    Cancelled,
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Address;

    use super::*;

    #[test]
    fn classification_follows_relay_error() {
        let fatal = DeploymentError::from_step(
            DeploymentStatus::CreatingOperation,
            RelayError::NonceUnavailable {
                sender: Address::ZERO,
                primary: "reverted".to_string(),
                legacy: "reverted".to_string(),
            },
        );
        assert!(!fatal.is_retryable());
        assert_eq!(fatal.status(), DeploymentStatus::CreatingOperation);

        let retryable = DeploymentError::from_step(
            DeploymentStatus::Submitting,
            RelayError::Timeout {
                operation: "submit".to_string(),
                timeout_ms: 10,
            },
        );
        assert!(retryable.is_retryable());
    }

    #[test]
    fn serialises_with_error_code_tag() {
        let err = DeploymentError::AlreadyTerminal {
            status: DeploymentStatus::Success,
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["errorCode"], "alreadyTerminal");
        assert_eq!(json["status"], "SUCCESS");
    }
}
