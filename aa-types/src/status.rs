use serde::{Deserialize, Serialize};

/// Lifecycle of a deployment record. Only `Success` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    #[default]
    NotStarted,
    CheckingRequirements,
    CreatingSessionKey,
    PreparingCallData,
    CreatingOperation,
    Signing,
    Submitting,
    WaitingConfirmation,
    Success,
    Failed,
}

impl DeploymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Success | DeploymentStatus::Failed)
    }
}

/// Status of an operation as reported by the relayer or the backend of record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayerStatus {
    Success,
    Failed,
    Pending,
    #[serde(other)]
    Unknown,
}

impl RelayerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayerStatus::Success | RelayerStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognised_relayer_status_is_unknown() {
        let status: RelayerStatus = serde_json::from_str(r#""dropped""#).unwrap();
        assert_eq!(status, RelayerStatus::Unknown);
    }

    #[test]
    fn only_success_and_failed_are_terminal() {
        assert!(DeploymentStatus::Success.is_terminal());
        assert!(DeploymentStatus::Failed.is_terminal());
        assert!(!DeploymentStatus::WaitingConfirmation.is_terminal());
        assert!(!DeploymentStatus::CreatingSessionKey.is_terminal());
    }
}
