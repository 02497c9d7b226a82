use alloy::{
    primitives::{Address, Bytes, U256},
    sol_types::SolValue,
};
use chrono::{DateTime, Utc};
use relay_core::{
    config::{PaymasterConfig, PaymasterMode},
    error::RelayError,
};

/// Largest timestamp representable as `uint48`.
pub const MAX_UINT48: u64 = (1 << 48) - 1;

/// Unix second bounds of a sponsorship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    pub valid_until: u64,
    pub valid_after: u64,
}

impl ValidityWindow {
    /// Window opening at `now` and closing `validity_secs` later.
    pub fn starting_at(now: DateTime<Utc>, validity_secs: u64) -> Self {
        let valid_after = now.timestamp().max(0) as u64;
        Self {
            valid_until: valid_after.saturating_add(validity_secs),
            valid_after,
        }
    }
}

/// Builds `paymasterAndData` in the single mode configured for a target.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymasterDataBuilder {
    config: Option<PaymasterConfig>,
}

impl PaymasterDataBuilder {
    pub fn new(config: Option<PaymasterConfig>) -> Self {
        Self { config }
    }

    /// Sponsor payload for an operation built at `now`. Empty without a sponsor.
    pub fn build(&self, now: DateTime<Utc>) -> Result<Bytes, RelayError> {
        let Some(config) = &self.config else {
            return Ok(Bytes::default());
        };

        let window = match config.mode {
            PaymasterMode::AddressOnly => None,
            PaymasterMode::AddressWithWindow => {
                Some(ValidityWindow::starting_at(now, config.validity_secs))
            }
        };

        encode_paymaster_and_data(config.address, window)
    }
}

/// `paymaster` alone, or `paymaster ‖ abi.encode(uint48 validUntil, uint48 validAfter)`.
pub fn encode_paymaster_and_data(
    paymaster: Address,
    window: Option<ValidityWindow>,
) -> Result<Bytes, RelayError> {
    let mut data = paymaster.into_array().to_vec();

    if let Some(window) = window {
        if window.valid_until > MAX_UINT48 || window.valid_after > MAX_UINT48 {
            return Err(RelayError::ValidationError {
                message: format!(
                    "paymaster validity window ({}, {}) exceeds uint48",
                    window.valid_until, window.valid_after
                ),
            });
        }
        if window.valid_after > window.valid_until {
            return Err(RelayError::ValidationError {
                message: "paymaster validity window closes before it opens".to_string(),
            });
        }

        // uint48 words, range checked above
        let encoded = (
            U256::from(window.valid_until),
            U256::from(window.valid_after),
        )
            .abi_encode();
        data.extend_from_slice(&encoded);
    }

    Ok(Bytes::from(data))
}
