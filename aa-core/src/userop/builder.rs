use alloy::primitives::{Address, Bytes, U256};
use relay_aa_types::{GasOverrides, GasProfile, Operation, unsigned_operation};

pub struct UserOpBuilderConfig {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    /// Fixed defaults of the deployment target.
    pub gas: GasProfile,
    /// Estimator supplied values, applied field by field over `gas`.
    pub gas_overrides: Option<GasOverrides>,
    pub paymaster_and_data: Bytes,
}

/// Assembles the unsigned operation. Pure, no I/O.
pub struct UserOpBuilder {
    config: UserOpBuilderConfig,
}

impl UserOpBuilder {
    pub fn new(config: UserOpBuilderConfig) -> Self {
        Self { config }
    }

    pub fn build(self) -> Operation {
        let config = self.config;
        let gas = match &config.gas_overrides {
            Some(overrides) => config.gas.with_overrides(overrides),
            None => config.gas,
        };

        let op = unsigned_operation(
            config.sender,
            config.nonce,
            config.init_code,
            config.call_data,
            &gas,
            config.paymaster_and_data,
        );

        tracing::debug!(
            sender = ?op.sender,
            nonce = %op.nonce,
            call_gas_limit = gas.call_gas_limit,
            has_init_code = !op.init_code.is_empty(),
            paymaster_and_data_len = op.paymaster_and_data.len(),
            "UserOp built"
        );

        op
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;

    fn config() -> UserOpBuilderConfig {
        UserOpBuilderConfig {
            sender: address!("0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"),
            nonce: U256::from(7),
            init_code: Bytes::default(),
            call_data: Bytes::from_static(&[0xb6, 0x1d, 0x27, 0xf6]),
            gas: GasProfile::default(),
            gas_overrides: None,
            paymaster_and_data: Bytes::from_static(&[0x99; 20]),
        }
    }

    #[test]
    fn fixed_profile_is_copied_and_signature_is_empty() {
        let op = UserOpBuilder::new(config()).build();

        assert_eq!(op.nonce, U256::from(7));
        assert_eq!(op.call_gas_limit, U256::from(2_000_000));
        assert_eq!(op.verification_gas_limit, U256::from(600_000));
        assert_eq!(op.pre_verification_gas, U256::from(210_000));
        assert_eq!(op.paymaster_and_data.len(), 20);
        assert!(op.signature.is_empty());
    }

    #[test]
    fn overrides_win_over_defaults() {
        let op = UserOpBuilder::new(UserOpBuilderConfig {
            gas_overrides: Some(GasOverrides {
                pre_verification_gas: Some(55_000),
                max_priority_fee_per_gas: Some(3),
                ..Default::default()
            }),
            ..config()
        })
        .build();

        assert_eq!(op.pre_verification_gas, U256::from(55_000));
        assert_eq!(op.max_priority_fee_per_gas, U256::from(3));
        assert_eq!(op.call_gas_limit, U256::from(2_000_000));
    }
}
