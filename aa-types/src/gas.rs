use serde::{Deserialize, Serialize};

pub const DEFAULT_CALL_GAS_LIMIT: u64 = 2_000_000;
pub const DEFAULT_VERIFICATION_GAS_LIMIT: u64 = 600_000;
pub const DEFAULT_PRE_VERIFICATION_GAS: u64 = 210_000;
pub const DEFAULT_MAX_FEE_PER_GAS: u64 = 2_000_000_000;
pub const DEFAULT_MAX_PRIORITY_FEE_PER_GAS: u64 = 1_000_000_000;

/// Gas budget attached to an operation. Limits are opaque budget and are not
/// cross-validated against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasProfile {
    pub call_gas_limit: u64,
    pub verification_gas_limit: u64,
    pub pre_verification_gas: u64,
    /// Wei
    pub max_fee_per_gas: u64,
    /// Wei
    pub max_priority_fee_per_gas: u64,
}

impl Default for GasProfile {
    fn default() -> Self {
        Self {
            call_gas_limit: DEFAULT_CALL_GAS_LIMIT,
            verification_gas_limit: DEFAULT_VERIFICATION_GAS_LIMIT,
            pre_verification_gas: DEFAULT_PRE_VERIFICATION_GAS,
            max_fee_per_gas: DEFAULT_MAX_FEE_PER_GAS,
            max_priority_fee_per_gas: DEFAULT_MAX_PRIORITY_FEE_PER_GAS,
        }
    }
}

/// Caller supplied values, typically from an estimator, that replace the
/// fixed defaults field by field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasOverrides {
    pub call_gas_limit: Option<u64>,
    pub verification_gas_limit: Option<u64>,
    pub pre_verification_gas: Option<u64>,
    pub max_fee_per_gas: Option<u64>,
    pub max_priority_fee_per_gas: Option<u64>,
}

impl GasProfile {
    pub fn with_overrides(self, overrides: &GasOverrides) -> Self {
        Self {
            call_gas_limit: overrides.call_gas_limit.unwrap_or(self.call_gas_limit),
            verification_gas_limit: overrides
                .verification_gas_limit
                .unwrap_or(self.verification_gas_limit),
            pre_verification_gas: overrides
                .pre_verification_gas
                .unwrap_or(self.pre_verification_gas),
            max_fee_per_gas: overrides.max_fee_per_gas.unwrap_or(self.max_fee_per_gas),
            max_priority_fee_per_gas: overrides
                .max_priority_fee_per_gas
                .unwrap_or(self.max_priority_fee_per_gas),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_only_given_fields() {
        let profile = GasProfile::default().with_overrides(&GasOverrides {
            call_gas_limit: Some(50_000),
            max_fee_per_gas: Some(7),
            ..Default::default()
        });

        assert_eq!(profile.call_gas_limit, 50_000);
        assert_eq!(profile.max_fee_per_gas, 7);
        assert_eq!(profile.verification_gas_limit, DEFAULT_VERIFICATION_GAS_LIMIT);
        assert_eq!(profile.pre_verification_gas, DEFAULT_PRE_VERIFICATION_GAS);
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let profile: GasProfile = serde_json::from_str(r#"{"call_gas_limit": 1}"#).unwrap();
        assert_eq!(profile.call_gas_limit, 1);
        assert_eq!(profile.max_priority_fee_per_gas, DEFAULT_MAX_PRIORITY_FEE_PER_GAS);
    }
}
