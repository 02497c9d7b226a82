use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// ### InnerTransaction
/// The call the smart account executes on behalf of the session key holder.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InnerTransaction {
    pub to: Address,

    #[serde(default)]
    pub data: Bytes,

    #[serde(default)]
    pub value: U256,
}

impl InnerTransaction {
    pub fn call(to: Address, data: Bytes) -> Self {
        Self {
            to,
            data,
            value: U256::ZERO,
        }
    }
}
