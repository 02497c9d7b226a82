use std::sync::Arc;

use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes},
};
use relay_core::{abi::AbiRegistry, error::RelayError, transaction::InnerTransaction};

use crate::smart_account::SmartAccount;

/// Inner target call and the `execute` envelope wrapping it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCall {
    pub inner: Bytes,
    pub execute: Bytes,
}

/// Encodes target contract calls routed through the smart account with zero value.
#[derive(Debug, Clone)]
pub struct CallDataEncoder {
    registry: Arc<AbiRegistry>,
}

impl CallDataEncoder {
    pub fn new(registry: Arc<AbiRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AbiRegistry {
        &self.registry
    }

    pub fn encode(
        &self,
        account: &impl SmartAccount,
        target: Address,
        function: &str,
        args: &[DynSolValue],
    ) -> Result<EncodedCall, RelayError> {
        let inner = self.registry.encode(function, args)?;
        let execute = account.encode_execute(&InnerTransaction::call(target, inner.clone()));

        tracing::debug!(
            account = ?account.address(),
            target = ?target,
            function = function,
            inner_len = inner.len(),
            "Encoded call data"
        );

        Ok(EncodedCall { inner, execute })
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{U256, address, hex};

    use super::*;
    use crate::smart_account::DeterminedSmartAccount;

    #[test]
    fn register_is_wrapped_in_execute() {
        let encoder = CallDataEncoder::new(Arc::new(AbiRegistry::voting().unwrap()));
        let account = DeterminedSmartAccount {
            address: address!("0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"),
        };
        let target = address!("0x1111111111111111111111111111111111111111");

        let call = encoder
            .encode(
                &account,
                target,
                "register",
                &[
                    DynSolValue::Uint(U256::from(1), 256),
                    DynSolValue::Address(address!("0xBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB")),
                ],
            )
            .unwrap();

        assert_eq!(&call.execute[..4], hex!("b61d27f6"));
        assert_eq!(&call.execute[4 + 12..36], target.as_slice());
        assert_eq!(U256::from_be_slice(&call.execute[36..68]), U256::ZERO);
        assert_eq!(
            U256::from_be_slice(&call.execute[100..132]),
            U256::from(call.inner.len())
        );
        assert_eq!(&call.execute[132..132 + call.inner.len()], call.inner.as_ref());
    }

    #[test]
    fn encoding_errors_surface_unchanged() {
        let encoder = CallDataEncoder::new(Arc::new(AbiRegistry::voting().unwrap()));
        let account = DeterminedSmartAccount {
            address: Address::ZERO,
        };

        let err = encoder
            .encode(&account, Address::ZERO, "register", &[DynSolValue::Bool(true)])
            .unwrap_err();
        assert!(matches!(err, RelayError::EncodingError { .. }));
    }
}
