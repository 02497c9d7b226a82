use alloy::{
    primitives::{Address, Bytes},
    sol,
    sol_types::SolCall,
};
use relay_core::{entrypoint::EntryPointReader, error::RelayError, transaction::InnerTransaction};

sol! {
    function execute(address _target, uint256 _value, bytes _calldata);
}

pub trait SmartAccount {
    fn address(&self) -> &Address;

    /// Check if the account is deployed
    #[allow(async_fn_in_trait)]
    async fn is_deployed(&self, reader: &impl EntryPointReader) -> Result<bool, RelayError> {
        reader.is_deployed(*self.address()).await
    }

    /// Encode a transaction call to the account
    fn encode_execute(&self, tx: &InnerTransaction) -> Bytes {
        executeCall {
            _target: tx.to,
            _value: tx.value,
            _calldata: tx.data.clone(),
        }
        .abi_encode()
        .into()
    }
}

/// Smart account whose address is already known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeterminedSmartAccount {
    pub address: Address,
}

impl SmartAccount for DeterminedSmartAccount {
    fn address(&self) -> &Address {
        &self.address
    }
}
