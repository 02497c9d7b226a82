use std::{future::Future, time::Duration};

use alloy::{
    primitives::{Address, Bytes, U256, aliases::U192},
    providers::{Provider, RootProvider},
    sol,
};
use relay_aa_types::{Operation, OperationHash};

use crate::error::{AlloyRpcErrorToRelayError, ContractErrorToRelayError, RelayError};

sol! {
    #[sol(rpc)]
    interface IEntryPoint {
        struct UserOperation {
            address sender;
            uint256 nonce;
            bytes initCode;
            bytes callData;
            uint256 callGasLimit;
            uint256 verificationGasLimit;
            uint256 preVerificationGas;
            uint256 maxFeePerGas;
            uint256 maxPriorityFeePerGas;
            bytes paymasterAndData;
            bytes signature;
        }

        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
        function getUserOpHash(UserOperation calldata userOp) external view returns (bytes32);
    }
}

sol! {
    #[sol(rpc)]
    interface ILegacyEntryPoint {
        function getNonce(address sender) external view returns (uint256 nonce);
    }
}

/// Read-only view of the verifying contract.
pub trait EntryPointReader: Send + Sync {
    fn address(&self) -> Address;

    /// Sequence number through `getNonce(address,uint192)` with key 0.
    fn get_nonce(&self, sender: Address)
    -> impl Future<Output = Result<U256, RelayError>> + Send;

    /// Sequence number through the single-argument legacy accessor.
    fn get_nonce_legacy(
        &self,
        sender: Address,
    ) -> impl Future<Output = Result<U256, RelayError>> + Send;

    /// The contract's own hash of `op`. The signature is ignored by the contract.
    fn get_user_op_hash(
        &self,
        op: &Operation,
    ) -> impl Future<Output = Result<OperationHash, RelayError>> + Send;

    fn is_deployed(&self, account: Address)
    -> impl Future<Output = Result<bool, RelayError>> + Send;
}

/// [`EntryPointReader`] over a JSON-RPC provider. Every call is bounded by `timeout`.
#[derive(Debug, Clone)]
pub struct EntryPoint {
    pub address: Address,
    pub chain_id: u64,
    pub rpc_url: String,
    pub provider: RootProvider,
    pub timeout: Duration,
}

impl EntryPoint {
    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, RelayError>>,
    ) -> Result<T, RelayError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| RelayError::timeout(operation, self.timeout))?
    }
}

impl From<&Operation> for IEntryPoint::UserOperation {
    fn from(op: &Operation) -> Self {
        IEntryPoint::UserOperation {
            sender: op.sender,
            nonce: op.nonce,
            initCode: op.init_code.clone(),
            callData: op.call_data.clone(),
            callGasLimit: op.call_gas_limit,
            verificationGasLimit: op.verification_gas_limit,
            preVerificationGas: op.pre_verification_gas,
            maxFeePerGas: op.max_fee_per_gas,
            maxPriorityFeePerGas: op.max_priority_fee_per_gas,
            paymasterAndData: op.paymaster_and_data.clone(),
            signature: Bytes::default(),
        }
    }
}

impl EntryPointReader for EntryPoint {
    fn address(&self) -> Address {
        self.address
    }

    async fn get_nonce(&self, sender: Address) -> Result<U256, RelayError> {
        let contract = IEntryPoint::new(self.address, self.provider.clone());

        self.bounded("getNonce", async {
            contract
                .getNonce(sender, U192::ZERO)
                .call()
                .await
                .map_err(|e| e.to_relay_error(self.chain_id, self.address))
        })
        .await
    }

    async fn get_nonce_legacy(&self, sender: Address) -> Result<U256, RelayError> {
        let contract = ILegacyEntryPoint::new(self.address, self.provider.clone());

        self.bounded("getNonce(legacy)", async {
            contract
                .getNonce(sender)
                .call()
                .await
                .map_err(|e| e.to_relay_error(self.chain_id, self.address))
        })
        .await
    }

    async fn get_user_op_hash(&self, op: &Operation) -> Result<OperationHash, RelayError> {
        let contract = IEntryPoint::new(self.address, self.provider.clone());
        let user_op = IEntryPoint::UserOperation::from(op);

        self.bounded("getUserOpHash", async {
            contract
                .getUserOpHash(user_op)
                .call()
                .await
                .map_err(|e| e.to_relay_error(self.chain_id, self.address))
        })
        .await
    }

    async fn is_deployed(&self, account: Address) -> Result<bool, RelayError> {
        self.bounded("eth_getCode", async {
            let code = self
                .provider
                .get_code_at(account)
                .await
                .map_err(|e| e.to_relay_error(self.chain_id, &self.rpc_url))?;

            Ok(!code.is_empty())
        })
        .await
    }
}
