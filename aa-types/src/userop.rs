use alloy::{
    core::sol_types::SolValue,
    primitives::{Address, B256, Bytes, ChainId, U256, keccak256},
    rpc::types::UserOperation,
};
use serde::{Deserialize, Serialize};

/// The meta-transaction envelope. Field layout follows ERC-4337 v0.6.
pub type Operation = UserOperation;

/// Digest identifying an [`Operation`] for a verifying contract on one chain.
pub type OperationHash = B256;

/// EIP-712 style type string covering every field except the signature.
pub const USER_OPERATION_TYPE: &str = "UserOperation(address sender,uint256 nonce,bytes initCode,bytes callData,uint256 callGasLimit,uint256 verificationGasLimit,uint256 preVerificationGas,uint256 maxFeePerGas,uint256 maxPriorityFeePerGas,bytes paymasterAndData)";

/// How the inner operation digest is laid out before binding it to the
/// verifying contract and chain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashScheme {
    /// Type hash word followed by the ten hashed/static fields.
    #[default]
    Typed,
    /// Plain ERC-4337 v0.6 `getUserOpHash` layout, no type hash word.
    EntryPointV06,
}

/// Keccak of [`USER_OPERATION_TYPE`].
pub fn user_operation_typehash() -> B256 {
    keccak256(USER_OPERATION_TYPE)
}

/// Build an operation with every field set and an empty signature.
pub fn unsigned_operation(
    sender: Address,
    nonce: U256,
    init_code: Bytes,
    call_data: Bytes,
    gas: &crate::GasProfile,
    paymaster_and_data: Bytes,
) -> Operation {
    UserOperation {
        sender,
        nonce,
        init_code,
        call_data,
        call_gas_limit: U256::from(gas.call_gas_limit),
        verification_gas_limit: U256::from(gas.verification_gas_limit),
        pre_verification_gas: U256::from(gas.pre_verification_gas),
        max_fee_per_gas: U256::from(gas.max_fee_per_gas),
        max_priority_fee_per_gas: U256::from(gas.max_priority_fee_per_gas),
        paymaster_and_data,
        signature: Bytes::default(),
    }
}

/// Compute the operation hash locally. The signature field is never read.
pub fn compute_operation_hash(
    op: &Operation,
    verifying_contract: Address,
    chain_id: ChainId,
    scheme: HashScheme,
) -> OperationHash {
    // Hash the byte fields first
    let init_code_hash = keccak256(&op.init_code);
    let call_data_hash = keccak256(&op.call_data);
    let paymaster_and_data_hash = keccak256(&op.paymaster_and_data);

    let inner_encoded = match scheme {
        HashScheme::Typed => (
            user_operation_typehash(),
            op.sender,
            op.nonce,
            init_code_hash,
            call_data_hash,
            op.call_gas_limit,
            op.verification_gas_limit,
            op.pre_verification_gas,
            op.max_fee_per_gas,
            op.max_priority_fee_per_gas,
            paymaster_and_data_hash,
        )
            .abi_encode(),
        HashScheme::EntryPointV06 => (
            op.sender,
            op.nonce,
            init_code_hash,
            call_data_hash,
            op.call_gas_limit,
            op.verification_gas_limit,
            op.pre_verification_gas,
            op.max_fee_per_gas,
            op.max_priority_fee_per_gas,
            paymaster_and_data_hash,
        )
            .abi_encode(),
    };
    let inner_hash = keccak256(&inner_encoded);

    let outer_tuple = (inner_hash, verifying_contract, U256::from(chain_id));
    keccak256(outer_tuple.abi_encode())
}
