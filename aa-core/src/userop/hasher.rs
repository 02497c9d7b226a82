use alloy::primitives::ChainId;
use relay_aa_types::{HashScheme, Operation, OperationHash, compute_operation_hash};
use relay_core::{entrypoint::EntryPointReader, error::RelayError};
use serde::{Deserialize, Serialize};

/// Which path produced an operation hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashSource {
    /// The verifying contract's `getUserOpHash`.
    Contract,
    /// Local encoding, used while the contract is unreachable.
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashedOperation {
    pub hash: OperationHash,
    pub source: HashSource,
}

/// Computes the canonical hash of an operation for the reader's contract and
/// `chain_id`. The signature field never contributes.
pub struct OperationHasher<'a, R: EntryPointReader> {
    reader: &'a R,
    chain_id: ChainId,
    scheme: HashScheme,
}

impl<'a, R: EntryPointReader> OperationHasher<'a, R> {
    pub fn new(reader: &'a R, chain_id: ChainId, scheme: HashScheme) -> Self {
        Self {
            reader,
            chain_id,
            scheme,
        }
    }

    pub fn local_hash(&self, op: &Operation) -> OperationHash {
        compute_operation_hash(op, self.reader.address(), self.chain_id, self.scheme)
    }

    /// Contract hash when reachable, otherwise the local encoding.
    ///
    /// A contract answer that disagrees with the local encoding fails with
    /// [`RelayError::HashMismatch`].
    pub async fn hash(&self, op: &Operation) -> Result<HashedOperation, RelayError> {
        let local = self.local_hash(op);

        match self.reader.get_user_op_hash(op).await {
            Ok(contract) if contract == local => Ok(HashedOperation {
                hash: contract,
                source: HashSource::Contract,
            }),
            Ok(contract) => {
                tracing::error!(
                    sender = ?op.sender,
                    nonce = %op.nonce,
                    contract_hash = ?contract,
                    local_hash = ?local,
                    scheme = ?self.scheme,
                    "Contract and local operation hashes disagree"
                );

                Err(RelayError::HashMismatch { contract, local })
            }
            Err(e) => {
                tracing::warn!(
                    sender = ?op.sender,
                    error = %e,
                    local_hash = ?local,
                    "Contract hash unavailable, falling back to local encoding"
                );

                Ok(HashedOperation {
                    hash: local,
                    source: HashSource::Local,
                })
            }
        }
    }
}
