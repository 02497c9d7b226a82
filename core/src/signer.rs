use alloy::{
    primitives::{Bytes, Signature},
    signers::SignerSync,
};
use chrono::{DateTime, Utc};
use relay_aa_types::OperationHash;

use crate::{credentials::SessionKey, error::RelayError};

/// Length of an `r ‖ s ‖ v` signature.
pub const SIGNATURE_LENGTH: usize = 65;

/// Signs operation hashes with a session key.
///
/// The hash is signed as the digest itself, no prefix and no second keccak
/// pass. Every signature is recovered and checked against the key address
/// before it is returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionKeySigner;

impl SessionKeySigner {
    pub fn new() -> Self {
        Self
    }

    pub fn sign(&self, hash: OperationHash, key: &SessionKey) -> Result<Bytes, RelayError> {
        self.sign_at(hash, key, Utc::now())
    }

    pub fn sign_at(
        &self,
        hash: OperationHash,
        key: &SessionKey,
        now: DateTime<Utc>,
    ) -> Result<Bytes, RelayError> {
        key.ensure_active(now)?;

        let signature = key
            .signer()
            .sign_hash_sync(&hash)
            .map_err(|e| RelayError::SigningError {
                message: e.to_string(),
            })?;

        let encoded = Bytes::from(signature.as_bytes());
        verify(hash, &encoded, key)?;

        tracing::debug!(
            hash = ?hash,
            signer = ?key.address(),
            account = ?key.account,
            "Signed operation hash"
        );

        Ok(encoded)
    }
}

/// Recover the signer of `signature` over `hash` and require it to be the
/// session key's address.
pub fn verify(hash: OperationHash, signature: &[u8], key: &SessionKey) -> Result<(), RelayError> {
    let expected = key.address();

    let recovered = if signature.len() == SIGNATURE_LENGTH {
        Signature::try_from(signature)
            .ok()
            .and_then(|sig| sig.recover_address_from_prehash(&hash).ok())
    } else {
        None
    };

    match recovered {
        Some(address) if address == expected => Ok(()),
        recovered => {
            tracing::error!(
                hash = ?hash,
                expected = ?expected,
                recovered = ?recovered,
                "Signature self-check failed"
            );
            Err(RelayError::SignatureMismatch {
                expected,
                recovered,
            })
        }
    }
}
