use alloy::primitives::{Address, U256};
use relay_core::{entrypoint::EntryPointReader, error::RelayError};

/// Reads the sender's current sequence number from the verifying contract.
///
/// Tries the keyed accessor first and the legacy accessor second. There is no
/// default value and no retry: if both fail the caller gets
/// [`RelayError::NonceUnavailable`].
pub struct NonceResolver<'a, R: EntryPointReader> {
    reader: &'a R,
}

impl<'a, R: EntryPointReader> NonceResolver<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }

    pub async fn resolve(&self, sender: Address) -> Result<U256, RelayError> {
        let primary = match self.reader.get_nonce(sender).await {
            Ok(nonce) => {
                tracing::debug!(sender = ?sender, nonce = %nonce, "Resolved nonce");
                return Ok(nonce);
            }
            Err(e) => e,
        };

        tracing::debug!(
            sender = ?sender,
            error = %primary,
            "Primary nonce accessor failed, trying legacy accessor"
        );

        match self.reader.get_nonce_legacy(sender).await {
            Ok(nonce) => {
                tracing::debug!(sender = ?sender, nonce = %nonce, "Resolved nonce via legacy accessor");
                Ok(nonce)
            }
            Err(legacy) => {
                tracing::error!(
                    sender = ?sender,
                    primary = %primary,
                    legacy = %legacy,
                    "Both nonce accessors failed"
                );
                Err(RelayError::NonceUnavailable {
                    sender,
                    primary: primary.to_string(),
                    legacy: legacy.to_string(),
                })
            }
        }
    }
}
