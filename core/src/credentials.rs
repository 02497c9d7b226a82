use std::fmt;

use alloy::{
    primitives::{Address, B256},
    signers::local::PrivateKeySigner,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::{constants::DEFAULT_SESSION_KEY_TTL_SECS, error::RelayError};

/// Delegated secp256k1 credential allowed to act for `account` until `expires_at`.
///
/// Lives only in process memory. Cloning shares the same scalar.
#[derive(Clone)]
pub struct SessionKey {
    signer: PrivateKeySigner,
    pub expires_at: DateTime<Utc>,
    pub account: Address,
}

/// Session key document as issued by the backend of record.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKeyGrant {
    pub private_key: String,
    pub account_address: Address,
    /// Unix seconds
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl fmt::Debug for SessionKeyGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeyGrant")
            .field("private_key", &"<redacted>")
            .field("account_address", &self.account_address)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("address", &self.signer.address())
            .field("account", &self.account)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl SessionKey {
    pub fn new(signer: PrivateKeySigner, account: Address, expires_at: DateTime<Utc>) -> Self {
        Self {
            signer,
            expires_at,
            account,
        }
    }

    /// Operator supplied key, `0x` prefix optional.
    pub fn from_hex(
        private_key: &str,
        account: Address,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, RelayError> {
        let scalar: B256 = private_key
            .trim()
            .parse()
            .map_err(|_| RelayError::ValidationError {
                message: "session key is not a 32 byte hex scalar".to_string(),
            })?;

        let signer =
            PrivateKeySigner::from_bytes(&scalar).map_err(|e| RelayError::ValidationError {
                message: format!("invalid session key: {e}"),
            })?;

        Ok(Self::new(signer, account, expires_at))
    }

    /// Key issued by the backend. A grant without an expiry is valid for
    /// [`DEFAULT_SESSION_KEY_TTL_SECS`] from `issued_at`.
    pub fn from_grant(grant: &SessionKeyGrant, issued_at: DateTime<Utc>) -> Result<Self, RelayError> {
        let expires_at = match grant.expires_at {
            Some(secs) => DateTime::from_timestamp(secs, 0).ok_or_else(|| {
                RelayError::ValidationError {
                    message: format!("session key expiry {secs} is out of range"),
                }
            })?,
            None => issued_at + Duration::seconds(DEFAULT_SESSION_KEY_TTL_SECS),
        };

        Self::from_hex(&grant.private_key, grant.account_address, expires_at)
    }

    /// Address derived from the key's public point.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn ensure_active(&self, now: DateTime<Utc>) -> Result<(), RelayError> {
        if self.is_expired_at(now) {
            return Err(RelayError::ExpiredSessionKey {
                account: self.account,
                expired_at: self.expires_at,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;

    // anvil account #0
    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const KEY_ADDRESS: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

    #[test]
    fn hex_key_derives_expected_address() {
        let key = SessionKey::from_hex(KEY, Address::ZERO, Utc::now()).unwrap();
        assert_eq!(key.address(), KEY_ADDRESS);

        let unprefixed = SessionKey::from_hex(&KEY[2..], Address::ZERO, Utc::now()).unwrap();
        assert_eq!(unprefixed.address(), KEY_ADDRESS);
    }

    #[test]
    fn debug_output_never_contains_the_scalar() {
        let key = SessionKey::from_hex(KEY, Address::ZERO, Utc::now()).unwrap();
        let rendered = format!("{key:?}");
        assert!(!rendered.contains(&KEY[2..]));
        assert!(!rendered.to_lowercase().contains("ac0974bec39a17e3"));
    }

    #[test]
    fn expiry_is_inclusive() {
        let expires_at = Utc::now();
        let key = SessionKey::from_hex(KEY, Address::ZERO, expires_at).unwrap();

        assert!(key.ensure_active(expires_at - Duration::seconds(1)).is_ok());
        assert!(matches!(
            key.ensure_active(expires_at),
            Err(RelayError::ExpiredSessionKey { .. })
        ));
    }

    #[test]
    fn grant_without_expiry_gets_default_ttl() {
        let grant: SessionKeyGrant = serde_json::from_value(serde_json::json!({
            "privateKey": KEY,
            "accountAddress": "0x00000000000000000000000000000000000000aa",
        }))
        .unwrap();
        let issued_at = Utc::now();

        let key = SessionKey::from_grant(&grant, issued_at).unwrap();
        assert_eq!(
            key.expires_at,
            issued_at + Duration::seconds(DEFAULT_SESSION_KEY_TTL_SECS)
        );
        assert_eq!(key.account, address!("0x00000000000000000000000000000000000000aa"));
    }

    #[test]
    fn malformed_key_is_rejected() {
        assert!(SessionKey::from_hex("0x1234", Address::ZERO, Utc::now()).is_err());
    }
}
