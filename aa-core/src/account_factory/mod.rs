use alloy::{
    primitives::{Address, Bytes},
    sol,
    sol_types::SolCall,
};
use relay_core::{entrypoint::EntryPointReader, error::RelayError};
use serde::{Deserialize, Serialize};

use crate::smart_account::SmartAccount;

sol! {
    function createAccount(address admin, bytes salt) returns (address);
}

/// Factory call creating the sender on first use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInit {
    pub factory: Address,
    pub admin: Address,
    #[serde(default)]
    pub salt: Bytes,
}

impl AccountInit {
    pub fn init_calldata(&self) -> Vec<u8> {
        createAccountCall {
            admin: self.admin,
            salt: self.salt.clone(),
        }
        .abi_encode()
    }

    /// `factory ‖ createAccount(admin, salt)`
    pub fn init_code(&self) -> Bytes {
        let mut init_code: Vec<u8> = self.factory.into_array().to_vec();
        init_code.extend_from_slice(&self.init_calldata());
        Bytes::from(init_code)
    }
}

/// Init code for `account`: empty once deployed or when no factory call is
/// configured.
pub async fn resolve_init_code(
    account: &impl SmartAccount,
    init: Option<&AccountInit>,
    reader: &impl EntryPointReader,
) -> Result<Bytes, RelayError> {
    let Some(init) = init else {
        return Ok(Bytes::default());
    };

    if account.is_deployed(reader).await? {
        tracing::debug!(account = ?account.address(), "Account already deployed, no init code");
        return Ok(Bytes::default());
    }

    tracing::debug!(
        account = ?account.address(),
        factory = ?init.factory,
        "Account not deployed, attaching init code"
    );
    Ok(init.init_code())
}
