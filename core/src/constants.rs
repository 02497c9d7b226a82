use alloy::primitives::{Address, address};

/// Canonical ERC-4337 v0.6 entry point, the default verifying contract.
pub const ENTRYPOINT_ADDRESS_V0_6: Address =
    address!("0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 15;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Session keys issued by the backend default to this lifetime when the grant
/// carries no expiry.
pub const DEFAULT_SESSION_KEY_TTL_SECS: i64 = 3_600;

/// Upper bound of relayer/backend error bodies kept in error messages.
pub const ERROR_BODY_PREVIEW_CHARS: usize = 512;
