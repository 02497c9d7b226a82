pub mod abi;
pub mod chain;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod entrypoint;
pub mod error;
pub mod rpc_clients;
pub mod signer;
pub mod transaction;
