pub mod builder;
pub mod call_data;
pub mod hasher;
pub mod nonce;
pub mod paymaster;
pub mod sender_lock;
