pub mod account_factory;
pub mod smart_account;
pub mod userop;
