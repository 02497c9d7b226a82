use fixtures::*;

use std::path::Path;

use alloy::primitives::{Address, B256, Bytes, U256, b256};
use proptest::prelude::*;
use relay_aa_core::userop::hasher::{HashSource, OperationHasher};
use relay_aa_types::{HashScheme, Operation, compute_operation_hash};
use relay_core::{
    config::{DeploymentTarget, Environment, load_config_from},
    error::{ErrorClass, RelayError},
};
use serde_json::json;

fn arb_operation() -> impl Strategy<Value = Operation> {
    (
        any::<[u8; 20]>(),
        any::<[u8; 32]>(),
        proptest::collection::vec(any::<u8>(), 0..120),
        proptest::collection::vec(any::<u8>(), 0..300),
        (any::<u64>(), any::<u64>(), any::<u64>()),
        (any::<u128>(), any::<u128>()),
        prop_oneof![
            Just(Vec::new()),
            proptest::collection::vec(any::<u8>(), 20..=20),
            proptest::collection::vec(any::<u8>(), 84..=84),
        ],
        proptest::collection::vec(any::<u8>(), 0..=65),
    )
        .prop_map(
            |(sender, nonce, init_code, call_data, limits, fees, paymaster, signature)| Operation {
                sender: Address::from(sender),
                nonce: U256::from_be_bytes(nonce),
                init_code: Bytes::from(init_code),
                call_data: Bytes::from(call_data),
                call_gas_limit: U256::from(limits.0),
                verification_gas_limit: U256::from(limits.1),
                pre_verification_gas: U256::from(limits.2),
                max_fee_per_gas: U256::from(fees.0),
                max_priority_fee_per_gas: U256::from(fees.1),
                paymaster_and_data: Bytes::from(paymaster),
                signature: Bytes::from(signature),
            },
        )
}

fn arb_scheme() -> impl Strategy<Value = HashScheme> {
    prop_oneof![Just(HashScheme::Typed), Just(HashScheme::EntryPointV06)]
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #[test]
    fn contract_and_local_paths_agree(
        op in arb_operation(),
        contract in any::<[u8; 20]>(),
        chain_id in any::<u64>(),
        scheme in arb_scheme(),
    ) {
        let mut reader = MockReader::new(chain_id, scheme);
        reader.address = Address::from(contract);
        let hasher = OperationHasher::new(&reader, chain_id, scheme);

        let hashed = block_on(hasher.hash(&op)).unwrap();

        prop_assert_eq!(hashed.source, HashSource::Contract);
        prop_assert_eq!(hashed.hash, hasher.local_hash(&op));
        prop_assert_eq!(
            hashed.hash,
            compute_operation_hash(&op, reader.address, chain_id, scheme)
        );
    }
}

#[tokio::test]
async fn test_unreachable_contract_falls_back_to_local_encoding() {
    setup_tracing();
    let mut reader = MockReader::new(80_002, HashScheme::Typed);
    reader.hash_available = false;
    let hasher = OperationHasher::new(&reader, 80_002, HashScheme::Typed);

    let op = Operation {
        sender: SENDER,
        nonce: U256::from(7),
        init_code: Bytes::default(),
        call_data: Bytes::from_static(&[0xb6, 0x1d, 0x27, 0xf6]),
        call_gas_limit: U256::from(2_000_000),
        verification_gas_limit: U256::from(600_000),
        pre_verification_gas: U256::from(210_000),
        max_fee_per_gas: U256::from(2_000_000_000u64),
        max_priority_fee_per_gas: U256::from(1_000_000_000u64),
        paymaster_and_data: Bytes::default(),
        signature: Bytes::default(),
    };

    let hashed = hasher.hash(&op).await.unwrap();
    assert_eq!(hashed.source, HashSource::Local);
    assert_eq!(
        hashed.hash,
        reference_hash(&op, ENTRYPOINT, 80_002, HashScheme::Typed)
    );
    assert_eq!(reader.calls(), vec!["getUserOpHash"]);
}

fn vote_operation() -> Operation {
    Operation {
        sender: SENDER,
        nonce: U256::from(3),
        init_code: Bytes::default(),
        call_data: Bytes::from_static(&[0xb6, 0x1d, 0x27, 0xf6, 0x00, 0x01]),
        call_gas_limit: U256::from(2_000_000),
        verification_gas_limit: U256::from(600_000),
        pre_verification_gas: U256::from(210_000),
        max_fee_per_gas: U256::from(2_000_000_000u64),
        max_priority_fee_per_gas: U256::from(1_000_000_000u64),
        paymaster_and_data: Bytes::from_static(&[0x99; 20]),
        signature: Bytes::default(),
    }
}

#[tokio::test]
async fn test_disagreeing_contract_hash_is_a_fatal_error() {
    setup_tracing();
    let bogus: B256 = b256!("0x0000000000000000000000000000000000000000000000000000000000000bad");
    let mut reader = MockReader::new(1, HashScheme::EntryPointV06);
    reader.hash_override = Some(bogus);
    let hasher = OperationHasher::new(&reader, 1, HashScheme::EntryPointV06);

    let op = Operation {
        sender: SENDER,
        nonce: U256::ZERO,
        init_code: Bytes::default(),
        call_data: Bytes::default(),
        call_gas_limit: U256::ZERO,
        verification_gas_limit: U256::ZERO,
        pre_verification_gas: U256::ZERO,
        max_fee_per_gas: U256::ZERO,
        max_priority_fee_per_gas: U256::ZERO,
        paymaster_and_data: Bytes::default(),
        signature: Bytes::default(),
    };

    let err = hasher.hash(&op).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Fatal);
    match err {
        RelayError::HashMismatch { contract, local } => {
            assert_eq!(contract, bogus);
            assert_eq!(local, hasher.local_hash(&op));
        }
        other => panic!("expected a hash mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_default_target_agrees_with_v06_entry_point() {
    setup_tracing();
    let target: DeploymentTarget = serde_json::from_value(json!({
        "chain_id": 80_002,
        "rpc_url": "http://127.0.0.1:8545",
        "relayer_url": "http://127.0.0.1:4000",
        "backend_url": "http://127.0.0.1:5000",
    }))
    .unwrap();
    assert_eq!(target.entrypoint_address, ENTRYPOINT);

    // the deployed v0.6 contract only knows its own layout
    let reader = MockReader::new(target.chain_id, HashScheme::EntryPointV06);
    let hasher = OperationHasher::new(&reader, target.chain_id, target.hash_scheme());
    let op = vote_operation();

    let hashed = hasher.hash(&op).await.unwrap();
    assert_eq!(hashed.source, HashSource::Contract);
    assert_eq!(hashed.hash, hasher.local_hash(&op));
}

#[tokio::test]
async fn test_shipped_targets_agree_with_v06_entry_point() {
    setup_tracing();
    let directory = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configuration");
    let op = vote_operation();

    for environment in [
        Environment::Local,
        Environment::Development,
        Environment::Production,
    ] {
        let config = load_config_from(&directory, environment).unwrap();
        for target in config.targets.values() {
            let mut reader = MockReader::new(target.chain_id, HashScheme::EntryPointV06);
            reader.address = target.entrypoint_address;
            let hasher = OperationHasher::new(&reader, target.chain_id, target.hash_scheme());

            let hashed = hasher.hash(&op).await.unwrap();
            assert_eq!(hashed.source, HashSource::Contract);
        }
    }
}
