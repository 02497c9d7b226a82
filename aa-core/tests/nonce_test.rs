use fixtures::*;

use std::time::Duration;

use alloy::{
    primitives::{U256, hex},
    providers::ProviderBuilder,
};
use relay_aa_core::userop::nonce::NonceResolver;
use relay_aa_types::HashScheme;
use relay_core::{
    entrypoint::EntryPoint,
    error::{ErrorClass, RelayError},
};
use serde_json::json;
use wiremock::{Mock, MockServer, matchers::method};

#[tokio::test]
async fn test_primary_accessor_wins() {
    setup_tracing();
    let mut reader = MockReader::new(1, HashScheme::Typed);
    reader.nonce = Some(U256::from(7));
    reader.legacy_nonce = Some(U256::from(3));

    let nonce = NonceResolver::new(&reader).resolve(SENDER).await.unwrap();

    assert_eq!(nonce, U256::from(7));
    assert_eq!(reader.calls(), vec!["getNonce"]);
}

#[tokio::test]
async fn test_falls_back_to_legacy_accessor() {
    setup_tracing();
    let mut reader = MockReader::new(1, HashScheme::Typed);
    reader.nonce = None;
    reader.legacy_nonce = Some(U256::from(12));

    let nonce = NonceResolver::new(&reader).resolve(SENDER).await.unwrap();

    assert_eq!(nonce, U256::from(12));
    assert_eq!(reader.calls(), vec!["getNonce", "getNonce(legacy)"]);
}

#[tokio::test]
async fn test_both_accessors_failing_is_fatal() {
    setup_tracing();
    let mut reader = MockReader::new(1, HashScheme::Typed);
    reader.nonce = None;
    reader.legacy_nonce = None;

    let err = NonceResolver::new(&reader).resolve(SENDER).await.unwrap_err();

    assert!(matches!(err, RelayError::NonceUnavailable { sender, .. } if sender == SENDER));
    assert_eq!(err.class(), ErrorClass::Fatal);
    // no retries at this layer
    assert_eq!(reader.calls().len(), 2);
}

#[tokio::test]
async fn test_fallback_over_json_rpc() {
    setup_tracing();
    let rpc = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(json_rpc(|_, params| {
            let input = call_input(params);
            if input[..4] == selector("getNonce(address)") {
                Ok(json!(format!(
                    "0x{}",
                    hex::encode(U256::from(9).to_be_bytes::<32>())
                )))
            } else {
                Err((-32601, "method not supported".to_string()))
            }
        }))
        .mount(&rpc)
        .await;

    let entrypoint = EntryPoint {
        address: ENTRYPOINT,
        chain_id: 80_002,
        rpc_url: rpc.uri(),
        provider: ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_http(rpc.uri().parse().unwrap()),
        timeout: Duration::from_secs(5),
    };

    let nonce = NonceResolver::new(&entrypoint).resolve(SENDER).await.unwrap();
    assert_eq!(nonce, U256::from(9));
}
