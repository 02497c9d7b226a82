use std::collections::HashMap;

use alloy::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier},
    json_abi::Function,
    primitives::{Bytes, Selector, U256},
};

use crate::error::RelayError;

/// Functions of the voting contracts driven through the pipeline.
pub const VOTING_SIGNATURES: &[&str] = &[
    "createElection(string name, uint256 startTime, uint256 endTime)",
    "register(uint256 id, address voter)",
    "addVoter(uint256 electionId, address voter)",
    "grantRole(bytes32 role, address account)",
];

#[derive(Debug, Clone)]
struct RegisteredFunction {
    function: Function,
    param_types: Vec<DynSolType>,
}

/// Target contract functions keyed by name, parsed and resolved once.
/// Overloads are not supported; a name maps to exactly one signature.
#[derive(Debug, Clone, Default)]
pub struct AbiRegistry {
    functions: HashMap<String, RegisteredFunction>,
}

impl AbiRegistry {
    pub fn from_signatures<S: AsRef<str>>(signatures: &[S]) -> Result<Self, RelayError> {
        let mut functions = HashMap::with_capacity(signatures.len());

        for signature in signatures {
            let signature = signature.as_ref();
            let function = Function::parse(signature).map_err(|e| RelayError::EncodingError {
                function: signature.to_string(),
                message: format!("unparseable signature: {e}"),
            })?;

            let param_types = function
                .inputs
                .iter()
                .map(|param| param.resolve())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| RelayError::EncodingError {
                    function: signature.to_string(),
                    message: format!("unsupported parameter type: {e}"),
                })?;

            if functions.contains_key(&function.name) {
                return Err(RelayError::EncodingError {
                    function: function.name.clone(),
                    message: "registered more than once".to_string(),
                });
            }

            functions.insert(
                function.name.clone(),
                RegisteredFunction {
                    function,
                    param_types,
                },
            );
        }

        Ok(Self { functions })
    }

    /// Registry for the election, voter and role management functions.
    pub fn voting() -> Result<Self, RelayError> {
        Self::from_signatures(VOTING_SIGNATURES)
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name).map(|f| &f.function)
    }

    pub fn selector(&self, name: &str) -> Option<Selector> {
        self.function(name).map(Function::selector)
    }

    /// ABI encode a call to `name`, selector included.
    ///
    /// Integer arguments must fit the declared width; nothing is truncated.
    pub fn encode(&self, name: &str, args: &[DynSolValue]) -> Result<Bytes, RelayError> {
        let registered = self.lookup(name)?;
        let encoding_error = |message: String| RelayError::EncodingError {
            function: name.to_string(),
            message,
        };

        if args.len() != registered.param_types.len() {
            return Err(encoding_error(format!(
                "Parameter count mismatch: expected {}, got {}",
                registered.param_types.len(),
                args.len()
            )));
        }

        for (index, (value, ty)) in args.iter().zip(&registered.param_types).enumerate() {
            if !value.matches(ty) {
                return Err(encoding_error(format!(
                    "Parameter {index} type mismatch: expected {ty}, got {:?}",
                    value.as_type()
                )));
            }

            if !fits_declared_width(value) {
                return Err(encoding_error(format!(
                    "Parameter {index} does not fit in {ty}"
                )));
            }
        }

        registered
            .function
            .abi_encode_input(args)
            .map(Bytes::from)
            .map_err(|e| encoding_error(format!("Failed to encode function call: {e}")))
    }

    /// Like [`encode`](Self::encode) with arguments given as strings and
    /// coerced into the declared parameter types.
    pub fn encode_str(&self, name: &str, args: &[&str]) -> Result<Bytes, RelayError> {
        let registered = self.lookup(name)?;

        if args.len() != registered.param_types.len() {
            return Err(RelayError::EncodingError {
                function: name.to_string(),
                message: format!(
                    "Parameter count mismatch: expected {}, got {}",
                    registered.param_types.len(),
                    args.len()
                ),
            });
        }

        let values = args
            .iter()
            .zip(&registered.param_types)
            .map(|(arg, ty)| {
                ty.coerce_str(arg).map_err(|e| RelayError::EncodingError {
                    function: name.to_string(),
                    message: format!("Failed to parse `{arg}` as {ty}: {e}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.encode(name, &values)
    }

    fn lookup(&self, name: &str) -> Result<&RegisteredFunction, RelayError> {
        self.functions
            .get(name)
            .ok_or_else(|| RelayError::EncodingError {
                function: name.to_string(),
                message: "unknown function".to_string(),
            })
    }
}

fn fits_declared_width(value: &DynSolValue) -> bool {
    match value {
        DynSolValue::Uint(v, bits) => v.bit_len() <= *bits,
        DynSolValue::Int(v, bits) => {
            if *bits >= 256 {
                return true;
            }
            let bound = U256::from(1u8) << (*bits - 1);
            if v.is_negative() {
                v.unsigned_abs() <= bound
            } else {
                v.unsigned_abs() < bound
            }
        }
        DynSolValue::FixedBytes(word, size) => word[*size..].iter().all(|b| *b == 0),
        DynSolValue::Array(values) | DynSolValue::FixedArray(values) | DynSolValue::Tuple(values) => {
            values.iter().all(fits_declared_width)
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, I256, address, hex};

    use super::*;

    const VOTER: Address = address!("0xBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB");

    #[test]
    fn register_encodes_selector_and_words() {
        let registry = AbiRegistry::voting().unwrap();
        let data = registry
            .encode(
                "register",
                &[DynSolValue::Uint(U256::from(1), 256), DynSolValue::Address(VOTER)],
            )
            .unwrap();

        assert_eq!(&data[..4], registry.selector("register").unwrap().as_slice());
        assert_eq!(data.len(), 4 + 32 * 2);
        assert_eq!(data[4 + 31], 1);
        assert_eq!(&data[4 + 32 + 12..], VOTER.as_slice());
    }

    #[test]
    fn strings_are_length_prefixed() {
        let registry = AbiRegistry::voting().unwrap();
        let data = registry
            .encode_str("createElection", &["Board 2026", "100", "200"])
            .unwrap();

        // head: offset, start, end; tail: length word then padded bytes
        assert_eq!(data.len(), 4 + 32 * 3 + 32 + 32);
        assert_eq!(U256::from_be_slice(&data[4..36]), U256::from(96));
        assert_eq!(U256::from_be_slice(&data[100..132]), U256::from(10));
        assert_eq!(&data[132..142], b"Board 2026");
    }

    #[test]
    fn oversized_integers_are_rejected() {
        let registry = AbiRegistry::from_signatures(&["setQuorum(uint8 quorum, int16 delta)"]).unwrap();

        let err = registry
            .encode(
                "setQuorum",
                &[
                    DynSolValue::Uint(U256::from(256), 8),
                    DynSolValue::Int(I256::ZERO, 16),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, RelayError::EncodingError { .. }));

        let err = registry
            .encode(
                "setQuorum",
                &[
                    DynSolValue::Uint(U256::from(255), 8),
                    DynSolValue::Int(I256::try_from(-32_769i64).unwrap(), 16),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, RelayError::EncodingError { .. }));

        assert!(
            registry
                .encode(
                    "setQuorum",
                    &[
                        DynSolValue::Uint(U256::from(255), 8),
                        DynSolValue::Int(I256::try_from(-32_768i64).unwrap(), 16),
                    ],
                )
                .is_ok()
        );
    }

    #[test]
    fn wrong_arity_type_or_name_is_an_encoding_error() {
        let registry = AbiRegistry::voting().unwrap();

        assert!(registry.encode("register", &[DynSolValue::Uint(U256::from(1), 256)]).is_err());
        assert!(
            registry
                .encode(
                    "register",
                    &[DynSolValue::Address(VOTER), DynSolValue::Address(VOTER)]
                )
                .is_err()
        );
        assert!(registry.encode("castVote", &[]).is_err());
        assert!(registry.encode_str("register", &["one", "0xbb"]).is_err());
    }

    #[test]
    fn duplicate_and_malformed_signatures_fail_construction() {
        assert!(AbiRegistry::from_signatures(&["register(uint256)", "register(address)"]).is_err());
        assert!(AbiRegistry::from_signatures(&["register(uint256"]).is_err());
    }

    #[test]
    fn grant_role_selector() {
        let registry = AbiRegistry::voting().unwrap();
        assert_eq!(
            registry.selector("grantRole").unwrap().as_slice(),
            hex!("2f2ff15d")
        );
    }
}
