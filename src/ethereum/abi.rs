use alloy::{
    dyn_abi::{DynSolValue, JsonAbiExt, Word},
    json_abi::{Constructor, Function, JsonAbi, Param, StateMutability},
    primitives::{Address, Bytes, I256, U256},
};
use serde_json::Value;
use std::str::FromStr;

use super::error::OpsError;

/// A contract's parsed interface description.
///
/// Wraps the parsed ABI (functions indexed by name, optional constructor)
/// together with the raw ABI JSON it was built from. Immutable once parsed;
/// one instance is shared across deploy/call operations on the same contract.
#[derive(Debug, Clone)]
pub struct ContractInterface {
    abi: JsonAbi,
    raw: String,
}

impl ContractInterface {
    pub fn parse(raw: &str) -> Result<Self, OpsError> {
        let abi: JsonAbi = serde_json::from_str(raw)?;
        Ok(Self {
            abi,
            raw: raw.to_owned(),
        })
    }

    /// Look up a function descriptor by name.
    ///
    /// Overload resolution is by name only; the first declared overload wins.
    pub fn function(&self, name: &str) -> Result<&Function, OpsError> {
        self.abi
            .function(name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| OpsError::FunctionNotFound(name.to_owned()))
    }

    pub fn constructor(&self) -> Result<&Constructor, OpsError> {
        self.abi.constructor.as_ref().ok_or(OpsError::ConstructorNotFound)
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    pub fn raw_json(&self) -> &str {
        &self.raw
    }
}

/// Whether calling this function is free of state changes (`eth_call` path).
pub fn is_read_only(function: &Function) -> bool {
    matches!(
        function.state_mutability,
        StateMutability::View | StateMutability::Pure
    )
}

/// ABI-encode a function call, selector included.
pub fn function_calldata(function: &Function, args: &[Value]) -> Result<Bytes, OpsError> {
    let values = coerce_args(&function.inputs, args)?;
    Ok(function.abi_encode_input(&values)?.into())
}

/// ABI-encode constructor arguments (no selector; appended to the bytecode).
pub fn constructor_args(constructor: &Constructor, args: &[Value]) -> Result<Vec<u8>, OpsError> {
    let values = coerce_args(&constructor.inputs, args)?;
    Ok(constructor.abi_encode_input(&values)?)
}

fn coerce_args(params: &[Param], args: &[Value]) -> Result<Vec<DynSolValue>, OpsError> {
    if params.len() != args.len() {
        return Err(OpsError::ArgumentCount {
            expected: params.len(),
            got: args.len(),
        });
    }
    params
        .iter()
        .zip(args)
        .map(|(param, arg)| coerce_value(arg, &param.ty))
        .collect()
}

/// Coerce a JSON value (typically a CLI-provided string) into the
/// `DynSolValue` demanded by the declared Solidity type.
fn coerce_value(value: &Value, sol_type: &str) -> Result<DynSolValue, OpsError> {
    let invalid = |reason: String| OpsError::InvalidArgument {
        ty: sol_type.to_owned(),
        reason,
    };

    match sol_type {
        "address" => {
            let text = value
                .as_str()
                .ok_or_else(|| invalid("address must be a string".into()))?;
            let address =
                Address::from_str(text.trim()).map_err(|e| invalid(e.to_string()))?;
            Ok(DynSolValue::Address(address))
        }
        "bool" => match value {
            Value::Bool(b) => Ok(DynSolValue::Bool(*b)),
            Value::String(s) => match s.trim() {
                "true" => Ok(DynSolValue::Bool(true)),
                "false" => Ok(DynSolValue::Bool(false)),
                other => Err(invalid(format!("expected true or false, got \"{other}\""))),
            },
            _ => Err(invalid("bool must be a boolean or string".into())),
        },
        "string" => {
            let text = value
                .as_str()
                .ok_or_else(|| invalid("string parameter must be a string".into()))?;
            Ok(DynSolValue::String(text.to_owned()))
        }
        "bytes" => {
            let bytes = hex_bytes(value, &invalid)?;
            Ok(DynSolValue::Bytes(bytes))
        }
        ty if ty.ends_with("[]") => {
            let elements = value
                .as_array()
                .ok_or_else(|| invalid("array parameter must be an array".into()))?;
            let element_type = &ty[..ty.len() - 2];
            let coerced = elements
                .iter()
                .map(|element| coerce_value(element, element_type))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DynSolValue::Array(coerced))
        }
        ty if ty.starts_with("uint") => {
            let size = numeric_width(ty, "uint", &invalid)?;
            let number = match value {
                Value::Number(n) => n
                    .as_u64()
                    .map(U256::from)
                    .ok_or_else(|| invalid("expected a non-negative integer".into()))?,
                Value::String(s) => parse_u256(s.trim()).map_err(invalid)?,
                _ => return Err(invalid("uint must be a number or string".into())),
            };
            Ok(DynSolValue::Uint(number, size))
        }
        ty if ty.starts_with("int") => {
            let size = numeric_width(ty, "int", &invalid)?;
            let number = match value {
                Value::Number(n) => {
                    let plain = n
                        .as_i64()
                        .ok_or_else(|| invalid("expected an integer".into()))?;
                    I256::try_from(plain).map_err(|e| invalid(e.to_string()))?
                }
                Value::String(s) => {
                    I256::from_dec_str(s.trim()).map_err(|e| invalid(e.to_string()))?
                }
                _ => return Err(invalid("int must be a number or string".into())),
            };
            Ok(DynSolValue::Int(number, size))
        }
        ty if ty.starts_with("bytes") => {
            // Fixed-size bytesN.
            let size: usize = ty[5..]
                .parse()
                .map_err(|_| invalid("unsupported bytes width".into()))?;
            let bytes = hex_bytes(value, &invalid)?;
            if bytes.len() != size || size > 32 {
                return Err(invalid(format!(
                    "expected {size} byte(s), got {}",
                    bytes.len()
                )));
            }
            let mut word = [0u8; 32];
            word[..size].copy_from_slice(&bytes);
            Ok(DynSolValue::FixedBytes(Word::from(word), size))
        }
        other => Err(invalid(format!("unsupported Solidity type \"{other}\""))),
    }
}

fn numeric_width(
    ty: &str,
    prefix: &str,
    invalid: &impl Fn(String) -> OpsError,
) -> Result<usize, OpsError> {
    let suffix = &ty[prefix.len()..];
    if suffix.is_empty() {
        return Ok(256);
    }
    match suffix.parse::<usize>() {
        Ok(bits) if bits % 8 == 0 && (8..=256).contains(&bits) => Ok(bits),
        _ => Err(invalid(format!("unsupported numeric width \"{ty}\""))),
    }
}

fn parse_u256(text: &str) -> Result<U256, String> {
    if let Some(hex_digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        U256::from_str_radix(hex_digits, 16).map_err(|e| e.to_string())
    } else {
        U256::from_str(text).map_err(|e| e.to_string())
    }
}

fn hex_bytes(value: &Value, invalid: &impl Fn(String) -> OpsError) -> Result<Vec<u8>, OpsError> {
    let text = value
        .as_str()
        .ok_or_else(|| invalid("bytes must be a hex string".into()))?;
    let trimmed = text.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(digits).map_err(|e| invalid(e.to_string()))
}

/// Convert decoded return values to JSON for display.
///
/// A single return value is unwrapped; multiple values become an array.
pub fn decoded_to_json(values: &[DynSolValue]) -> Value {
    match values {
        [single] => value_to_json(single),
        many => Value::Array(many.iter().map(value_to_json).collect()),
    }
}

fn value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Address(address) => Value::String(address.to_string()),
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Uint(n, _) => Value::String(n.to_string()),
        DynSolValue::Int(n, _) => Value::String(n.to_string()),
        DynSolValue::Bytes(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(format!("0x{}", hex::encode(&word[..*size])))
        }
        DynSolValue::Array(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(value_to_json).collect())
        }
        other => Value::String(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE_ABI: &str = r#"[
        {"type":"constructor","stateMutability":"payable",
         "inputs":[{"name":"owner","type":"address"}]},
        {"type":"function","name":"totalCount","stateMutability":"view",
         "inputs":[],"outputs":[{"name":"","type":"uint256"}]},
        {"type":"function","name":"register","stateMutability":"nonpayable",
         "inputs":[{"name":"target","type":"address"}],"outputs":[]},
        {"type":"function","name":"subscribe","stateMutability":"payable",
         "inputs":[],"outputs":[]},
        {"type":"function","name":"digest","stateMutability":"pure",
         "inputs":[{"name":"data","type":"bytes"}],
         "outputs":[{"name":"","type":"bytes32"}]}
    ]"#;

    fn interface() -> ContractInterface {
        ContractInterface::parse(SAMPLE_ABI).unwrap()
    }

    #[test]
    fn function_lookup_by_name() {
        let iface = interface();
        assert_eq!(iface.function("register").unwrap().name, "register");
        assert!(matches!(
            iface.function("missing"),
            Err(OpsError::FunctionNotFound(name)) if name == "missing"
        ));
    }

    #[test]
    fn constructor_lookup() {
        let iface = interface();
        assert_eq!(
            iface.constructor().unwrap().state_mutability,
            StateMutability::Payable
        );

        let bare = ContractInterface::parse("[]").unwrap();
        assert!(matches!(bare.constructor(), Err(OpsError::ConstructorNotFound)));
    }

    #[test]
    fn read_only_classification() {
        let iface = interface();
        assert!(is_read_only(iface.function("totalCount").unwrap()));
        assert!(is_read_only(iface.function("digest").unwrap()));
        assert!(!is_read_only(iface.function("register").unwrap()));
        assert!(!is_read_only(iface.function("subscribe").unwrap()));
    }

    #[test]
    fn calldata_has_selector_and_encoded_args() {
        let iface = interface();
        let calldata = function_calldata(
            iface.function("register").unwrap(),
            &[json!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")],
        )
        .unwrap();
        assert_eq!(calldata.len(), 4 + 32);
    }

    #[test]
    fn argument_count_mismatch() {
        let iface = interface();
        let err = function_calldata(iface.function("register").unwrap(), &[]).unwrap_err();
        assert!(matches!(err, OpsError::ArgumentCount { expected: 1, got: 0 }));
    }

    #[test]
    fn coerces_common_types() {
        let addr = coerce_value(
            &json!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
            "address",
        )
        .unwrap();
        assert!(matches!(addr, DynSolValue::Address(_)));

        assert_eq!(
            coerce_value(&json!("42"), "uint256").unwrap(),
            DynSolValue::Uint(U256::from(42), 256)
        );
        assert_eq!(
            coerce_value(&json!("0x2a"), "uint256").unwrap(),
            DynSolValue::Uint(U256::from(42), 256)
        );
        assert_eq!(
            coerce_value(&json!(7), "uint64").unwrap(),
            DynSolValue::Uint(U256::from(7), 64)
        );
        assert_eq!(
            coerce_value(&json!("-5"), "int256").unwrap(),
            DynSolValue::Int(I256::from_dec_str("-5").unwrap(), 256)
        );
        assert_eq!(
            coerce_value(&json!("true"), "bool").unwrap(),
            DynSolValue::Bool(true)
        );
        assert_eq!(
            coerce_value(&json!(["1", "2"]), "uint256[]").unwrap(),
            DynSolValue::Array(vec![
                DynSolValue::Uint(U256::from(1), 256),
                DynSolValue::Uint(U256::from(2), 256),
            ])
        );
    }

    #[test]
    fn fixed_bytes_width_is_enforced() {
        let ok = coerce_value(&json!(format!("0x{}", "ab".repeat(32))), "bytes32").unwrap();
        assert!(matches!(ok, DynSolValue::FixedBytes(_, 32)));

        let err = coerce_value(&json!("0xabcd"), "bytes32").unwrap_err();
        assert!(matches!(err, OpsError::InvalidArgument { .. }));
    }

    #[test]
    fn decoded_values_to_json() {
        let single = decoded_to_json(&[DynSolValue::Uint(U256::from(99), 256)]);
        assert_eq!(single, json!("99"));

        let pair = decoded_to_json(&[
            DynSolValue::Bool(true),
            DynSolValue::String("ok".into()),
        ]);
        assert_eq!(pair, json!([true, "ok"]));
    }
}
