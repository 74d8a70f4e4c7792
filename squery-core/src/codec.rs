//! JSON text codec shared by the caller and the route handler.
//!
//! Non-finite floats are written as `null`, matching JSON semantics. Decoding
//! never substitutes defaults: empty or malformed text is an error.

use crate::error::{DeserializationError, SerializationError};
use crate::result::{ErrorDetail, QueryResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub fn serialize_input<I: Serialize + ?Sized>(input: &I) -> Result<String, SerializationError> {
    serde_json::to_string(input).map_err(|e| SerializationError::new("input", e))
}

pub fn serialize_result<T: Serialize>(result: &QueryResult<T>) -> Result<String, SerializationError> {
    serde_json::to_string(result).map_err(|e| SerializationError::new("result", e))
}

pub fn deserialize_input<I: DeserializeOwned>(text: &str) -> Result<I, DeserializationError> {
    serde_json::from_str(text).map_err(|e| DeserializationError::new("input", e))
}

pub fn deserialize_result<T: DeserializeOwned>(
    text: &str,
) -> Result<QueryResult<T>, DeserializationError> {
    serde_json::from_str(text).map_err(|e| DeserializationError::new("result", e))
}

pub fn serialize_error_detail(detail: &ErrorDetail) -> Result<String, SerializationError> {
    serde_json::to_string(detail).map_err(|e| SerializationError::new("error detail", e))
}

pub fn deserialize_error_detail(text: &str) -> Result<ErrorDetail, DeserializationError> {
    serde_json::from_str(text).map_err(|e| DeserializationError::new("error detail", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    #[test]
    fn test_non_finite_numbers_become_null() {
        let text = serialize_input(&vec![1.5, f64::NAN, f64::INFINITY]).unwrap();
        assert_eq!(text, "[1.5,null,null]");

        let result = QueryResult::ok(f64::NEG_INFINITY);
        assert_eq!(
            serialize_result(&result).unwrap(),
            r#"{"ok":true,"err":false,"val":null}"#
        );
    }

    #[test]
    fn test_non_string_map_keys_fail_to_serialize() {
        let mut input = HashMap::new();
        input.insert(vec![1u8], "value");
        assert!(serialize_input(&input).is_err());
    }

    #[test]
    fn test_malformed_text_is_rejected() {
        assert!(deserialize_input::<Value>("").is_err());
        assert!(deserialize_input::<Value>("{\"a\":").is_err());
        assert!(deserialize_result::<Value>("{\"a\":1}").is_err());
        assert!(deserialize_result::<Value>("not json").is_err());
    }

    #[test]
    fn test_error_detail_body() {
        let detail = ErrorDetail::new()
            .with_status("404")
            .with_title("Not Found")
            .with_detail("No matching query found for ID: nope");
        let text = serialize_error_detail(&detail).unwrap();
        insta::assert_snapshot!(text, @r#"{"status":"404","title":"Not Found","detail":"No matching query found for ID: nope"}"#);
        assert_eq!(deserialize_error_detail(&text).unwrap(), detail);
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z0-9 ]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn arb_error() -> impl Strategy<Value = ErrorDetail> {
        (
            proptest::option::of("[A-Za-z ]{1,10}"),
            proptest::option::of("[A-Za-z ]{1,20}"),
            proptest::option::of("[a-z_]{1,10}"),
            proptest::option::of("[a-z.]{1,10}"),
        )
            .prop_map(|(title, detail, code, pointer)| {
                let mut error = ErrorDetail::new();
                error.title = title;
                error.detail = detail;
                error.code = code;
                if let Some(pointer) = pointer {
                    error = error.with_pointer(pointer);
                }
                error
            })
    }

    proptest! {
        #[test]
        fn prop_result_survives_the_wire(
            result in prop_oneof![
                arb_json().prop_map(QueryResult::Ok),
                prop::collection::vec(arb_error(), 1..4).prop_map(QueryResult::Err),
            ]
        ) {
            let text = serialize_result(&result).unwrap();
            let decoded: QueryResult = deserialize_result(&text).unwrap();
            prop_assert_eq!(decoded, result);
        }
    }
}
