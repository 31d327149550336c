//! Unit tests for Value enum

use core_types::{JsError, Value};
use num_bigint::BigInt;
use std::any::Any;
use std::rc::Rc;

#[cfg(test)]
mod value_display_tests {
    use super::*;

    #[test]
    fn test_display_primitives() {
        assert_eq!(Value::Undefined.to_string(), "undefined");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Smi(-3).to_string(), "-3");
        assert_eq!(Value::from("text").to_string(), "text");
    }

    #[test]
    fn test_display_doubles() {
        assert_eq!(Value::Double(1.5).to_string(), "1.5");
        assert_eq!(Value::Double(100.0).to_string(), "100");
        assert_eq!(Value::Double(f64::NAN).to_string(), "NaN");
        assert_eq!(Value::Double(f64::NEG_INFINITY).to_string(), "-Infinity");
    }

    #[test]
    fn test_display_bigint() {
        assert_eq!(Value::BigInt(BigInt::from(12)).to_string(), "12n");
    }

    #[test]
    fn test_display_array_skips_nullish() {
        let arr = Value::Array(vec![Value::Smi(1), Value::Undefined, Value::Null, Value::from("x")]);
        assert_eq!(arr.to_string(), "1,,,x");
    }

    #[test]
    fn test_display_objects() {
        assert_eq!(Value::object([("a", Value::Smi(1))]).to_string(), "[object Object]");
        let native: Rc<dyn Any> = Rc::new(());
        assert_eq!(Value::Native(native).to_string(), "[object Object]");
    }

    #[test]
    fn test_display_error() {
        let value = JsError::type_error("nope").into_value();
        assert_eq!(value.to_string(), "TypeError: nope");
    }
}

#[cfg(test)]
mod value_semantics_tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(!Value::Double(-0.0).is_truthy());
        assert!(Value::Object(vec![]).is_truthy());
        assert!(JsError::type_error("x").into_value().is_truthy());
    }

    #[test]
    fn test_type_of() {
        assert_eq!(Value::Smi(1).type_of(), "number");
        assert_eq!(Value::Double(1.0).type_of(), "number");
        assert_eq!(Value::from("s").type_of(), "string");
        assert_eq!(Value::Array(vec![]).type_of(), "object");
    }

    #[test]
    fn test_array_accessor() {
        let arr = Value::from(vec![Value::Smi(1), Value::Smi(2)]);
        assert_eq!(arr.as_array().map(|a| a.len()), Some(2));
        assert!(Value::Smi(1).as_array().is_none());
    }

    #[test]
    fn test_nested_equality() {
        let a = Value::object([("list", Value::Array(vec![Value::Smi(1)]))]);
        let b = Value::object([("list", Value::Array(vec![Value::Double(1.0)]))]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_object_key_order_matters() {
        let a = Value::object([("a", Value::Smi(1)), ("b", Value::Smi(2))]);
        let b = Value::object([("b", Value::Smi(2)), ("a", Value::Smi(1))]);
        assert_ne!(a, b);
    }
}
