//! Value coercion helpers shared by the evaluator, directives and renderer.
//!
//! All engine state is `serde_json::Value`. The original attribute language
//! is loosely typed, so bindings lean on a small set of coercions: truthiness
//! for conditionals, numeric coercion for arithmetic, and display
//! stringification for text bindings. Absent state is `Value::Null`.

use serde_json::Value;

/// Truthiness used by `if`/`show`/`case`, logical operators and the ternary.
///
/// `null`, `false`, `0`, `""` are falsy; everything else (including empty
/// arrays and objects) is truthy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Numeric coercion for arithmetic and comparisons.
///
/// `null` coerces to 0, booleans to 0/1, numeric strings parse. Anything
/// else has no numeric value and poisons the arithmetic result to `Null`.
pub fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Wrap an `f64` back into a `Value`, preserving integer shape where exact.
pub fn from_f64(f: f64) -> Value {
    if !f.is_finite() {
        return Value::Null;
    }
    if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 {
        Value::from(f as i64)
    } else {
        Value::from(f)
    }
}

/// Display form used by text bindings and attribute serialization.
///
/// Unlike `Value::to_string`, strings render without quotes and `null`
/// renders empty - a broken binding shows nothing, not the word "null".
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Containers always notify on write; only primitives get the
/// equality-skip optimization.
pub fn is_container(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

/// Loose comparison for `case` matching and `==`/`!=`: numbers compare
/// numerically across representations, everything else by deep equality.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(_), Value::String(_)) => a == b,
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            match (to_f64(a), to_f64(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(!truthy(&Value::Null));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!("0")));
        assert!(truthy(&json!([])));
        assert!(truthy(&json!(1.5)));
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(to_f64(&json!("12")), Some(12.0));
        assert_eq!(to_f64(&Value::Null), Some(0.0));
        assert_eq!(to_f64(&json!({})), None);
        assert_eq!(from_f64(3.0), json!(3));
        assert_eq!(from_f64(3.5), json!(3.5));
    }

    #[test]
    fn test_display_is_unquoted() {
        assert_eq!(display(&json!("hi")), "hi");
        assert_eq!(display(&Value::Null), "");
        assert_eq!(display(&json!(42)), "42");
    }

    #[test]
    fn test_loose_equality() {
        assert!(loose_eq(&json!(1), &json!("1")));
        assert!(!loose_eq(&json!("1"), &json!("01")));
        assert!(loose_eq(&json!([1, 2]), &json!([1, 2])));
    }
}
