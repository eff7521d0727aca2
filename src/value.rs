//! # Values
//!
//! Scalar values held by the variable store, produced by the script language
//! and inserted into templates.
//!
//! [`parse_value`] is the single entry point for turning raw configuration
//! text into a typed [`Value`]. The order of the checks is significant:
//! quoted text always stays a string, so `"1"` and `1` end up with different
//! types and only the latter can be incremented.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Default for Value {
    fn default() -> Self {
        Value::Integer(0)
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "bool",
            Value::Integer(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "str",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// `false`, `0`, `0.0` and `""` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
        }
    }

    /// Converts a JSON scalar into a value. Structured documents supply
    /// already-typed values, so strings are kept verbatim.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Value::Boolean(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Integer)
                .or_else(|| n.as_f64().map(Value::Float)),
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

/// Shortest round-trip decimal, integral floats keep a trailing `.0`.
/// Magnitudes outside `[1e-4, 1e16)` use exponent form (`1e+16`, `2.5e-05`).
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    let magnitude = x.abs();
    if x.is_finite() && magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{:e}", x);
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) => {
                let (sign, digits) = match exponent.strip_prefix('-') {
                    Some(digits) => ('-', digits),
                    None => ('+', exponent),
                };
                format!("{}e{}{:0>2}", mantissa, sign, digits)
            }
            None => formatted,
        };
    }
    if x.is_finite() && x.fract() == 0.0 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

/// Parses raw scalar text: quoted string, then bool, then integer, then
/// float, then plain string. Never fails.
pub fn parse_value(raw: &str) -> Value {
    let value = raw.trim();

    if let Some(inner) = strip_quotes(value) {
        return Value::String(inner.replace("\\n", "\n"));
    }

    if value.eq_ignore_ascii_case("true") {
        return Value::Boolean(true);
    }
    if value.eq_ignore_ascii_case("false") {
        return Value::Boolean(false);
    }

    if let Ok(i) = value.parse::<i64>() {
        return Value::Integer(i);
    }

    if value.contains('.') {
        if let Ok(f) = value.parse::<f64>() {
            if f.is_finite() {
                return Value::Float(f);
            }
        }
    }

    Value::String(value.to_string())
}

fn strip_quotes(value: &str) -> Option<&str> {
    if value.len() < 2 {
        return None;
    }
    let first = value.chars().next()?;
    let last = value.chars().last()?;
    if (first == '\'' || first == '"') && first == last {
        Some(&value[1..value.len() - 1])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_scalars() {
        assert_eq!(parse_value("true"), Value::Boolean(true));
        assert_eq!(parse_value("FALSE"), Value::Boolean(false));
        assert_eq!(parse_value("42"), Value::Integer(42));
        assert_eq!(parse_value("-7"), Value::Integer(-7));
        assert_eq!(parse_value("3.5"), Value::Float(3.5));
        assert_eq!(parse_value("hello"), Value::String("hello".to_string()));
    }

    #[test]
    fn test_parse_quoted() {
        assert_eq!(parse_value("'a\\nb'"), Value::String("a\nb".to_string()));
        assert_eq!(parse_value("\"1\""), Value::String("1".to_string()));
        assert_eq!(parse_value("\"true\""), Value::String("true".to_string()));
        // 片側だけのクォートは文字列のまま
        assert_eq!(parse_value("'abc"), Value::String("'abc".to_string()));
    }

    #[test]
    fn test_parse_numeric_fallthrough() {
        assert_eq!(parse_value("1.2.3"), Value::String("1.2.3".to_string()));
        assert_eq!(parse_value("12abc"), Value::String("12abc".to_string()));
        assert_eq!(parse_value(""), Value::String(String::new()));
    }

    #[test]
    fn test_display_canonical() {
        assert_eq!(Value::Integer(5).to_string(), "5");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(3.25).to_string(), "3.25");
        assert_eq!(Value::Boolean(true).to_string(), "true");
    }

    #[test]
    fn test_float_exponent_form() {
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(1.5e20), "1.5e+20");
        assert_eq!(format_float(0.00001), "1e-05");
        assert_eq!(format_float(-2.5e-7), "-2.5e-07");
        assert_eq!(format_float(1e-4), "0.0001");
        assert_eq!(format_float(1e15), "1000000000000000.0");
        assert_eq!(format_float(0.0), "0.0");
        assert_eq!(format_float(1e100), "1e+100");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NAN), "nan");
    }

    #[test]
    fn test_from_json() {
        assert_eq!(
            Value::from_json(&serde_json::json!(3)),
            Some(Value::Integer(3))
        );
        assert_eq!(
            Value::from_json(&serde_json::json!("3")),
            Some(Value::String("3".to_string()))
        );
        assert_eq!(Value::from_json(&serde_json::json!([1])), None);
    }

    proptest! {
        #[test]
        fn prop_integers_roundtrip(i in any::<i64>()) {
            prop_assert_eq!(parse_value(&i.to_string()), Value::Integer(i));
        }

        #[test]
        fn prop_parse_never_panics(s in "\\PC*") {
            let _ = parse_value(&s);
        }
    }
}
