//! Allow-listed functions callable from scripts.
//!
//! Module-style spellings such as `random.randint` or `math.sqrt` resolve to
//! the same functions as their bare names.

use std::cmp::Ordering;

use chrono::{Local, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::info;

use super::interpreter::compare_values;
use super::parser::BinaryOp;
use super::{LangError, LangResult};
use crate::context::{DATE_FORMAT, DATETIME_FORMAT, TIME_FORMAT};
use crate::value::Value;

pub const BUILTINS: &[&str] = &[
    "randint", "random", "choice", "now", "datetime", "date", "time", "timestamp", "str", "int",
    "float", "bool", "len", "upper", "lower", "strip", "round", "abs", "min", "max", "sqrt",
    "floor", "ceil", "pow", "print", "format",
];

fn canonical(name: &str) -> &str {
    match name {
        "random.randint" => "randint",
        "random.random" => "random",
        "random.choice" => "choice",
        "math.sqrt" => "sqrt",
        "math.floor" => "floor",
        "math.ceil" => "ceil",
        "math.pow" => "pow",
        "datetime.now" => "now",
        "time.time" => "timestamp",
        other => other,
    }
}

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&canonical(name))
}

pub fn call(name: &str, args: Vec<Value>) -> LangResult<Value> {
    let function = canonical(name);
    match function {
        "randint" => {
            let (low, high) = two_ints(function, &args)?;
            if low > high {
                return Err(LangError::argument(function, "empty range"));
            }
            Ok(Value::Integer(rand::thread_rng().gen_range(low..=high)))
        }
        "random" => {
            arity(function, &args, 0)?;
            Ok(Value::Float(rand::thread_rng().r#gen::<f64>()))
        }
        "choice" => match args.as_slice() {
            [] => Err(LangError::argument(function, "expected at least one argument")),
            [Value::String(s)] => {
                let chars: Vec<char> = s.chars().collect();
                chars
                    .choose(&mut rand::thread_rng())
                    .map(|c| Value::String(c.to_string()))
                    .ok_or_else(|| LangError::argument(function, "empty sequence"))
            }
            items => items
                .choose(&mut rand::thread_rng())
                .cloned()
                .ok_or_else(|| LangError::argument(function, "empty sequence")),
        },
        "now" | "datetime" => {
            arity(function, &args, 0)?;
            Ok(Value::String(Local::now().format(DATETIME_FORMAT).to_string()))
        }
        "date" => {
            arity(function, &args, 0)?;
            Ok(Value::String(Local::now().format(DATE_FORMAT).to_string()))
        }
        "time" => {
            arity(function, &args, 0)?;
            Ok(Value::String(Local::now().format(TIME_FORMAT).to_string()))
        }
        "timestamp" => {
            arity(function, &args, 0)?;
            Ok(Value::Float(Utc::now().timestamp_millis() as f64 / 1000.0))
        }
        "str" => Ok(Value::String(one(function, &args)?.to_string())),
        "int" => to_int(function, one(function, &args)?),
        "float" => to_float(function, one(function, &args)?),
        "bool" => Ok(Value::Boolean(one(function, &args)?.is_truthy())),
        "len" => match one(function, &args)? {
            Value::String(s) => Ok(Value::Integer(s.chars().count() as i64)),
            other => Err(LangError::Type(format!(
                "object of type '{}' has no len()",
                other.type_name()
            ))),
        },
        "upper" => Ok(Value::String(string_arg(function, &args)?.to_uppercase())),
        "lower" => Ok(Value::String(string_arg(function, &args)?.to_lowercase())),
        "strip" => Ok(Value::String(string_arg(function, &args)?.trim().to_string())),
        "round" => round(function, &args),
        "abs" => match one(function, &args)? {
            Value::Integer(i) => i.checked_abs().map(Value::Integer).ok_or(LangError::Overflow),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Err(not_numeric(function, other)),
        },
        "min" => extreme(function, args, Ordering::Less),
        "max" => extreme(function, args, Ordering::Greater),
        "sqrt" => {
            let x = float_arg(function, one(function, &args)?)?;
            if x < 0.0 {
                return Err(LangError::argument(function, "math domain error"));
            }
            Ok(Value::Float(x.sqrt()))
        }
        "floor" => float_to_int(function, float_arg(function, one(function, &args)?)?.floor()),
        "ceil" => float_to_int(function, float_arg(function, one(function, &args)?)?.ceil()),
        "pow" => {
            arity(function, &args, 2)?;
            match (&args[0], &args[1]) {
                (Value::Integer(base), Value::Integer(exp)) if *exp >= 0 => {
                    let exp = u32::try_from(*exp).map_err(|_| LangError::Overflow)?;
                    base.checked_pow(exp)
                        .map(Value::Integer)
                        .ok_or(LangError::Overflow)
                }
                (base, exp) => Ok(Value::Float(
                    float_arg(function, base)?.powf(float_arg(function, exp)?),
                )),
            }
        }
        "print" => {
            let line = args
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            info!(target: "esybot::script", "{}", line);
            Ok(Value::String(String::new()))
        }
        "format" => {
            let (template, rest) = match args.split_first() {
                Some((Value::String(template), rest)) => (template, rest),
                _ => {
                    return Err(LangError::argument(
                        function,
                        "first argument must be a string",
                    ));
                }
            };
            let mut pieces = template.split("{}");
            let mut output = pieces.next().unwrap_or_default().to_string();
            let mut values = rest.iter();
            for piece in pieces {
                match values.next() {
                    Some(value) => output.push_str(&value.to_string()),
                    None => return Err(LangError::argument(function, "not enough arguments")),
                }
                output.push_str(piece);
            }
            Ok(Value::String(output))
        }
        _ => Err(LangError::UnknownFunction(name.to_string())),
    }
}

fn arity(function: &str, args: &[Value], expected: usize) -> LangResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(LangError::argument(
            function,
            format!("expected {} argument(s), got {}", expected, args.len()),
        ))
    }
}

fn one<'a>(function: &str, args: &'a [Value]) -> LangResult<&'a Value> {
    arity(function, args, 1)?;
    Ok(&args[0])
}

fn not_numeric(function: &str, value: &Value) -> LangError {
    LangError::argument(
        function,
        format!("expected a number, got '{}'", value.type_name()),
    )
}

fn string_arg<'a>(function: &str, args: &'a [Value]) -> LangResult<&'a str> {
    match one(function, args)? {
        Value::String(s) => Ok(s),
        other => Err(LangError::argument(
            function,
            format!("expected a string, got '{}'", other.type_name()),
        )),
    }
}

fn float_arg(function: &str, value: &Value) -> LangResult<f64> {
    value.as_f64().ok_or_else(|| not_numeric(function, value))
}

fn two_ints(function: &str, args: &[Value]) -> LangResult<(i64, i64)> {
    arity(function, args, 2)?;
    match (&args[0], &args[1]) {
        (Value::Integer(a), Value::Integer(b)) => Ok((*a, *b)),
        _ => Err(LangError::argument(function, "expected two integers")),
    }
}

fn float_to_int(function: &str, x: f64) -> LangResult<Value> {
    if !x.is_finite() || x < i64::MIN as f64 || x >= i64::MAX as f64 {
        return Err(LangError::argument(function, "value out of integer range"));
    }
    Ok(Value::Integer(x as i64))
}

fn to_int(function: &str, value: &Value) -> LangResult<Value> {
    match value {
        Value::Integer(i) => Ok(Value::Integer(*i)),
        Value::Float(f) => float_to_int(function, f.trunc()),
        Value::Boolean(b) => Ok(Value::Integer(i64::from(*b))),
        Value::String(s) => s.trim().parse::<i64>().map(Value::Integer).map_err(|_| {
            LangError::argument(function, format!("invalid literal for int(): {:?}", s))
        }),
    }
}

fn to_float(function: &str, value: &Value) -> LangResult<Value> {
    match value {
        Value::Integer(i) => Ok(Value::Float(*i as f64)),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Boolean(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::String(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            LangError::argument(function, format!("could not convert string to float: {:?}", s))
        }),
    }
}

/// Half-to-even rounding. Without `digits` the result is an integer.
fn round(function: &str, args: &[Value]) -> LangResult<Value> {
    match args {
        [Value::Integer(i)] => Ok(Value::Integer(*i)),
        [x] => float_to_int(function, float_arg(function, x)?.round_ties_even()),
        [Value::Integer(i), Value::Integer(_)] => Ok(Value::Integer(*i)),
        [x, Value::Integer(digits)] => {
            let x = float_arg(function, x)?;
            let digits = i32::try_from(*digits)
                .map_err(|_| LangError::argument(function, "digits out of range"))?;
            let factor = 10f64.powi(digits);
            Ok(Value::Float((x * factor).round_ties_even() / factor))
        }
        _ => Err(LangError::argument(function, "expected (number[, digits])")),
    }
}

fn extreme(function: &str, args: Vec<Value>, wanted: Ordering) -> LangResult<Value> {
    let mut iter = args.into_iter();
    let mut best = iter
        .next()
        .ok_or_else(|| LangError::argument(function, "expected at least one argument"))?;
    for candidate in iter {
        let op = if wanted == Ordering::Less {
            BinaryOp::LessThan
        } else {
            BinaryOp::GreaterThan
        };
        if compare_values(op, &candidate, &best)? == wanted {
            best = candidate;
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn s(text: &str) -> Value {
        Value::String(text.to_string())
    }

    #[test]
    fn test_randint_stays_in_range() {
        for _ in 0..200 {
            match call("random.randint", vec![Value::Integer(1), Value::Integer(6)]).unwrap() {
                Value::Integer(i) => assert!((1..=6).contains(&i)),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(call("randint", vec![Value::Integer(5), Value::Integer(1)]).is_err());
    }

    #[test]
    fn test_choice() {
        let picked = call("choice", vec![s("a"), s("b")]).unwrap();
        assert!(picked == s("a") || picked == s("b"));
        assert_eq!(call("choice", vec![s("z")]).unwrap(), s("z"));
        assert!(call("choice", vec![]).is_err());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("int", vec![s(" 42 ")]).unwrap(), Value::Integer(42));
        assert_eq!(call("int", vec![Value::Float(-2.7)]).unwrap(), Value::Integer(-2));
        assert_eq!(call("float", vec![Value::Integer(2)]).unwrap(), Value::Float(2.0));
        assert_eq!(call("str", vec![Value::Float(2.0)]).unwrap(), s("2.0"));
        assert_eq!(call("bool", vec![s("")]).unwrap(), Value::Boolean(false));
        assert!(matches!(
            call("int", vec![s("x")]),
            Err(LangError::Argument { .. })
        ));
    }

    #[test]
    fn test_strings() {
        assert_eq!(call("len", vec![s("héllo")]).unwrap(), Value::Integer(5));
        assert_eq!(call("upper", vec![s("ab")]).unwrap(), s("AB"));
        assert_eq!(call("strip", vec![s("  x ")]).unwrap(), s("x"));
        assert_eq!(
            call("format", vec![s("{} of {}"), Value::Integer(1), Value::Integer(3)]).unwrap(),
            s("1 of 3")
        );
    }

    #[test]
    fn test_math() {
        assert_eq!(call("round", vec![Value::Float(2.5)]).unwrap(), Value::Integer(2));
        assert_eq!(
            call("round", vec![Value::Float(1.23456), Value::Integer(2)]).unwrap(),
            Value::Float(1.23)
        );
        assert_eq!(
            call("max", vec![Value::Integer(1), Value::Float(2.5), Value::Integer(2)]).unwrap(),
            Value::Float(2.5)
        );
        assert_eq!(
            call("min", vec![Value::Integer(3), Value::Integer(-1)]).unwrap(),
            Value::Integer(-1)
        );
        assert_eq!(call("math.sqrt", vec![Value::Integer(9)]).unwrap(), Value::Float(3.0));
        assert_eq!(call("floor", vec![Value::Float(-1.5)]).unwrap(), Value::Integer(-2));
        assert_eq!(
            call("pow", vec![Value::Integer(2), Value::Integer(10)]).unwrap(),
            Value::Integer(1024)
        );
        assert_eq!(call("abs", vec![Value::Integer(-3)]).unwrap(), Value::Integer(3));
    }

    #[test]
    fn test_unknown_and_aliases() {
        assert!(is_builtin("datetime.now"));
        assert!(!is_builtin("open"));
        assert_eq!(
            call("open", vec![s("/etc/passwd")]),
            Err(LangError::UnknownFunction("open".to_string()))
        );
        assert_eq!(
            call("date", vec![]).unwrap().to_string().len(),
            "2024-01-01".len()
        );
    }
}
