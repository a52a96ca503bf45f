//! Builtin function allow-list
//!
//! The only functions a transformation rule may call. All of them are
//! pure: inputs in, value out, no access to anything beyond their
//! arguments.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use super::ast::Value;
use super::eval::EvalError;

pub type TransformFn = Box<dyn Fn(Vec<Value>) -> Result<Value, EvalError> + Send + Sync>;

/// Returns the full builtin table keyed by call name.
pub fn builtin_functions() -> HashMap<&'static str, TransformFn> {
    let mut functions: HashMap<&'static str, TransformFn> = HashMap::new();

    functions.insert(
        "split",
        Box::new(|args| {
            let (s, sep) = two_strings("split", args)?;
            let parts = s
                .split(sep.as_str())
                .map(|part| JsonValue::String(part.to_string()))
                .collect();
            Ok(Value::Array(parts))
        }),
    );

    functions.insert(
        "concat",
        Box::new(|args| {
            let mut out = String::new();
            for arg in args {
                match arg {
                    Value::String(s) => out.push_str(&s),
                    Value::Number(n) => out.push_str(&format_number(n)),
                    other => {
                        return Err(EvalError::Type(format!(
                            "concat expects strings or numbers, got {}",
                            other.type_name()
                        )))
                    }
                }
            }
            Ok(Value::String(out))
        }),
    );

    functions.insert(
        "join",
        Box::new(|args| {
            let mut args = args.into_iter();
            let array = match args.next() {
                Some(Value::Array(items)) => items,
                other => return Err(arg_error("join", "an array", other)),
            };
            let sep = match args.next() {
                Some(Value::String(s)) => s,
                other => return Err(arg_error("join", "a separator string", other)),
            };
            let parts = array
                .into_iter()
                .map(|item| match item {
                    JsonValue::String(s) => Ok(s),
                    other => Err(EvalError::Type(format!(
                        "join expects an array of strings, got element {other}"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::String(parts.join(&sep)))
        }),
    );

    functions.insert(
        "get",
        Box::new(|args| {
            let mut args = args.into_iter();
            let array = match args.next() {
                Some(Value::Array(items)) => items,
                other => return Err(arg_error("get", "an array", other)),
            };
            let index = match args.next() {
                Some(Value::Number(n)) if n >= 0.0 && n.fract() == 0.0 => n as usize,
                other => return Err(arg_error("get", "a non-negative integer index", other)),
            };
            match array.into_iter().nth(index) {
                Some(item) => Ok(Value::from(item)),
                None => Ok(Value::Null),
            }
        }),
    );

    functions.insert(
        "len",
        Box::new(|args| match one_arg("len", args)? {
            Value::String(s) => Ok(Value::Number(s.chars().count() as f64)),
            Value::Array(items) => Ok(Value::Number(items.len() as f64)),
            other => Err(EvalError::Type(format!(
                "len expects a string or array, got {}",
                other.type_name()
            ))),
        }),
    );

    functions.insert(
        "trim",
        Box::new(|args| {
            let s = one_string("trim", args)?;
            Ok(Value::String(s.trim().to_string()))
        }),
    );

    functions.insert(
        "lower",
        Box::new(|args| {
            let s = one_string("lower", args)?;
            Ok(Value::String(s.to_lowercase()))
        }),
    );

    functions.insert(
        "upper",
        Box::new(|args| {
            let s = one_string("upper", args)?;
            Ok(Value::String(s.to_uppercase()))
        }),
    );

    functions.insert(
        "replace",
        Box::new(|args| {
            let mut args = args.into_iter();
            let (s, from, to) = match (args.next(), args.next(), args.next()) {
                (Some(Value::String(s)), Some(Value::String(from)), Some(Value::String(to))) => {
                    (s, from, to)
                }
                _ => {
                    return Err(EvalError::Type(
                        "replace expects (string, string, string)".to_string(),
                    ))
                }
            };
            Ok(Value::String(s.replace(&from, &to)))
        }),
    );

    functions.insert(
        "min",
        Box::new(|args| {
            let (a, b) = two_numbers("min", args)?;
            Ok(Value::Number(a.min(b)))
        }),
    );

    functions.insert(
        "max",
        Box::new(|args| {
            let (a, b) = two_numbers("max", args)?;
            Ok(Value::Number(a.max(b)))
        }),
    );

    functions.insert(
        "clamp",
        Box::new(|args| {
            let mut args = args.into_iter();
            match (args.next(), args.next(), args.next()) {
                (
                    Some(Value::Number(n)),
                    Some(Value::Number(lo)),
                    Some(Value::Number(hi)),
                ) if lo <= hi => Ok(Value::Number(n.clamp(lo, hi))),
                _ => Err(EvalError::Type(
                    "clamp expects (number, low, high) with low <= high".to_string(),
                )),
            }
        }),
    );

    functions.insert(
        "abs",
        Box::new(|args| {
            let n = one_number("abs", args)?;
            Ok(Value::Number(n.abs()))
        }),
    );

    functions.insert(
        "round",
        Box::new(|args| {
            let n = one_number("round", args)?;
            Ok(Value::Number(n.round()))
        }),
    );

    functions.insert(
        "floor",
        Box::new(|args| {
            let n = one_number("floor", args)?;
            Ok(Value::Number(n.floor()))
        }),
    );

    functions.insert(
        "ceil",
        Box::new(|args| {
            let n = one_number("ceil", args)?;
            Ok(Value::Number(n.ceil()))
        }),
    );

    functions.insert(
        "to_string",
        Box::new(|args| match one_arg("to_string", args)? {
            Value::String(s) => Ok(Value::String(s)),
            Value::Number(n) => Ok(Value::String(format_number(n))),
            Value::Boolean(b) => Ok(Value::String(b.to_string())),
            Value::Null => Ok(Value::String(String::new())),
            other => Err(EvalError::Type(format!(
                "to_string expects a scalar, got {}",
                other.type_name()
            ))),
        }),
    );

    functions.insert(
        "to_number",
        Box::new(|args| match one_arg("to_number", args)? {
            Value::Number(n) => Ok(Value::Number(n)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Number)
                .map_err(|_| EvalError::Type(format!("to_number cannot parse {s:?}"))),
            other => Err(EvalError::Type(format!(
                "to_number expects a string or number, got {}",
                other.type_name()
            ))),
        }),
    );

    functions.insert(
        "coalesce",
        Box::new(|args| {
            for arg in args {
                if !matches!(arg, Value::Null) {
                    return Ok(arg);
                }
            }
            Ok(Value::Null)
        }),
    );

    functions
}

fn one_arg(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    let mut args = args.into_iter();
    match (args.next(), args.next()) {
        (Some(value), None) => Ok(value),
        _ => Err(EvalError::Type(format!("{name} expects one argument"))),
    }
}

fn one_string(name: &str, args: Vec<Value>) -> Result<String, EvalError> {
    match one_arg(name, args)? {
        Value::String(s) => Ok(s),
        other => Err(arg_error(name, "a string", Some(other))),
    }
}

fn one_number(name: &str, args: Vec<Value>) -> Result<f64, EvalError> {
    match one_arg(name, args)? {
        Value::Number(n) => Ok(n),
        other => Err(arg_error(name, "a number", Some(other))),
    }
}

fn two_strings(name: &str, args: Vec<Value>) -> Result<(String, String), EvalError> {
    let mut args = args.into_iter();
    match (args.next(), args.next(), args.next()) {
        (Some(Value::String(a)), Some(Value::String(b)), None) => Ok((a, b)),
        _ => Err(EvalError::Type(format!("{name} expects two strings"))),
    }
}

fn two_numbers(name: &str, args: Vec<Value>) -> Result<(f64, f64), EvalError> {
    let mut args = args.into_iter();
    match (args.next(), args.next(), args.next()) {
        (Some(Value::Number(a)), Some(Value::Number(b)), None) => Ok((a, b)),
        _ => Err(EvalError::Type(format!("{name} expects two numbers"))),
    }
}

fn arg_error(name: &str, expected: &str, got: Option<Value>) -> EvalError {
    match got {
        Some(value) => EvalError::Type(format!(
            "{name} expects {expected}, got {}",
            value.type_name()
        )),
        None => EvalError::Type(format!("{name} expects {expected}, got nothing")),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
