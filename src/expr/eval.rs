//! Expression evaluator
//!
//! Evaluates parsed rule expressions against a record snapshot. The
//! evaluator is the sandbox boundary: field reads come from the snapshot
//! only, calls resolve through the builtin allow-list only, and every
//! evaluation step ticks a budget so a pathological rule cannot run
//! unbounded.

use std::collections::HashMap;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::delta::Record;

use super::ast::{Expression, Operator, UnaryOperator, Value};
use super::builtins::{builtin_functions, TransformFn};

/// Errors raised while parsing or evaluating a transformation rule.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("evaluation budget exhausted")]
    BudgetExhausted,
}

/// Evaluates expressions against a single record snapshot.
pub struct Evaluator<'a> {
    record: &'a Record,
    functions: HashMap<&'static str, TransformFn>,
    steps_left: u64,
}

impl<'a> Evaluator<'a> {
    /// Creates an evaluator over `record` with at most `budget` steps.
    pub fn new(record: &'a Record, budget: u64) -> Self {
        Self {
            record,
            functions: builtin_functions(),
            steps_left: budget,
        }
    }

    pub fn eval(&mut self, expr: &Expression) -> Result<Value, EvalError> {
        if self.steps_left == 0 {
            return Err(EvalError::BudgetExhausted);
        }
        self.steps_left -= 1;

        match expr {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Field(path) => self.resolve_field(path),
            Expression::BinaryOp {
                left,
                operator,
                right,
            } => {
                let lhs = self.eval(left)?;
                let rhs = self.eval(right)?;
                apply_binary(*operator, lhs, rhs)
            }
            Expression::UnaryOp { operator, expr } => {
                let value = self.eval(expr)?;
                apply_unary(*operator, value)
            }
            Expression::Call { name, args } => {
                let evaluated = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                let function = self
                    .functions
                    .get(name.as_str())
                    .ok_or_else(|| EvalError::UnknownFunction(name.clone()))?;
                function(evaluated)
            }
            Expression::IfElse {
                condition,
                then_branch,
                else_branch,
            } => match self.eval(condition)? {
                Value::Boolean(true) => self.eval(then_branch),
                Value::Boolean(false) => self.eval(else_branch),
                other => Err(EvalError::Type(format!(
                    "if condition must be a boolean, got {}",
                    other.type_name()
                ))),
            },
        }
    }

    fn resolve_field(&self, path: &[String]) -> Result<Value, EvalError> {
        let (head, rest) = path
            .split_first()
            .ok_or_else(|| EvalError::UnknownField(String::new()))?;
        let mut current = self
            .record
            .get(head)
            .ok_or_else(|| EvalError::UnknownField(path.join(".")))?;
        for segment in rest {
            current = match current {
                JsonValue::Object(map) => map
                    .get(segment)
                    .ok_or_else(|| EvalError::UnknownField(path.join(".")))?,
                _ => return Err(EvalError::UnknownField(path.join("."))),
            };
        }
        Ok(Value::from(current.clone()))
    }
}

fn apply_binary(operator: Operator, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    match operator {
        Operator::Add => match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
            (a, b) => Err(type_mismatch(operator, &a, &b)),
        },
        Operator::Subtract => numeric(operator, lhs, rhs, |a, b| Ok(Value::Number(a - b))),
        Operator::Multiply => numeric(operator, lhs, rhs, |a, b| Ok(Value::Number(a * b))),
        Operator::Divide => numeric(operator, lhs, rhs, |a, b| {
            if b == 0.0 {
                Err(EvalError::DivisionByZero)
            } else {
                Ok(Value::Number(a / b))
            }
        }),
        Operator::Equal => Ok(Value::Boolean(values_equal(&lhs, &rhs))),
        Operator::NotEqual => Ok(Value::Boolean(!values_equal(&lhs, &rhs))),
        Operator::LessThan => compare(operator, lhs, rhs, |o| o == std::cmp::Ordering::Less),
        Operator::LessThanOrEqual => {
            compare(operator, lhs, rhs, |o| o != std::cmp::Ordering::Greater)
        }
        Operator::GreaterThan => compare(operator, lhs, rhs, |o| o == std::cmp::Ordering::Greater),
        Operator::GreaterThanOrEqual => {
            compare(operator, lhs, rhs, |o| o != std::cmp::Ordering::Less)
        }
        Operator::And => boolean(operator, lhs, rhs, |a, b| a && b),
        Operator::Or => boolean(operator, lhs, rhs, |a, b| a || b),
    }
}

fn numeric(
    operator: Operator,
    lhs: Value,
    rhs: Value,
    f: impl FnOnce(f64, f64) -> Result<Value, EvalError>,
) -> Result<Value, EvalError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => f(a, b),
        (a, b) => Err(type_mismatch(operator, &a, &b)),
    }
}

fn boolean(
    operator: Operator,
    lhs: Value,
    rhs: Value,
    f: impl FnOnce(bool, bool) -> bool,
) -> Result<Value, EvalError> {
    match (lhs, rhs) {
        (Value::Boolean(a), Value::Boolean(b)) => Ok(Value::Boolean(f(a, b))),
        (a, b) => Err(type_mismatch(operator, &a, &b)),
    }
}

fn compare(
    operator: Operator,
    lhs: Value,
    rhs: Value,
    f: impl FnOnce(std::cmp::Ordering) -> bool,
) -> Result<Value, EvalError> {
    let ordering = match (&lhs, &rhs) {
        (Value::Number(a), Value::Number(b)) => a
            .partial_cmp(b)
            .ok_or_else(|| EvalError::Type("cannot compare NaN".to_string()))?,
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => return Err(type_mismatch(operator, &lhs, &rhs)),
    };
    Ok(Value::Boolean(f(ordering)))
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    JsonValue::from(lhs.clone()) == JsonValue::from(rhs.clone())
}

fn type_mismatch(operator: Operator, lhs: &Value, rhs: &Value) -> EvalError {
    EvalError::Type(format!(
        "operator {} cannot combine {} and {}",
        operator,
        lhs.type_name(),
        rhs.type_name()
    ))
}

fn apply_unary(operator: UnaryOperator, value: Value) -> Result<Value, EvalError> {
    match (operator, value) {
        (UnaryOperator::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOperator::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
        (op, value) => Err(EvalError::Type(format!(
            "unary {op:?} cannot apply to {}",
            value.type_name()
        ))),
    }
}
