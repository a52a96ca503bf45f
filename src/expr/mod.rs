//! Sandboxed transformation rule language
//!
//! Delta transformation rules are strings like
//! `concat(first_name, " ", last_name)` evaluated against the record being
//! transformed. The language is a small expression grammar, never the host
//! language: a rule can read record fields, combine them with a fixed
//! operator set, and call allow-listed pure functions. There is no ambient
//! system, network, or file access, no assignment, and no loops; every
//! evaluation runs under a step budget.
//!
//! Pipeline:
//!
//! 1. [`parser`] turns rule text into an [`ast::Expression`] (pest grammar
//!    in `expr.pest`)
//! 2. [`eval::Evaluator`] walks the AST against a record snapshot
//! 3. [`builtins`] supplies the function allow-list

pub mod ast;
pub mod builtins;
pub mod eval;
pub mod parser;

pub use ast::{Expression, Operator, UnaryOperator, Value};
pub use eval::{EvalError, Evaluator};
pub use parser::parse_rule;
