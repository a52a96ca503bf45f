//! Parser for transformation rules
//!
//! Converts rule text into an [`Expression`] via the pest grammar in
//! `expr.pest`. Binary operators at one precedence level associate left.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use super::ast::{Expression, Operator, UnaryOperator, Value};
use super::eval::EvalError;

#[derive(Parser)]
#[grammar = "expr/expr.pest"]
struct RuleParser;

/// Parse a transformation rule into an expression AST.
pub fn parse_rule(input: &str) -> Result<Expression, EvalError> {
    let mut pairs = RuleParser::parse(Rule::complete_expr, input)
        .map_err(|e| EvalError::Parse(e.to_string()))?;
    let expr_pair = pairs
        .next()
        .ok_or_else(|| EvalError::Parse("empty rule".to_string()))?;
    build_expr(expr_pair)
}

fn build_expr(pair: Pair<Rule>) -> Result<Expression, EvalError> {
    match pair.as_rule() {
        Rule::expr => {
            let inner = first_inner(pair)?;
            build_expr(inner)
        }
        Rule::if_expr => build_if(pair),
        Rule::logic_expr | Rule::comp_expr | Rule::add_expr | Rule::mul_expr => {
            build_binary_chain(pair)
        }
        Rule::unary_expr => build_unary(pair),
        Rule::atom => build_atom(pair),
        other => Err(EvalError::Parse(format!("unexpected rule {other:?}"))),
    }
}

fn first_inner(pair: Pair<Rule>) -> Result<Pair<Rule>, EvalError> {
    pair.into_inner()
        .next()
        .ok_or_else(|| EvalError::Parse("malformed expression".to_string()))
}

/// Folds `operand (op operand)*` left-associatively.
fn build_binary_chain(pair: Pair<Rule>) -> Result<Expression, EvalError> {
    let mut pairs = pair.into_inner();
    let first = pairs
        .next()
        .ok_or_else(|| EvalError::Parse("missing operand".to_string()))?;
    let mut expr = build_expr(first)?;

    while let Some(op_pair) = pairs.next() {
        let operator = parse_operator(op_pair.as_str())?;
        let right_pair = pairs
            .next()
            .ok_or_else(|| EvalError::Parse("missing right operand".to_string()))?;
        let right = build_expr(right_pair)?;
        expr = Expression::BinaryOp {
            left: Box::new(expr),
            operator,
            right: Box::new(right),
        };
    }
    Ok(expr)
}

fn parse_operator(s: &str) -> Result<Operator, EvalError> {
    let op = match s {
        "&&" => Operator::And,
        "||" => Operator::Or,
        "==" => Operator::Equal,
        "!=" => Operator::NotEqual,
        "<" => Operator::LessThan,
        "<=" => Operator::LessThanOrEqual,
        ">" => Operator::GreaterThan,
        ">=" => Operator::GreaterThanOrEqual,
        "+" => Operator::Add,
        "-" => Operator::Subtract,
        "*" => Operator::Multiply,
        "/" => Operator::Divide,
        other => return Err(EvalError::Parse(format!("unknown operator {other:?}"))),
    };
    Ok(op)
}

fn build_unary(pair: Pair<Rule>) -> Result<Expression, EvalError> {
    let mut operators = Vec::new();
    let mut atom = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::unary_op => {
                let op = match inner.as_str() {
                    "-" => UnaryOperator::Negate,
                    "!" => UnaryOperator::Not,
                    other => return Err(EvalError::Parse(format!("unknown unary {other:?}"))),
                };
                operators.push(op);
            }
            _ => atom = Some(build_expr(inner)?),
        }
    }
    let mut expr = atom.ok_or_else(|| EvalError::Parse("missing operand".to_string()))?;
    for op in operators.into_iter().rev() {
        expr = Expression::UnaryOp {
            operator: op,
            expr: Box::new(expr),
        };
    }
    Ok(expr)
}

fn build_if(pair: Pair<Rule>) -> Result<Expression, EvalError> {
    // The keyword tokens are atomic, not silent; skip them.
    let mut pairs = pair.into_inner().filter(|p| p.as_rule() == Rule::expr);
    let condition = build_expr(
        pairs
            .next()
            .ok_or_else(|| EvalError::Parse("if without condition".to_string()))?,
    )?;
    let then_branch = build_expr(
        pairs
            .next()
            .ok_or_else(|| EvalError::Parse("if without then branch".to_string()))?,
    )?;
    let else_branch = build_expr(
        pairs
            .next()
            .ok_or_else(|| EvalError::Parse("if without else branch".to_string()))?,
    )?;
    Ok(Expression::IfElse {
        condition: Box::new(condition),
        then_branch: Box::new(then_branch),
        else_branch: Box::new(else_branch),
    })
}

fn build_atom(pair: Pair<Rule>) -> Result<Expression, EvalError> {
    let inner = first_inner(pair)?;
    match inner.as_rule() {
        Rule::number => {
            let n = inner
                .as_str()
                .parse::<f64>()
                .map_err(|e| EvalError::Parse(format!("invalid number: {e}")))?;
            Ok(Expression::Literal(Value::Number(n)))
        }
        Rule::string => {
            let s = inner.as_str();
            let unescaped = unescape_string(&s[1..s.len() - 1])?;
            Ok(Expression::Literal(Value::String(unescaped)))
        }
        Rule::boolean => Ok(Expression::Literal(Value::Boolean(inner.as_str() == "true"))),
        Rule::null => Ok(Expression::Literal(Value::Null)),
        Rule::function_call => build_call(inner),
        Rule::field_path => {
            let path = inner
                .into_inner()
                .map(|segment| segment.as_str().to_string())
                .collect();
            Ok(Expression::Field(path))
        }
        Rule::expr => build_expr(inner),
        other => Err(EvalError::Parse(format!("unexpected atom {other:?}"))),
    }
}

/// Resolves the escapes the grammar admits: `\"`, `\\`, `\n`, `\t`.
fn unescape_string(s: &str) -> Result<String, EvalError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            other => {
                return Err(EvalError::Parse(format!(
                    "invalid string escape: {other:?}"
                )))
            }
        }
    }
    Ok(out)
}

fn build_call(pair: Pair<Rule>) -> Result<Expression, EvalError> {
    let mut pairs = pair.into_inner();
    let name = pairs
        .next()
        .ok_or_else(|| EvalError::Parse("call without name".to_string()))?
        .as_str()
        .to_string();
    let args = pairs.map(build_expr).collect::<Result<Vec<_>, _>>()?;
    Ok(Expression::Call { name, args })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_reference() {
        let expr = parse_rule("name").unwrap();
        assert_eq!(expr, Expression::Field(vec!["name".to_string()]));
    }

    #[test]
    fn test_parse_dotted_field_path() {
        let expr = parse_rule("address.city").unwrap();
        assert_eq!(
            expr,
            Expression::Field(vec!["address".to_string(), "city".to_string()])
        );
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(
            parse_rule("42").unwrap(),
            Expression::Literal(Value::Number(42.0))
        );
        assert_eq!(
            parse_rule("\"Ada\"").unwrap(),
            Expression::Literal(Value::String("Ada".to_string()))
        );
        assert_eq!(
            parse_rule("true").unwrap(),
            Expression::Literal(Value::Boolean(true))
        );
        assert_eq!(parse_rule("null").unwrap(), Expression::Literal(Value::Null));
    }

    #[test]
    fn test_parse_string_escapes() {
        assert_eq!(
            parse_rule(r#""say \"hi\"""#).unwrap(),
            Expression::Literal(Value::String("say \"hi\"".to_string()))
        );
        assert_eq!(
            parse_rule(r#""a\\b\n""#).unwrap(),
            Expression::Literal(Value::String("a\\b\n".to_string()))
        );
        assert!(parse_rule(r#""bad \q escape""#).is_err());
    }

    #[test]
    fn test_parse_operator_precedence() {
        let expr = parse_rule("2 + 3 * 4").unwrap();
        assert_eq!(
            expr,
            Expression::BinaryOp {
                left: Box::new(Expression::Literal(Value::Number(2.0))),
                operator: Operator::Add,
                right: Box::new(Expression::BinaryOp {
                    left: Box::new(Expression::Literal(Value::Number(3.0))),
                    operator: Operator::Multiply,
                    right: Box::new(Expression::Literal(Value::Number(4.0))),
                }),
            }
        );
    }

    #[test]
    fn test_parse_parentheses() {
        let expr = parse_rule("(2 + 3) * 4").unwrap();
        assert_eq!(
            expr,
            Expression::BinaryOp {
                left: Box::new(Expression::BinaryOp {
                    left: Box::new(Expression::Literal(Value::Number(2.0))),
                    operator: Operator::Add,
                    right: Box::new(Expression::Literal(Value::Number(3.0))),
                }),
                operator: Operator::Multiply,
                right: Box::new(Expression::Literal(Value::Number(4.0))),
            }
        );
    }

    #[test]
    fn test_parse_function_call() {
        let expr = parse_rule("concat(first_name, \" \", last_name)").unwrap();
        match expr {
            Expression::Call { name, args } => {
                assert_eq!(name, "concat");
                assert_eq!(args.len(), 3);
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_nested_calls() {
        let expr = parse_rule("get(split(name, \" \"), 0)").unwrap();
        match expr {
            Expression::Call { name, args } => {
                assert_eq!(name, "get");
                assert!(matches!(args[0], Expression::Call { .. }));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_if_expression() {
        let expr = parse_rule("if age >= 18 then \"adult\" else \"minor\"").unwrap();
        match expr {
            Expression::IfElse { condition, .. } => {
                assert!(matches!(*condition, Expression::BinaryOp { .. }));
            }
            other => panic!("expected if expression, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_if_with_parenthesized_condition() {
        assert!(parse_rule("if (age >= 18) then 1 else 2").is_ok());
        assert!(parse_rule("if true then 1 else 2").is_ok());
        assert!(parse_rule("if flag then upper(name) else lower(name)").is_ok());
    }

    #[test]
    fn test_parse_unary() {
        let expr = parse_rule("-x").unwrap();
        assert_eq!(
            expr,
            Expression::UnaryOp {
                operator: UnaryOperator::Negate,
                expr: Box::new(Expression::Field(vec!["x".to_string()])),
            }
        );
        assert!(parse_rule("!-x").is_ok());
    }

    #[test]
    fn test_parse_logic_chain() {
        let expr = parse_rule("a > 1 && b < 2").unwrap();
        match expr {
            Expression::BinaryOp { operator, .. } => assert_eq!(operator, Operator::And),
            other => panic!("expected binary op, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_rule("").is_err());
        assert!(parse_rule("1 +").is_err());
        assert!(parse_rule("foo(").is_err());
        assert!(parse_rule("a b").is_err());
    }

    #[test]
    fn test_keyword_prefixed_identifier() {
        // "iffy" must parse as a field, not the if keyword.
        let expr = parse_rule("iffy + 1").unwrap();
        match expr {
            Expression::BinaryOp { left, .. } => {
                assert_eq!(*left, Expression::Field(vec!["iffy".to_string()]));
            }
            other => panic!("expected binary op, got {other:?}"),
        }
    }
}
