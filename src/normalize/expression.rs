//! Restricted derived-column expression grammar
//!
//! Derived columns are declared as SQL-flavoured expressions over canonical
//! columns, e.g. `upper(region) || '-' || plant_code` or
//! `base_amount + bonus_amount`. Expressions are parsed with the SQL parser,
//! validated against a whitelist of operators and functions and the declared
//! column set, and compiled to a small evaluation tree. Unknown columns,
//! functions, or syntax are rejected at submission time; only value-level
//! failures (such as arithmetic on text) can surface per record.
//!
//! Supported syntax:
//! - column references and parentheses
//! - string literals (`'...'`), numeric literals, `true`/`false`
//! - `+ - * /` and `||` (string concatenation)
//! - `upper(x)`, `lower(x)`, `trim(x)`, `abs(x)`, `round(x)`,
//!   `concat(a, b, ...)`, `coalesce(a, b, ...)`

use std::collections::{HashMap, HashSet};

use sqlparser::ast::{
    BinaryOperator, Expr, FunctionArg, FunctionArgExpr, FunctionArguments, SelectItem, SetExpr,
    Statement, UnaryOperator, Value,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use thiserror::Error;

use crate::models::value::ScalarValue;

/// Errors raised while parsing, validating, or evaluating an expression.
#[derive(Debug, Clone, Error)]
pub enum ExpressionError {
    /// Source text is not a parseable expression
    #[error("parse error: {0}")]
    Parse(String),

    /// Expression references a column that is not declared
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    /// Function is not in the supported set
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// Syntax parsed but is outside the restricted grammar
    #[error("unsupported syntax: {0}")]
    UnsupportedSyntax(String),

    /// Function called with the wrong number of arguments
    #[error("{function} expects {expected} argument(s), got {actual}")]
    WrongArity {
        function: &'static str,
        expected: &'static str,
        actual: usize,
    },

    /// Value-level failure while evaluating against one record
    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Upper,
    Lower,
    Trim,
    Abs,
    Round,
    Concat,
    Coalesce,
}

impl Builtin {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "upper" => Some(Builtin::Upper),
            "lower" => Some(Builtin::Lower),
            "trim" => Some(Builtin::Trim),
            "abs" => Some(Builtin::Abs),
            "round" => Some(Builtin::Round),
            "concat" => Some(Builtin::Concat),
            "coalesce" => Some(Builtin::Coalesce),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Builtin::Upper => "upper",
            Builtin::Lower => "lower",
            Builtin::Trim => "trim",
            Builtin::Abs => "abs",
            Builtin::Round => "round",
            Builtin::Concat => "concat",
            Builtin::Coalesce => "coalesce",
        }
    }

    fn check_arity(&self, actual: usize) -> Result<(), ExpressionError> {
        let ok = match self {
            Builtin::Upper | Builtin::Lower | Builtin::Trim | Builtin::Abs | Builtin::Round => {
                actual == 1
            }
            Builtin::Concat | Builtin::Coalesce => actual >= 1,
        };
        if ok {
            Ok(())
        } else {
            let expected = match self {
                Builtin::Concat | Builtin::Coalesce => "1 or more",
                _ => "exactly 1",
            };
            Err(ExpressionError::WrongArity {
                function: self.name(),
                expected,
                actual,
            })
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Column(String),
    TextLit(String),
    NumberLit(f64),
    BoolLit(bool),
    Binary {
        op: BinOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Call(Builtin, Vec<Node>),
}

/// A validated, compiled derived-column expression.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    root: Node,
}

impl CompiledExpression {
    /// Parse and validate `source` against the declared column set.
    pub fn parse(
        source: &str,
        known_columns: &HashSet<String>,
    ) -> Result<Self, ExpressionError> {
        let sql = format!("SELECT {}", source);
        let statements = Parser::parse_sql(&GenericDialect {}, &sql)
            .map_err(|e| ExpressionError::Parse(e.to_string()))?;

        if statements.len() != 1 {
            return Err(ExpressionError::UnsupportedSyntax(
                "expected a single expression".to_string(),
            ));
        }
        let query = match &statements[0] {
            Statement::Query(query) => query,
            other => {
                return Err(ExpressionError::UnsupportedSyntax(other.to_string()));
            }
        };
        let select = match query.body.as_ref() {
            SetExpr::Select(select) => select,
            other => {
                return Err(ExpressionError::UnsupportedSyntax(other.to_string()));
            }
        };
        if !select.from.is_empty() || select.projection.len() != 1 {
            return Err(ExpressionError::UnsupportedSyntax(
                "expected a single expression".to_string(),
            ));
        }
        let expr = match &select.projection[0] {
            SelectItem::UnnamedExpr(expr) => expr,
            other => {
                return Err(ExpressionError::UnsupportedSyntax(other.to_string()));
            }
        };

        let root = compile(expr, known_columns)?;
        Ok(CompiledExpression { root })
    }

    /// Evaluate against one record's typed column environment.
    pub fn evaluate(
        &self,
        env: &HashMap<String, ScalarValue>,
    ) -> Result<ScalarValue, ExpressionError> {
        eval(&self.root, env)
    }
}

fn compile(expr: &Expr, known_columns: &HashSet<String>) -> Result<Node, ExpressionError> {
    match expr {
        Expr::Identifier(ident) => {
            if !known_columns.contains(&ident.value) {
                return Err(ExpressionError::UnknownColumn(ident.value.clone()));
            }
            Ok(Node::Column(ident.value.clone()))
        }
        Expr::Value(value) => match &value.value {
            Value::Number(text, _) => text
                .parse::<f64>()
                .map(Node::NumberLit)
                .map_err(|e| ExpressionError::Parse(format!("bad numeric literal {text:?}: {e}"))),
            Value::SingleQuotedString(text) => Ok(Node::TextLit(text.clone())),
            Value::Boolean(b) => Ok(Node::BoolLit(*b)),
            other => Err(ExpressionError::UnsupportedSyntax(other.to_string())),
        },
        Expr::BinaryOp { left, op, right } => {
            let op = match op {
                BinaryOperator::Plus => BinOp::Add,
                BinaryOperator::Minus => BinOp::Sub,
                BinaryOperator::Multiply => BinOp::Mul,
                BinaryOperator::Divide => BinOp::Div,
                BinaryOperator::StringConcat => BinOp::Concat,
                other => {
                    return Err(ExpressionError::UnsupportedSyntax(format!(
                        "operator {}",
                        other
                    )));
                }
            };
            Ok(Node::Binary {
                op,
                left: Box::new(compile(left, known_columns)?),
                right: Box::new(compile(right, known_columns)?),
            })
        }
        Expr::UnaryOp { op, expr } => match op {
            UnaryOperator::Minus => Ok(Node::Binary {
                op: BinOp::Sub,
                left: Box::new(Node::NumberLit(0.0)),
                right: Box::new(compile(expr, known_columns)?),
            }),
            UnaryOperator::Plus => compile(expr, known_columns),
            other => Err(ExpressionError::UnsupportedSyntax(format!(
                "operator {}",
                other
            ))),
        },
        Expr::Nested(inner) => compile(inner, known_columns),
        Expr::Function(func) => {
            let name = func.name.to_string().to_lowercase();
            let builtin = Builtin::from_name(&name)
                .ok_or_else(|| ExpressionError::UnknownFunction(name.clone()))?;
            let mut args = Vec::new();
            match &func.args {
                FunctionArguments::List(list) => {
                    for arg in &list.args {
                        match arg {
                            FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => {
                                args.push(compile(e, known_columns)?);
                            }
                            _ => {
                                return Err(ExpressionError::UnsupportedSyntax(
                                    "named or wildcard function arguments".to_string(),
                                ));
                            }
                        }
                    }
                }
                FunctionArguments::None => {}
                _ => {
                    return Err(ExpressionError::UnsupportedSyntax(
                        "function argument form".to_string(),
                    ));
                }
            }
            builtin.check_arity(args.len())?;
            Ok(Node::Call(builtin, args))
        }
        other => Err(ExpressionError::UnsupportedSyntax(other.to_string())),
    }
}

fn numeric(value: &ScalarValue) -> Result<f64, ExpressionError> {
    value.as_f64().ok_or_else(|| {
        ExpressionError::Evaluation(format!(
            "non-numeric operand: {}",
            value.canonical_string()
        ))
    })
}

fn eval(
    node: &Node,
    env: &HashMap<String, ScalarValue>,
) -> Result<ScalarValue, ExpressionError> {
    match node {
        Node::Column(name) => env.get(name).cloned().ok_or_else(|| {
            ExpressionError::Evaluation(format!("column {name:?} missing from record"))
        }),
        Node::TextLit(text) => Ok(ScalarValue::Text(text.clone())),
        Node::NumberLit(n) => Ok(ScalarValue::Float(*n)),
        Node::BoolLit(b) => Ok(ScalarValue::Bool(*b)),
        Node::Binary { op, left, right } => {
            let left = eval(left, env)?;
            let right = eval(right, env)?;
            match op {
                BinOp::Concat => Ok(ScalarValue::Text(format!(
                    "{}{}",
                    left.canonical_string(),
                    right.canonical_string()
                ))),
                _ if left.is_null() || right.is_null() => Ok(ScalarValue::Null),
                BinOp::Add | BinOp::Sub | BinOp::Mul => {
                    if let (ScalarValue::Integer(a), ScalarValue::Integer(b)) = (&left, &right) {
                        let result = match op {
                            BinOp::Add => a.checked_add(*b),
                            BinOp::Sub => a.checked_sub(*b),
                            _ => a.checked_mul(*b),
                        };
                        return result.map(ScalarValue::Integer).ok_or_else(|| {
                            ExpressionError::Evaluation("integer overflow".to_string())
                        });
                    }
                    let (a, b) = (numeric(&left)?, numeric(&right)?);
                    let result = match op {
                        BinOp::Add => a + b,
                        BinOp::Sub => a - b,
                        _ => a * b,
                    };
                    Ok(ScalarValue::Float(result))
                }
                BinOp::Div => {
                    let (a, b) = (numeric(&left)?, numeric(&right)?);
                    if b == 0.0 {
                        return Err(ExpressionError::Evaluation("division by zero".to_string()));
                    }
                    Ok(ScalarValue::Float(a / b))
                }
            }
        }
        Node::Call(builtin, args) => {
            let values: Vec<ScalarValue> = args
                .iter()
                .map(|a| eval(a, env))
                .collect::<Result<_, _>>()?;
            match builtin {
                Builtin::Upper | Builtin::Lower | Builtin::Trim => {
                    let value = &values[0];
                    if value.is_null() {
                        return Ok(ScalarValue::Null);
                    }
                    let text = value.canonical_string();
                    let text = match builtin {
                        Builtin::Upper => text.to_uppercase(),
                        Builtin::Lower => text.to_lowercase(),
                        _ => text.trim().to_string(),
                    };
                    Ok(ScalarValue::Text(text))
                }
                Builtin::Abs => match &values[0] {
                    ScalarValue::Null => Ok(ScalarValue::Null),
                    ScalarValue::Integer(i) => i
                        .checked_abs()
                        .map(ScalarValue::Integer)
                        .ok_or_else(|| {
                            ExpressionError::Evaluation("integer overflow".to_string())
                        }),
                    other => Ok(ScalarValue::Float(numeric(other)?.abs())),
                },
                Builtin::Round => match &values[0] {
                    ScalarValue::Null => Ok(ScalarValue::Null),
                    ScalarValue::Integer(i) => Ok(ScalarValue::Integer(*i)),
                    other => Ok(ScalarValue::Float(numeric(other)?.round())),
                },
                Builtin::Concat => {
                    let joined: String = values
                        .iter()
                        .map(ScalarValue::canonical_string)
                        .collect::<Vec<_>>()
                        .join("");
                    Ok(ScalarValue::Text(joined))
                }
                Builtin::Coalesce => Ok(values
                    .into_iter()
                    .find(|v| !v.is_null())
                    .unwrap_or(ScalarValue::Null)),
            }
        }
    }
}
