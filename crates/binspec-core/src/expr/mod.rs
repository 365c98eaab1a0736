//! Schema expression language.
//!
//! Expressions appear wherever a node needs a computed value: lengths,
//! counts, conditions, switch selectors, template arguments. They are
//! written as JSON:
//!
//! | JSON                                     | term                         |
//! |------------------------------------------|------------------------------|
//! | `12`                                     | [`ExprTerm::UintLiteral`]    |
//! | `true`                                   | [`ExprTerm::BooleanLiteral`] |
//! | `"header.width"`, `{"ref": "..."}`       | [`ExprTerm::Ref`]            |
//! | `{"text": "RIFF"}`                       | [`ExprTerm::TextLiteral`]    |
//! | `{"op": "+"}`                            | [`ExprTerm::Operator`]       |
//! | `["size", "-", 4]`, `{"expr": [...]}`    | [`ExprTerm::Expression`]     |
//! | `{"call": ["list::sum", "chunks"]}`      | [`ExprTerm::Call`]           |
//! | `{"match": {"on": .., "cases": [..]}}`   | [`ExprTerm::Match`]          |
//!
//! Inside an expression array a bare string that spells an operator is the
//! operator; `{"ref": "eq"}` references a field literally named `eq`.
//! Expressions are infix and reduce strictly left to right.

mod eval;

pub use eval::{evaluate, Env, Resolve};
pub(crate) use eval::apply;

use crate::error::Error;
use serde::Deserialize;
use serde_json::Value as Json;
use std::fmt;

/// Binary operators usable inside an [`ExprTerm::Expression`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Numeric addition or text concatenation
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Division
    Div,
    /// Remainder
    Rem,
    /// Exponentiation
    Pow,
    /// Loose equality
    Eq,
    /// Loose inequality
    Ne,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Logical and
    And,
    /// Logical or
    Or,
    /// Bitwise and
    BitAnd,
    /// Bitwise or
    BitOr,
    /// Left shift
    Shl,
    /// Arithmetic right shift
    Shr,
    /// Field or index lookup on the left operand
    Access,
}

impl Operator {
    /// Parses an operator spelling
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "+" => Operator::Add,
            "-" => Operator::Sub,
            "*" => Operator::Mul,
            "/" => Operator::Div,
            "%" => Operator::Rem,
            "pow" | "**" => Operator::Pow,
            "eq" | "==" => Operator::Eq,
            "ne" | "!=" => Operator::Ne,
            "gt" | ">" => Operator::Gt,
            "ge" | ">=" => Operator::Ge,
            "lt" | "<" => Operator::Lt,
            "le" | "<=" => Operator::Le,
            "and" | "&&" => Operator::And,
            "or" | "||" => Operator::Or,
            "&" => Operator::BitAnd,
            "|" => Operator::BitOr,
            "<<" => Operator::Shl,
            ">>" => Operator::Shr,
            "access" | "." => Operator::Access,
            _ => return None,
        };
        Some(op)
    }

    /// Returns the canonical spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Rem => "%",
            Operator::Pow => "pow",
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Ge => "ge",
            Operator::Lt => "lt",
            Operator::Le => "le",
            Operator::And => "and",
            Operator::Or => "or",
            Operator::BitAnd => "&",
            Operator::BitOr => "|",
            Operator::Shl => "<<",
            Operator::Shr => ">>",
            Operator::Access => "access",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One term of a schema expression
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub enum ExprTerm {
    /// Reference to a field, parameter or root value (`$.` for the current record)
    Ref(String),
    /// Non-negative integer literal
    UintLiteral(u64),
    /// Text literal
    TextLiteral(String),
    /// Boolean literal
    BooleanLiteral(bool),
    /// Operator between two operands of an expression
    Operator(Operator),
    /// Infix term sequence reduced left to right
    Expression(Vec<ExprTerm>),
    /// Function call: the first child names the function, the rest are arguments
    Call(Vec<ExprTerm>),
    /// First case whose value equals the condition selects the result
    Match(MatchExpr),
}

/// Body of an [`ExprTerm::Match`]
#[derive(Debug, Clone, PartialEq)]
pub struct MatchExpr {
    /// Value being matched
    pub condition: Box<ExprTerm>,
    /// Cases tried in order
    pub cases: Vec<MatchCase>,
}

/// A single arm of a [`MatchExpr`]
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCase {
    /// Literal compared against the condition
    pub value: ExprTerm,
    /// Result when the literal matches
    pub then: ExprTerm,
}

impl ExprTerm {
    /// Creates a reference term
    pub fn reference(path: impl Into<String>) -> Self {
        ExprTerm::Ref(path.into())
    }

    /// Creates an integer literal
    pub fn uint(n: u64) -> Self {
        ExprTerm::UintLiteral(n)
    }

    /// Creates a text literal
    pub fn text(s: impl Into<String>) -> Self {
        ExprTerm::TextLiteral(s.into())
    }

    fn from_json(json: Json, in_expression: bool) -> Result<Self, Error> {
        match json {
            Json::Bool(b) => Ok(ExprTerm::BooleanLiteral(b)),
            Json::Number(n) => n.as_u64().map(ExprTerm::UintLiteral).ok_or_else(|| {
                Error::invalid_schema(format!(
                    "numeric literal {} must be a non-negative integer",
                    n
                ))
            }),
            Json::String(s) => {
                if in_expression {
                    if let Some(op) = Operator::from_symbol(&s) {
                        return Ok(ExprTerm::Operator(op));
                    }
                }
                Ok(ExprTerm::Ref(s))
            }
            Json::Array(items) => Ok(ExprTerm::Expression(Self::sequence(items)?)),
            Json::Object(map) => {
                if map.len() != 1 {
                    return Err(Error::invalid_schema(format!(
                        "expression object must have exactly one key, got {}",
                        map.len()
                    )));
                }
                let Some((key, value)) = map.into_iter().next() else {
                    return Err(Error::invalid_schema("empty expression object"));
                };
                match (key.as_str(), value) {
                    ("ref", Json::String(path)) => Ok(ExprTerm::Ref(path)),
                    ("text", Json::String(text)) => Ok(ExprTerm::TextLiteral(text)),
                    ("op", Json::String(symbol)) => Operator::from_symbol(&symbol)
                        .map(ExprTerm::Operator)
                        .ok_or_else(|| Error::invalid_schema(format!("unknown operator '{}'", symbol))),
                    ("expr", Json::Array(items)) => Ok(ExprTerm::Expression(Self::sequence(items)?)),
                    ("call", Json::Array(items)) => {
                        if items.is_empty() {
                            return Err(Error::invalid_schema("call needs a function name"));
                        }
                        let children = items
                            .into_iter()
                            .map(|item| Self::from_json(item, false))
                            .collect::<Result<Vec<_>, _>>()?;
                        Ok(ExprTerm::Call(children))
                    }
                    ("match", body) => Ok(ExprTerm::Match(MatchExpr::from_json(body)?)),
                    (key, _) => Err(Error::invalid_schema(format!(
                        "unsupported expression form '{}'",
                        key
                    ))),
                }
            }
            Json::Null => Err(Error::invalid_schema("null is not an expression")),
        }
    }

    fn sequence(items: Vec<Json>) -> Result<Vec<ExprTerm>, Error> {
        items
            .into_iter()
            .map(|item| Self::from_json(item, true))
            .collect()
    }
}

impl MatchExpr {
    fn from_json(body: Json) -> Result<Self, Error> {
        let Json::Object(mut body) = body else {
            return Err(Error::invalid_schema("match body must be an object"));
        };
        let condition = body
            .remove("on")
            .or_else(|| body.remove("condition"))
            .ok_or_else(|| Error::invalid_schema("match needs an 'on' condition"))?;
        let Some(Json::Array(raw_cases)) = body.remove("cases") else {
            return Err(Error::invalid_schema("match needs a 'cases' array"));
        };

        let mut cases = Vec::with_capacity(raw_cases.len());
        for raw in raw_cases {
            let Json::Object(mut raw) = raw else {
                return Err(Error::invalid_schema("match case must be an object"));
            };
            let value = raw
                .remove("when")
                .ok_or_else(|| Error::invalid_schema("match case needs 'when'"))?;
            let then = raw
                .remove("then")
                .ok_or_else(|| Error::invalid_schema("match case needs 'then'"))?;
            cases.push(MatchCase {
                value: ExprTerm::from_json(value, false)?,
                then: ExprTerm::from_json(then, false)?,
            });
        }

        Ok(Self {
            condition: Box::new(ExprTerm::from_json(condition, false)?),
            cases,
        })
    }
}

impl TryFrom<Json> for ExprTerm {
    type Error = Error;

    fn try_from(json: Json) -> Result<Self, Error> {
        ExprTerm::from_json(json, false)
    }
}

impl From<u64> for ExprTerm {
    fn from(n: u64) -> Self {
        ExprTerm::UintLiteral(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parse(json: Json) -> ExprTerm {
        ExprTerm::try_from(json).unwrap()
    }

    #[test]
    fn test_literals_and_refs() {
        assert_eq!(parse(json!(4)), ExprTerm::UintLiteral(4));
        assert_eq!(parse(json!(true)), ExprTerm::BooleanLiteral(true));
        assert_eq!(parse(json!("header.size")), ExprTerm::reference("header.size"));
        assert_eq!(parse(json!({"text": "RIFF"})), ExprTerm::text("RIFF"));
        assert_eq!(parse(json!({"ref": "eq"})), ExprTerm::reference("eq"));
    }

    #[test]
    fn test_operators_only_inside_sequences() {
        assert_eq!(parse(json!("-")), ExprTerm::reference("-"));
        assert_eq!(
            parse(json!(["size", "-", 4])),
            ExprTerm::Expression(vec![
                ExprTerm::reference("size"),
                ExprTerm::Operator(Operator::Sub),
                ExprTerm::uint(4),
            ])
        );
        assert_eq!(
            parse(json!({"expr": ["a", {"op": "eq"}, 0]})),
            ExprTerm::Expression(vec![
                ExprTerm::reference("a"),
                ExprTerm::Operator(Operator::Eq),
                ExprTerm::uint(0),
            ])
        );
    }

    #[test]
    fn test_call_and_match() {
        assert_eq!(
            parse(json!({"call": ["list::sum", "chunks", {"text": "size"}]})),
            ExprTerm::Call(vec![
                ExprTerm::reference("list::sum"),
                ExprTerm::reference("chunks"),
                ExprTerm::text("size"),
            ])
        );

        let term = parse(json!({"match": {"on": "kind", "cases": [
            {"when": 1, "then": {"text": "one"}},
            {"when": 2, "then": ["a", "+", 1]}
        ]}}));
        let ExprTerm::Match(m) = term else {
            panic!("expected match");
        };
        assert_eq!(*m.condition, ExprTerm::reference("kind"));
        assert_eq!(m.cases.len(), 2);
        assert_eq!(m.cases[0].then, ExprTerm::text("one"));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(ExprTerm::try_from(json!(-1)).is_err());
        assert!(ExprTerm::try_from(json!(null)).is_err());
        assert!(ExprTerm::try_from(json!({"op": "??"})).is_err());
        assert!(ExprTerm::try_from(json!({"a": 1, "b": 2})).is_err());
        assert!(ExprTerm::try_from(json!({"call": []})).is_err());
    }
}
