//! Expression evaluation against a resolution context.

use super::{ExprTerm, MatchExpr, Operator};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{Error, Result};
use crate::functions::FunctionRegistry;
use crate::value::Value;
use tracing::warn;

/// Variable lookup used by [`ExprTerm::Ref`].
///
/// The decoder implements this over its scope stack; tests and embedders can
/// implement it over anything that maps paths to values.
pub trait Resolve {
    /// Resolves a reference path; unknown paths yield [`Value::Undefined`]
    fn resolve(&self, path: &str) -> Value;
}

impl Resolve for crate::value::Record {
    fn resolve(&self, path: &str) -> Value {
        self.get_path(path.strip_prefix("$.").unwrap_or(path))
            .unwrap_or_default()
    }
}

/// Everything an evaluation needs besides the term itself
pub struct Env<'a> {
    /// Reference resolution
    pub resolver: &'a dyn Resolve,
    /// Functions reachable through [`ExprTerm::Call`]
    pub functions: &'a FunctionRegistry,
    /// Receiver for soft failures
    pub sink: &'a mut dyn DiagnosticSink,
    /// Fail instead of yielding `Undefined` for unknown functions
    pub strict_functions: bool,
    /// Cursor offset, reported with diagnostics
    pub offset: usize,
}

/// Evaluates a single term
pub fn evaluate(term: &ExprTerm, env: &mut Env<'_>) -> Result<Value> {
    match term {
        ExprTerm::Ref(path) => Ok(env.resolver.resolve(path)),
        ExprTerm::UintLiteral(n) => Ok(Value::from_u64(*n)),
        ExprTerm::TextLiteral(s) => Ok(Value::Text(s.clone())),
        ExprTerm::BooleanLiteral(b) => Ok(Value::Bool(*b)),
        ExprTerm::Operator(op) => Err(Error::eval(format!(
            "operator '{}' used outside an expression",
            op
        ))),
        ExprTerm::Expression(terms) => evaluate_sequence(terms, env),
        ExprTerm::Call(children) => evaluate_call(children, env),
        ExprTerm::Match(m) => evaluate_match(m, env),
    }
}

fn evaluate_sequence(terms: &[ExprTerm], env: &mut Env<'_>) -> Result<Value> {
    let mut terms = terms.iter();
    let mut acc = match terms.next() {
        None => return Ok(Value::Undefined),
        Some(ExprTerm::Operator(op)) => {
            return Err(Error::eval(format!("expression starts with operator '{}'", op)))
        }
        Some(term) => evaluate(term, env)?,
    };

    while let Some(term) = terms.next() {
        let ExprTerm::Operator(op) = term else {
            return Err(Error::eval("expected an operator between operands"));
        };
        let rhs = match terms.next() {
            None | Some(ExprTerm::Operator(_)) => {
                return Err(Error::eval(format!("operator '{}' is missing its right operand", op)))
            }
            Some(term) => evaluate(term, env)?,
        };
        acc = apply(*op, &acc, &rhs)?;
    }

    Ok(acc)
}

fn evaluate_call(children: &[ExprTerm], env: &mut Env<'_>) -> Result<Value> {
    let (callee, args) = children
        .split_first()
        .ok_or_else(|| Error::eval("call without a function name"))?;

    let name = match callee {
        ExprTerm::Ref(name) | ExprTerm::TextLiteral(name) => name.clone(),
        other => evaluate(other, env)?.to_string(),
    };

    let args = args
        .iter()
        .map(|arg| evaluate(arg, env))
        .collect::<Result<Vec<_>>>()?;

    match env.functions.get(&name) {
        Some(function) => function.call(&args),
        None if env.strict_functions => Err(Error::UnknownFunction { name }),
        None => {
            warn!("Call to unregistered function '{}' yields undefined", name);
            env.sink.report(Diagnostic::UnknownFunction {
                name,
                offset: env.offset,
            });
            Ok(Value::Undefined)
        }
    }
}

fn evaluate_match(m: &MatchExpr, env: &mut Env<'_>) -> Result<Value> {
    let value = evaluate(&m.condition, env)?;
    for case in &m.cases {
        let literal = evaluate(&case.value, env)?;
        if value.loose_eq(&literal) {
            return evaluate(&case.then, env);
        }
    }
    Err(Error::NoMatch {
        value: value.to_string(),
    })
}

/// Applies a binary operator
pub(crate) fn apply(op: Operator, lhs: &Value, rhs: &Value) -> Result<Value> {
    match op {
        Operator::Add => {
            if matches!(lhs, Value::Text(_)) || matches!(rhs, Value::Text(_)) {
                return Ok(Value::Text(format!("{}{}", lhs, rhs)));
            }
            arithmetic(lhs, rhs, i64::checked_add, |a, b| a + b)
        }
        Operator::Sub => arithmetic(lhs, rhs, i64::checked_sub, |a, b| a - b),
        Operator::Mul => arithmetic(lhs, rhs, i64::checked_mul, |a, b| a * b),
        Operator::Div => arithmetic(
            lhs,
            rhs,
            |a, b| match a.checked_rem(b) {
                Some(0) => a.checked_div(b),
                _ => None,
            },
            |a, b| a / b,
        ),
        Operator::Rem => arithmetic(lhs, rhs, i64::checked_rem, |a, b| a % b),
        Operator::Pow => arithmetic(
            lhs,
            rhs,
            |a, b| u32::try_from(b).ok().and_then(|e| a.checked_pow(e)),
            f64::powf,
        ),
        Operator::Eq => Ok(Value::Bool(lhs.loose_eq(rhs))),
        Operator::Ne => Ok(Value::Bool(!lhs.loose_eq(rhs))),
        Operator::Gt => Ok(Value::Bool(compare(lhs, rhs, |o| o.is_gt()))),
        Operator::Ge => Ok(Value::Bool(compare(lhs, rhs, |o| o.is_ge()))),
        Operator::Lt => Ok(Value::Bool(compare(lhs, rhs, |o| o.is_lt()))),
        Operator::Le => Ok(Value::Bool(compare(lhs, rhs, |o| o.is_le()))),
        Operator::And => Ok(Value::Bool(lhs.is_truthy() && rhs.is_truthy())),
        Operator::Or => Ok(Value::Bool(lhs.is_truthy() || rhs.is_truthy())),
        Operator::BitAnd => Ok(Value::Int(integer(lhs)? & integer(rhs)?)),
        Operator::BitOr => Ok(Value::Int(integer(lhs)? | integer(rhs)?)),
        Operator::Shl => Ok(Value::Int(integer(lhs)?.wrapping_shl(shift(rhs)?))),
        Operator::Shr => Ok(Value::Int(integer(lhs)?.wrapping_shr(shift(rhs)?))),
        Operator::Access => {
            let key = rhs.to_string();
            Ok(lhs
                .child(&key)
                .map(|value| value.into_owned())
                .unwrap_or_default())
        }
    }
}

/// Integer arithmetic while it fits, float arithmetic otherwise
fn arithmetic(
    lhs: &Value,
    rhs: &Value,
    int_op: impl Fn(i64, i64) -> Option<i64>,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<Value> {
    let (lhs, rhs) = (lhs.to_number()?, rhs.to_number()?);
    if let (Value::Int(a), Value::Int(b)) = (&lhs, &rhs) {
        if let Some(n) = int_op(*a, *b) {
            return Ok(Value::Int(n));
        }
    }
    Ok(Value::Float(float_op(lhs.to_f64()?, rhs.to_f64()?)))
}

/// Orders text lexically and everything else numerically; incomparable
/// operands compare false.
fn compare(lhs: &Value, rhs: &Value, test: impl Fn(std::cmp::Ordering) -> bool) -> bool {
    let ordering = match (lhs, rhs) {
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        _ => match (lhs.to_f64(), rhs.to_f64()) {
            (Ok(a), Ok(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    ordering.map_or(false, test)
}

fn integer(value: &Value) -> Result<i64> {
    match value.to_number()? {
        Value::Int(n) => Ok(n),
        other => Ok(other.to_f64()? as i64),
    }
}

fn shift(value: &Value) -> Result<u32> {
    Ok((integer(value)? & 63) as u32)
}
