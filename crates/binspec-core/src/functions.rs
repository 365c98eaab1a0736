//! Functions callable from schema expressions.
//!
//! Format modules register helpers under namespaced names (`"gif::..."`,
//! `"jpeg::..."`) before decoding. The registry is an explicit value owned by
//! a [`crate::Decoder`]; there is no process-wide table.
//!
//! ```
//! use binspec_core::{FunctionRegistry, Value, Result};
//!
//! let mut functions = FunctionRegistry::with_builtins();
//! functions.register("jpeg::to_hex", |args: &[Value]| -> Result<Value> {
//!     Ok(Value::Text(format!("{:x}", args[0].to_f64()? as i64)))
//! });
//! assert!(functions.contains("jpeg::to_hex"));
//! ```

use crate::error::{Error, Result};
use crate::expr::{apply, Operator};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A function of any arity over decoded values
pub trait Function: Send + Sync {
    /// Invokes the function with already-evaluated arguments
    fn call(&self, args: &[Value]) -> Result<Value>;
}

impl<F> Function for F
where
    F: Fn(&[Value]) -> Result<Value> + Send + Sync,
{
    fn call(&self, args: &[Value]) -> Result<Value> {
        self(args)
    }
}

/// Name → function table consulted by call expressions
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn Function>>,
}

impl FunctionRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in `list::` functions
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register("list::sum", list_sum)
            .register("list::length", list_length)
            .register("list::size", list_length);
        registry
    }

    /// Registers a function, replacing any previous one with the same name
    pub fn register(&mut self, name: impl Into<String>, function: impl Function + 'static) -> &mut Self {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    /// Looks up a function by name
    pub fn get(&self, name: &str) -> Option<&dyn Function> {
        self.functions.get(name).map(|f| f.as_ref())
    }

    /// Returns true if a function is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

/// `list::sum(list[, key])`: sums the items, or the `key` field of each item.
/// Missing entries count as zero.
fn list_sum(args: &[Value]) -> Result<Value> {
    let key = match args.get(1) {
        None | Some(Value::Undefined) => None,
        Some(key) => Some(key.to_string()),
    };

    let mut total = Value::Int(0);
    match args.first() {
        None | Some(Value::Undefined) => {}
        Some(Value::List(items)) => {
            for item in items {
                let term = match &key {
                    Some(key) => item.get_path(key).unwrap_or_default(),
                    None => item.clone(),
                };
                if term != Value::Undefined {
                    total = apply(Operator::Add, &total, &term.to_number()?)?;
                }
            }
        }
        Some(Value::Bytes(bytes)) => {
            total = Value::Int(bytes.iter().map(|&b| i64::from(b)).sum());
        }
        Some(other) => {
            return Err(Error::function(
                "list::sum",
                format!("expected a list, got {}", other.type_name()),
            ))
        }
    }
    Ok(total)
}

/// `list::length(list)`: element count of a list, bytes or text
fn list_length(args: &[Value]) -> Result<Value> {
    match args.first() {
        None | Some(Value::Undefined) => Ok(Value::Int(0)),
        Some(value) => value.len().map(|n| Value::Int(n as i64)).ok_or_else(|| {
            Error::function(
                "list::length",
                format!("expected a list, got {}", value.type_name()),
            )
        }),
    }
}
