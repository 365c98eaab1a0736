//! Scope stack and reference resolution.

use crate::error::{Error, Result};
use crate::expr::Resolve;
use crate::value::{Record, Value};
use std::iter;

/// A record under construction, tagged with the node that opened it
#[derive(Debug)]
pub(crate) enum Scope {
    /// One item of a `list`
    ListItem(Record),
    /// One item of a `bounded` region
    RegionItem(Record),
    /// The body of a `template_ref`
    Template(Record),
}

impl Scope {
    pub(crate) fn record(&self) -> &Record {
        match self {
            Scope::ListItem(record) | Scope::RegionItem(record) | Scope::Template(record) => record,
        }
    }

    pub(crate) fn record_mut(&mut self) -> &mut Record {
        match self {
            Scope::ListItem(record) | Scope::RegionItem(record) | Scope::Template(record) => record,
        }
    }

    pub(crate) fn into_record(self) -> Record {
        match self {
            Scope::ListItem(record) | Scope::RegionItem(record) | Scope::Template(record) => record,
        }
    }
}

/// Root record, open scopes and template parameter frames of one decode.
///
/// The root record is never on the scope stack; at top level it is the
/// current target.
#[derive(Debug, Default)]
pub(crate) struct ScopeStack {
    root: Record,
    scopes: Vec<Scope>,
    params: Vec<Record>,
}

impl ScopeStack {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record that new fields are written into
    pub(crate) fn target(&self) -> &Record {
        self.scopes.last().map_or(&self.root, Scope::record)
    }

    pub(crate) fn target_mut(&mut self) -> &mut Record {
        match self.scopes.last_mut() {
            Some(scope) => scope.record_mut(),
            None => &mut self.root,
        }
    }

    pub(crate) fn push(&mut self, scope: Scope) {
        self.scopes.push(scope);
    }

    pub(crate) fn pop(&mut self) -> Result<Scope> {
        self.scopes
            .pop()
            .ok_or_else(|| Error::internal("scope stack underflow"))
    }

    pub(crate) fn push_params(&mut self, frame: Record) {
        self.params.push(frame);
    }

    pub(crate) fn pop_params(&mut self) -> Result<Record> {
        self.params
            .pop()
            .ok_or_else(|| Error::internal("parameter stack underflow"))
    }

    /// Overwrites the innermost existing binding of `id`, or creates it on
    /// the current target when nothing binds it.
    pub(crate) fn assign(&mut self, id: &str, value: Value) {
        let binding = self
            .scopes
            .iter_mut()
            .rev()
            .map(Scope::record_mut)
            .chain(iter::once(&mut self.root))
            .find(|record| record.contains(id));

        match binding {
            Some(record) => record.insert(id, value),
            None => self.target_mut().insert(id, value),
        }
    }

    /// Returns the finished root record
    pub(crate) fn into_root(self) -> Result<Record> {
        if !self.scopes.is_empty() || !self.params.is_empty() {
            return Err(Error::internal(format!(
                "{} scopes and {} parameter frames left open",
                self.scopes.len(),
                self.params.len()
            )));
        }
        Ok(self.root)
    }
}

impl Resolve for ScopeStack {
    fn resolve(&self, path: &str) -> Value {
        if path == "$" {
            return Value::Record(self.target().clone());
        }
        if let Some(local) = path.strip_prefix("$.") {
            return self.target().get_path(local).unwrap_or_default();
        }

        self.scopes
            .iter()
            .rev()
            .map(Scope::record)
            .chain(self.params.last())
            .chain(iter::once(&self.root))
            .find_map(|record| record.get_path(path))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(fields: &[(&str, i64)]) -> Record {
        fields
            .iter()
            .map(|&(id, n)| (id.to_string(), Value::Int(n)))
            .collect()
    }

    #[test]
    fn test_target_is_root_at_top_level() {
        let mut stack = ScopeStack::new();
        stack.target_mut().insert("a", 1_i64);
        assert_eq!(stack.resolve("a"), Value::Int(1));
        assert_eq!(stack.resolve("$.a"), Value::Int(1));
        assert_eq!(stack.into_root().unwrap().len(), 1);
    }

    #[test]
    fn test_resolution_order() {
        let mut stack = ScopeStack::new();
        stack.target_mut().merge(record(&[("size", 1), ("root_only", 7)]));
        stack.push_params(record(&[("size", 2), ("param_only", 8)]));
        stack.push(Scope::Template(record(&[("size", 3)])));
        stack.push(Scope::ListItem(record(&[("value", 4)])));

        assert_eq!(stack.resolve("size"), Value::Int(3));
        assert_eq!(stack.resolve("param_only"), Value::Int(8));
        assert_eq!(stack.resolve("root_only"), Value::Int(7));
        assert_eq!(stack.resolve("value"), Value::Int(4));
        assert_eq!(stack.resolve("missing"), Value::Undefined);
    }

    #[test]
    fn test_dollar_prefix_is_local() {
        let mut stack = ScopeStack::new();
        stack.target_mut().insert("count", 2_i64);
        stack.push(Scope::ListItem(record(&[("value", 4)])));

        assert_eq!(stack.resolve("$.value"), Value::Int(4));
        assert_eq!(stack.resolve("$.count"), Value::Undefined);
        assert_eq!(stack.resolve("count"), Value::Int(2));
    }

    #[test]
    fn test_undefined_field_shadows_outer_scopes() {
        let mut stack = ScopeStack::new();
        stack.target_mut().insert("x", 1_i64);
        stack.push(Scope::Template(Record::new()));
        stack.target_mut().insert("x", Value::Undefined);
        assert_eq!(stack.resolve("x"), Value::Undefined);

        stack.pop().unwrap();
        assert_eq!(stack.resolve("x"), Value::Int(1));
    }

    #[test]
    fn test_params_only_top_frame() {
        let mut stack = ScopeStack::new();
        stack.push_params(record(&[("outer", 1)]));
        stack.push_params(record(&[("inner", 2)]));
        assert_eq!(stack.resolve("inner"), Value::Int(2));
        assert_eq!(stack.resolve("outer"), Value::Undefined);

        stack.pop_params().unwrap();
        assert_eq!(stack.resolve("outer"), Value::Int(1));
    }

    #[test]
    fn test_assign_overwrites_innermost_binding() {
        let mut stack = ScopeStack::new();
        stack.target_mut().insert("total", 0_i64);
        stack.push(Scope::RegionItem(Record::new()));

        stack.assign("total", Value::Int(5));
        stack.assign("fresh", Value::Int(1));

        let item = stack.pop().unwrap().into_record();
        assert_eq!(item.get("fresh"), Some(&Value::Int(1)));
        assert!(!item.contains("total"));
        assert_eq!(stack.resolve("total"), Value::Int(5));
    }

    #[test]
    fn test_unbalanced_stack_is_an_error() {
        let mut stack = ScopeStack::new();
        assert!(stack.pop().is_err());
        stack.push(Scope::ListItem(Record::new()));
        assert!(matches!(stack.into_root(), Err(Error::Internal(_))));
    }
}
