//! Schema interpreter.
//!
//! This module walks a [`Schema`] over a byte buffer and builds the decoded
//! [`Record`] tree.
//!
//! ## Algorithm Overview
//!
//! 1. Create a fresh parse state: cursor, scope stack, region stack
//! 2. Interpret the top-level nodes in order, each writing into the current
//!    target record and/or advancing the cursor
//! 3. `list`, `bounded` and `template_ref` push a new scope, recurse, then
//!    pop it and move the finished record into their parent
//! 4. Return the root record; any fatal error discards everything
//!
//! ## Example
//!
//! ```
//! use binspec_core::{Decoder, Schema, Value};
//!
//! let schema: Schema = r#"{
//!     "byte_order": "big",
//!     "spec": [
//!         { "type": "uint", "id": "length", "length": 2 },
//!         { "type": "bytes", "id": "body", "length": "length" }
//!     ]
//! }"#.parse()?;
//!
//! let record = Decoder::new().decode(&[0x00, 0x02, 0xCA, 0xFE], &schema)?;
//! assert_eq!(record.get("length"), Some(&Value::Int(2)));
//! # Ok::<(), binspec_core::Error>(())
//! ```

mod cursor;
mod leaf;
mod scope;

pub use cursor::Cursor;

use crate::diagnostics::{Diagnostic, DiagnosticSink, NullSink};
use crate::error::{Error, Result};
use crate::expr::{evaluate, Env, ExprTerm};
use crate::functions::FunctionRegistry;
use crate::schema::{AlignBasis, ByteOrder, Schema, SpecNode, Template, TemplateArgs};
use crate::value::{Record, Value};
use bytes::Bytes;
use scope::{Scope, ScopeStack};
use std::path::Path;
use tracing::{debug, trace, warn};

/// Configuration for the decoder
#[derive(Debug, Clone, Default)]
pub struct DecoderConfig {
    /// Maximum schema nesting depth (0 = unlimited)
    pub max_depth: usize,
    /// Fail on calls to unregistered functions instead of yielding `undefined`
    pub strict_functions: bool,
    /// Byte order used instead of the schema's own default
    pub byte_order: Option<ByteOrder>,
}

impl DecoderConfig {
    /// Creates a new decoder config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum nesting depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets strict handling of unknown functions
    pub fn strict_functions(mut self, strict: bool) -> Self {
        self.strict_functions = strict;
        self
    }

    /// Overrides the schema's initial byte order
    pub fn byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = Some(byte_order);
        self
    }
}

/// Reusable decoder: configuration plus the functions schemas may call.
///
/// A decoder holds no per-decode state and can be shared between threads.
#[derive(Debug, Clone)]
pub struct Decoder {
    config: DecoderConfig,
    functions: FunctionRegistry,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Creates a decoder with default configuration and the built-in functions
    pub fn new() -> Self {
        Self::with_config(DecoderConfig::default())
    }

    /// Creates a decoder with custom configuration and the built-in functions
    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            config,
            functions: FunctionRegistry::with_builtins(),
        }
    }

    /// Replaces the function registry
    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    /// Registry for adding format-specific functions
    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    /// Active configuration
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decodes a buffer, discarding diagnostics
    pub fn decode(&self, buffer: &[u8], schema: &Schema) -> Result<Record> {
        self.decode_bytes(Bytes::copy_from_slice(buffer), schema)
    }

    /// Decodes a shared buffer without copying it
    pub fn decode_bytes(&self, buffer: Bytes, schema: &Schema) -> Result<Record> {
        self.run(buffer, schema, &mut NullSink)
    }

    /// Decodes a buffer, reporting soft failures to `sink`
    pub fn decode_with_sink(
        &self,
        buffer: &[u8],
        schema: &Schema,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Record> {
        self.run(Bytes::copy_from_slice(buffer), schema, sink)
    }

    /// Reads and decodes a file
    pub fn decode_file(&self, path: impl AsRef<Path>, schema: &Schema) -> Result<Record> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
        self.decode_bytes(Bytes::from(data), schema)
    }

    fn run(&self, data: Bytes, schema: &Schema, sink: &mut dyn DiagnosticSink) -> Result<Record> {
        let byte_order = self.config.byte_order.unwrap_or(schema.byte_order);
        debug!(
            "Starting decode of {} bytes ({:?} endian, {} top-level nodes)",
            data.len(),
            byte_order,
            schema.spec.len()
        );

        let mut interpreter = Interpreter {
            schema,
            functions: &self.functions,
            config: &self.config,
            sink,
            cursor: Cursor::new(data, byte_order),
            scopes: ScopeStack::new(),
            regions: Vec::new(),
            depth: 0,
        };
        interpreter.run_block(&schema.spec)?;

        let consumed = interpreter.cursor.offset();
        let total = interpreter.cursor.len();
        let record = interpreter.scopes.into_root()?;
        debug!(
            "Decode complete: {} fields, {} of {} bytes consumed",
            record.len(),
            consumed,
            total
        );
        Ok(record)
    }
}

/// Decodes a buffer with a default [`Decoder`]
pub fn decode(buffer: &[u8], schema: &Schema) -> Result<Record> {
    Decoder::new().decode(buffer, schema)
}

/// Reads and decodes a file with a default [`Decoder`]
pub fn decode_file(path: impl AsRef<Path>, schema: &Schema) -> Result<Record> {
    Decoder::new().decode_file(path, schema)
}

/// Absolute byte window of an open `bounded` node
#[derive(Debug, Clone, Copy)]
struct Region {
    start: usize,
    end: usize,
}

/// Per-decode parse state
struct Interpreter<'a> {
    schema: &'a Schema,
    functions: &'a FunctionRegistry,
    config: &'a DecoderConfig,
    sink: &'a mut dyn DiagnosticSink,
    cursor: Cursor,
    scopes: ScopeStack,
    regions: Vec<Region>,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    fn run_block(&mut self, nodes: &'a [SpecNode]) -> Result<()> {
        self.depth += 1;
        if self.config.max_depth > 0 && self.depth > self.config.max_depth {
            return Err(Error::DepthExceeded {
                limit: self.config.max_depth,
            });
        }
        for node in nodes {
            self.run_node(node)?;
        }
        self.depth -= 1;
        Ok(())
    }

    fn run_node(&mut self, node: &'a SpecNode) -> Result<()> {
        match node {
            SpecNode::Uint { id, length } => {
                let n = self.eval_length(length)?;
                let value = self.cursor.read_uint(n)?;
                self.write(id, Value::from_u64(value));
            }
            SpecNode::Int { id, length } => {
                let n = self.eval_length(length)?;
                let value = self.cursor.read_int(n)?;
                self.write(id, Value::Int(value));
            }
            SpecNode::Ascii { id, length } => {
                let n = self.eval_length(length)?;
                let text = self.cursor.read_ascii(n)?;
                self.write(id, Value::Text(text));
            }
            SpecNode::Bytes { id, length } => {
                let n = self.eval_length(length)?;
                let bytes = self.cursor.read_bytes(n)?;
                self.write(id, Value::Bytes(bytes));
            }
            SpecNode::BytesLenient { id, length } => {
                let n = self.eval_length(length)?;
                let offset = self.cursor.offset();
                let bytes = self.cursor.read_bytes_lenient(n);
                if bytes.len() < n {
                    self.report(Diagnostic::Truncated {
                        node: node.kind(),
                        requested: n,
                        available: bytes.len(),
                        offset,
                    });
                }
                self.write(id, Value::Bytes(bytes));
            }
            SpecNode::Skip { length } => {
                let n = self.eval_length(length)?;
                self.cursor.skip(n)?;
            }
            SpecNode::SkipIfOdd { reference } => {
                let n = self.eval(reference)?.to_f64()?;
                if n.trunc() % 2.0 != 0.0 {
                    self.cursor.skip_lenient(1);
                }
            }
            SpecNode::Bitfield { id, spec } => {
                let byte = self.cursor.read_u8()?;
                let fields = leaf::unpack_bitfield(byte, spec)?;
                let target = self.scopes.target_mut();
                if let Some(id) = id {
                    target.insert(id.as_str(), fields.iter().cloned().collect::<Record>());
                }
                for (field, value) in fields {
                    target.insert(field, value);
                }
            }
            SpecNode::EbmlVintId { id } => self.run_vint(id, true)?,
            SpecNode::EbmlVintSize { id } => self.run_vint(id, false)?,
            SpecNode::List {
                id,
                items,
                count,
                stop_when,
                read_until,
                emit_when,
            } => self.run_list(
                id,
                items,
                count.as_ref(),
                stop_when.as_ref().or(read_until.as_ref()),
                emit_when.as_ref(),
            )?,
            SpecNode::TemplateRef { id, params } => self.run_template(id, params)?,
            SpecNode::If {
                condition,
                spec,
                otherwise,
            } => {
                if self.eval(condition)?.is_truthy() {
                    self.run_block(spec)?;
                } else {
                    self.run_block(otherwise)?;
                }
            }
            SpecNode::Switch { on, cases, default } => {
                let key = self.eval(on)?.to_string();
                let branch = cases
                    .get(&key)
                    .or(default.as_ref())
                    .or_else(|| cases.get("default"));
                match branch {
                    Some(branch) => self.run_block(branch)?,
                    None => trace!("switch on '{}' matched no case", key),
                }
            }
            SpecNode::Bounded { id, length, spec } => self.run_bounded(id, length, spec)?,
            SpecNode::Align { to, basis } => self.run_align(to, basis)?,
            SpecNode::WithByteOrder { byte_order, spec } => {
                let saved = self.cursor.byte_order();
                self.cursor.set_byte_order(*byte_order);
                self.run_block(spec)?;
                self.cursor.set_byte_order(saved);
            }
            SpecNode::Assert { condition, message } => {
                if !self.eval(condition)?.is_truthy() {
                    return Err(Error::assertion_failed(message.as_str(), self.cursor.offset()));
                }
            }
            SpecNode::Let { id, expr } => {
                let value = self.eval(expr)?;
                self.write(id, value);
            }
            SpecNode::Set { id, expr } => {
                let value = self.eval(expr)?;
                self.scopes.assign(id, value);
            }
            SpecNode::SkipWs => {
                leaf::skip_whitespace(&mut self.cursor);
            }
            SpecNode::PeekBytes { id, length } => {
                let n = self.eval_length(length)?;
                let bytes = self.cursor.fork().read_bytes_lenient(n);
                self.write(id, Value::Bytes(bytes));
            }
            SpecNode::AsciiUntil {
                id,
                terminators,
                max_len,
            } => {
                let max_len = self.eval_max_len(max_len.as_ref())?;
                let n = leaf::scan_until_any(self.cursor.rest(), terminators, max_len);
                let text = self.cursor.read_ascii(n)?;
                self.write(id, Value::Text(text));
            }
            SpecNode::BytesUntilSeq { id, seq, max_len } => {
                let max_len = self.eval_max_len(max_len.as_ref())?;
                let n = leaf::scan_until_seq(self.cursor.rest(), seq, max_len);
                let bytes = self.cursor.read_bytes(n)?;
                self.write(id, Value::Bytes(bytes));
            }
            SpecNode::BytesUntilPrefixed {
                id,
                prefix,
                passthrough_values,
                passthrough_ranges,
            } => {
                let n = leaf::scan_prefixed(
                    self.cursor.rest(),
                    *prefix,
                    passthrough_values,
                    passthrough_ranges,
                );
                let bytes = self.cursor.read_bytes(n)?;
                self.write(id, Value::Bytes(bytes));
            }
        }
        Ok(())
    }

    fn run_vint(&mut self, id: &str, keep_marker: bool) -> Result<()> {
        let (value, length) = leaf::read_ebml_vint(&mut self.cursor, keep_marker)?;
        let mut vint = Record::new();
        vint.insert("value", value);
        vint.insert("length", length as i64);
        self.write(id, Value::Record(vint));
        Ok(())
    }

    fn run_list(
        &mut self,
        id: &str,
        items: &'a [SpecNode],
        count: Option<&ExprTerm>,
        stop_when: Option<&ExprTerm>,
        emit_when: Option<&ExprTerm>,
    ) -> Result<()> {
        let count = count.map(|term| self.eval_length(term)).transpose()?;
        trace!(
            "list '{}' at offset {} (count: {:?})",
            id,
            self.cursor.offset(),
            count
        );
        self.write(id, Value::List(Vec::new()));

        let mut index = 0;
        loop {
            match count {
                Some(count) if index >= count => break,
                None if stop_when.is_none() && self.at_region_end() => break,
                _ => {}
            }

            let start = self.cursor.offset();
            self.scopes.push(Scope::ListItem(Record::new()));
            self.run_block(items)?;
            let stop = match stop_when {
                Some(term) => self.eval(term)?.is_truthy(),
                None => false,
            };
            let emit = match emit_when {
                Some(term) => self.eval(term)?.is_truthy(),
                None => true,
            };
            let item = self.scopes.pop()?.into_record();
            if emit {
                self.scopes.target_mut().push_item(id, Value::Record(item));
            }
            index += 1;

            if stop {
                break;
            }
            if count.is_none() && self.cursor.offset() == start {
                self.report(Diagnostic::Stalled {
                    node: "list",
                    offset: start,
                });
                break;
            }
        }
        Ok(())
    }

    fn run_template(&mut self, name: &str, args: &'a TemplateArgs) -> Result<()> {
        let schema = self.schema;
        let template = schema.get_template(name)?;
        let frame = self.bind_params(name, template, args)?;
        trace!("template '{}' at offset {}", name, self.cursor.offset());

        self.scopes.push_params(frame);
        self.scopes.push(Scope::Template(Record::new()));
        self.run_block(&template.spec)?;
        let fields = self.scopes.pop()?.into_record();
        self.scopes.pop_params()?;

        self.scopes.target_mut().merge(fields);
        Ok(())
    }

    fn bind_params(&mut self, name: &str, template: &Template, args: &TemplateArgs) -> Result<Record> {
        let mut frame = Record::new();
        match args {
            TemplateArgs::Positional(args) => {
                if args.len() > template.params.len() {
                    return Err(Error::invalid_schema(format!(
                        "template '{}' takes {} params, got {}",
                        name,
                        template.params.len(),
                        args.len()
                    )));
                }
                for (param, arg) in template.params.iter().zip(args) {
                    let value = self.eval(arg)?.to_number()?;
                    frame.insert(param.as_str(), value);
                }
            }
            TemplateArgs::Named(args) => {
                for (param, arg) in args {
                    let value = self.eval(arg)?.to_number()?;
                    frame.insert(param.as_str(), value);
                }
            }
        }
        Ok(frame)
    }

    fn run_bounded(&mut self, id: &str, length: &ExprTerm, spec: &'a [SpecNode]) -> Result<()> {
        let length = self.eval_length(length)?;
        let start = self.cursor.offset();
        let end = start.saturating_add(length).min(self.cursor.len());
        trace!("bounded '{}' over {}..{}", id, start, end);

        self.write(id, Value::List(Vec::new()));
        self.regions.push(Region { start, end });

        while self.cursor.offset() < end {
            let before = self.cursor.offset();
            self.scopes.push(Scope::RegionItem(Record::new()));
            self.run_block(spec)?;
            let item = self.scopes.pop()?.into_record();
            self.scopes.target_mut().push_item(id, Value::Record(item));

            if self.cursor.offset() == before {
                self.report(Diagnostic::Stalled {
                    node: "bounded",
                    offset: before,
                });
                break;
            }
        }

        self.regions.pop();
        let offset = self.cursor.offset();
        if offset > end {
            self.report(Diagnostic::RegionOverrun { start, end, offset });
        }
        self.cursor.seek(end);
        Ok(())
    }

    fn run_align(&mut self, to: &ExprTerm, basis: &AlignBasis) -> Result<()> {
        let to = self.eval_length(to)?;
        if to == 0 {
            return Err(Error::invalid_schema("align to 0 bytes"));
        }
        let base = match basis {
            AlignBasis::Scope => self.regions.last().map_or(0, |region| region.start),
            AlignBasis::Global => 0,
            AlignBasis::Expr(term) => self.eval_length(term)?,
        };

        let offset = self.cursor.offset();
        let aligned = if offset <= base {
            base
        } else {
            base + (offset - base).div_ceil(to) * to
        };
        self.cursor.skip_lenient(aligned - offset);
        Ok(())
    }

    fn at_region_end(&self) -> bool {
        let end = self
            .regions
            .last()
            .map_or(self.cursor.len(), |region| region.end);
        self.cursor.offset() >= end
    }

    fn write(&mut self, id: &str, value: Value) {
        self.scopes.target_mut().insert(id, value);
    }

    fn eval(&mut self, term: &ExprTerm) -> Result<Value> {
        let mut env = Env {
            resolver: &self.scopes,
            functions: self.functions,
            sink: &mut *self.sink,
            strict_functions: self.config.strict_functions,
            offset: self.cursor.offset(),
        };
        evaluate(term, &mut env)
    }

    fn eval_length(&mut self, term: &ExprTerm) -> Result<usize> {
        self.eval(term)?.to_length()
    }

    fn eval_max_len(&mut self, term: Option<&ExprTerm>) -> Result<Option<usize>> {
        term.map(|term| self.eval_length(term)).transpose()
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
        self.sink.report(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema(spec: serde_json::Value) -> Schema {
        serde_json::from_value(spec).unwrap()
    }

    fn decode_json(spec: serde_json::Value, data: &[u8]) -> serde_json::Value {
        let record = decode(data, &schema(spec)).unwrap();
        serde_json::to_value(&record).unwrap()
    }

    #[test]
    fn test_decoder_config_builder() {
        let config = DecoderConfig::new()
            .max_depth(32)
            .strict_functions(true)
            .byte_order(ByteOrder::Big);

        assert_eq!(config.max_depth, 32);
        assert!(config.strict_functions);
        assert_eq!(config.byte_order, Some(ByteOrder::Big));
    }

    #[test]
    fn test_decoder_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Decoder>();
        assert_send_sync::<Schema>();
    }

    #[test]
    fn test_fixed_reads() {
        let spec = json!({ "spec": [
            { "type": "ascii", "id": "magic", "length": 3 },
            { "type": "uint", "id": "width", "length": 2 },
            { "type": "int", "id": "delta", "length": 1 },
            { "type": "skip", "length": 1 },
            { "type": "bytes", "id": "tail", "length": 2 }
        ]});
        let record = decode_json(spec, b"GIF\x40\x01\xFF\x00\xAA\xBB");
        assert_eq!(
            record,
            json!({ "magic": "GIF", "width": 320, "delta": -1, "tail": [0xAA, 0xBB] })
        );
    }

    #[test]
    fn test_empty_schema_and_buffer() {
        assert_eq!(decode_json(json!({ "spec": [] }), &[]), json!({}));
    }

    #[test]
    fn test_bitfield_nested_and_promoted() {
        let spec = json!({ "spec": [
            { "type": "bitfield", "id": "flags", "spec": [
                { "id": "a", "bits": 3 },
                { "id": "b", "type": "boolean", "bits": 1 },
                { "id": "c", "bits": 4 }
            ]}
        ]});
        let record = decode_json(spec, &[0b1011_0011]);
        assert_eq!(
            record,
            json!({ "flags": { "a": 5, "b": true, "c": 3 }, "a": 5, "b": true, "c": 3 })
        );
    }

    #[test]
    fn test_ebml_vints() {
        let spec = json!({ "spec": [
            { "type": "ebml_vint_id", "id": "element" },
            { "type": "ebml_vint_size", "id": "size" }
        ]});
        let record = decode_json(spec, &[0x1A, 0x45, 0xDF, 0xA3, 0x40, 0x01]);
        assert_eq!(
            record,
            json!({
                "element": { "value": 0x1A45_DFA3_u32, "length": 4 },
                "size": { "value": 1, "length": 2 }
            })
        );
    }

    #[test]
    fn test_bounded_clamps_overrun() {
        let spec = schema(json!({ "spec": [
            { "type": "bounded", "id": "region", "length": 4, "spec": [
                { "type": "bytes", "id": "wide", "length": 6 }
            ]},
            { "type": "uint", "id": "after", "length": 1 }
        ]}));
        let mut sink = CollectingSink::default();
        let record = Decoder::new()
            .decode_with_sink(&[1, 2, 3, 4, 5, 6, 7], &spec, &mut sink)
            .unwrap();

        assert_eq!(record.get("after"), Some(&Value::Int(5)));
        assert_eq!(
            sink.diagnostics,
            vec![Diagnostic::RegionOverrun {
                start: 0,
                end: 4,
                offset: 6
            }]
        );
    }

    #[test]
    fn test_bounded_skips_unconsumed_tail() {
        let spec = json!({ "spec": [
            { "type": "uint", "id": "size", "length": 1 },
            { "type": "let", "id": "done", "expr": false },
            { "type": "bounded", "id": "chunks", "length": "size", "spec": [
                { "type": "if", "condition": ["done", "eq", false], "spec": [
                    { "type": "uint", "id": "tag", "length": 1 },
                    { "type": "set", "id": "done", "expr": true }
                ]}
            ]},
            { "type": "uint", "id": "after", "length": 1 }
        ]});
        let record = decode_json(spec, &[4, 0xA1, 0xEE, 0xEE, 0xEE, 9]);
        assert_eq!(
            record,
            json!({
                "size": 4,
                "done": true,
                "chunks": [{ "tag": 0xA1 }, {}],
                "after": 9
            })
        );
    }

    #[test]
    fn test_bounded_stops_without_progress() {
        let spec = schema(json!({ "spec": [
            { "type": "bounded", "id": "region", "length": 3, "spec": [
                { "type": "let", "id": "seen", "expr": true }
            ]}
        ]}));
        let mut sink = CollectingSink::default();
        let record = Decoder::new()
            .decode_with_sink(&[1, 2, 3], &spec, &mut sink)
            .unwrap();

        assert_eq!(record.get("region").and_then(Value::len), Some(1));
        assert_eq!(
            sink.diagnostics,
            vec![Diagnostic::Stalled {
                node: "bounded",
                offset: 0
            }]
        );
    }

    #[test]
    fn test_align_relative_to_region() {
        let data: Vec<u8> = (0..20).collect();
        let spec = json!({ "spec": [
            { "type": "skip", "length": 10 },
            { "type": "bounded", "id": "region", "length": 5, "spec": [
                { "type": "uint", "id": "a", "length": 1 },
                { "type": "align", "to": 4 },
                { "type": "uint", "id": "b", "length": 1 }
            ]},
            { "type": "align", "to": 8, "basis": "global" },
            { "type": "uint", "id": "c", "length": 1 }
        ]});
        let record = decode_json(spec, &data);
        assert_eq!(
            record,
            json!({ "region": [{ "a": 10, "b": 14 }], "c": 16 })
        );
    }

    #[test]
    fn test_align_to_expression_basis() {
        let data: Vec<u8> = (0..8).collect();
        let spec = json!({ "spec": [
            { "type": "uint", "id": "a", "length": 1 },
            { "type": "uint", "id": "b", "length": 1 },
            { "type": "align", "to": 4, "basis": "b" },
            { "type": "uint", "id": "c", "length": 1 }
        ]});
        assert_eq!(decode_json(spec, &data), json!({ "a": 0, "b": 1, "c": 5 }));
    }

    #[test]
    fn test_align_zero_is_rejected() {
        let spec = schema(json!({ "spec": [ { "type": "align", "to": 0 } ] }));
        assert!(matches!(decode(&[0], &spec), Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn test_list_stop_when_is_inclusive() {
        let spec = json!({ "spec": [
            { "type": "list", "id": "values", "stop_when": ["value", "eq", 0], "items": [
                { "type": "uint", "id": "value", "length": 1 }
            ]},
            { "type": "uint", "id": "next", "length": 1 }
        ]});
        let record = decode_json(spec, &[3, 2, 0, 9]);
        assert_eq!(
            record,
            json!({ "values": [{ "value": 3 }, { "value": 2 }, { "value": 0 }], "next": 9 })
        );
    }

    #[test]
    fn test_list_read_until_and_emit_when() {
        let spec = json!({ "spec": [
            { "type": "list", "id": "entries",
              "read_until": ["$.kind", "eq", 0],
              "emit_when": ["$.kind", "ne", 0],
              "items": [ { "type": "uint", "id": "kind", "length": 1 } ] }
        ]});
        let record = decode_json(spec, &[1, 2, 0, 7]);
        assert_eq!(record, json!({ "entries": [{ "kind": 1 }, { "kind": 2 }] }));
    }

    #[test]
    fn test_list_count_and_scope_lookup() {
        let spec = json!({ "spec": [
            { "type": "uint", "id": "count", "length": 1 },
            { "type": "list", "id": "items", "count": "count", "items": [
                { "type": "uint", "id": "value", "length": 1 },
                { "type": "let", "id": "scaled", "expr": ["value", "*", "count"] },
                { "type": "let", "id": "local", "expr": "$.count" },
                { "type": "let", "id": "seen", "expr": "items.length" }
            ]}
        ]});
        let record = decode_json(spec, &[2, 5, 6]);
        assert_eq!(
            record,
            json!({
                "count": 2,
                "items": [
                    { "value": 5, "scaled": 10, "local": null, "seen": 0 },
                    { "value": 6, "scaled": 12, "local": null, "seen": 1 }
                ]
            })
        );
    }

    #[test]
    fn test_list_without_bound_reads_to_end() {
        let spec = json!({ "spec": [
            { "type": "list", "id": "bytes", "items": [
                { "type": "uint", "id": "b", "length": 1 }
            ]}
        ]});
        let record = decode_json(spec, &[1, 2, 3]);
        assert_eq!(record, json!({ "bytes": [{ "b": 1 }, { "b": 2 }, { "b": 3 }] }));
    }

    #[test]
    fn test_switch_uses_decimal_form() {
        let spec = json!({ "spec": [
            { "type": "uint", "id": "tag", "length": 1 },
            { "type": "switch", "on": "tag",
              "cases": { "33": [ { "type": "let", "id": "branch", "expr": { "text": "extension" } } ] },
              "default": [ { "type": "let", "id": "branch", "expr": { "text": "other" } } ] }
        ]});
        assert_eq!(
            decode_json(spec.clone(), &[0x21]),
            json!({ "tag": 33, "branch": "extension" })
        );
        assert_eq!(decode_json(spec, &[0x2C]), json!({ "tag": 44, "branch": "other" }));
    }

    #[test]
    fn test_switch_default_key_and_no_match() {
        let spec = json!({ "spec": [
            { "type": "uint", "id": "tag", "length": 1 },
            { "type": "switch", "on": "tag", "cases": {
                "1": [ { "type": "let", "id": "one", "expr": true } ],
                "default": [ { "type": "let", "id": "fallback", "expr": true } ]
            }},
            { "type": "switch", "on": "tag", "cases": {} }
        ]});
        assert_eq!(decode_json(spec, &[7]), json!({ "tag": 7, "fallback": true }));
    }

    #[test]
    fn test_if_else() {
        let spec = json!({ "spec": [
            { "type": "uint", "id": "flag", "length": 1 },
            { "type": "if", "condition": ["flag", "gt", 0],
              "spec": [ { "type": "uint", "id": "extra", "length": 1 } ],
              "else": [ { "type": "let", "id": "extra", "expr": 0 } ] }
        ]});
        assert_eq!(decode_json(spec.clone(), &[1, 9]), json!({ "flag": 1, "extra": 9 }));
        assert_eq!(decode_json(spec, &[0]), json!({ "flag": 0, "extra": 0 }));
    }

    #[test]
    fn test_template_fields_overwrite_caller() {
        let spec = json!({
            "templates": {
                "header": { "spec": [ { "type": "let", "id": "length", "expr": 99 } ] }
            },
            "spec": [
                { "type": "let", "id": "length", "expr": 5 },
                { "type": "template_ref", "id": "header" }
            ]
        });
        assert_eq!(decode_json(spec, &[]), json!({ "length": 99 }));
    }

    #[test]
    fn test_template_params() {
        let spec = json!({
            "templates": {
                "chunk": { "params": ["size", "label"], "spec": [
                    { "type": "bytes", "id": "data", "length": "size" },
                    { "type": "let", "id": "label", "expr": "label" }
                ]}
            },
            "spec": [
                { "type": "uint", "id": "len", "length": 1 },
                { "type": "template_ref", "id": "chunk", "params": [["len", "-", 1], 7] },
                { "type": "template_ref", "id": "chunk", "params": { "size": 1, "label": { "text": "0x10" } } }
            ]
        });
        let record = decode_json(spec, &[3, 0xAA, 0xBB, 0xCC]);
        assert_eq!(record, json!({ "len": 3, "data": [0xCC], "label": 16 }));
    }

    #[test]
    fn test_template_params_must_be_numeric() {
        let spec = schema(json!({
            "templates": {
                "t": { "params": ["magic"], "spec": [ { "type": "let", "id": "got", "expr": "magic" } ] }
            },
            "spec": [ { "type": "template_ref", "id": "t", "params": [{ "text": "GIF" }] } ]
        }));
        assert!(matches!(decode(&[], &spec), Err(Error::Coercion { .. })));

        let unbound = schema(json!({
            "templates": { "t": { "params": ["n"], "spec": [] } },
            "spec": [ { "type": "template_ref", "id": "t", "params": ["missing"] } ]
        }));
        assert!(matches!(decode(&[], &unbound), Err(Error::Coercion { .. })));
    }

    #[test]
    fn test_template_sees_caller_fields() {
        let spec = json!({
            "templates": {
                "entry": { "spec": [ { "type": "bytes", "id": "payload", "length": "size" } ] }
            },
            "spec": [
                { "type": "list", "id": "entries", "count": 2, "items": [
                    { "type": "uint", "id": "size", "length": 1 },
                    { "type": "template_ref", "id": "entry" }
                ]}
            ]
        });
        let record = decode_json(spec, &[1, 0xAA, 2, 0xBB, 0xCC]);
        assert_eq!(
            record,
            json!({ "entries": [
                { "size": 1, "payload": [0xAA] },
                { "size": 2, "payload": [0xBB, 0xCC] }
            ]})
        );
    }

    #[test]
    fn test_template_errors() {
        let unknown = schema(json!({ "spec": [ { "type": "template_ref", "id": "nope" } ] }));
        assert!(matches!(
            decode(&[], &unknown),
            Err(Error::UnknownTemplate { .. })
        ));

        let extra_args = schema(json!({
            "templates": { "t": { "spec": [] } },
            "spec": [ { "type": "template_ref", "id": "t", "params": [1] } ]
        }));
        assert!(matches!(decode(&[], &extra_args), Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn test_max_depth_stops_recursion() {
        let spec = schema(json!({
            "templates": { "loop": { "spec": [ { "type": "template_ref", "id": "loop" } ] } },
            "spec": [ { "type": "template_ref", "id": "loop" } ]
        }));
        let decoder = Decoder::with_config(DecoderConfig::new().max_depth(16));
        assert!(matches!(
            decoder.decode(&[], &spec),
            Err(Error::DepthExceeded { limit: 16 })
        ));
    }

    #[test]
    fn test_with_byte_order_restores() {
        let spec = json!({ "spec": [
            { "type": "with_byte_order", "byte_order": "big", "spec": [
                { "type": "uint", "id": "a", "length": 2 }
            ]},
            { "type": "uint", "id": "b", "length": 2 }
        ]});
        assert_eq!(
            decode_json(spec, &[1, 2, 3, 4]),
            json!({ "a": 0x0102, "b": 0x0403 })
        );
    }

    #[test]
    fn test_byte_order_override() {
        let spec = schema(json!({ "spec": [ { "type": "uint", "id": "a", "length": 2 } ] }));
        let decoder = Decoder::with_config(DecoderConfig::new().byte_order(ByteOrder::Big));
        let record = decoder.decode(&[1, 2], &spec).unwrap();
        assert_eq!(record.get("a"), Some(&Value::Int(0x0102)));
    }

    #[test]
    fn test_skip_if_odd() {
        let spec = json!({ "spec": [
            { "type": "uint", "id": "size", "length": 1 },
            { "type": "bytes", "id": "data", "length": "size" },
            { "type": "skip_if_odd", "ref": "size" },
            { "type": "uint", "id": "next", "length": 1 }
        ]});
        assert_eq!(
            decode_json(spec.clone(), &[3, 1, 2, 3, 0, 9]),
            json!({ "size": 3, "data": [1, 2, 3], "next": 9 })
        );
        assert_eq!(
            decode_json(spec, &[2, 1, 2, 9]),
            json!({ "size": 2, "data": [1, 2], "next": 9 })
        );
    }

    #[test]
    fn test_set_updates_outer_binding() {
        let spec = json!({ "spec": [
            { "type": "let", "id": "total", "expr": 0 },
            { "type": "list", "id": "parts", "count": 2, "items": [
                { "type": "uint", "id": "v", "length": 1 },
                { "type": "set", "id": "total", "expr": ["total", "+", "v"] }
            ]}
        ]});
        assert_eq!(
            decode_json(spec, &[3, 4]),
            json!({ "total": 7, "parts": [{ "v": 3 }, { "v": 4 }] })
        );
    }

    #[test]
    fn test_peek_and_lenient_reads() {
        let spec = schema(json!({ "spec": [
            { "type": "peek_bytes", "id": "magic", "length": 4 },
            { "type": "uint", "id": "first", "length": 1 },
            { "type": "bytes_lenient", "id": "rest", "length": 8 }
        ]}));
        let mut sink = CollectingSink::default();
        let record = Decoder::new()
            .decode_with_sink(&[7, 8], &spec, &mut sink)
            .unwrap();

        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({ "magic": [7, 8], "first": 7, "rest": [8] })
        );
        assert_eq!(
            sink.diagnostics,
            vec![Diagnostic::Truncated {
                node: "bytes_lenient",
                requested: 8,
                available: 1,
                offset: 1
            }]
        );
    }

    #[test]
    fn test_pdf_token_nodes() {
        let spec = json!({ "spec": [
            { "type": "skip_ws" },
            { "type": "ascii_until", "id": "name", "terminators": [47, 32] },
            { "type": "skip", "length": 1 },
            { "type": "bytes_until_seq", "id": "stream", "seq": [101, 110, 100] },
            { "type": "ascii", "id": "keyword", "length": 3 }
        ]});
        assert_eq!(
            decode_json(spec, b" \r\nName/abcend"),
            json!({ "name": "Name", "stream": [97, 98, 99], "keyword": "end" })
        );
    }

    #[test]
    fn test_bytes_until_prefixed_leaves_marker() {
        let spec = json!({
            "byte_order": "big",
            "spec": [
                { "type": "bytes_until_prefixed", "id": "scan", "prefix": 255, "passthrough_values": [0] },
                { "type": "uint", "id": "marker", "length": 2 }
            ]
        });
        assert_eq!(
            decode_json(spec, &[0x41, 0xFF, 0x00, 0x42, 0xFF, 0xD9]),
            json!({ "scan": [0x41, 0xFF, 0x00, 0x42], "marker": 0xFFD9 })
        );
    }

    #[test]
    fn test_fatal_errors_abort() {
        let short = schema(json!({ "spec": [
            { "type": "uint", "id": "a", "length": 1 },
            { "type": "uint", "id": "b", "length": 4 }
        ]}));
        let err = decode(&[1, 2], &short).unwrap_err();
        assert!(err.is_data_error());
        assert!(matches!(err, Error::UnexpectedEof { offset: 1, requested: 4, available: 1 }));

        let failing = schema(json!({ "spec": [
            { "type": "ascii", "id": "magic", "length": 2 },
            { "type": "assert", "condition": ["magic", "eq", { "text": "PK" }], "message": "not a zip" }
        ]}));
        assert!(decode(b"PK", &failing).is_ok());
        let err = decode(b"MZ", &failing).unwrap_err();
        assert!(matches!(err, Error::AssertionFailed { offset: 2, .. }));
    }

    #[test]
    fn test_unknown_functions() {
        let spec = schema(json!({ "spec": [
            { "type": "let", "id": "x", "expr": { "call": ["gif::missing", 1] } }
        ]}));

        let mut sink = CollectingSink::default();
        let record = Decoder::new().decode_with_sink(&[], &spec, &mut sink).unwrap();
        assert_eq!(record.get("x"), Some(&Value::Undefined));
        assert_eq!(sink.len(), 1);

        let strict = Decoder::with_config(DecoderConfig::new().strict_functions(true));
        assert!(matches!(
            strict.decode(&[], &spec),
            Err(Error::UnknownFunction { .. })
        ));
    }

    #[test]
    fn test_registered_function() {
        let spec = schema(json!({ "spec": [
            { "type": "uint", "id": "raw", "length": 1 },
            { "type": "let", "id": "hex", "expr": { "call": ["fmt::hex", "raw"] } }
        ]}));
        let mut decoder = Decoder::new();
        decoder
            .functions_mut()
            .register("fmt::hex", |args: &[Value]| -> Result<Value> {
                Ok(Value::Text(format!("{:#04x}", args[0].to_f64()? as i64)))
            });

        let record = decoder.decode(&[0x2A], &spec).unwrap();
        assert_eq!(record.get("hex"), Some(&Value::from("0x2a")));
    }

    #[test]
    fn test_decode_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), [0x34, 0x12]).unwrap();
        let spec = schema(json!({ "spec": [ { "type": "uint", "id": "v", "length": 2 } ] }));

        let record = decode_file(file.path(), &spec).unwrap();
        assert_eq!(record.get("v"), Some(&Value::Int(0x1234)));
        assert!(matches!(
            decode_file("/nonexistent/input.bin", &spec),
            Err(Error::FileRead { .. })
        ));
    }
}
