//! Schema data model.
//!
//! A [`Schema`] is pure data: a default byte order, named [`Template`]s and a
//! top-level list of [`SpecNode`]s. Schemas are loaded from JSON, with every
//! node tagged by its `"type"`:
//!
//! ```
//! use binspec_core::Schema;
//!
//! let schema: Schema = r#"{
//!     "byte_order": "little",
//!     "spec": [
//!         { "type": "ascii", "id": "signature", "length": 3 },
//!         { "type": "uint", "id": "width", "length": 2 }
//!     ]
//! }"#.parse()?;
//! assert_eq!(schema.spec.len(), 2);
//! # Ok::<(), binspec_core::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::expr::ExprTerm;
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

/// Order of bytes within multi-byte integers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Least significant byte first
    #[default]
    #[serde(alias = "le")]
    Little,
    /// Most significant byte first
    #[serde(alias = "be")]
    Big,
}

/// A complete format description
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Schema {
    /// Byte order in effect at the start of a decode
    #[serde(default, alias = "byteOrder")]
    pub byte_order: ByteOrder,
    /// Named sub-schemas invoked through `template_ref`
    #[serde(default)]
    pub templates: HashMap<String, Template>,
    /// Top-level nodes, interpreted in order
    pub spec: Vec<SpecNode>,
}

/// A named, parameterized sub-schema
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Template {
    /// Parameter names bound positionally by `template_ref`
    #[serde(default)]
    pub params: Vec<String>,
    /// Template body
    pub spec: Vec<SpecNode>,
}

/// Kind of a bitfield entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitKind {
    /// Unsigned integer of the declared width
    #[default]
    Uint,
    /// Flag: true when any of its bits is set
    Boolean,
}

/// One sub-field of a `bitfield` byte
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BitFieldEntry {
    /// Field name; entries without one are padding
    #[serde(default)]
    pub id: Option<String>,
    /// How the bits are interpreted
    #[serde(default, rename = "type")]
    pub kind: BitKind,
    /// Width in bits
    pub bits: u8,
}

/// Base offset that `align` pads relative to
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub enum AlignBasis {
    /// Start of the innermost bounded region (0 outside any region)
    #[default]
    Scope,
    /// Start of the buffer
    Global,
    /// Computed base offset
    Expr(ExprTerm),
}

impl TryFrom<serde_json::Value> for AlignBasis {
    type Error = Error;

    fn try_from(json: serde_json::Value) -> Result<Self> {
        match json.as_str() {
            Some("scope") => Ok(AlignBasis::Scope),
            Some("global") => Ok(AlignBasis::Global),
            _ => ExprTerm::try_from(json).map(AlignBasis::Expr),
        }
    }
}

/// Arguments of a `template_ref`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TemplateArgs {
    /// Bound to the template's `params` in order
    Positional(Vec<ExprTerm>),
    /// Bound by parameter name
    Named(IndexMap<String, ExprTerm>),
}

impl Default for TemplateArgs {
    fn default() -> Self {
        TemplateArgs::Positional(Vec::new())
    }
}

/// A structural schema node
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpecNode {
    /// Unsigned integer of `length` bytes
    Uint {
        /// Field name
        id: String,
        /// Width in bytes (1..=8)
        length: ExprTerm,
    },
    /// Two's-complement signed integer of `length` bytes
    Int {
        /// Field name
        id: String,
        /// Width in bytes (1..=8)
        length: ExprTerm,
    },
    /// Latin-1 text of `length` bytes
    Ascii {
        /// Field name
        id: String,
        /// Length in bytes
        length: ExprTerm,
    },
    /// Raw bytes
    Bytes {
        /// Field name
        id: String,
        /// Length in bytes
        length: ExprTerm,
    },
    /// Raw bytes, clamped to what remains
    BytesLenient {
        /// Field name
        id: String,
        /// Requested length in bytes
        length: ExprTerm,
    },
    /// Advances the cursor
    Skip {
        /// Bytes to skip
        length: ExprTerm,
    },
    /// Skips one pad byte when the referenced value is odd
    SkipIfOdd {
        /// Value whose parity decides
        #[serde(rename = "ref")]
        reference: ExprTerm,
    },
    /// One byte unpacked MSB-first into sub-fields
    Bitfield {
        /// Optional name for a nested record of the sub-fields
        #[serde(default)]
        id: Option<String>,
        /// Sub-fields, most significant first
        spec: Vec<BitFieldEntry>,
    },
    /// EBML element id (length marker kept)
    EbmlVintId {
        /// Field name
        id: String,
    },
    /// EBML data size (length marker masked)
    EbmlVintSize {
        /// Field name
        id: String,
    },
    /// Repeated item records
    List {
        /// Field name of the resulting list
        id: String,
        /// Nodes interpreted into each item
        items: Vec<SpecNode>,
        /// Fixed repeat count
        #[serde(default)]
        count: Option<ExprTerm>,
        /// Stop after the first item for which this is true
        #[serde(default)]
        stop_when: Option<ExprTerm>,
        /// Alias of `stop_when`
        #[serde(default)]
        read_until: Option<ExprTerm>,
        /// Keep only items for which this is true
        #[serde(default)]
        emit_when: Option<ExprTerm>,
    },
    /// Invokes a named template
    TemplateRef {
        /// Template name
        id: String,
        /// Template arguments
        #[serde(default)]
        params: TemplateArgs,
    },
    /// Conditional block
    If {
        /// Branch selector
        condition: ExprTerm,
        /// Nodes run when the condition holds
        spec: Vec<SpecNode>,
        /// Nodes run otherwise
        #[serde(default, rename = "else")]
        otherwise: Vec<SpecNode>,
    },
    /// Multi-way branch on a value's string form
    Switch {
        /// Selector
        on: ExprTerm,
        /// Branches keyed by string form
        cases: HashMap<String, Vec<SpecNode>>,
        /// Branch used when no key matches
        #[serde(default)]
        default: Option<Vec<SpecNode>>,
    },
    /// Repeated item records confined to a byte window
    Bounded {
        /// Field name of the resulting list
        id: String,
        /// Window length in bytes
        #[serde(alias = "length_expr")]
        length: ExprTerm,
        /// Nodes interpreted into each item
        spec: Vec<SpecNode>,
    },
    /// Pads the cursor to a multiple of `to`
    Align {
        /// Alignment in bytes
        to: ExprTerm,
        /// Offset the alignment is measured from
        #[serde(default)]
        basis: AlignBasis,
    },
    /// Runs a block under a different byte order
    WithByteOrder {
        /// Byte order inside the block
        #[serde(alias = "byteOrder")]
        byte_order: ByteOrder,
        /// Nodes to run
        spec: Vec<SpecNode>,
    },
    /// Aborts the decode when the condition is false
    Assert {
        /// Condition that must hold
        condition: ExprTerm,
        /// Error message
        message: String,
    },
    /// Computed field on the current record
    Let {
        /// Field name
        id: String,
        /// Value
        #[serde(alias = "value")]
        expr: ExprTerm,
    },
    /// Overwrites the innermost existing binding
    Set {
        /// Field name
        id: String,
        /// Value
        #[serde(alias = "value")]
        expr: ExprTerm,
    },
    /// Skips PDF whitespace
    SkipWs,
    /// Reads bytes without consuming them
    PeekBytes {
        /// Field name
        id: String,
        /// Requested length in bytes
        length: ExprTerm,
    },
    /// Latin-1 text up to a terminator byte
    AsciiUntil {
        /// Field name
        id: String,
        /// Bytes that end the run (not consumed)
        terminators: Vec<u8>,
        /// Maximum run length
        #[serde(default)]
        max_len: Option<ExprTerm>,
    },
    /// Bytes up to a byte sequence
    BytesUntilSeq {
        /// Field name
        id: String,
        /// Sequence that ends the run (not consumed)
        seq: Vec<u8>,
        /// Maximum run length
        #[serde(default)]
        max_len: Option<ExprTerm>,
    },
    /// Bytes up to an unescaped marker
    BytesUntilPrefixed {
        /// Field name
        id: String,
        /// Marker prefix byte
        prefix: u8,
        /// Bytes that, after the prefix, form an escape
        #[serde(default)]
        passthrough_values: Vec<u8>,
        /// Inclusive ranges of bytes that, after the prefix, form an escape
        #[serde(default)]
        passthrough_ranges: Vec<(u8, u8)>,
    },
}

impl SpecNode {
    /// The node's `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            SpecNode::Uint { .. } => "uint",
            SpecNode::Int { .. } => "int",
            SpecNode::Ascii { .. } => "ascii",
            SpecNode::Bytes { .. } => "bytes",
            SpecNode::BytesLenient { .. } => "bytes_lenient",
            SpecNode::Skip { .. } => "skip",
            SpecNode::SkipIfOdd { .. } => "skip_if_odd",
            SpecNode::Bitfield { .. } => "bitfield",
            SpecNode::EbmlVintId { .. } => "ebml_vint_id",
            SpecNode::EbmlVintSize { .. } => "ebml_vint_size",
            SpecNode::List { .. } => "list",
            SpecNode::TemplateRef { .. } => "template_ref",
            SpecNode::If { .. } => "if",
            SpecNode::Switch { .. } => "switch",
            SpecNode::Bounded { .. } => "bounded",
            SpecNode::Align { .. } => "align",
            SpecNode::WithByteOrder { .. } => "with_byte_order",
            SpecNode::Assert { .. } => "assert",
            SpecNode::Let { .. } => "let",
            SpecNode::Set { .. } => "set",
            SpecNode::SkipWs => "skip_ws",
            SpecNode::PeekBytes { .. } => "peek_bytes",
            SpecNode::AsciiUntil { .. } => "ascii_until",
            SpecNode::BytesUntilSeq { .. } => "bytes_until_seq",
            SpecNode::BytesUntilPrefixed { .. } => "bytes_until_prefixed",
        }
    }
}

impl Schema {
    /// Creates a schema from top-level nodes
    pub fn new(spec: Vec<SpecNode>) -> Self {
        Self {
            spec,
            ..Self::default()
        }
    }

    /// Sets the initial byte order
    pub fn byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// Adds a named template
    pub fn template(mut self, name: impl Into<String>, template: Template) -> Self {
        self.templates.insert(name.into(), template);
        self
    }

    /// Parses a schema from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON schema file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        Self::from_json(&text)
    }

    /// Looks up a template by name
    pub fn get_template(&self, name: &str) -> Result<&Template> {
        self.templates
            .get(name)
            .ok_or_else(|| Error::unknown_template(name))
    }
}

impl FromStr for Schema {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_json(s)
    }
}
