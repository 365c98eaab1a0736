//! # binspec-core
//!
//! A declarative binary-schema interpreter.
//!
//! Binary formats are described as data, not code: a [`Schema`] lists typed
//! nodes (integers, bitfields, EBML vints, bounded regions, lists, templates,
//! conditionals, delimiter scans) and a [`Decoder`] walks it over a byte
//! buffer to produce a [`Record`] tree.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`schema`]: Schema data model and JSON loading
//! - [`expr`]: Expression language used for lengths, counts and conditions
//! - [`decoder`]: The interpreter and its byte cursor
//! - [`value`]: Decoded values and records
//! - [`functions`]: Functions callable from expressions
//! - [`diagnostics`]: Soft-failure reporting
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```
//! use binspec_core::{decode, Schema, Value};
//!
//! let schema = Schema::from_json(r#"{
//!     "spec": [
//!         { "type": "ascii", "id": "signature", "length": 6 },
//!         { "type": "uint", "id": "width", "length": 2 },
//!         { "type": "uint", "id": "height", "length": 2 },
//!         { "type": "bitfield", "id": "packed", "spec": [
//!             { "id": "global_color_table", "type": "boolean", "bits": 1 },
//!             { "id": "color_resolution", "bits": 3 },
//!             { "id": "sorted", "type": "boolean", "bits": 1 },
//!             { "id": "table_size", "bits": 3 }
//!         ]}
//!     ]
//! }"#)?;
//!
//! let record = decode(b"GIF89a\x0a\x00\x14\x00\xf7", &schema)?;
//! assert_eq!(record.get("signature"), Some(&Value::from("GIF89a")));
//! assert_eq!(record.get("height"), Some(&Value::Int(20)));
//! assert_eq!(record.get("table_size"), Some(&Value::Int(7)));
//! # Ok::<(), binspec_core::Error>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`FunctionRegistry`]: Register format-specific functions for `call` expressions
//! - [`DiagnosticSink`]: Observe soft failures such as truncated lenient reads

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod decoder;
pub mod diagnostics;
pub mod error;
pub mod expr;
pub mod functions;
pub mod schema;
pub mod value;

// Re-export primary types for convenience
pub use decoder::{decode, decode_file, Cursor, Decoder, DecoderConfig};
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticSink, NullSink};
pub use error::{Error, Result};
pub use expr::{ExprTerm, Operator};
pub use functions::{Function, FunctionRegistry};
pub use schema::{AlignBasis, BitFieldEntry, BitKind, ByteOrder, Schema, SpecNode, Template, TemplateArgs};
pub use value::{Record, Value};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
