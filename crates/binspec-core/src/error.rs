//! Error types for the binspec-core library.
//!
//! Every failure that aborts a decode is a variant of [`Error`]. Lenient
//! nodes never produce errors for lack of input; they report through
//! [`crate::diagnostics`] instead.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for binspec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all binspec operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read a schema or input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Schema JSON did not match the schema data model
    #[error("failed to parse schema: {0}")]
    SchemaParse(#[from] serde_json::Error),

    /// Schema is well-formed JSON but semantically unusable
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// A fixed-size read ran past the end of the buffer
    #[error("unexpected end of input at offset {offset}: need {requested} bytes, have {available}")]
    UnexpectedEof {
        /// Byte offset where the read started
        offset: usize,
        /// Number of bytes the node asked for
        requested: usize,
        /// Number of bytes left in the buffer
        available: usize,
    },

    /// First byte of an EBML variable-length integer carries no length marker
    #[error("invalid EBML vint at offset {offset}: first byte 0x{byte:02x} has no length marker")]
    InvalidVint {
        /// Byte offset of the vint
        offset: usize,
        /// The offending first byte
        byte: u8,
    },

    /// `template_ref` named a template the schema does not define
    #[error("unknown template '{name}'")]
    UnknownTemplate {
        /// The missing template name
        name: String,
    },

    /// `call` named an unregistered function while strict mode is on
    #[error("unknown function '{name}'")]
    UnknownFunction {
        /// The missing function name
        name: String,
    },

    /// An `assert` node evaluated to false
    #[error("assertion failed at offset {offset}: {message}")]
    AssertionFailed {
        /// Schema-supplied message
        message: String,
        /// Cursor offset when the assertion ran
        offset: usize,
    },

    /// A value could not be coerced to the type a node needed
    #[error("cannot coerce {value} to {expected}")]
    Coercion {
        /// Rendering of the offending value
        value: String,
        /// Name of the target type
        expected: &'static str,
    },

    /// A length or count evaluated to a negative or non-finite number
    #[error("invalid length {value}")]
    InvalidLength {
        /// The offending number
        value: f64,
    },

    /// A match expression found no case equal to its condition
    #[error("no match case for value {value}")]
    NoMatch {
        /// Rendering of the unmatched value
        value: String,
    },

    /// Malformed expression or unsupported operation
    #[error("expression error: {0}")]
    Eval(String),

    /// A registered function reported a failure
    #[error("function '{name}' failed: {message}")]
    Function {
        /// Function name
        name: String,
        /// Failure description
        message: String,
    },

    /// Schema nesting exceeded the configured limit
    #[error("nesting depth limit {limit} exceeded")]
    DepthExceeded {
        /// The configured limit
        limit: usize,
    },

    /// Interpreter state became inconsistent
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new invalid schema error
    pub fn invalid_schema(msg: impl Into<String>) -> Self {
        Self::InvalidSchema(msg.into())
    }

    /// Creates a new end-of-input error
    pub fn unexpected_eof(offset: usize, requested: usize, available: usize) -> Self {
        Self::UnexpectedEof {
            offset,
            requested,
            available,
        }
    }

    /// Creates a new unknown template error
    pub fn unknown_template(name: impl Into<String>) -> Self {
        Self::UnknownTemplate { name: name.into() }
    }

    /// Creates a new assertion failure
    pub fn assertion_failed(message: impl Into<String>, offset: usize) -> Self {
        Self::AssertionFailed {
            message: message.into(),
            offset,
        }
    }

    /// Creates a new coercion error
    pub fn coercion(value: impl std::fmt::Display, expected: &'static str) -> Self {
        Self::Coercion {
            value: value.to_string(),
            expected,
        }
    }

    /// Creates a new expression error
    pub fn eval(msg: impl Into<String>) -> Self {
        Self::Eval(msg.into())
    }

    /// Creates a new function failure
    pub fn function(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Function {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if the error means the input does not fit the schema,
    /// as opposed to a fault in the schema or the caller.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedEof { .. } | Self::InvalidVint { .. } | Self::AssertionFailed { .. }
        )
    }
}
