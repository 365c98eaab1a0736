//! Soft-failure reporting.
//!
//! Lenient nodes and unresolved function calls never abort a decode. They
//! are reported to a [`DiagnosticSink`] instead, so callers can tell a clean
//! decode from one that degraded to "as much as available".

use std::fmt;

/// A non-fatal event observed during a decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A call named a function missing from the registry; it yielded `undefined`
    UnknownFunction {
        /// Function name as written in the schema
        name: String,
        /// Cursor offset at the call
        offset: usize,
    },
    /// A bounded region's contents read past its end; the cursor was clamped back
    RegionOverrun {
        /// Absolute start of the region
        start: usize,
        /// Absolute end of the region
        end: usize,
        /// Offset reached before clamping
        offset: usize,
    },
    /// A repeating node stopped because an iteration consumed no input
    Stalled {
        /// Node kind that stopped
        node: &'static str,
        /// Cursor offset where progress stopped
        offset: usize,
    },
    /// A lenient read returned fewer bytes than requested
    Truncated {
        /// Node kind that read
        node: &'static str,
        /// Bytes requested
        requested: usize,
        /// Bytes actually available
        available: usize,
        /// Cursor offset of the read
        offset: usize,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnknownFunction { name, offset } => {
                write!(f, "unknown function '{}' at offset {}", name, offset)
            }
            Diagnostic::RegionOverrun { start, end, offset } => write!(
                f,
                "region {}..{} overrun to offset {}, clamped to {}",
                start, end, offset, end
            ),
            Diagnostic::Stalled { node, offset } => {
                write!(f, "{} made no progress at offset {}", node, offset)
            }
            Diagnostic::Truncated {
                node,
                requested,
                available,
                offset,
            } => write!(
                f,
                "{} at offset {} truncated: requested {} bytes, got {}",
                node, offset, requested, available
            ),
        }
    }
}

/// Receiver for soft failures.
///
/// The default implementation discards everything; implement this trait to
/// log, count or collect diagnostics.
///
/// # Example
///
/// ```
/// use binspec_core::diagnostics::{Diagnostic, DiagnosticSink};
///
/// #[derive(Default)]
/// struct CountingSink {
///     overruns: usize,
/// }
///
/// impl DiagnosticSink for CountingSink {
///     fn report(&mut self, diagnostic: Diagnostic) {
///         if let Diagnostic::RegionOverrun { .. } = diagnostic {
///             self.overruns += 1;
///         }
///     }
/// }
/// ```
pub trait DiagnosticSink {
    /// Receives one diagnostic
    fn report(&mut self, diagnostic: Diagnostic) {
        let _ = diagnostic;
    }
}

/// A sink that discards all diagnostics
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {}

/// A sink that keeps every diagnostic in arrival order
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    /// Collected diagnostics
    pub diagnostics: Vec<Diagnostic>,
}

impl CollectingSink {
    /// Returns true if nothing was reported
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Number of collected diagnostics
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}
