//! Assembler errors

use quill_bytecode::{OpCode, OperandKind};
use std::fmt;
use thiserror::Error;

/// Result alias used throughout the assembler
pub type EmitResult<T> = Result<T, EmitError>;

/// Which symbol table an invalid symbol was checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Jump target
    Label,
    /// Local storage slot
    Local,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Label => f.write_str("label"),
            Self::Local => f.write_str("local"),
        }
    }
}

/// Errors raised while assembling
///
/// All of these are raised before the instruction stream is touched.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("{what} {value} is out of range (expected {expected})")]
    OutOfRange {
        what: &'static str,
        value: i64,
        expected: &'static str,
    },

    #[error("invalid {kind} `{name}` (ordinal {ordinal}): {reason}")]
    InvalidSymbol {
        kind: SymbolKind,
        ordinal: usize,
        name: String,
        reason: &'static str,
    },

    #[error("label `{name}` is already marked at offset {offset}")]
    LabelAlreadyMarked { name: String, offset: usize },

    #[error("{operation} has no encoding for operand {operand}")]
    UnsupportedOperand {
        operation: &'static str,
        operand: String,
    },

    #[error("opcode {opcode} expects a {expected:?} operand, got {found}")]
    OperandMismatch {
        opcode: OpCode,
        expected: OperandKind,
        found: &'static str,
    },

    #[error("cannot {action}: {reason}")]
    RegionSequence {
        action: &'static str,
        reason: String,
    },

    #[error("bytecode sink failed: {0}")]
    Sink(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl EmitError {
    pub(crate) fn out_of_range<T>(what: &'static str, value: T, expected: &'static str) -> Self
    where
        T: TryInto<i64>,
    {
        Self::OutOfRange {
            what,
            value: value.try_into().unwrap_or(i64::MAX),
            expected,
        }
    }

    pub(crate) fn unsupported(operation: &'static str, operand: impl fmt::Display) -> Self {
        Self::UnsupportedOperand {
            operation,
            operand: operand.to_string(),
        }
    }

    pub(crate) fn sequence(action: &'static str, reason: impl Into<String>) -> Self {
        Self::RegionSequence {
            action,
            reason: reason.into(),
        }
    }

    pub(crate) fn sink<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Sink(Box::new(error))
    }

    /// Whether the error is a range error
    pub fn is_range(&self) -> bool {
        matches!(self, Self::OutOfRange { .. })
    }

    /// Whether the error is an invalid-symbol error
    pub fn is_invalid_symbol(&self) -> bool {
        matches!(
            self,
            Self::InvalidSymbol { .. } | Self::LabelAlreadyMarked { .. }
        )
    }

    /// Whether the error is a region-sequencing error
    pub fn is_sequencing(&self) -> bool {
        matches!(self, Self::RegionSequence { .. })
    }
}
