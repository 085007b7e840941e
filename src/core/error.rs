// This module defines the error taxonomy of the back end using the thiserror crate.
// CompileError covers the three fatal outcomes a compilation can have: running out of
// registers once no spill candidate remains, a malformed-IR invariant violation (an
// internal defect, reported with a precise message), and a construct the target device
// cannot express (reported before register allocation starts). Passes themselves only
// report progress; the driver decides what is fatal.

//! Error types for the vec4 back end.

use thiserror::Error;

/// Fatal compilation outcomes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error(
        "out of registers: {live_values} values live at once, {available} registers \
         available, no spill candidate left after {spill_iterations} spill iteration(s)"
    )]
    OutOfRegisters {
        live_values: u32,
        available: u32,
        spill_iterations: u32,
    },

    #[error("malformed IR: {reason}")]
    MalformedIr { reason: String },

    #[error("unsupported on {device}: {construct}")]
    Unsupported {
        construct: String,
        device: &'static str,
    },
}

/// Build a [`CompileError::MalformedIr`].
pub(crate) fn malformed(reason: impl Into<String>) -> CompileError {
    CompileError::MalformedIr {
        reason: reason.into(),
    }
}

/// Build a [`CompileError::Unsupported`] for `device`.
pub(crate) fn unsupported(construct: impl Into<String>, device: &'static str) -> CompileError {
    CompileError::Unsupported {
        construct: construct.into(),
        device,
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
