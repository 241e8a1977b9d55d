//! Crate-wide error type.
//!
//! Three failure kinds reach callers: parse errors abort the current
//! function, `NotImplemented` means the input uses a construct outside the
//! supported subset (the function is skipped, no verdict is claimed), and
//! `UnreachableExit` is the dedicated outcome for a CFG whose exit block
//! cannot be reached (an infinite loop). Refinement counterexamples are not
//! errors; they are returned as strings by the SMT back-end.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("parse error: line {line}: {msg}")]
    Parse { msg: String, line: u32 },

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("unreachable exit block (infinite loop)")]
    UnreachableExit,
}

impl Error {
    pub fn parse(msg: impl Into<String>, line: u32) -> Self {
        Error::Parse {
            msg: msg.into(),
            line,
        }
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Error::NotImplemented(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
