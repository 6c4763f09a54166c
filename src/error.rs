use std::path::PathBuf;

use thiserror::Error;

use crate::memory::Cell;

/// Errors reported by loading, assembling, and running programs.
///
/// Every error is returned to the caller of the operation that triggered
/// it. Failed loads leave the machine untouched; a failed step leaves the
/// program counter on the instruction that failed.
#[derive(Debug, Error)]
pub enum Error {
    /// A program token is not a signed decimal integer.
    #[error("line {line}: '{token}' is not a signed integer")]
    Parse {
        /// 1-based line of the offending token.
        line: usize,
        token: String,
    },
    /// An operand or program counter resolved to a negative address.
    #[error("invalid address {address}")]
    InvalidAddress { address: Cell },
    /// A write landed at or beyond the configured memory limit.
    #[error("address {address} exceeds the memory limit of {limit} cells")]
    MemoryLimit { address: Cell, limit: usize },
    /// A bounded run used up its step budget without halting or
    /// blocking on input.
    #[error("no halt or input wait after {steps} steps")]
    NoProgress { steps: u64 },
    /// An assembler source referenced or redefined a label incorrectly.
    #[error("assembly failed: {0}")]
    Assemble(String),
    /// Reading an image from disk failed.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
