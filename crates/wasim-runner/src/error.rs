//! Run driver error types.
//!
//! Every variant is fatal to the run that raised it.  Guest-visible
//! resource failures and trace-store outages never show up here: the first
//! are return codes handed to the guest, the second are logged and skipped.

use std::path::PathBuf;

use thiserror::Error;
use wasim_bridge::BridgeError;

#[derive(Debug, Error)]
pub enum RunError {
    /// The guest binary is malformed or fails validation.
    #[error("failed to decode guest module: {0}")]
    Decode(String),

    /// The guest's imports cannot be satisfied by the host bridge.
    #[error("failed to resolve guest imports: {0}")]
    Import(#[from] BridgeError),

    /// The interpreter rejected a host function definition.
    #[error("failed to link host function: {0}")]
    Link(String),

    /// None of the recognised entry symbols is exported as a function.
    #[error("no entry point found: the guest exports neither `main` nor `cwa_main`")]
    EntryPointNotFound,

    #[error("entry point `{name}` has unsupported signature {signature}")]
    EntryPointSignature { name: String, signature: String },

    #[error("failed to instantiate guest module: {0}")]
    Instantiate(String),

    /// The guest trapped or a host function faulted during execution.
    #[error("guest execution failed: {0}")]
    Trap(String),

    #[error("invalid run configuration {path}: {reason}")]
    Config { path: PathBuf, reason: String },
}

/// Run result type alias.
pub type RunResult<T> = Result<T, RunError>;
