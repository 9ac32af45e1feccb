//! Fault taxonomy for the executor.
//!
//! Faults fall into two tiers. Infrastructure-level faults (bad request,
//! unresolvable imports, timeout) surface as tool-level errors with a plain
//! message. A script that ran but threw is application-level: the tool call
//! itself succeeds and the failure travels inside the result payload. The
//! exact marker substrings in the messages below are part of the caller
//! contract.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested operation name is not in the operation table.
    #[error("Unknown executor operation: \"{0}\"")]
    UnknownOperation(String),

    /// The `code` argument is absent, not a string, or empty.
    #[error("Missing \"code\" string parameter in tool arguments")]
    MissingCode,

    /// The arguments object did not decode.
    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    /// Submitted source exceeds the configured ceiling.
    #[error("Submitted code is too large: {actual} bytes (limit {max})")]
    CodeTooLarge { max: usize, actual: usize },

    /// The source does not export the required entry point.
    #[error("Submitted script must export an async function named \"main\" taking the execution context, e.g. `export async function main(ctx) {{ ... }}`")]
    MissingEntryPoint,

    /// An import specifier could not be resolved. The message is one of two
    /// families: `Network access is disabled ...` (resolution refused before
    /// any socket is opened) or `Module import failed: ...` (fetch or load
    /// failure, with the underlying cause).
    #[error("{0}")]
    Resolution(String),

    /// The deadline elapsed before the run completed.
    #[error("Execution timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// The entry point threw. Application-level: travels inside a
    /// successful tool call as `{"ok":false,"error":...}`.
    #[error("{message}")]
    Script { message: String },

    /// The serialized result exceeds the configured ceiling.
    #[error("Execution result exceeds the {max}-byte output limit")]
    OutputTooLarge { max: usize },

    /// Engine-side failure unrelated to the submitted script.
    #[error("Executor internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Resolution refused because the call does not allow network access.
    pub fn network_disabled(specifier: &str) -> Self {
        Self::Resolution(format!(
            "Network access is disabled (allowNet is not set); refusing to resolve \"{specifier}\""
        ))
    }

    /// Resolution attempted and failed; `detail` carries the cause.
    pub fn module_import(detail: impl std::fmt::Display) -> Self {
        Self::Resolution(format!("Module import failed: {detail}"))
    }
}
