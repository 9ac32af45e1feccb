//! tsbox engine - sandboxed on-demand script execution
//!
//! Executes caller-supplied scripts in isolated V8 contexts behind a single
//! `run_ts` tool operation. Each call gets a fresh isolate, a virtualized
//! file namespace, and a deadline; nothing of the host is reachable except
//! through the injected execution context.

mod config;
mod context;
mod error;
mod ops;
mod resolver;
mod runner;
mod service;
mod validate;

pub use config::EngineConfig;
pub use context::{
    default_base_dir, unique_output_name, CallPaths, HostFacts, VirtualFiles, APP_DIR_NAME,
    MIME_TYPES,
};
pub use error::EngineError;
pub use resolver::{EsmLoader, ModuleCache};
pub use runner::{CallSpec, Engine};
pub use service::{format_result, tool_descriptors, ExecutorService, RunArgs, RUN_TS};
pub use validate::{has_entry_point, validate_code};

/// Engine-level result alias.
pub type Result<T> = std::result::Result<T, EngineError>;
