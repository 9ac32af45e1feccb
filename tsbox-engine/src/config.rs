//! Engine configuration and execution limits.

use std::path::PathBuf;
use std::time::Duration;

/// Limits and defaults for sandboxed execution.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline applied when the caller does not supply `timeoutMs`.
    pub default_timeout: Duration,

    /// Maximum size of submitted source text in bytes.
    pub max_code_size: usize,

    /// Maximum size of the serialized result payload in bytes.
    pub max_output_size: usize,

    /// V8 heap limit in bytes.
    pub max_heap_size: usize,

    /// Maximum concurrent sandbox executions.
    pub max_concurrent: usize,

    /// Override for the application-scoped base directory holding the
    /// output and temp directories. `None` uses the platform default.
    pub base_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            max_code_size: 256 * 1024,        // 256 KB
            max_output_size: 1024 * 1024,     // 1 MB
            max_heap_size: 128 * 1024 * 1024, // 128 MB
            max_concurrent: 8,
            base_dir: None,
        }
    }
}

impl EngineConfig {
    /// Strict limits for fully untrusted callers.
    pub fn strict() -> Self {
        Self {
            default_timeout: Duration::from_secs(5),
            max_code_size: 64 * 1024,
            max_output_size: 256 * 1024,
            max_heap_size: 32 * 1024 * 1024,
            max_concurrent: 2,
            base_dir: None,
        }
    }

    /// Set the base directory override.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }
}
