//! Test fixtures: an executor over a throwaway base directory plus small
//! helpers for calling `run_ts` and parsing result payloads.

use std::path::Path;

use serde_json::Value;
use tempfile::TempDir;
use tsbox_engine::{EngineConfig, ExecutorService, RUN_TS};
use tsbox_protocol::{ToolCallRequest, ToolCallResult};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("tsbox_engine=debug")
        .try_init();
}

/// An executor whose output and temp directories live under a temp base
/// that is removed when the fixture drops.
pub struct TestExecutor {
    pub service: ExecutorService,
    base: TempDir,
}

impl TestExecutor {
    pub fn new() -> Self {
        init_tracing();
        let base = tempfile::tempdir().expect("temp base dir");
        let service = ExecutorService::new(EngineConfig::default().with_base_dir(base.path()));
        Self { service, base }
    }

    pub fn base_dir(&self) -> &Path {
        self.base.path()
    }

    /// Call an arbitrary operation by name.
    pub async fn call(&self, name: &str, arguments: Value) -> ToolCallResult {
        self.service
            .handle_call(&ToolCallRequest::new(name, arguments))
            .await
    }

    /// Call `run_ts` with the given arguments object.
    pub async fn run_ts(&self, arguments: Value) -> ToolCallResult {
        self.call(RUN_TS, arguments).await
    }
}

impl Default for TestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// The result's text payload, verbatim.
pub fn text(result: &ToolCallResult) -> &str {
    result.first_text().expect("result carries a text block")
}

/// The result's text payload parsed as JSON.
pub fn payload(result: &ToolCallResult) -> Value {
    serde_json::from_str(text(result)).expect("payload parses as JSON")
}
