//! Tool-facing surface: operation table, argument decoding, and the
//! two-tier result formatter.
//!
//! The formatter is the contract boundary. Infrastructure faults (bad
//! request, unresolvable imports, timeout) become tool-level errors with a
//! plain message; a script that ran but threw becomes a successful tool
//! call whose payload says `{"ok":false,"error":...}`, so callers can feed
//! the failure back to whatever produced the script.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use tsbox_protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use tsbox_protocol::tool::{ToolCallRequest, ToolCallResult, ToolDescriptor};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::runner::{CallSpec, Engine};
use crate::validate::validate_code;

/// Name of the single execution operation.
pub const RUN_TS: &str = "run_ts";

/// Arguments accepted by [`RUN_TS`], decoded from the tool call's
/// `arguments` object. Everything except `code` is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunArgs {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub libraries: Vec<String>,
    #[serde(default)]
    pub allow_net: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub file_path_map: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub inputs: Value,
}

/// Descriptors for every operation the executor serves.
pub fn tool_descriptors() -> Vec<ToolDescriptor> {
    vec![ToolDescriptor {
        name: RUN_TS.to_string(),
        description: "Execute a sandboxed script that exports `async function main(ctx)`. \
            The context offers virtual file access (ctx.files), output/temp paths \
            (ctx.paths), host facts (ctx.env), caller inputs (ctx.inputs), and \
            spreadsheet helpers (ctx.xlsx) for use with the SheetJS (xlsx) library. \
            Set allowNet to import npm: packages listed in libraries."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Module source exporting `async function main(ctx)`."
                },
                "libraries": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Import specifiers (e.g. npm:xlsx@0.18.5) to resolve before running."
                },
                "allowNet": {
                    "type": "boolean",
                    "description": "Allow fetching remote modules. Defaults to false."
                },
                "timeoutMs": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Deadline in milliseconds covering resolution and execution."
                },
                "filePathMap": {
                    "type": "object",
                    "additionalProperties": { "type": "string" },
                    "description": "Logical file names mapped to real paths, readable via ctx.files."
                },
                "inputs": {
                    "description": "Arbitrary JSON exposed as ctx.inputs."
                }
            },
            "required": ["code"]
        }),
    }]
}

/// Fold an execution outcome into a tool call result.
///
/// Script throws stay `isError:false` with the failure in the payload;
/// everything else is a tool-level error carrying the message verbatim.
pub fn format_result(outcome: Result<Value, EngineError>) -> ToolCallResult {
    match outcome {
        Ok(result) => {
            ToolCallResult::text(json!({ "ok": true, "result": result }).to_string(), false)
        }
        Err(EngineError::Script { message }) => {
            ToolCallResult::text(json!({ "ok": false, "error": message }).to_string(), false)
        }
        Err(err) => ToolCallResult::text(err.to_string(), true),
    }
}

/// The executor behind the tool surface. Cheap to clone; clones share the
/// engine's concurrency bound and module cache.
#[derive(Clone)]
pub struct ExecutorService {
    engine: Arc<Engine>,
}

impl ExecutorService {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engine: Arc::new(Engine::new(config)),
        }
    }

    pub fn tools(&self) -> Vec<ToolDescriptor> {
        tool_descriptors()
    }

    /// Dispatch one tool call. Never returns `Err`; every fault folds into
    /// the result per the formatter contract.
    pub async fn handle_call(&self, request: &ToolCallRequest) -> ToolCallResult {
        let outcome = self.dispatch(request).await;
        format_result(outcome)
    }

    async fn dispatch(&self, request: &ToolCallRequest) -> Result<Value, EngineError> {
        match request.name.as_str() {
            RUN_TS => self.run_ts(&request.arguments).await,
            other => Err(EngineError::UnknownOperation(other.to_string())),
        }
    }

    async fn run_ts(&self, arguments: &Value) -> Result<Value, EngineError> {
        match arguments.get("code") {
            Some(Value::String(code)) if !code.trim().is_empty() => {}
            _ => return Err(EngineError::MissingCode),
        }
        let args: RunArgs = serde_json::from_value(arguments.clone())
            .map_err(|e| EngineError::InvalidArguments(e.to_string()))?;

        let config = self.engine.config();
        validate_code(&args.code, config.max_code_size)?;

        let timeout = args
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(config.default_timeout);
        tracing::info!(operation = RUN_TS, allow_net = args.allow_net,
            libraries = args.libraries.len(), "executing tool call");

        self.engine
            .run(CallSpec {
                code: args.code,
                libraries: args.libraries,
                allow_net: args.allow_net,
                timeout,
                file_path_map: args.file_path_map,
                inputs: args.inputs,
            })
            .await
    }

    /// JSON-RPC envelope handler for hosts that speak the tool protocol
    /// directly: `tools/list` and `tools/call`.
    pub async fn handle_rpc(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            "tools/list" => {
                JsonRpcResponse::result(request.id, json!({ "tools": self.tools() }))
            }
            "tools/call" => match serde_json::from_value::<ToolCallRequest>(
                request.params.unwrap_or(Value::Null),
            ) {
                Ok(call) => {
                    let result = self.handle_call(&call).await;
                    JsonRpcResponse::result(request.id, json!(result))
                }
                Err(e) => JsonRpcResponse::error(
                    request.id,
                    format!("Invalid tool call parameters: {e}"),
                ),
            },
            other => JsonRpcResponse::error(request.id, format!("Method not found: {other}")),
        }
    }
}
