//! Run a script through the tool surface
//!
//! Shows the full round trip: build the service, call `run_ts` with
//! inline source, and read the result envelope back. Also demonstrates
//! how a throwing script and a bad request surface differently.

use serde_json::json;
use tsbox_engine::{EngineConfig, ExecutorService, RUN_TS};
use tsbox_protocol::ToolCallRequest;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let service = ExecutorService::new(EngineConfig::default());

    println!("=== run_ts: successful call ===\n");
    let request = ToolCallRequest::new(
        RUN_TS,
        json!({
            "code": r#"
export async function main(ctx) {
    const doubled = ctx.inputs.values.map((v) => v * 2);
    console.log("doubling", ctx.inputs.values.length, "values");
    return { platform: ctx.env.platform, doubled };
}
"#,
            "inputs": { "values": [1, 2, 3] },
        }),
    );
    let result = service.handle_call(&request).await;
    println!("isError: {}", result.is_error);
    println!("payload: {}\n", result.first_text().unwrap_or_default());

    println!("=== run_ts: script throws (tool call still succeeds) ===\n");
    let request = ToolCallRequest::new(
        RUN_TS,
        json!({ "code": "export async function main(ctx) { throw new Error(\"bad input\"); }" }),
    );
    let result = service.handle_call(&request).await;
    println!("isError: {}", result.is_error);
    println!("payload: {}\n", result.first_text().unwrap_or_default());

    println!("=== run_ts: bad request (tool-level error) ===\n");
    let request = ToolCallRequest::new(RUN_TS, json!({ "code": "const nope = 1;" }));
    let result = service.handle_call(&request).await;
    println!("isError: {}", result.is_error);
    println!("payload: {}", result.first_text().unwrap_or_default());

    Ok(())
}
