//! Virtual file namespace from inside a script
//!
//! Maps a real file under a logical name with `filePathMap`, reads it from
//! the script, and writes a derived artifact back into the output
//! directory using a collision-resistant name.

use serde_json::json;
use tsbox_engine::{EngineConfig, ExecutorService, RUN_TS};
use tsbox_protocol::ToolCallRequest;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let staging = tempfile::tempdir()?;
    let source = staging.path().join("orders.csv");
    std::fs::write(&source, "sku,qty\nA-1,4\nB-2,9\n")?;

    let service = ExecutorService::new(EngineConfig::default());

    let request = ToolCallRequest::new(
        RUN_TS,
        json!({
            "code": r#"
export async function main(ctx) {
    const csv = ctx.files.readText("orders.csv");
    const rows = csv.trim().split("\n").slice(1);
    const total = rows
        .map((row) => Number(row.split(",")[1]))
        .reduce((a, b) => a + b, 0);

    const name = ctx.xlsx.outputName("summary", "json");
    const written = ctx.files.write(name, JSON.stringify({ rows: rows.length, total }));
    return { written, mapped: ctx.files.listMapped(), outputDir: ctx.paths.output };
}
"#,
            "filePathMap": { "orders.csv": source },
        }),
    );

    let result = service.handle_call(&request).await;
    println!("isError: {}", result.is_error);
    println!("payload: {}", result.first_text().unwrap_or_default());

    Ok(())
}
