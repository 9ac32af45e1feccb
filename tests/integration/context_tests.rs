//! Behavior of the execution context as seen from inside scripts: the
//! virtual file namespace, the helper surfaces, and the capability cuts.

use serde_json::json;
use tsbox_tests::common::{payload, text, TestExecutor};

#[tokio::test]
async fn outputs_from_one_call_are_readable_in_the_next() {
    let executor = TestExecutor::new();
    let first = executor
        .run_ts(json!({
            "code": r#"
export async function main(ctx) {
    ctx.files.write("state.json", JSON.stringify({ round: 1 }));
    return null;
}
"#
        }))
        .await;
    assert!(!first.is_error, "{}", text(&first));

    let second = executor
        .run_ts(json!({
            "code": r#"
export async function main(ctx) {
    return JSON.parse(ctx.files.readText("state.json"));
}
"#
        }))
        .await;
    let value = payload(&second);
    assert_eq!(value["result"]["round"], json!(1));
}

#[tokio::test]
async fn writes_cannot_escape_the_output_directory() {
    let executor = TestExecutor::new();
    let result = executor
        .run_ts(json!({
            "code": r#"
export async function main(ctx) {
    return ctx.files.write("../../evil.txt", "nope");
}
"#
        }))
        .await;
    let value = payload(&result);
    assert_eq!(value["ok"], json!(true));
    let path = value["result"].as_str().unwrap();
    assert!(
        path.starts_with(executor.base_dir().to_str().unwrap()),
        "escaped: {path}"
    );
    assert!(path.ends_with("evil.txt"));
}

#[tokio::test]
async fn reading_an_unmapped_name_is_an_application_fault() {
    let executor = TestExecutor::new();
    let result = executor
        .run_ts(json!({
            "code": r#"
export async function main(ctx) {
    return ctx.files.read("missing.bin");
}
"#
        }))
        .await;
    assert!(!result.is_error);
    let value = payload(&result);
    assert_eq!(value["ok"], json!(false));
    assert!(value["error"].as_str().unwrap().contains("File not found"));
}

#[tokio::test]
async fn spreadsheet_mime_types_are_exposed() {
    let executor = TestExecutor::new();
    let result = executor
        .run_ts(json!({
            "code": r#"
export async function main(ctx) {
    return { xlsx: ctx.xlsx.mimeTypes.xlsx, csv: ctx.xlsx.mimeTypes.csv };
}
"#
        }))
        .await;
    let value = payload(&result);
    assert!(value["result"]["xlsx"]
        .as_str()
        .unwrap()
        .contains("spreadsheetml"));
    assert_eq!(value["result"]["csv"], json!("text/csv"));
}

#[tokio::test]
async fn console_logging_does_not_disturb_the_result() {
    let executor = TestExecutor::new();
    let result = executor
        .run_ts(json!({
            "code": r#"
export async function main(ctx) {
    console.log("structured", { step: 1 });
    console.warn("plain text");
    return "done";
}
"#
        }))
        .await;
    let value = payload(&result);
    assert_eq!(value["result"], json!("done"));
}

#[tokio::test]
async fn ambient_capabilities_are_unreachable() {
    let executor = TestExecutor::new();
    let result = executor
        .run_ts(json!({
            "code": r#"
export async function main(ctx) {
    return {
        deno: typeof Deno,
        evalFn: typeof eval,
        ctor: (function () {}).constructor === undefined,
    };
}
"#
        }))
        .await;
    let value = payload(&result);
    assert_eq!(value["result"]["deno"], json!("undefined"));
    assert_eq!(value["result"]["evalFn"], json!("undefined"));
    assert_eq!(value["result"]["ctor"], json!(true));
}

#[tokio::test]
async fn frozen_context_rejects_tampering() {
    let executor = TestExecutor::new();
    let result = executor
        .run_ts(json!({
            "code": r#"
export async function main(ctx) {
    try {
        ctx.files = null;
    } catch (_) {}
    return typeof ctx.files.readText;
}
"#
        }))
        .await;
    let value = payload(&result);
    assert_eq!(value["result"], json!("function"));
}
