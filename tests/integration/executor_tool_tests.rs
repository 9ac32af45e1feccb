//! Contract tests for the `run_ts` tool surface: descriptor shape, the
//! fault tiers, and the end-to-end success scenarios.

use serde_json::json;
use tsbox_tests::common::{payload, text, TestExecutor};

#[tokio::test]
async fn descriptor_lists_exactly_one_operation() {
    let executor = TestExecutor::new();
    let tools = executor.service.tools();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "run_ts");
    assert!(tools[0].description.contains("xlsx"), "{}", tools[0].description);
    assert_eq!(tools[0].input_schema["required"], json!(["code"]));
}

#[tokio::test]
async fn unknown_operation_name_is_a_tool_error() {
    let executor = TestExecutor::new();
    let result = executor.call("run_py", json!({ "code": "print(1)" })).await;
    assert!(result.is_error);
    assert!(text(&result).contains("Unknown executor operation"));
}

#[tokio::test]
async fn missing_code_is_a_tool_error() {
    let executor = TestExecutor::new();
    let result = executor.run_ts(json!({ "allowNet": false })).await;
    assert!(result.is_error);
    assert!(text(&result).contains("Missing \"code\" string"));
}

#[tokio::test]
async fn code_without_the_entry_point_is_a_tool_error() {
    let executor = TestExecutor::new();
    let result = executor
        .run_ts(json!({ "code": "const add = (a, b) => a + b;" }))
        .await;
    assert!(result.is_error);
    assert!(text(&result).contains("export an async function named \"main\""));
}

#[tokio::test]
async fn written_report_lands_on_disk() {
    let executor = TestExecutor::new();
    let result = executor
        .run_ts(json!({
            "code": r#"
export async function main(ctx) {
    const filename = "report.csv";
    const path = ctx.files.write(filename, "sku,qty\nA-1,4\n");
    return { filename, path };
}
"#
        }))
        .await;
    assert!(!result.is_error, "{}", text(&result));
    let value = payload(&result);
    assert_eq!(value["ok"], json!(true));
    assert_eq!(value["result"]["filename"], json!("report.csv"));
    let path = value["result"]["path"].as_str().unwrap();
    assert!(std::path::Path::new(path).exists(), "missing file: {path}");
    assert!(path.starts_with(executor.base_dir().to_str().unwrap()));
}

#[tokio::test]
async fn environment_facts_and_generated_names_reach_the_script() {
    let executor = TestExecutor::new();
    let result = executor
        .run_ts(json!({
            "code": r#"
export async function main(ctx) {
    return {
        platform: ctx.env.platform,
        output: ctx.paths.output,
        temp: ctx.paths.temp,
        name: ctx.xlsx.outputName("report"),
    };
}
"#
        }))
        .await;
    let value = payload(&result);
    assert_eq!(value["result"]["platform"], json!(std::env::consts::OS));
    assert!(value["result"]["output"].as_str().unwrap().contains("output"));
    assert!(value["result"]["temp"].as_str().unwrap().contains("tmp"));
    let name = value["result"]["name"].as_str().unwrap();
    assert!(name.starts_with("report_"), "unexpected name: {name}");
    assert!(name.ends_with(".xlsx"), "unexpected name: {name}");
}

#[tokio::test]
async fn mapped_files_expose_real_content_and_paths() {
    let executor = TestExecutor::new();
    let staging = tempfile::tempdir().unwrap();
    let real = staging.path().join("source.txt");
    std::fs::write(&real, "exact bytes").unwrap();

    let result = executor
        .run_ts(json!({
            "code": r#"
export async function main(ctx) {
    return {
        content: ctx.files.readText("input.txt"),
        exists: ctx.files.exists("input.txt"),
        path: ctx.files.getPath("input.txt"),
    };
}
"#,
            "filePathMap": { "input.txt": real },
        }))
        .await;
    let value = payload(&result);
    assert_eq!(value["result"]["content"], json!("exact bytes"));
    assert_eq!(value["result"]["exists"], json!(true));
    assert_eq!(value["result"]["path"], json!(real.to_str().unwrap()));
}

#[tokio::test]
async fn nonexistent_package_with_network_is_an_import_failure() {
    let executor = TestExecutor::new();
    let result = executor
        .run_ts(json!({
            "code": "export async function main(ctx) { return 1; }",
            "libraries": ["npm:tsbox-no-such-package-e5b1@9.9.9"],
            "allowNet": true,
        }))
        .await;
    assert!(result.is_error);
    assert!(text(&result).contains("Module import failed"), "{}", text(&result));
}

#[tokio::test]
async fn remote_import_without_network_is_refused() {
    let executor = TestExecutor::new();
    let result = executor
        .run_ts(json!({
            "code": "export async function main(ctx) { return 1; }",
            "libraries": ["npm:xlsx@0.18.5"],
        }))
        .await;
    assert!(result.is_error);
    assert!(text(&result).contains("Network access is disabled"), "{}", text(&result));
}

#[tokio::test]
async fn intentional_throw_is_an_application_fault() {
    let executor = TestExecutor::new();
    let result = executor
        .run_ts(json!({
            "code": r#"
export async function main(ctx) {
    throw new Error("Intentional test error");
}
"#
        }))
        .await;
    assert!(!result.is_error);
    let value = payload(&result);
    assert_eq!(value["ok"], json!(false));
    assert!(value["error"]
        .as_str()
        .unwrap()
        .contains("Intentional test error"));
}

#[tokio::test]
async fn rerunning_the_same_code_produces_distinct_outputs() {
    let executor = TestExecutor::new();
    let arguments = json!({
        "code": r#"
export async function main(ctx) {
    const filename = ctx.xlsx.outputName("summary", "json");
    const path = ctx.files.write(filename, JSON.stringify({ done: true }));
    return { filename, path };
}
"#
    });

    let first = payload(&executor.run_ts(arguments.clone()).await);
    let second = payload(&executor.run_ts(arguments).await);

    assert_eq!(first["ok"], json!(true));
    assert_eq!(second["ok"], json!(true));
    assert_ne!(first["result"]["filename"], second["result"]["filename"]);
    for value in [&first, &second] {
        let path = value["result"]["path"].as_str().unwrap();
        assert!(std::path::Path::new(path).exists(), "missing file: {path}");
    }
}

#[tokio::test]
async fn concurrent_calls_are_fully_independent() {
    let executor = TestExecutor::new();
    let call = |tag: i64| {
        executor.run_ts(json!({
            "code": r#"
export async function main(ctx) {
    const filename = ctx.xlsx.outputName("job", "json");
    const path = ctx.files.write(filename, JSON.stringify({ tag: ctx.inputs.tag }));
    return { path, tag: ctx.inputs.tag };
}
"#,
            "inputs": { "tag": tag },
        }))
    };

    let (a, b, c) = tokio::join!(call(1), call(2), call(3));

    let mut paths = Vec::new();
    for (result, tag) in [(&a, 1), (&b, 2), (&c, 3)] {
        let value = payload(result);
        assert_eq!(value["ok"], json!(true), "{}", text(result));
        assert_eq!(value["result"]["tag"], json!(tag));
        let path = value["result"]["path"].as_str().unwrap().to_string();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["tag"], json!(tag), "crossed output in {path}");
        paths.push(path);
    }
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 3, "output paths collided: {paths:?}");
}

#[tokio::test]
async fn cache_races_on_one_specifier_resolve_idempotently() {
    use tsbox_engine::{EsmLoader, ModuleCache};

    let cache = ModuleCache::default();
    cache.lock().unwrap().insert(
        "https://esm.sh/left-pad@1.3.0".to_string(),
        "export default () => {};".to_string(),
    );
    let loader = EsmLoader::new(
        "export {};".to_string(),
        "export async function main() {}".to_string(),
        true,
        cache.clone(),
    );
    let other = loader.clone();

    let (a, b) = tokio::join!(
        loader.prefetch("npm:left-pad@1.3.0"),
        other.prefetch("npm:left-pad@1.3.0"),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(cache.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn deadline_cuts_off_long_runs() {
    let executor = TestExecutor::new();
    let result = executor
        .run_ts(json!({
            "code": "export async function main(ctx) { while (true) {} }",
            "timeoutMs": 400,
        }))
        .await;
    assert!(result.is_error);
    assert!(text(&result).contains("timed out"), "{}", text(&result));
}

#[tokio::test]
async fn inputs_are_visible_as_plain_data() {
    let executor = TestExecutor::new();
    let result = executor
        .run_ts(json!({
            "code": r#"
export async function main(ctx) {
    return ctx.inputs.rows.map((r) => r.qty).reduce((a, b) => a + b, 0);
}
"#,
            "inputs": { "rows": [ { "qty": 4 }, { "qty": 9 } ] },
        }))
        .await;
    let value = payload(&result);
    assert_eq!(value["result"], json!(13));
}
