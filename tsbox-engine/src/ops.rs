//! Host bridge between the isolate and the per-call context.
//!
//! Each op is a thin wrapper over [`crate::context::VirtualFiles`] stored in
//! the isolate's `OpState`. The bootstrap script assembles the frozen `ctx`
//! object from these ops and then strips the ambient capabilities the
//! runtime would otherwise leave reachable.

use std::borrow::Cow;

use deno_core::{op2, Extension, OpState};
use deno_error::JsErrorBox;

use crate::context::{unique_output_name, VirtualFiles};

/// Result envelope reported by the driver module, as a JSON string.
#[derive(Debug, Default)]
pub struct ResultSlot(pub Option<String>);

fn file_error(err: std::io::Error) -> JsErrorBox {
    JsErrorBox::generic(err.to_string())
}

#[op2]
#[buffer]
fn op_ctx_read(state: &mut OpState, #[string] name: String) -> Result<Vec<u8>, JsErrorBox> {
    let files = state.borrow::<VirtualFiles>();
    files.read(&name).map_err(file_error)
}

#[op2]
#[string]
fn op_ctx_read_text(state: &mut OpState, #[string] name: String) -> Result<String, JsErrorBox> {
    let files = state.borrow::<VirtualFiles>();
    files.read_text(&name).map_err(file_error)
}

#[op2]
#[string]
fn op_ctx_write(
    state: &mut OpState,
    #[string] name: String,
    #[buffer] data: &[u8],
) -> Result<String, JsErrorBox> {
    let files = state.borrow::<VirtualFiles>();
    let path = files.write(&name, data).map_err(file_error)?;
    Ok(path.to_string_lossy().into_owned())
}

#[op2]
#[string]
fn op_ctx_write_text(
    state: &mut OpState,
    #[string] name: String,
    #[string] data: String,
) -> Result<String, JsErrorBox> {
    let files = state.borrow::<VirtualFiles>();
    let path = files.write(&name, data.as_bytes()).map_err(file_error)?;
    Ok(path.to_string_lossy().into_owned())
}

#[op2(fast)]
fn op_ctx_exists(state: &mut OpState, #[string] name: String) -> bool {
    let files = state.borrow::<VirtualFiles>();
    files.exists(&name)
}

#[op2]
#[string]
fn op_ctx_get_path(state: &mut OpState, #[string] name: String) -> String {
    let files = state.borrow::<VirtualFiles>();
    files.get_path(&name).to_string_lossy().into_owned()
}

#[op2]
#[serde]
fn op_ctx_list_mapped(state: &mut OpState) -> Vec<String> {
    let files = state.borrow::<VirtualFiles>();
    files.list_mapped()
}

#[op2]
#[string]
fn op_ctx_output_path(state: &mut OpState, #[string] filename: String) -> Result<String, JsErrorBox> {
    let files = state.borrow::<VirtualFiles>();
    let path = files.create_output_path(&filename).map_err(file_error)?;
    Ok(path.to_string_lossy().into_owned())
}

#[op2]
#[string]
fn op_ctx_output_name(#[string] base: String, #[string] ext: String) -> String {
    unique_output_name(&base, &ext)
}

#[op2(fast)]
fn op_executor_log(#[string] level: String, #[string] message: String) {
    match level.as_str() {
        "error" => tracing::error!(target: "tsbox::script", "{message}"),
        "warn" => tracing::warn!(target: "tsbox::script", "{message}"),
        "debug" => tracing::debug!(target: "tsbox::script", "{message}"),
        _ => tracing::info!(target: "tsbox::script", "{message}"),
    }
}

#[op2(fast)]
fn op_executor_set_result(state: &mut OpState, #[string] payload: String) {
    state.borrow_mut::<ResultSlot>().0 = Some(payload);
}

/// The op set exposed to sandboxed calls.
pub fn executor_extension() -> Extension {
    let ops = vec![
        op_ctx_read(),
        op_ctx_read_text(),
        op_ctx_write(),
        op_ctx_write_text(),
        op_ctx_exists(),
        op_ctx_get_path(),
        op_ctx_list_mapped(),
        op_ctx_output_path(),
        op_ctx_output_name(),
        op_executor_log(),
        op_executor_set_result(),
    ];

    Extension {
        name: "tsbox_executor",
        ops: Cow::Owned(ops),
        ..Default::default()
    }
}

/// Builds the frozen `ctx` object from the injected config literal and the
/// ops above, then removes ambient capabilities: the `Deno` namespace,
/// `eval`, and the `Function` constructor chain.
pub const BOOTSTRAP_JS: &str = r#"
((ops, cfg) => {
    const files = Object.freeze({
        read: (name) => ops.op_ctx_read(String(name)),
        readText: (name) => ops.op_ctx_read_text(String(name)),
        write: (name, data) =>
            typeof data === "string"
                ? ops.op_ctx_write_text(String(name), data)
                : ops.op_ctx_write(String(name), data),
        exists: (name) => ops.op_ctx_exists(String(name)),
        getPath: (name) => ops.op_ctx_get_path(String(name)),
        listMapped: () => ops.op_ctx_list_mapped(),
        createOutputPath: (filename) => ops.op_ctx_output_path(String(filename)),
    });

    const xlsx = Object.freeze({
        mimeTypes: Object.freeze(cfg.mimeTypes),
        outputName: (base, ext) =>
            ops.op_ctx_output_name(String(base), ext === undefined ? "xlsx" : String(ext)),
    });

    const context = Object.freeze({
        files,
        paths: Object.freeze(cfg.paths),
        env: Object.freeze(cfg.env),
        inputs: cfg.inputs,
        xlsx,
    });

    const format = (args) =>
        args
            .map((a) => {
                if (typeof a === "string") return a;
                try {
                    const s = JSON.stringify(a);
                    return s === undefined ? String(a) : s;
                } catch (_) {
                    return String(a);
                }
            })
            .join(" ");
    const log = (level) => (...args) => ops.op_executor_log(level, format(args));
    globalThis.console = Object.freeze({
        log: log("info"),
        info: log("info"),
        warn: log("warn"),
        error: log("error"),
        debug: log("debug"),
    });

    globalThis.__tsbox = Object.freeze({
        context,
        setResult: (json) => ops.op_executor_set_result(json),
    });

    delete globalThis.__tsbox_config;
    delete globalThis.Deno;

    // Close the prototype-chain route back to code generation.
    delete globalThis.eval;
    const AsyncFunction = (async function () {}).constructor;
    const GeneratorFunction = (function* () {}).constructor;
    Object.defineProperty(Function.prototype, "constructor", {
        value: undefined, configurable: false, writable: false,
    });
    Object.defineProperty(AsyncFunction.prototype, "constructor", {
        value: undefined, configurable: false, writable: false,
    });
    Object.defineProperty(GeneratorFunction.prototype, "constructor", {
        value: undefined, configurable: false, writable: false,
    });
})(Deno.core.ops, globalThis.__tsbox_config);
"#;
