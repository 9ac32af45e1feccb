//! Sandboxed execution of a validated call.
//!
//! Every call gets a fresh isolate on a dedicated thread with its own
//! current-thread reactor; results travel back over a oneshot channel. A
//! watchdog thread terminates CPU-bound scripts that never yield to the
//! event loop, and a reactor-level timeout covers everything else, so the
//! deadline holds for both busy loops and stuck awaits.

use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use deno_core::{JsRuntime, ModuleSpecifier, PollEventLoopOptions, RuntimeOptions};
use tokio::sync::{oneshot, Semaphore};

use crate::config::EngineConfig;
use crate::context::{bootstrap_config, CallPaths, VirtualFiles};
use crate::error::EngineError;
use crate::ops::{executor_extension, ResultSlot, BOOTSTRAP_JS};
use crate::resolver::{EsmLoader, ModuleCache, DRIVER_SPECIFIER};

/// Driver module evaluated as the isolate's main module. It imports the
/// submitted source, checks the entry-point shape one more time at runtime,
/// invokes it with the frozen context, and reports a result envelope either
/// way. A throw inside `main` is captured here, not propagated to the host.
const DRIVER_JS: &str = r#"
import * as user from "tsbox:user";

const report = (payload) => globalThis.__tsbox.setResult(JSON.stringify(payload));

try {
    if (typeof user.main !== "function") {
        throw new Error(
            'Submitted script must export an async function named "main" taking the execution context',
        );
    }
    const result = await user.main(globalThis.__tsbox.context);
    report({ ok: true, result: result === undefined ? null : result });
} catch (err) {
    const message =
        err instanceof Error && err.message ? err.message : String(err);
    report({ ok: false, error: message });
}
"#;

// Import-resolution failures surface as JS errors wrapped in engine frames.
// These markers pull them back out into the infrastructure tier.
const RESOLUTION_MARKERS: &[&str] = &["Network access is disabled", "Module import failed"];

fn classify_js_error(message: &str) -> EngineError {
    for marker in RESOLUTION_MARKERS {
        if let Some(idx) = message.find(marker) {
            return EngineError::Resolution(message[idx..].to_string());
        }
    }
    EngineError::Script {
        message: message.to_string(),
    }
}

/// One fully-validated execution request.
#[derive(Debug, Clone, Default)]
pub struct CallSpec {
    /// Submitted module source. Must already have passed validation.
    pub code: String,
    /// Import specifiers to resolve before the entry point runs.
    pub libraries: Vec<String>,
    /// Whether remote specifiers may be fetched.
    pub allow_net: bool,
    /// Deadline covering resolution and execution together.
    pub timeout: Duration,
    /// Logical name to real path map for the virtual file namespace.
    pub file_path_map: std::collections::BTreeMap<String, PathBuf>,
    /// Caller-supplied value exposed as `ctx.inputs`.
    pub inputs: serde_json::Value,
}

/// Shared executor: a concurrency bound and a module source cache over
/// otherwise per-call state.
pub struct Engine {
    config: EngineConfig,
    semaphore: Arc<Semaphore>,
    module_cache: ModuleCache,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            config,
            semaphore,
            module_cache: ModuleCache::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one call to completion and return the script's result value.
    ///
    /// Waits for a concurrency slot, then executes on a dedicated sandbox
    /// thread. The returned value is whatever `main` resolved to, already
    /// deserialized; failures carry the two-tier taxonomy from
    /// [`EngineError`].
    pub async fn run(&self, spec: CallSpec) -> Result<serde_json::Value, EngineError> {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Internal("executor is shutting down".to_string()))?;

        let config = self.config.clone();
        let cache = self.module_cache.clone();
        let (tx, rx) = oneshot::channel();

        std::thread::Builder::new()
            .name("tsbox-sandbox".to_string())
            .spawn(move || {
                let outcome = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt.block_on(run_call(&config, cache, spec)),
                    Err(e) => Err(EngineError::Internal(format!(
                        "sandbox reactor failed to start: {e}"
                    ))),
                };
                let _ = tx.send(outcome);
            })
            .map_err(|e| EngineError::Internal(format!("sandbox thread failed to start: {e}")))?;

        rx.await
            .map_err(|_| EngineError::Internal("sandbox thread panicked".to_string()))?
    }
}

async fn run_call(
    config: &EngineConfig,
    cache: ModuleCache,
    spec: CallSpec,
) -> Result<serde_json::Value, EngineError> {
    let call_id = uuid::Uuid::new_v4();
    tracing::debug!(%call_id, allow_net = spec.allow_net, libraries = spec.libraries.len(),
        timeout_ms = spec.timeout.as_millis() as u64, "starting sandboxed call");

    let paths = CallPaths::resolve(config.base_dir.as_deref());
    paths
        .ensure()
        .map_err(|e| EngineError::Internal(format!("could not create call directories: {e}")))?;
    let files = VirtualFiles::new(spec.file_path_map.clone(), paths);
    let config_json = bootstrap_config(&files, &spec.inputs)?;

    let loader = EsmLoader::new(
        DRIVER_JS.to_string(),
        spec.code.clone(),
        spec.allow_net,
        cache,
    );
    let prefetcher = loader.clone();

    let mut runtime = JsRuntime::new(RuntimeOptions {
        module_loader: Some(Rc::new(loader)),
        extensions: vec![executor_extension()],
        create_params: Some(
            deno_core::v8::CreateParams::default().heap_limits(0, config.max_heap_size),
        ),
        ..Default::default()
    });

    {
        let op_state = runtime.op_state();
        let mut op_state = op_state.borrow_mut();
        op_state.put(files);
        op_state.put(ResultSlot::default());
    }

    runtime
        .execute_script("[tsbox:config]", format!("globalThis.__tsbox_config = {config_json};"))
        .map_err(|e| EngineError::Internal(format!("context injection failed: {e}")))?;
    runtime
        .execute_script("[tsbox:bootstrap]", BOOTSTRAP_JS)
        .map_err(|e| EngineError::Internal(format!("bootstrap failed: {e}")))?;

    // Watchdog for CPU-bound scripts that never yield. The reactor timeout
    // below cannot fire while V8 holds the thread, so termination has to
    // come from outside the isolate.
    let isolate_handle = runtime.v8_isolate().thread_safe_handle();
    let timed_out = Arc::new(AtomicBool::new(false));
    let watchdog_flag = timed_out.clone();
    let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
    let watchdog_deadline = spec.timeout + Duration::from_millis(50);
    let watchdog = std::thread::spawn(move || {
        if let Err(mpsc::RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(watchdog_deadline) {
            watchdog_flag.store(true, Ordering::SeqCst);
            isolate_handle.terminate_execution();
        }
    });

    let exec = async {
        for specifier in &spec.libraries {
            prefetcher.prefetch(specifier).await?;
        }

        let driver_url = ModuleSpecifier::parse(DRIVER_SPECIFIER)
            .map_err(|e| EngineError::Internal(format!("bad driver specifier: {e}")))?;
        let module_id = runtime
            .load_main_es_module(&driver_url)
            .await
            .map_err(|e| classify_js_error(&e.to_string()))?;
        let eval = runtime.mod_evaluate(module_id);
        runtime
            .run_event_loop(PollEventLoopOptions::default())
            .await
            .map_err(|e| classify_js_error(&e.to_string()))?;
        eval.await.map_err(|e| classify_js_error(&e.to_string()))?;

        let op_state = runtime.op_state();
        let payload = op_state.borrow_mut().borrow_mut::<ResultSlot>().0.take();
        Ok::<_, EngineError>(payload)
    };

    let outcome = tokio::time::timeout(spec.timeout, exec).await;
    let _ = cancel_tx.send(());
    let _ = watchdog.join();

    let timeout_ms = spec.timeout.as_millis() as u64;
    let payload = match outcome {
        Err(_) => return Err(EngineError::Timeout { timeout_ms }),
        Ok(Err(_)) if timed_out.load(Ordering::SeqCst) => {
            return Err(EngineError::Timeout { timeout_ms });
        }
        Ok(Err(e)) => return Err(e),
        Ok(Ok(payload)) => payload.ok_or_else(|| {
            EngineError::Internal("script completed without reporting a result".to_string())
        })?,
    };

    if payload.len() > config.max_output_size {
        return Err(EngineError::OutputTooLarge {
            max: config.max_output_size,
        });
    }

    let envelope: serde_json::Value = serde_json::from_str(&payload)
        .map_err(|e| EngineError::Internal(format!("malformed result envelope: {e}")))?;
    if envelope["ok"].as_bool() == Some(true) {
        tracing::debug!(%call_id, "call completed");
        return Ok(envelope
            .get("result")
            .cloned()
            .unwrap_or(serde_json::Value::Null));
    }

    let message = envelope["error"]
        .as_str()
        .unwrap_or("script failed without a message")
        .to_string();
    tracing::debug!(%call_id, error = %message, "script threw");
    // A dynamic import that failed resolution rejects inside the script;
    // pull those back into the infrastructure tier.
    Err(classify_js_error(&message))
}
