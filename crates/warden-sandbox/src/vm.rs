//! The isolated runtime — a resource-bounded, capability-stripped V8
//! isolate, one per call.
//!
//! V8 isolates are `!Send`, so each execution runs on a dedicated thread
//! with its own single-threaded tokio runtime. The public API is async and
//! `Send`-safe. Nothing leaks between calls: the isolate is created for
//! one script and torn down before the call returns, on every outcome.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use deno_core::{JsRuntime, PollEventLoopOptions, RuntimeOptions, v8};
use serde::{Deserialize, Serialize};

use crate::error::{SandboxError, SandboxResult};
use crate::ops::{ConsoleCapture, MAX_TIMER_MS, ScriptOutcome, warden_vm};

/// Resource limits for one isolated execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfig {
    /// V8 heap ceiling in megabytes.
    pub memory_limit_mb: usize,
    /// Wall-clock execution ceiling in milliseconds.
    pub timeout_ms: u64,
    /// Whether `console.*` output is captured (otherwise discarded).
    pub allow_console: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: 128,
            timeout_ms: 5_000,
            allow_console: true,
        }
    }
}

impl VmConfig {
    /// Set the heap ceiling.
    #[must_use]
    pub fn with_memory_limit_mb(mut self, mb: usize) -> Self {
        self.memory_limit_mb = mb;
        self
    }

    /// Set the wall-clock ceiling.
    #[must_use]
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Enable or disable console capture.
    #[must_use]
    pub fn with_allow_console(mut self, allow: bool) -> Self {
        self.allow_console = allow;
        self
    }

    /// Reject non-positive limits.
    pub(crate) fn validate(&self) -> SandboxResult<()> {
        if self.memory_limit_mb == 0 {
            return Err(SandboxError::InvalidConfig {
                param: "memory_limit_mb".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.timeout_ms == 0 {
            return Err(SandboxError::InvalidConfig {
                param: "timeout_ms".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Outcome of one isolated execution. Failures (throw, timeout, memory
/// ceiling) are reported here, never as `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmExecutionResult {
    /// Whether the script ran to completion.
    pub success: bool,
    /// The script's completion value, JSON-encoded.
    pub result: Option<serde_json::Value>,
    /// Captured console lines, in emission order.
    pub logs: Vec<String>,
    /// What went wrong, when `success` is false.
    pub error: Option<String>,
    /// Wall-clock execution time in milliseconds.
    pub duration_ms: u64,
    /// Heap bytes in use when the script finished, when measurable.
    pub memory_usage: Option<u64>,
}

impl VmExecutionResult {
    fn failure(error: impl Into<String>, logs: Vec<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            result: None,
            logs,
            error: Some(error.into()),
            duration_ms,
            memory_usage: None,
        }
    }
}

/// Executes scripts inside a capability-stripped V8 isolate.
#[derive(Debug, Clone)]
pub struct IsolatedRuntime {
    config: VmConfig,
}

impl IsolatedRuntime {
    /// Create a runtime, validating the configuration up front.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::InvalidConfig`] on a non-positive limit.
    pub fn new(config: VmConfig) -> SandboxResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The runtime's configuration.
    #[must_use]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Execute a script under the runtime's limits, or `config`'s if given.
    ///
    /// Infallible: every failure mode (syntax error, throw, timeout, heap
    /// ceiling, panicked worker thread) is folded into the result.
    pub async fn execute(&self, code: &str) -> VmExecutionResult {
        self.execute_with(code, None).await
    }

    /// Execute with a per-call configuration override.
    pub async fn execute_with(&self, code: &str, config: Option<VmConfig>) -> VmExecutionResult {
        let config = match config {
            Some(c) if c.validate().is_ok() => c,
            Some(c) => {
                tracing::warn!(?c, "per-call vm config invalid, using runtime default");
                self.config
            }
            None => self.config,
        };

        tracing::debug!(
            code_len = code.len(),
            timeout_ms = config.timeout_ms,
            memory_limit_mb = config.memory_limit_mb,
            "vm execution starting"
        );

        let started = Instant::now();
        let code = code.to_string();

        // V8 isolates are !Send: run the whole execution on its own thread.
        let (tx, rx) = tokio::sync::oneshot::channel();
        std::thread::spawn(move || {
            let outcome = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| format!("failed to build vm runtime: {e}"))
                .and_then(|rt| rt.block_on(run_isolated(&config, &code)));
            if tx.send(outcome).is_err() {
                tracing::warn!("vm result receiver dropped before result was sent");
            }
        });

        let duration_ms = |started: Instant| {
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
        };

        match rx.await {
            Ok(Ok(mut result)) => {
                result.duration_ms = duration_ms(started);
                tracing::debug!(
                    success = result.success,
                    duration_ms = result.duration_ms,
                    "vm execution finished"
                );
                result
            }
            Ok(Err(message)) => {
                VmExecutionResult::failure(message, Vec::new(), duration_ms(started))
            }
            Err(_) => VmExecutionResult::failure(
                "vm worker thread panicked",
                Vec::new(),
                duration_ms(started),
            ),
        }
    }
}

impl Default for IsolatedRuntime {
    fn default() -> Self {
        Self {
            config: VmConfig::default(),
        }
    }
}

/// State shared with the V8 near-heap-limit callback.
struct HeapLimitState {
    handle: v8::IsolateHandle,
    triggered: AtomicBool,
}

/// Terminates execution when the heap approaches its ceiling, granting 1 MB
/// of grace so the termination exception can propagate instead of aborting
/// the process.
extern "C" fn near_heap_limit_callback(
    data: *mut std::ffi::c_void,
    current_heap_limit: usize,
    _initial_heap_limit: usize,
) -> usize {
    // SAFETY: `data` points to the Box<HeapLimitState> owned by
    // `run_isolated`, which deregisters this callback before the state can
    // drop; V8 only calls this while the callback is registered.
    // `triggered` is atomic, so a shared reference suffices.
    let state = unsafe { &*data.cast::<HeapLimitState>() };
    if !state.triggered.swap(true, Ordering::SeqCst) {
        state.handle.terminate_execution();
    }
    current_heap_limit.saturating_add(1024 * 1024)
}

/// Capability strip + host shims, evaluated before any user code.
const BOOTSTRAP: &str = r#"
((ops, allowConsole, maxTimerMs) => {
    const emit = allowConsole
        ? (...args) => { ops.op_vm_log(args.map(String).join(" ")); }
        : () => {};
    globalThis.console = Object.freeze({
        log: emit, info: emit, warn: emit, error: emit, debug: emit,
    });

    const clamp = (ms) => Math.min(Math.max(Number(ms) || 0, 0), maxTimerMs);
    globalThis.sleep = (ms) => ops.op_vm_sleep(clamp(ms));
    globalThis.setTimeout = (fn, ms) => {
        ops.op_vm_sleep(clamp(ms)).then(() => fn());
        return 0;
    };

    globalThis.__host = Object.freeze({
        setResult: (json) => ops.op_vm_set_result(json),
    });

    delete globalThis.Deno;

    // Remove code-generation primitives; a reference to Function reachable
    // through any prototype chain reopens everything static analysis closed.
    delete globalThis.eval;
    const AsyncFunction = (async function(){}).constructor;
    const GeneratorFunction = (function*(){}).constructor;
    Object.defineProperty(Function.prototype, 'constructor', {
        value: undefined, configurable: false, writable: false
    });
    Object.defineProperty(AsyncFunction.prototype, 'constructor', {
        value: undefined, configurable: false, writable: false
    });
    Object.defineProperty(GeneratorFunction.prototype, 'constructor', {
        value: undefined, configurable: false, writable: false
    });
})(Deno.core.ops, %ALLOW_CONSOLE%, %MAX_TIMER_MS%);
"#;

/// Run one script to completion on the current (dedicated) thread.
///
/// `Err` here means the harness itself failed; script-level failures come
/// back as `Ok` results with `success: false`.
#[allow(clippy::too_many_lines)]
async fn run_isolated(config: &VmConfig, code: &str) -> Result<VmExecutionResult, String> {
    let heap_bytes = config.memory_limit_mb.saturating_mul(1024 * 1024);
    let mut runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![warden_vm::init_ops()],
        create_params: Some(v8::CreateParams::default().heap_limits(0, heap_bytes)),
        ..Default::default()
    });
    runtime.op_state().borrow_mut().put(ConsoleCapture(Vec::new()));

    let bootstrap = BOOTSTRAP
        .replace("%ALLOW_CONSOLE%", if config.allow_console { "true" } else { "false" })
        .replace("%MAX_TIMER_MS%", &MAX_TIMER_MS.to_string());
    runtime
        .execute_script("[warden:bootstrap]", bootstrap)
        .map_err(|e| format!("bootstrap failed: {e}"))?;

    // Heap ceiling: terminate execution instead of letting V8 abort.
    let heap_state = Box::new(HeapLimitState {
        handle: runtime.v8_isolate().thread_safe_handle(),
        triggered: AtomicBool::new(false),
    });
    runtime.v8_isolate().add_near_heap_limit_callback(
        near_heap_limit_callback,
        std::ptr::from_ref::<HeapLimitState>(&*heap_state) as *mut std::ffi::c_void,
    );

    // Wall-clock watchdog: catches CPU-bound loops the async timeout can't.
    let watchdog_handle = runtime.v8_isolate().thread_safe_handle();
    let timed_out = Arc::new(AtomicBool::new(false));
    let watchdog_timed_out = Arc::clone(&timed_out);
    let timeout = Duration::from_millis(config.timeout_ms);
    let (cancel_tx, cancel_rx) = std::sync::mpsc::channel::<()>();
    let watchdog = std::thread::spawn(move || {
        if let Err(std::sync::mpsc::RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(timeout) {
            watchdog_timed_out.store(true, Ordering::SeqCst);
            watchdog_handle.terminate_execution();
        }
    });

    let wrapped = format!(
        r#"
        (async () => {{
            try {{
                const __result = await (async () => {{ {code} }})();
                __host.setResult(JSON.stringify({{
                    ok: __result === undefined ? null : __result
                }}));
            }} catch (e) {{
                __host.setResult(JSON.stringify({{
                    error: (e && e.message) ? e.message : String(e)
                }}));
            }}
        }})();
        "#
    );

    let exec_error = match runtime.execute_script("[warden:execute]", wrapped) {
        Ok(_) => {
            match tokio::time::timeout(
                timeout,
                runtime.run_event_loop(PollEventLoopOptions::default()),
            )
            .await
            {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!("execution timed out after {} ms", config.timeout_ms)),
            }
        }
        Err(e) => Some(e.to_string()),
    };

    // The watchdog must be joined before the runtime is dropped so its
    // IsolateHandle never outlives the isolate.
    let _ = cancel_tx.send(());
    let _ = watchdog.join();

    // `heap_state` drops before `runtime` on return; the callback must be
    // detached first or V8 could invoke it against freed state.
    runtime
        .v8_isolate()
        .remove_near_heap_limit_callback(near_heap_limit_callback, 0);

    let mut heap_stats = v8::HeapStatistics::default();
    runtime.v8_isolate().get_heap_statistics(&mut heap_stats);
    let memory_usage = u64::try_from(heap_stats.used_heap_size()).ok();

    let logs = {
        let state = runtime.op_state();
        let state = state.borrow();
        state
            .try_borrow::<ConsoleCapture>()
            .map(|c| c.0.clone())
            .unwrap_or_default()
    };

    if heap_state.triggered.load(Ordering::SeqCst) {
        return Ok(VmExecutionResult::failure(
            format!("memory limit exceeded ({} MB)", config.memory_limit_mb),
            logs,
            0,
        ));
    }
    if timed_out.load(Ordering::SeqCst) {
        return Ok(VmExecutionResult::failure(
            format!("execution timed out after {} ms", config.timeout_ms),
            logs,
            0,
        ));
    }
    if let Some(message) = exec_error {
        return Ok(VmExecutionResult::failure(message, logs, 0));
    }

    let envelope = {
        let state = runtime.op_state();
        let state = state.borrow();
        state.try_borrow::<ScriptOutcome>().map(|r| r.0.clone())
    };
    let Some(envelope) = envelope else {
        return Ok(VmExecutionResult::failure(
            "script produced no result",
            logs,
            0,
        ));
    };

    let envelope: serde_json::Value =
        serde_json::from_str(&envelope).map_err(|e| format!("malformed result envelope: {e}"))?;

    if let Some(error) = envelope.get("error") {
        let message = error.as_str().unwrap_or("unknown script error").to_string();
        return Ok(VmExecutionResult::failure(message, logs, 0));
    }

    Ok(VmExecutionResult {
        success: true,
        result: envelope.get("ok").cloned(),
        logs,
        error: None,
        duration_ms: 0,
        memory_usage,
    })
}
