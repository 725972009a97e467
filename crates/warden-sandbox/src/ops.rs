//! Host ops exposed to the isolated V8 runtime.
//!
//! The bootstrap script captures these before `Deno` is deleted, so
//! sandboxed code only ever sees the frozen shims built on top of them.

use deno_core::{OpState, op2};
use std::time::Duration;

/// Hard per-timer ceiling; requested durations are clamped on both sides
/// of the boundary.
pub(crate) const MAX_TIMER_MS: u64 = 5_000;

/// Console lines captured from the sandboxed script.
pub(crate) struct ConsoleCapture(pub(crate) Vec<String>);

/// JSON result envelope set by the wrapper around user code:
/// `{"ok": value}` or `{"error": message}`.
pub(crate) struct ScriptOutcome(pub(crate) String);

#[op2(fast)]
fn op_vm_log(state: &mut OpState, #[string] message: String) {
    if let Some(capture) = state.try_borrow_mut::<ConsoleCapture>() {
        capture.0.push(message);
    }
}

#[op2(fast)]
fn op_vm_set_result(state: &mut OpState, #[string] json: String) {
    state.put(ScriptOutcome(json));
}

#[op2(async)]
async fn op_vm_sleep(#[number] ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms.min(MAX_TIMER_MS))).await;
}

deno_core::extension!(
    warden_vm,
    ops = [op_vm_log, op_vm_set_result, op_vm_sleep],
);
