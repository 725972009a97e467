//! Warden Sandbox - Layered execution of untrusted scripts.
//!
//! Script payloads an agent wants to run pass through successive,
//! increasingly-trusting environments, aborting as soon as any layer
//! signals unacceptable risk:
//!
//! 1. [`StaticAnalyzer`] — pattern scan of the source; a `Critical`
//!    violation stops everything before any code runs.
//! 2. [`IsolatedRuntime`] — a capability-stripped V8 isolate with a heap
//!    ceiling and a wall-clock watchdog; no filesystem, network, process,
//!    or code-generation access.
//! 3. The browser layer (behind [`BrowserAutomation`]) — a real page in a
//!    headless browser, reached only if both earlier layers pass.
//!
//! [`SandboxOrchestrator`] composes the three; the runtimes sit behind
//! traits so the pipeline can be exercised against stubs.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod analyzer;
/// Error types for the sandbox module.
pub mod error;
pub mod layers;
mod ops;
pub mod orchestrator;
pub mod vm;

pub use analyzer::{StaticAnalysisResult, StaticAnalyzer, StaticRule, Violation};
pub use error::{SandboxError, SandboxResult};
pub use layers::{
    BrowserAutomation, BrowserConfig, BrowserExecutionResult, ConsoleLog, ScreenshotOptions,
    ScriptRuntime,
};
pub use orchestrator::{
    Layer1, Layer2, SandboxExecuteResult, SandboxOptions, SandboxOrchestrator,
};
pub use vm::{IsolatedRuntime, VmConfig, VmExecutionResult};
