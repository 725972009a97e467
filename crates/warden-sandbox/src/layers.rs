//! Execution-layer contracts — the trait seams between the orchestrator
//! and the concrete runtimes, plus the browser layer's result types.
//!
//! The browser implementation lives in its own crate; this module defines
//! everything the pipeline needs to talk to it, so the orchestrator can be
//! tested against stubs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use warden_core::Timestamp;

use crate::error::SandboxResult;
use crate::vm::{IsolatedRuntime, VmConfig, VmExecutionResult};

/// Layer-1 execution: a resource-bounded, capability-stripped interpreter.
#[async_trait]
pub trait ScriptRuntime: Send + Sync {
    /// Execute a script, optionally overriding the runtime's limits.
    /// Failures are folded into the result, never returned as errors.
    async fn execute(&self, code: &str, config: Option<VmConfig>) -> VmExecutionResult;
}

#[async_trait]
impl ScriptRuntime for IsolatedRuntime {
    async fn execute(&self, code: &str, config: Option<VmConfig>) -> VmExecutionResult {
        self.execute_with(code, config).await
    }
}

/// Configuration for the browser layer. Updates apply to subsequent
/// executions, never in-flight ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run the browser without a visible window.
    pub headless: bool,
    /// Per-operation ceiling (navigation, evaluation) in milliseconds.
    pub timeout_ms: u64,
    /// Viewport width in pixels.
    pub viewport_width: u32,
    /// Viewport height in pixels.
    pub viewport_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            timeout_ms: 30_000,
            viewport_width: 1280,
            viewport_height: 720,
        }
    }
}

impl BrowserConfig {
    /// Set headless mode.
    #[must_use]
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set the per-operation ceiling.
    #[must_use]
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Set the viewport size.
    #[must_use]
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }
}

/// One console line captured from a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleLog {
    /// Console method kind (`log`, `warn`, `error`, ...).
    pub kind: String,
    /// The rendered message.
    pub message: String,
    /// When the line was observed.
    pub timestamp: Timestamp,
}

/// Outcome of one browser-layer execution. Failures are reported here,
/// never as `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserExecutionResult {
    /// Whether navigation and evaluation completed.
    pub success: bool,
    /// The evaluated script's completion value, when it produced one.
    pub result: Option<serde_json::Value>,
    /// Final page URL, when known.
    pub url: Option<String>,
    /// Page title, when known.
    pub title: Option<String>,
    /// Console output observed during the execution, in order.
    pub console_logs: Vec<ConsoleLog>,
    /// What went wrong, when `success` is false.
    pub error: Option<String>,
    /// Base64-encoded PNG, when a screenshot was requested and captured.
    pub screenshot: Option<String>,
    /// Wall-clock execution time in milliseconds.
    pub duration_ms: u64,
}

/// Options for a standalone screenshot capture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotOptions {
    /// Capture the full scrollable page instead of the viewport.
    pub full_page: bool,
    /// CSS selector to clip the capture to, when set.
    pub selector: Option<String>,
}

/// Layer-2 execution: a real browser reached over a remote-debugging
/// protocol. The implementation owns a single long-lived browser process
/// and gives each call a fresh page.
#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    /// Navigate (when `url` is given) and evaluate `code` in the page.
    async fn execute(
        &self,
        code: &str,
        url: Option<&str>,
        capture_screenshot: bool,
    ) -> BrowserExecutionResult;

    /// Capture a screenshot of `url` without running any script.
    async fn capture_screenshot(
        &self,
        url: &str,
        options: &ScreenshotOptions,
    ) -> SandboxResult<String>;

    /// Replace the configuration for subsequent executions.
    async fn update_config(&self, config: BrowserConfig);

    /// Shut down the underlying browser process.
    async fn close(&self);
}
