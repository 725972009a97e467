//! End-to-end sandbox pipeline scenarios: a real V8 isolate for layer 1
//! with an instrumented browser stub, plus an opt-in real-browser check.

#![allow(clippy::arithmetic_side_effects)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use warden_sandbox::{
    BrowserAutomation, BrowserConfig, BrowserExecutionResult, IsolatedRuntime, SandboxOptions,
    SandboxOrchestrator, SandboxResult, ScreenshotOptions, VmConfig,
};

/// Browser stub that records calls and always succeeds.
struct CountingBrowser {
    calls: AtomicUsize,
}

impl CountingBrowser {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl BrowserAutomation for CountingBrowser {
    async fn execute(
        &self,
        _code: &str,
        url: Option<&str>,
        _capture_screenshot: bool,
    ) -> BrowserExecutionResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        BrowserExecutionResult {
            success: true,
            result: None,
            url: url.map(str::to_string),
            title: None,
            console_logs: Vec::new(),
            error: None,
            screenshot: None,
            duration_ms: 1,
        }
    }

    async fn capture_screenshot(
        &self,
        _url: &str,
        _options: &ScreenshotOptions,
    ) -> SandboxResult<String> {
        Ok(String::new())
    }

    async fn update_config(&self, _config: BrowserConfig) {}

    async fn close(&self) {}
}

fn orchestrator(browser: Arc<CountingBrowser>) -> SandboxOrchestrator {
    let vm = IsolatedRuntime::new(VmConfig::default()).unwrap();
    SandboxOrchestrator::new(Arc::new(vm), browser)
}

/// A critical static violation stops the pipeline before any code runs.
#[tokio::test]
async fn test_static_violation_aborts_before_execution() {
    warden_integration_tests::init_tracing();
    let browser = CountingBrowser::new();
    let orch = orchestrator(Arc::clone(&browser));

    let result = orch
        .execute(SandboxOptions::new("const x = eval('1 + 1'); return x;"))
        .await;

    assert!(!result.success);
    assert!(!result.layer1.static_analysis.passed);
    assert!(result.layer1.vm_execution.is_none());
    assert!(result.layer2.is_none());
    assert_eq!(browser.calls.load(Ordering::SeqCst), 0);
}

/// A script that passes static analysis but throws in the isolate stops
/// the pipeline before the browser layer.
#[tokio::test]
async fn test_vm_failure_aborts_before_browser() {
    let browser = CountingBrowser::new();
    let orch = orchestrator(Arc::clone(&browser));

    let result = orch
        .execute(SandboxOptions::new("throw new Error('runtime boom');"))
        .await;

    assert!(!result.success);
    assert!(result.layer1.static_analysis.passed);
    let vm = result.layer1.vm_execution.unwrap();
    assert!(!vm.success);
    assert!(vm.error.unwrap().contains("runtime boom"));
    assert!(result.layer2.is_none());
    assert_eq!(browser.calls.load(Ordering::SeqCst), 0);
}

/// A clean script flows through all three layers; overall success follows
/// the browser layer.
#[tokio::test]
async fn test_clean_script_reaches_browser() {
    let browser = CountingBrowser::new();
    let orch = orchestrator(Arc::clone(&browser));

    let result = orch
        .execute(
            SandboxOptions::new("console.log('probing'); return 6 * 7;")
                .with_url("https://example.com"),
        )
        .await;

    assert!(result.success, "error: {:?}", result.error);
    let vm = result.layer1.vm_execution.unwrap();
    assert!(vm.success);
    assert_eq!(vm.result, Some(serde_json::json!(42)));
    assert_eq!(vm.logs, ["probing"]);
    assert!(result.layer2.unwrap().browser_execution.success);
    assert_eq!(browser.calls.load(Ordering::SeqCst), 1);
}

/// The isolate enforces its wall-clock ceiling without affecting the host.
#[tokio::test]
async fn test_vm_timeout_is_a_layer_failure() {
    let browser = CountingBrowser::new();
    let orch = orchestrator(Arc::clone(&browser));

    let result = orch
        .execute(
            SandboxOptions::new("while (true) {}")
                .with_vm_config(VmConfig::default().with_timeout_ms(300)),
        )
        .await;

    assert!(!result.success);
    assert!(result.layer1.vm_execution.unwrap().error.unwrap().contains("timed out"));
    assert_eq!(browser.calls.load(Ordering::SeqCst), 0);
}

/// Full pipeline against a real headless browser. Skips silently when no
/// Chrome/Chromium binary is installed.
#[tokio::test]
async fn test_real_browser_roundtrip() {
    warden_integration_tests::init_tracing();
    if warden_browser::find_browser_binary().is_err() {
        eprintln!("skipping: no browser binary on PATH");
        return;
    }

    let browser = Arc::new(warden_browser::BrowserRuntime::new(BrowserConfig::default()));
    let vm = IsolatedRuntime::new(VmConfig::default()).unwrap();
    let orch = SandboxOrchestrator::new(Arc::new(vm), Arc::clone(&browser) as _);

    // The script must survive the isolate too, where no DOM exists.
    let result = orch
        .execute(
            SandboxOptions::new("console.log('probing both layers'); return 2 + 2;")
                .with_url("about:blank"),
        )
        .await;

    assert!(result.success, "error: {:?}", result.error);
    let layer2 = result.layer2.unwrap();
    assert!(layer2.browser_execution.success);

    orch.dispose().await;
}
