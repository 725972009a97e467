//! The sandbox orchestrator — composes static analysis, the isolated
//! runtime, and the browser layer into an abort-early pipeline.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::analyzer::{StaticAnalysisResult, StaticAnalyzer, StaticRule};
use crate::error::SandboxResult;
use crate::layers::{
    BrowserAutomation, BrowserConfig, BrowserExecutionResult, ScreenshotOptions, ScriptRuntime,
};
use crate::vm::{VmConfig, VmExecutionResult};

/// Options for one full pipeline run.
#[derive(Debug, Clone, Default)]
pub struct SandboxOptions {
    /// The script to execute.
    pub code: String,
    /// Static rules replacing the default set for this run.
    pub static_rules: Option<Vec<StaticRule>>,
    /// Per-run override for the isolated runtime's limits.
    pub vm_config: Option<VmConfig>,
    /// Browser configuration applied before the browser layer runs.
    pub browser_config: Option<BrowserConfig>,
    /// Capture a screenshot at the end of the browser layer.
    pub capture_screenshot: bool,
    /// Page to navigate to before evaluating in the browser.
    pub url: Option<String>,
}

impl SandboxOptions {
    /// Options for `code` with everything else defaulted.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    /// Replace the static rule set for this run.
    #[must_use]
    pub fn with_static_rules(mut self, rules: Vec<StaticRule>) -> Self {
        self.static_rules = Some(rules);
        self
    }

    /// Override the isolated runtime's limits for this run.
    #[must_use]
    pub fn with_vm_config(mut self, config: VmConfig) -> Self {
        self.vm_config = Some(config);
        self
    }

    /// Apply a browser configuration before the browser layer runs.
    #[must_use]
    pub fn with_browser_config(mut self, config: BrowserConfig) -> Self {
        self.browser_config = Some(config);
        self
    }

    /// Request a screenshot from the browser layer.
    #[must_use]
    pub fn with_screenshot(mut self, capture: bool) -> Self {
        self.capture_screenshot = capture;
        self
    }

    /// Navigate to `url` before evaluating in the browser.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Results from the untrusting layers: static analysis and, when it ran,
/// the isolated runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer1 {
    /// Static analysis outcome. Always present.
    pub static_analysis: StaticAnalysisResult,
    /// Isolated runtime outcome; absent when static analysis aborted the
    /// pipeline.
    pub vm_execution: Option<VmExecutionResult>,
}

/// Results from the trusting layer: the real browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer2 {
    /// Browser execution outcome.
    pub browser_execution: BrowserExecutionResult,
}

/// Aggregate outcome of a pipeline run.
///
/// `layer2` is present iff the isolated runtime succeeded and no critical
/// static violation occurred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxExecuteResult {
    /// Overall success: the browser layer ran and succeeded.
    pub success: bool,
    /// Layer-1 results.
    pub layer1: Layer1,
    /// Layer-2 results, when the pipeline reached the browser.
    pub layer2: Option<Layer2>,
    /// Total pipeline wall-clock time in milliseconds.
    pub total_duration_ms: u64,
    /// One-line failure summary, when `success` is false.
    pub error: Option<String>,
}

/// The pipeline's internal outcome, so the abort-early contract is carried
/// by the type rather than by control-flow discipline.
enum PipelineOutcome {
    StaticFailed(StaticAnalysisResult),
    VmFailed(StaticAnalysisResult, VmExecutionResult),
    Completed(StaticAnalysisResult, VmExecutionResult, BrowserExecutionResult),
}

/// Composes the three execution layers with abort-early semantics and owns
/// the browser layer's lifecycle.
pub struct SandboxOrchestrator {
    analyzer: StaticAnalyzer,
    vm: Arc<dyn ScriptRuntime>,
    browser: Arc<dyn BrowserAutomation>,
    disposed: AtomicBool,
}

impl SandboxOrchestrator {
    /// Build an orchestrator over concrete layer implementations.
    #[must_use]
    pub fn new(vm: Arc<dyn ScriptRuntime>, browser: Arc<dyn BrowserAutomation>) -> Self {
        Self {
            analyzer: StaticAnalyzer::new(),
            vm,
            browser,
            disposed: AtomicBool::new(false),
        }
    }

    /// Replace the default static analyzer.
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: StaticAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Run the full pipeline: static analysis, isolated runtime, browser.
    pub async fn execute(&self, options: SandboxOptions) -> SandboxExecuteResult {
        let started = Instant::now();
        let span = tracing::info_span!(
            "sandbox_execute",
            code_len = options.code.len(),
            url = options.url.as_deref(),
        );
        let _guard = span.enter();

        let outcome = self.run_pipeline(&options).await;
        let total_duration_ms =
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            PipelineOutcome::StaticFailed(static_analysis) => {
                let rules = static_analysis.critical_rule_names().join(", ");
                tracing::warn!(rules = %rules, "pipeline aborted by static analysis");
                SandboxExecuteResult {
                    success: false,
                    layer1: Layer1 {
                        static_analysis,
                        vm_execution: None,
                    },
                    layer2: None,
                    total_duration_ms,
                    error: Some(format!("static analysis failed: {rules}")),
                }
            }
            PipelineOutcome::VmFailed(static_analysis, vm_execution) => {
                let error = vm_execution
                    .error
                    .clone()
                    .unwrap_or_else(|| "isolated execution failed".to_string());
                tracing::warn!(error = %error, "pipeline aborted by isolated runtime");
                SandboxExecuteResult {
                    success: false,
                    layer1: Layer1 {
                        static_analysis,
                        vm_execution: Some(vm_execution),
                    },
                    layer2: None,
                    total_duration_ms,
                    error: Some(format!("isolated execution failed: {error}")),
                }
            }
            PipelineOutcome::Completed(static_analysis, vm_execution, browser_execution) => {
                let success = browser_execution.success;
                let error = if success {
                    None
                } else {
                    Some(format!(
                        "browser execution failed: {}",
                        browser_execution
                            .error
                            .as_deref()
                            .unwrap_or("unknown error")
                    ))
                };
                tracing::info!(
                    success,
                    total_duration_ms,
                    vm_ms = vm_execution.duration_ms,
                    browser_ms = browser_execution.duration_ms,
                    "pipeline finished"
                );
                SandboxExecuteResult {
                    success,
                    layer1: Layer1 {
                        static_analysis,
                        vm_execution: Some(vm_execution),
                    },
                    layer2: Some(Layer2 { browser_execution }),
                    total_duration_ms,
                    error,
                }
            }
        }
    }

    async fn run_pipeline(&self, options: &SandboxOptions) -> PipelineOutcome {
        let static_analysis = match &options.static_rules {
            Some(rules) => self.analyzer.analyze_with_rules(&options.code, rules),
            None => self.analyzer.analyze(&options.code),
        };
        if !static_analysis.passed {
            return PipelineOutcome::StaticFailed(static_analysis);
        }

        let vm_execution = self.vm.execute(&options.code, options.vm_config).await;
        if !vm_execution.success {
            return PipelineOutcome::VmFailed(static_analysis, vm_execution);
        }

        if let Some(config) = options.browser_config.clone() {
            self.browser.update_config(config).await;
        }
        let browser_execution = self
            .browser
            .execute(
                &options.code,
                options.url.as_deref(),
                options.capture_screenshot,
            )
            .await;

        PipelineOutcome::Completed(static_analysis, vm_execution, browser_execution)
    }

    /// Run only static analysis.
    #[must_use]
    pub fn analyze(&self, code: &str, rules: Option<&[StaticRule]>) -> StaticAnalysisResult {
        match rules {
            Some(rules) => self.analyzer.analyze_with_rules(code, rules),
            None => self.analyzer.analyze(code),
        }
    }

    /// Run only the isolated runtime.
    pub async fn execute_in_vm(
        &self,
        code: &str,
        config: Option<VmConfig>,
    ) -> VmExecutionResult {
        self.vm.execute(code, config).await
    }

    /// Run only the browser layer.
    pub async fn execute_in_browser(
        &self,
        code: &str,
        url: Option<&str>,
        capture_screenshot: bool,
    ) -> BrowserExecutionResult {
        self.browser.execute(code, url, capture_screenshot).await
    }

    /// Capture a screenshot without running any script.
    pub async fn capture_screenshot(
        &self,
        url: &str,
        options: &ScreenshotOptions,
    ) -> SandboxResult<String> {
        self.browser.capture_screenshot(url, options).await
    }

    /// Release the owned browser process. Safe to call more than once;
    /// only the first call shuts the browser down.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            tracing::debug!("orchestrator already disposed");
            return;
        }
        tracing::info!("disposing sandbox orchestrator");
        self.browser.close().await;
    }
}

impl fmt::Debug for SandboxOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxOrchestrator")
            .field("disposed", &self.disposed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
