//! The browser runtime — a lazily-launched singleton Chrome with one fresh
//! page (DevTools target) per call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock, broadcast};
use warden_core::Timestamp;
use warden_sandbox::{
    BrowserAutomation, BrowserConfig, BrowserExecutionResult, ConsoleLog, SandboxError,
    SandboxResult, ScreenshotOptions,
};

use crate::cdp::{CdpConnection, CdpEvent};
use crate::error::{BrowserError, BrowserResult};
use crate::launcher::BrowserProcess;

/// Aborts the wrapped task when dropped, so an early return can never
/// leave a collector running against the shared event stream.
struct CollectorGuard(tokio::task::JoinHandle<()>);

impl Drop for CollectorGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A live browser session: the owned process and its DevTools connection.
struct Session {
    process: BrowserProcess,
    connection: Arc<CdpConnection>,
}

/// One attached page, closed by the caller on every path.
struct Page {
    connection: Arc<CdpConnection>,
    target_id: String,
    session_id: String,
    timeout: Duration,
}

impl Page {
    /// Create a blank target and attach to it in flat session mode.
    async fn open(connection: Arc<CdpConnection>, timeout: Duration) -> BrowserResult<Self> {
        let created = connection
            .send(
                "Target.createTarget",
                json!({ "url": "about:blank" }),
                None,
                timeout,
            )
            .await?;
        let target_id = created
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol("createTarget returned no targetId".into()))?
            .to_string();

        let attached = connection
            .send(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
                timeout,
            )
            .await?;
        let session_id = attached
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol("attachToTarget returned no sessionId".into()))?
            .to_string();

        Ok(Self {
            connection,
            target_id,
            session_id,
            timeout,
        })
    }

    /// Send a session-scoped command to this page.
    async fn send(&self, method: &str, params: Value) -> BrowserResult<Value> {
        self.connection
            .send(method, params, Some(&self.session_id), self.timeout)
            .await
    }

    /// Navigate and wait for the load event.
    async fn navigate(&self, url: &str, mut events: broadcast::Receiver<CdpEvent>) -> BrowserResult<()> {
        let response = self.send("Page.navigate", json!({ "url": url })).await?;
        if let Some(error_text) = response.get("errorText").and_then(Value::as_str) {
            if !error_text.is_empty() {
                return Err(BrowserError::Protocol(format!(
                    "navigation to {url} failed: {error_text}"
                )));
            }
        }

        let started = Instant::now();
        loop {
            let remaining = self.timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(BrowserError::Timeout {
                    method: "Page.loadEventFired".to_string(),
                    timeout: self.timeout,
                });
            }
            match tokio::time::timeout(remaining, events.recv()).await {
                Ok(Ok(event))
                    if event.method == "Page.loadEventFired"
                        && event.session_id.as_deref() == Some(&self.session_id) =>
                {
                    return Ok(());
                }
                Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => {}
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(BrowserError::Protocol(
                        "event stream closed during navigation".to_string(),
                    ));
                }
                Err(_) => {
                    return Err(BrowserError::Timeout {
                        method: "Page.loadEventFired".to_string(),
                        timeout: self.timeout,
                    });
                }
            }
        }
    }

    /// Close the underlying target. Best-effort; failures are logged only.
    async fn close(&self) {
        let result = self
            .connection
            .send(
                "Target.closeTarget",
                json!({ "targetId": self.target_id }),
                None,
                self.timeout,
            )
            .await;
        if let Err(e) = result {
            tracing::warn!(target = %self.target_id, error = %e, "failed to close page");
        }
    }
}

/// Executes scripts inside a real browser page over the DevTools protocol.
///
/// The browser process is launched on first use and shared across calls;
/// each call gets its own page, torn down on every outcome. `close()`
/// disposes the process; the next call would lazily relaunch it.
pub struct BrowserRuntime {
    config: RwLock<BrowserConfig>,
    session: Mutex<Option<Session>>,
}

impl BrowserRuntime {
    /// Runtime with the given configuration. No browser is launched yet.
    #[must_use]
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config: RwLock::new(config),
            session: Mutex::new(None),
        }
    }

    /// Launch the browser if it is not already running.
    async fn ensure_connection(&self) -> BrowserResult<Arc<CdpConnection>> {
        let mut session = self.session.lock().await;
        if let Some(live) = session.as_ref() {
            return Ok(Arc::clone(&live.connection));
        }

        let config = self.config.read().await.clone();
        let process = BrowserProcess::launch(
            config.headless,
            config.viewport_width,
            config.viewport_height,
        )
        .await?;
        let connection = Arc::new(CdpConnection::connect(process.ws_url()).await?);
        let handle = Arc::clone(&connection);
        *session = Some(Session {
            process,
            connection,
        });
        Ok(handle)
    }

    /// Open a page against the shared browser.
    async fn open_page(&self) -> BrowserResult<Page> {
        let timeout = Duration::from_millis(self.config.read().await.timeout_ms);
        let connection = self.ensure_connection().await?;
        Page::open(connection, timeout).await
    }

    /// The whole execution against one page; the page is closed by the
    /// caller regardless of the outcome here.
    async fn run_in_page(
        &self,
        page: &Page,
        code: &str,
        url: Option<&str>,
        capture_screenshot: bool,
        console_logs: &Arc<std::sync::Mutex<Vec<ConsoleLog>>>,
    ) -> BrowserResult<BrowserExecutionResult> {
        // Subscribe before enabling domains so no output is lost.
        let events = page.connection.subscribe();
        let navigation_events = page.connection.subscribe();
        let collector = CollectorGuard(spawn_console_collector(
            events,
            page.session_id.clone(),
            Arc::clone(console_logs),
        ));

        page.send("Runtime.enable", json!({})).await?;
        page.send("Page.enable", json!({})).await?;

        if let Some(url) = url {
            page.navigate(url, navigation_events).await?;
        }

        let wrapped = format!("(async () => {{ {code} }})()");
        let evaluated = page
            .send(
                "Runtime.evaluate",
                json!({
                    "expression": wrapped,
                    "awaitPromise": true,
                    "returnByValue": true,
                }),
            )
            .await?;

        let (result, error) = if let Some(exception) = evaluated.get("exceptionDetails") {
            (None, Some(exception_message(exception)))
        } else {
            (
                evaluated.pointer("/result/value").cloned(),
                None,
            )
        };

        let info = page
            .send(
                "Runtime.evaluate",
                json!({
                    "expression": "({ url: location.href, title: document.title })",
                    "returnByValue": true,
                }),
            )
            .await
            .ok();
        let page_url = info
            .as_ref()
            .and_then(|v| v.pointer("/result/value/url"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let title = info
            .as_ref()
            .and_then(|v| v.pointer("/result/value/title"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let screenshot = if capture_screenshot && error.is_none() {
            let shot = page
                .send("Page.captureScreenshot", json!({ "format": "png" }))
                .await?;
            shot.get("data").and_then(Value::as_str).map(str::to_string)
        } else {
            None
        };

        // Give trailing console events a moment to arrive before stopping.
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(collector);

        let logs = console_logs
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default();

        Ok(BrowserExecutionResult {
            success: error.is_none(),
            result,
            url: page_url,
            title,
            console_logs: logs,
            error,
            screenshot,
            duration_ms: 0,
        })
    }

    async fn screenshot_in_page(
        &self,
        page: &Page,
        url: &str,
        options: &ScreenshotOptions,
    ) -> BrowserResult<String> {
        let navigation_events = page.connection.subscribe();
        page.send("Page.enable", json!({})).await?;
        page.navigate(url, navigation_events).await?;

        let mut params = json!({
            "format": "png",
            "captureBeyondViewport": options.full_page,
        });
        if let Some(selector) = &options.selector {
            let clip = self.selector_clip(page, selector).await?;
            if let Some(map) = params.as_object_mut() {
                map.insert("clip".to_string(), clip);
            }
        }

        let shot = page.send("Page.captureScreenshot", params).await?;
        shot.get("data")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Protocol("captureScreenshot returned no data".into()))
    }

    /// Resolve a CSS selector to a capture clip rectangle.
    async fn selector_clip(&self, page: &Page, selector: &str) -> BrowserResult<Value> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({sel}); \
             if (!el) return null; const r = el.getBoundingClientRect(); \
             return {{ x: r.x, y: r.y, width: r.width, height: r.height }}; }})()",
            sel = serde_json::to_string(selector)
                .map_err(|e| BrowserError::Protocol(e.to_string()))?,
        );
        let evaluated = page
            .send(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true }),
            )
            .await?;
        let rect = evaluated.pointer("/result/value").cloned();
        match rect {
            Some(Value::Object(mut map)) => {
                map.insert("scale".to_string(), json!(1));
                Ok(Value::Object(map))
            }
            _ => Err(BrowserError::Protocol(format!(
                "selector {selector:?} matched no element"
            ))),
        }
    }

    /// Execute `code` in a fresh page, folding failures into the result.
    pub async fn execute(
        &self,
        code: &str,
        url: Option<&str>,
        capture_screenshot: bool,
    ) -> BrowserExecutionResult {
        let started = Instant::now();
        tracing::debug!(code_len = code.len(), url, "browser execution starting");

        let console_logs = Arc::new(std::sync::Mutex::new(Vec::new()));
        let outcome = match self.open_page().await {
            Ok(page) => {
                let outcome = self
                    .run_in_page(&page, code, url, capture_screenshot, &console_logs)
                    .await;
                page.close().await;
                outcome
            }
            Err(e) => Err(e),
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok(mut result) => {
                result.duration_ms = duration_ms;
                tracing::debug!(
                    success = result.success,
                    duration_ms,
                    "browser execution finished"
                );
                result
            }
            Err(e) => {
                tracing::warn!(error = %e, "browser execution failed");
                BrowserExecutionResult {
                    success: false,
                    result: None,
                    url: url.map(str::to_string),
                    title: None,
                    console_logs: console_logs
                        .lock()
                        .map(|l| l.clone())
                        .unwrap_or_default(),
                    error: Some(e.to_string()),
                    screenshot: None,
                    duration_ms,
                }
            }
        }
    }

    /// Capture a screenshot of `url` without running any script.
    pub async fn capture_screenshot(
        &self,
        url: &str,
        options: &ScreenshotOptions,
    ) -> BrowserResult<String> {
        let page = self.open_page().await?;
        let outcome = self.screenshot_in_page(&page, url, options).await;
        page.close().await;
        outcome
    }

    /// Replace the configuration. In-flight executions keep the old one.
    pub async fn update_config(&self, config: BrowserConfig) {
        *self.config.write().await = config;
    }

    /// Shut down the owned browser process, if any.
    pub async fn close(&self) {
        let mut session = self.session.lock().await;
        if let Some(mut live) = session.take() {
            tracing::info!("shutting down browser");
            live.connection.shutdown().await;
            live.process.shutdown().await;
        }
    }
}

impl Default for BrowserRuntime {
    fn default() -> Self {
        Self::new(BrowserConfig::default())
    }
}

impl std::fmt::Debug for BrowserRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserRuntime").finish_non_exhaustive()
    }
}

#[async_trait]
impl BrowserAutomation for BrowserRuntime {
    async fn execute(
        &self,
        code: &str,
        url: Option<&str>,
        capture_screenshot: bool,
    ) -> BrowserExecutionResult {
        Self::execute(self, code, url, capture_screenshot).await
    }

    async fn capture_screenshot(
        &self,
        url: &str,
        options: &ScreenshotOptions,
    ) -> SandboxResult<String> {
        Self::capture_screenshot(self, url, options)
            .await
            .map_err(|e| SandboxError::Browser(e.to_string()))
    }

    async fn update_config(&self, config: BrowserConfig) {
        Self::update_config(self, config).await;
    }

    async fn close(&self) {
        Self::close(self).await;
    }
}

/// Collect console and exception events for one session into `sink`.
fn spawn_console_collector(
    mut events: broadcast::Receiver<CdpEvent>,
    session_id: String,
    sink: Arc<std::sync::Mutex<Vec<ConsoleLog>>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "console collector lagged, events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if event.session_id.as_deref() != Some(session_id.as_str()) {
                continue;
            }
            let entry = match event.method.as_str() {
                "Runtime.consoleAPICalled" => Some(console_entry(&event.params)),
                "Runtime.exceptionThrown" => Some(ConsoleLog {
                    kind: "error".to_string(),
                    message: exception_message(
                        event.params.get("exceptionDetails").unwrap_or(&Value::Null),
                    ),
                    timestamp: Timestamp::now(),
                }),
                _ => None,
            };
            if let Some(entry) = entry {
                if let Ok(mut sink) = sink.lock() {
                    sink.push(entry);
                }
            }
        }
    })
}

/// Render a `Runtime.consoleAPICalled` event into one log line.
fn console_entry(params: &Value) -> ConsoleLog {
    let kind = params
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("log")
        .to_string();
    let message = params
        .get("args")
        .and_then(Value::as_array)
        .map(|args| {
            args.iter()
                .map(render_remote_object)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    ConsoleLog {
        kind,
        message,
        timestamp: Timestamp::now(),
    }
}

/// Render a CDP RemoteObject the way a console would.
fn render_remote_object(arg: &Value) -> String {
    if let Some(value) = arg.get("value") {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    } else if let Some(description) = arg.get("description").and_then(Value::as_str) {
        description.to_string()
    } else {
        "undefined".to_string()
    }
}

/// Summarize a CDP `exceptionDetails` object into one line.
fn exception_message(details: &Value) -> String {
    details
        .pointer("/exception/description")
        .or_else(|| details.pointer("/exception/value"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            details
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or("uncaught exception")
                .to_string()
        })
}
