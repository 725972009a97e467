//! Launching an owned headless Chrome/Chromium with DevTools enabled.
//!
//! The binary is discovered on `PATH`, the process gets a throwaway profile
//! directory and a free loopback port, and the DevTools WebSocket endpoint
//! is read from `/json/version` once the process is up.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::process::{Child, Command};

use crate::error::{BrowserError, BrowserResult};

/// Binary names searched on `PATH`, in preference order.
const BINARY_CANDIDATES: &[&str] = &[
    "google-chrome-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// How long to wait for the DevTools endpoint to come up.
const STARTUP_DEADLINE: Duration = Duration::from_secs(20);

/// Poll interval while waiting for `/json/version`.
const STARTUP_POLL: Duration = Duration::from_millis(200);

/// Locate a Chrome/Chromium binary on `PATH`.
pub fn find_browser_binary() -> BrowserResult<PathBuf> {
    for candidate in BINARY_CANDIDATES {
        if let Ok(path) = which::which(candidate) {
            tracing::debug!(binary = %path.display(), "browser binary found");
            return Ok(path);
        }
    }
    Err(BrowserError::BinaryNotFound {
        tried: BINARY_CANDIDATES.join(", "),
    })
}

/// Command-line flags for a headless, automation-friendly launch.
fn launch_flags(port: u16, user_data_dir: &str, headless: bool, width: u32, height: u32) -> Vec<String> {
    let mut flags = vec![
        format!("--remote-debugging-port={port}"),
        format!("--user-data-dir={user_data_dir}"),
        format!("--window-size={width},{height}"),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-gpu".to_string(),
        "--disable-extensions".to_string(),
        "--disable-background-networking".to_string(),
        "--mute-audio".to_string(),
    ];
    if headless {
        flags.push("--headless=new".to_string());
    }
    flags
}

/// Reserve a free loopback port by binding port 0 and reading the result.
async fn free_port() -> BrowserResult<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| BrowserError::Launch {
            reason: format!("failed to reserve a debugging port: {e}"),
        })?;
    let port = listener
        .local_addr()
        .map_err(|e| BrowserError::Launch {
            reason: format!("failed to read reserved port: {e}"),
        })?
        .port();
    drop(listener);
    Ok(port)
}

/// An owned browser process with its DevTools endpoint.
///
/// The profile directory lives as long as the process handle; killing the
/// child and dropping this struct cleans both up.
pub struct BrowserProcess {
    child: Child,
    ws_url: String,
    port: u16,
    _profile_dir: TempDir,
}

impl BrowserProcess {
    /// Launch a browser and wait for its DevTools endpoint.
    pub async fn launch(headless: bool, width: u32, height: u32) -> BrowserResult<Self> {
        let binary = find_browser_binary()?;
        let port = free_port().await?;
        let profile_dir = TempDir::new().map_err(|e| BrowserError::Launch {
            reason: format!("failed to create profile directory: {e}"),
        })?;
        let profile_path = profile_dir.path().display().to_string();

        tracing::info!(binary = %binary.display(), port, headless, "launching browser");

        let child = Command::new(&binary)
            .args(launch_flags(port, &profile_path, headless, width, height))
            .arg("about:blank")
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BrowserError::Launch {
                reason: format!("failed to spawn {}: {e}", binary.display()),
            })?;

        let ws_url = wait_for_devtools(port).await?;
        tracing::info!(port, ws_url = %ws_url, "browser DevTools endpoint ready");

        Ok(Self {
            child,
            ws_url,
            port,
            _profile_dir: profile_dir,
        })
    }

    /// The browser-level DevTools WebSocket URL.
    #[must_use]
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// The remote-debugging port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Terminate the browser process.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!(error = %e, "failed to kill browser process");
        }
    }
}

impl std::fmt::Debug for BrowserProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserProcess")
            .field("port", &self.port)
            .field("ws_url", &self.ws_url)
            .finish_non_exhaustive()
    }
}

/// Poll `/json/version` until the DevTools WebSocket URL is published.
async fn wait_for_devtools(port: u16) -> BrowserResult<String> {
    let url = format!("http://127.0.0.1:{port}/json/version");
    let client = reqwest::Client::new();
    let started = Instant::now();

    loop {
        if let Ok(response) = client.get(&url).send().await {
            if let Ok(body) = response.json::<serde_json::Value>().await {
                if let Some(ws_url) = body
                    .get("webSocketDebuggerUrl")
                    .and_then(serde_json::Value::as_str)
                {
                    return Ok(ws_url.to_string());
                }
            }
        }
        if started.elapsed() > STARTUP_DEADLINE {
            return Err(BrowserError::Launch {
                reason: format!(
                    "DevTools endpoint did not come up on port {port} within {STARTUP_DEADLINE:?}"
                ),
            });
        }
        tokio::time::sleep(STARTUP_POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_flag_is_conditional() {
        let headless = launch_flags(9222, "/tmp/profile", true, 1280, 720);
        assert!(headless.iter().any(|f| f == "--headless=new"));
        assert!(headless.iter().any(|f| f == "--remote-debugging-port=9222"));
        assert!(headless.iter().any(|f| f == "--window-size=1280,720"));

        let headed = launch_flags(9222, "/tmp/profile", false, 800, 600);
        assert!(!headed.iter().any(|f| f == "--headless=new"));
    }

    #[tokio::test]
    async fn test_free_port_is_nonzero() {
        let port = free_port().await.unwrap();
        assert_ne!(port, 0);
    }
}
