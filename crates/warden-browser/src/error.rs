use std::time::Duration;

/// Errors from the browser layer's plumbing.
///
/// Script-level failures (evaluation exceptions, navigation errors inside a
/// page) come back inside `BrowserExecutionResult`, not here.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    /// No supported browser binary was found on the host.
    #[error("no Chrome/Chromium binary found (tried: {tried})")]
    BinaryNotFound {
        /// Candidate names that were searched.
        tried: String,
    },

    /// The browser process failed to start or expose DevTools.
    #[error("failed to launch browser: {reason}")]
    Launch {
        /// What went wrong.
        reason: String,
    },

    /// The DevTools WebSocket connection could not be established.
    #[error("failed to connect to {url}: {reason}")]
    ConnectionFailed {
        /// The WebSocket endpoint.
        url: String,
        /// What went wrong.
        reason: String,
    },

    /// A DevTools command did not answer in time.
    #[error("CDP command {method} timed out after {timeout:?}")]
    Timeout {
        /// The command method.
        method: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The browser answered a command with an error.
    #[error("CDP error {code}: {message}")]
    Cdp {
        /// DevTools error code.
        code: i64,
        /// DevTools error message.
        message: String,
    },

    /// The DevTools stream misbehaved (serialization, closed channel).
    #[error("CDP protocol error: {0}")]
    Protocol(String),
}

/// Result type for browser operations.
pub type BrowserResult<T> = Result<T, BrowserError>;
