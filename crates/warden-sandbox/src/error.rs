/// Errors that can occur inside the sandbox subsystem.
///
/// Layer failures (script errors, timeouts, memory exhaustion, navigation
/// failures) are NOT errors — they come back as `success: false` results
/// scoped to the failing layer. This enum covers contract violations and
/// failures outside any layer's result envelope.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// A configuration value is invalid (checked at construction).
    #[error("invalid sandbox configuration: {param} {reason}")]
    InvalidConfig {
        /// The offending parameter.
        param: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The browser automation layer failed outside a script execution
    /// (e.g. a standalone screenshot capture).
    #[error("browser automation error: {0}")]
    Browser(String),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;
