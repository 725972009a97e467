//! Per-tool parameter analyzers.
//!
//! Each analyzer inspects the parameters of one family of tools and emits
//! [`RiskFactor`]s for known-dangerous patterns. Analyzers are registered
//! against tool names in the [`RiskEvaluator`](crate::RiskEvaluator)
//! registry; unknown tools get no analyzer and degrade to their base
//! classification.
//!
//! Analyzers never fail: unparseable or missing parameters simply
//! contribute no factors.

use regex::Regex;
use std::sync::LazyLock;
use warden_core::{ToolParams, param_str};

use crate::evaluation::RiskFactor;

/// A parameter analyzer for one family of tools.
///
/// Implementations must be pure: no I/O, deterministic output for a given
/// parameter map.
pub trait ToolAnalyzer: Send + Sync {
    /// Inspect the parameters and return contributing risk factors, in
    /// detection order.
    fn analyze(&self, params: &ToolParams) -> Vec<RiskFactor>;
}

/// A compiled dangerous-pattern rule.
struct PatternRule {
    pattern: Regex,
    kind: &'static str,
    description: &'static str,
    impact: u8,
}

impl PatternRule {
    fn new(pattern: &str, kind: &'static str, description: &'static str, impact: u8) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("builtin pattern must compile"),
            kind,
            description,
            impact,
        }
    }
}

fn match_rules(rules: &[PatternRule], text: &str) -> Vec<RiskFactor> {
    rules
        .iter()
        .filter(|rule| rule.pattern.is_match(text))
        .map(|rule| RiskFactor::new(rule.kind, rule.description, rule.impact))
        .collect()
}

// ---------------------------------------------------------------------------
// Shell commands
// ---------------------------------------------------------------------------

static SHELL_RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
    vec![
        PatternRule::new(
            r"(?i)\brm\b\s+(-[a-z]*r[a-z]*f|-[a-z]*f[a-z]*r)\b",
            "dangerous_command",
            "Recursive force delete",
            30,
        ),
        PatternRule::new(
            r"(?i)\bmkfs\b|\bdd\b[^|;]*\bof=/dev/",
            "dangerous_command",
            "Raw disk write or filesystem format",
            30,
        ),
        PatternRule::new(
            r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
            "fork_bomb",
            "Shell fork bomb",
            30,
        ),
        PatternRule::new(
            r"(?i)>\s*/dev/(sd|nvme|hd)",
            "dangerous_command",
            "Redirect into a block device",
            25,
        ),
        PatternRule::new(
            r"(?i)\b(curl|wget)\b[^|;&]*\|\s*(ba|z|da)?sh\b",
            "pipe_to_shell",
            "Download piped into a shell",
            25,
        ),
        PatternRule::new(
            r"(?i)\bsudo\b|\bdoas\b|\bsu\s+root\b",
            "privilege_escalation",
            "Privilege escalation",
            20,
        ),
        PatternRule::new(
            r"(?i)\bchmod\b\s+(-[a-z]+\s+)?777\b|\bchown\b\s+root\b",
            "privilege_escalation",
            "World-writable permissions or root ownership change",
            15,
        ),
        PatternRule::new(
            r"(?i)\b(shutdown|reboot|halt|poweroff)\b",
            "dangerous_command",
            "System power-state change",
            15,
        ),
        PatternRule::new(
            r"(?i)\beval\b",
            "dynamic_evaluation",
            "Shell eval of constructed input",
            10,
        ),
    ]
});

/// Analyzer for shell-execution tools (`exec`, `shell`).
///
/// Matches the `command` parameter against a library of dangerous-pattern
/// regexes: destructive filesystem operations, fork bombs, privilege
/// escalation, pipe-to-shell downloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellCommandAnalyzer;

impl ToolAnalyzer for ShellCommandAnalyzer {
    fn analyze(&self, params: &ToolParams) -> Vec<RiskFactor> {
        let Some(command) = param_str(params, "command") else {
            return Vec::new();
        };
        match_rules(&SHELL_RULES, &command)
    }
}

// ---------------------------------------------------------------------------
// Browser scripts
// ---------------------------------------------------------------------------

static SCRIPT_RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
    vec![
        PatternRule::new(
            r"\beval\s*\(",
            "dynamic_evaluation",
            "Dynamic code evaluation in script",
            25,
        ),
        PatternRule::new(
            r"new\s+Function\s*\(|\bFunction\s*\(",
            "dynamic_evaluation",
            "Function constructor in script",
            25,
        ),
        PatternRule::new(
            r"document\.cookie",
            "cookie_access",
            "Direct cookie access",
            15,
        ),
        PatternRule::new(
            r"\b(fetch|XMLHttpRequest|WebSocket)\b",
            "network_access",
            "Raw network access from script",
            10,
        ),
        PatternRule::new(
            r"\b(localStorage|sessionStorage)\b",
            "storage_access",
            "Browser storage access",
            5,
        ),
    ]
});

static EXTERNAL_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://").expect("builtin pattern must compile")
});

static LOCAL_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://(localhost|127\.0\.0\.1|\[::1\])([:/]|$)")
        .expect("builtin pattern must compile")
});

/// Analyzer for scripted-browser tools.
///
/// Flags external URL access, script presence, and dangerous JS idioms in
/// the `script` parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserScriptAnalyzer;

impl ToolAnalyzer for BrowserScriptAnalyzer {
    fn analyze(&self, params: &ToolParams) -> Vec<RiskFactor> {
        let mut factors = Vec::new();

        if let Some(url) = param_str(params, "url")
            && EXTERNAL_URL.is_match(&url)
            && !LOCAL_HOST.is_match(&url)
        {
            factors.push(RiskFactor::new(
                "external_url",
                "Navigation to an external URL",
                10,
            ));
        }

        if let Some(script) = param_str(params, "script")
            && !script.trim().is_empty()
        {
            factors.push(RiskFactor::new(
                "script_execution",
                "Script payload will run in the page",
                5,
            ));
            factors.extend(match_rules(&SCRIPT_RULES, &script));
        }

        factors
    }
}

// ---------------------------------------------------------------------------
// File paths
// ---------------------------------------------------------------------------

static SENSITIVE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^/(etc|sys|proc|boot|dev|root)(/|$)|^[a-z]:\\windows\\")
        .expect("builtin pattern must compile")
});

static CREDENTIAL_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\.ssh/|\.aws/|\.gnupg/|id_rsa|id_ed25519|\.env$|credentials|secrets?\.|\.pem$|/shadow$|/passwd$)")
        .expect("builtin pattern must compile")
});

static PATH_TRAVERSAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\./").expect("builtin pattern must compile"));

/// Analyzer for file tools (`file_read`, `file_write`, `file_delete`).
///
/// Flags access to sensitive system paths, credential files, path
/// traversal, and recursive deletes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilePathAnalyzer;

impl ToolAnalyzer for FilePathAnalyzer {
    fn analyze(&self, params: &ToolParams) -> Vec<RiskFactor> {
        let mut factors = Vec::new();

        if let Some(path) = param_str(params, "path") {
            if SENSITIVE_PATH.is_match(&path) {
                factors.push(RiskFactor::new(
                    "sensitive_path",
                    "Access to a sensitive system path",
                    20,
                ));
            }
            if CREDENTIAL_PATH.is_match(&path) {
                factors.push(RiskFactor::new(
                    "credential_access",
                    "Access to a credential file",
                    25,
                ));
            }
            if PATH_TRAVERSAL.is_match(&path) {
                factors.push(RiskFactor::new(
                    "path_traversal",
                    "Relative path traversal",
                    10,
                ));
            }
        }

        if param_str(params, "recursive").as_deref() == Some("true") {
            factors.push(RiskFactor::new(
                "recursive_operation",
                "Recursive filesystem operation",
                15,
            ));
        }

        factors
    }
}

// ---------------------------------------------------------------------------
// Network fetches
// ---------------------------------------------------------------------------

static PLAINTEXT_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^http://").expect("builtin pattern must compile"));

static INTERNAL_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[a-z]+://(localhost|127\.|0\.0\.0\.0|10\.|192\.168\.|169\.254\.|172\.(1[6-9]|2[0-9]|3[01])\.|\[::1\])|\.internal(\b|/)|metadata\.google",
    )
    .expect("builtin pattern must compile")
});

/// Analyzer for network-fetch tools.
///
/// Flags plaintext transport and internal/loopback address targets in the
/// `url` parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkAnalyzer;

impl ToolAnalyzer for NetworkAnalyzer {
    fn analyze(&self, params: &ToolParams) -> Vec<RiskFactor> {
        let Some(url) = param_str(params, "url") else {
            return Vec::new();
        };
        let mut factors = Vec::new();

        if PLAINTEXT_URL.is_match(&url) {
            factors.push(RiskFactor::new(
                "plaintext_transport",
                "Plaintext HTTP transport",
                10,
            ));
        }
        if INTERNAL_ADDRESS.is_match(&url) {
            factors.push(RiskFactor::new(
                "internal_address",
                "Internal or loopback address target",
                20,
            ));
        }

        factors
    }
}
