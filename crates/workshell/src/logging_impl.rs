//! Logging helpers for Workshell
//!
//! Scripts routinely assign credentials to variables (`GITHUB_TOKEN=...`)
//! before handing them to commands, so everything the interpreter logs about
//! variables or script text goes through [`LogConfig`] first.
//!
//! # Log Levels
//!
//! - **WARN**: aborted runs, resource limits hit
//! - **INFO**: run lifecycle (`sh` invocations, exit codes)
//! - **DEBUG**: command dispatch, assignments, loop-control signals
//! - **TRACE**: token and statement counts

use std::borrow::Cow;

const REDACTED: &str = "[REDACTED]";

/// Configuration for logging behavior
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to redact sensitive data from logs (default: true)
    pub redact_sensitive: bool,

    /// Variable name fragments that mark a value as secret (upper-case)
    pub redact_env_vars: Vec<String>,

    /// Whether to include script content in logs (default: false)
    pub log_script_content: bool,

    /// Maximum length of logged values before truncation (default: 200)
    pub max_value_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        let redact_env_vars = [
            "PASSWORD",
            "PASSWD",
            "SECRET",
            "TOKEN",
            "KEY",
            "CREDENTIAL",
            "AUTH",
            "PRIVATE",
            "SESSION",
            "COOKIE",
            "DATABASE_URL",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Self {
            redact_sensitive: true,
            redact_env_vars,
            log_script_content: false,
            max_value_length: 200,
        }
    }
}

impl LogConfig {
    /// Create a new log configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable redaction. Only for local debugging.
    pub fn unsafe_disable_redaction(mut self) -> Self {
        self.redact_sensitive = false;
        self
    }

    /// Add a variable name fragment to redact
    pub fn redact_env(mut self, pattern: &str) -> Self {
        self.redact_env_vars.push(pattern.to_uppercase());
        self
    }

    /// Log full script text instead of a size summary
    pub fn unsafe_log_scripts(mut self) -> Self {
        self.log_script_content = true;
        self
    }

    /// Set maximum length for logged values
    pub fn max_value_length(mut self, len: usize) -> Self {
        self.max_value_length = len;
        self
    }

    /// Check if a variable name looks like it holds a secret
    pub fn should_redact_env(&self, name: &str) -> bool {
        if !self.redact_sensitive {
            return false;
        }
        let upper = name.to_uppercase();
        self.redact_env_vars.iter().any(|p| upper.contains(p.as_str()))
    }

    /// Value of variable `name` as it should appear in a log line
    pub fn format_assignment<'a>(&self, name: &str, value: &'a str) -> Cow<'a, str> {
        if self.should_redact_env(name) {
            return Cow::Borrowed(REDACTED);
        }
        self.redact_value(value)
    }

    /// Redact a value if it looks like a credential, otherwise truncate it
    pub fn redact_value<'a>(&self, value: &'a str) -> Cow<'a, str> {
        if self.redact_sensitive && looks_like_token(value) {
            return Cow::Borrowed(REDACTED);
        }
        self.truncate(value)
    }

    fn truncate<'a>(&self, value: &'a str) -> Cow<'a, str> {
        if value.len() <= self.max_value_length {
            return Cow::Borrowed(value);
        }
        let mut end = self.max_value_length;
        while end > 0 && !value.is_char_boundary(end) {
            end -= 1;
        }
        Cow::Owned(format!(
            "{}...[truncated {} bytes]",
            &value[..end],
            value.len() - end
        ))
    }
}

/// Well-known API key prefixes
fn looks_like_token(value: &str) -> bool {
    let trimmed = value.trim();
    ["sk-", "ghp_", "gho_", "github_pat_", "xoxb-", "xoxp-", "AKIA", "eyJ"]
        .iter()
        .any(|prefix| trimmed.starts_with(prefix) && trimmed.len() > prefix.len() + 10)
}

/// Escape newlines and drop control characters so one log event stays one line
pub fn sanitize_for_log(input: &str) -> String {
    input
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

/// Script text for a log line, or a size summary unless content logging is on
pub fn format_script_for_log(script: &str, config: &LogConfig) -> String {
    if !config.log_script_content {
        return format!(
            "[script: {} lines, {} bytes]",
            script.lines().count(),
            script.len()
        );
    }
    let sanitized = sanitize_for_log(script);
    config.truncate(&sanitized).into_owned()
}
