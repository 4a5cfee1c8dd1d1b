//! Workshell - embedded POSIX-like shell for workspace scripts
//!
//! Scripts run against a virtual filesystem with a fixed set of commands.
//! Nothing touches the host.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use workshell::{InMemoryFs, Shell};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let fs = InMemoryFs::new().with_file("/home/user/greet.sh", "echo \"hello $1\"\n");
//!     let shell = Shell::builder().fs(Arc::new(fs)).build();
//!
//!     let output = shell.run("sh greet.sh world").await?;
//!     assert_eq!(output.stdout, "hello world\n");
//!     assert_eq!(output.code, 0);
//!     Ok(())
//! }
//! ```
//!
//! For REPL-style use, [`Shell::exec`] runs inline text against a session
//! that keeps its variables and working directory between calls.

mod builtins;
mod error;
mod fs;
mod interpreter;
mod limits;
mod logging_impl;
mod parser;

pub use async_trait::async_trait;
pub use builtins::{Builtin, Context as BuiltinContext, Registry};
pub use error::{Error, Result};
pub use fs::{DirEntry, FileSystem, FileType, InMemoryFs, Metadata};
pub use interpreter::{
    AbortHandle, ControlFlow, ExecResult, ExecutionContext, FdTable, ShellOptions, Sink,
};
pub use limits::{ExecutionCounters, ExecutionLimits, LimitExceeded};
pub use logging_impl::{LogConfig, format_script_for_log, sanitize_for_log};
pub use parser::{Statement, Token, TokenKind, parse_script, tokenize};

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use interpreter::Interpreter;
use parser::Word;

const DEFAULT_CWD: &str = "/home/user";

/// Result of [`Shell::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

impl From<ExecResult> for ScriptOutput {
    fn from(result: ExecResult) -> Self {
        Self {
            stdout: result.stdout,
            stderr: result.stderr,
            code: result.exit_code,
        }
    }
}

/// Main entry point for Workshell.
pub struct Shell {
    interpreter: Interpreter,
    env: HashMap<String, String>,
    cwd: PathBuf,
    errexit: bool,
    /// Context kept between [`Shell::exec`] calls
    session: ExecutionContext,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell {
    /// Create a shell with an empty in-memory filesystem and default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new ShellBuilder for customized configuration.
    pub fn builder() -> ShellBuilder {
        ShellBuilder::default()
    }

    /// The filesystem scripts run against.
    pub fn fs(&self) -> Arc<dyn FileSystem> {
        Arc::clone(self.interpreter.fs())
    }

    /// Run a command line of the form `sh <script> [args...]`.
    ///
    /// `bash` is accepted in place of `sh`. The script is read from the
    /// virtual filesystem (relative to the shell's cwd) and parsed before
    /// anything runs. Script problems come back as output, not `Err`:
    /// a missing file is code 127, a syntax error is code 2 with
    /// `sh: <path>: line N: <message>`. `Err` is reserved for resource limits
    /// and internal failures.
    pub async fn run(&self, command_line: &str) -> Result<ScriptOutput> {
        self.run_with_abort(command_line, &AbortHandle::new()).await
    }

    /// [`Shell::run`], cancellable through `abort`.
    ///
    /// The handle belongs to this run alone. Once it is aborted the run stops
    /// before its next command and reports the output so far with code 130.
    pub async fn run_with_abort(
        &self,
        command_line: &str,
        abort: &AbortHandle,
    ) -> Result<ScriptOutput> {
        let words = split_command_line(command_line).unwrap_or_default();
        match words.split_first() {
            Some((shell, rest)) if shell == "sh" || shell == "bash" => match rest.split_first() {
                Some((path, args)) => self.run_script_with_abort(path, args, abort).await,
                None => Ok(usage()),
            },
            _ => Ok(usage()),
        }
    }

    /// Run the script at `path` with positional arguments `args`.
    pub async fn run_script(&self, path: &str, args: &[String]) -> Result<ScriptOutput> {
        self.run_script_with_abort(path, args, &AbortHandle::new()).await
    }

    /// [`Shell::run_script`], cancellable through `abort`.
    pub async fn run_script_with_abort(
        &self,
        path: &str,
        args: &[String],
        abort: &AbortHandle,
    ) -> Result<ScriptOutput> {
        tracing::info!(script = %path, args = args.len(), "run");

        let statements = match self.interpreter.load_script(&self.cwd, path).await {
            Ok(statements) => statements,
            Err(failure) => {
                tracing::info!(script = %path, exit_code = failure.exit_code, "script not runnable");
                return Ok(failure.into());
            }
        };

        let mut ctx = ExecutionContext::new(self.cwd.clone(), self.env.clone(), path, args);
        ctx.options.errexit = self.errexit;
        ctx.abort = abort.clone();

        let result = self.interpreter.execute(&statements, &mut ctx).await?;

        if result.control_flow == ControlFlow::Abort {
            tracing::warn!(script = %path, "run aborted");
        }
        tracing::info!(
            script = %path,
            exit_code = result.exit_code,
            commands = ctx.counters.commands,
            "run finished"
        );
        Ok(result.into())
    }

    /// Execute inline script text in the persistent session.
    ///
    /// Variables, cwd and `set -e` carry over between calls. Parse errors are
    /// returned as `Err`.
    pub async fn exec(&mut self, script: &str) -> Result<ExecResult> {
        self.exec_with_abort(script, &AbortHandle::new()).await
    }

    /// [`Shell::exec`], cancellable through `abort`.
    pub async fn exec_with_abort(
        &mut self,
        script: &str,
        abort: &AbortHandle,
    ) -> Result<ExecResult> {
        tracing::debug!(
            script = %format_script_for_log(script, self.interpreter.log_config()),
            "exec"
        );
        let statements = parse_script(script)?;

        self.session.counters = ExecutionCounters::new();
        self.session.loop_depth = 0;
        self.session.errexit_suppressed = 0;
        self.session.abort = abort.clone();

        self.interpreter.execute(&statements, &mut self.session).await
    }
}

fn usage() -> ScriptOutput {
    ScriptOutput {
        stderr: "usage: sh <script> [args...]\n".to_string(),
        code: 2,
        ..Default::default()
    }
}

/// Split a command line into literal words. Quotes are honored; any
/// expansion, operator or redirection makes the line invalid.
fn split_command_line(line: &str) -> Option<Vec<String>> {
    let tokens = tokenize(line).ok()?;
    tokens
        .iter()
        .filter(|token| token.kind != TokenKind::Newline)
        .map(|token| match token.kind {
            TokenKind::Word | TokenKind::Assignment => {
                Word::parse(&token.text, token.line).ok()?.literal_text()
            }
            _ => None,
        })
        .collect()
}

/// Builder for customized Shell configuration.
#[derive(Default)]
pub struct ShellBuilder {
    fs: Option<Arc<dyn FileSystem>>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
    builtins: Vec<(String, Arc<dyn Builtin>)>,
    limits: ExecutionLimits,
    log_config: LogConfig,
    errexit: bool,
}

impl ShellBuilder {
    /// Set a custom filesystem.
    pub fn fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the current working directory.
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Register a command, replacing a default command of the same name.
    ///
    /// `break`, `continue`, `exit`, `set` and `sh` are handled by the
    /// interpreter and cannot be replaced.
    pub fn builtin(mut self, name: impl Into<String>, builtin: Box<dyn Builtin>) -> Self {
        self.builtins.push((name.into(), Arc::from(builtin)));
        self
    }

    /// Set resource limits.
    pub fn limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set logging behavior.
    pub fn log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    /// Start every run with `set -e` in effect.
    pub fn errexit(mut self, enabled: bool) -> Self {
        self.errexit = enabled;
        self
    }

    /// Build the Shell instance.
    pub fn build(self) -> Shell {
        let fs = self.fs.unwrap_or_else(|| Arc::new(InMemoryFs::new()));
        let cwd = self.cwd.unwrap_or_else(|| PathBuf::from(DEFAULT_CWD));

        let mut env = self.env;
        env.entry("HOME".to_string())
            .or_insert_with(|| DEFAULT_CWD.to_string());
        env.entry("PWD".to_string())
            .or_insert_with(|| cwd.to_string_lossy().into_owned());

        let mut registry = builtins::default_registry();
        registry.extend(self.builtins);

        let mut session = ExecutionContext::new(cwd.clone(), env.clone(), "sh", &[]);
        session.options.errexit = self.errexit;

        Shell {
            interpreter: Interpreter::new(fs, registry, self.limits, self.log_config),
            env,
            cwd,
            errexit: self.errexit,
            session,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_hello() {
        let mut shell = Shell::new();
        let result = shell.exec("echo hello").await.unwrap();
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn test_variable_expansion() {
        let mut shell = Shell::builder().env("HOME", "/home/test").build();
        let result = shell.exec("echo $HOME ${HOME}").await.unwrap();
        assert_eq!(result.stdout, "/home/test /home/test\n");
    }

    #[tokio::test]
    async fn test_undefined_variable_expands_to_empty() {
        let mut shell = Shell::new();
        let result = shell.exec("echo $UNDEFINED_VAR").await.unwrap();
        assert_eq!(result.stdout, "\n");
    }

    #[tokio::test]
    async fn test_session_persists_state() {
        let mut shell = Shell::new();
        shell.exec("X=1; cd /tmp").await.unwrap();
        let result = shell.exec("echo $X; pwd").await.unwrap();
        assert_eq!(result.stdout, "1\n/tmp\n");
    }

    #[tokio::test]
    async fn test_exec_parse_error_is_err() {
        let mut shell = Shell::new();
        let err = shell.exec("if true; then echo x").await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.line(), Some(1));
    }

    #[tokio::test]
    async fn test_pipeline_into_file() {
        let mut shell = Shell::builder().env("HOME", "/home/testuser").build();
        let result = shell
            .exec("echo $HOME | cat > /tmp/out && cat /tmp/out")
            .await
            .unwrap();
        assert_eq!(result.stdout, "/home/testuser\n");
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn test_split_command_line() {
        assert_eq!(
            split_command_line("sh s.sh 'a b' c").unwrap(),
            vec!["sh", "s.sh", "a b", "c"]
        );
        assert!(split_command_line("sh s.sh $HOME").is_none());
        assert!(split_command_line("sh s.sh > out").is_none());
        assert!(split_command_line("sh s.sh; ls").is_none());
    }

    #[tokio::test]
    async fn test_run_usage() {
        let shell = Shell::new();
        for line in ["", "ls /", "sh"] {
            let output = shell.run(line).await.unwrap();
            assert_eq!(output.code, 2, "{line}");
            assert_eq!(output.stderr, "usage: sh <script> [args...]\n");
        }
    }

    #[test]
    fn test_script_output_serializes() {
        let output = ScriptOutput {
            stdout: "a\n".into(),
            stderr: String::new(),
            code: 1,
        };
        let json = serde_json::to_string(&output).unwrap();
        assert_eq!(json, r#"{"stdout":"a\n","stderr":"","code":1}"#);
    }
}
