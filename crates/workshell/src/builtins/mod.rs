//! Built-in commands
//!
//! This module provides the [`Builtin`] trait that every command in the
//! registry implements, and the [`Context`] handed to each invocation.
//!
//! # Custom Builtins
//!
//! ```rust
//! use workshell::{Builtin, BuiltinContext, ExecResult, async_trait};
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl Builtin for Hello {
//!     async fn execute(&self, ctx: BuiltinContext<'_>) -> workshell::Result<ExecResult> {
//!         let name = ctx.args.first().map(String::as_str).unwrap_or("world");
//!         Ok(ExecResult::ok(format!("hello {}\n", name)))
//!     }
//! }
//! ```
//!
//! Register via [`ShellBuilder::builtin`](crate::ShellBuilder::builtin).

mod cat;
mod echo;
mod export;
mod fileops;
mod flow;
mod grep;
mod headtail;
mod ls;
mod navigation;

pub use cat::Cat;
pub use echo::Echo;
pub use export::{Export, Unset};
pub use fileops::{Mkdir, Rm, Touch};
pub use flow::{False, True};
pub use grep::Grep;
pub use headtail::{Head, Tail};
pub use ls::Ls;
pub use navigation::{Cd, Pwd};
pub use test::{Bracket, Test};

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::fs::FileSystem;
use crate::interpreter::ExecResult;

/// Registry of named commands.
pub type Registry = HashMap<String, Arc<dyn Builtin>>;

/// The default command set.
pub fn default_registry() -> Registry {
    let mut registry: Registry = HashMap::new();
    let mut add = |name: &str, builtin: Arc<dyn Builtin>| {
        registry.insert(name.to_string(), builtin);
    };

    add("echo", Arc::new(Echo));
    add("cat", Arc::new(Cat));
    add("grep", Arc::new(Grep));
    add("head", Arc::new(Head));
    add("tail", Arc::new(Tail));
    add("ls", Arc::new(Ls));
    add("mkdir", Arc::new(Mkdir));
    add("touch", Arc::new(Touch));
    add("rm", Arc::new(Rm));
    add("cd", Arc::new(Cd));
    add("pwd", Arc::new(Pwd));
    add("true", Arc::new(True));
    add(":", Arc::new(True));
    add("false", Arc::new(False));
    add("test", Arc::new(Test));
    add("[", Arc::new(Bracket));
    add("export", Arc::new(Export));
    add("unset", Arc::new(Unset));

    registry
}

/// Resolve a path relative to the current working directory.
///
/// The result is absolute with `.` and `..` collapsed, e.g. `resolve_path("/home", "../tmp")`
/// is `/tmp`.
pub fn resolve_path(cwd: &Path, path_str: &str) -> PathBuf {
    let path = Path::new(path_str);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };

    let mut result = PathBuf::from("/");
    for component in joined.components() {
        match component {
            Component::Normal(name) => result.push(name),
            Component::ParentDir => {
                result.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    result
}

/// Execution context for a command invocation.
pub struct Context<'a> {
    /// Command arguments (not including the command name).
    ///
    /// For `mycommand arg1 arg2`, this contains `["arg1", "arg2"]`.
    pub args: &'a [String],

    /// Shell variables, including temporary `NAME=value` prefixes.
    pub env: &'a mut HashMap<String, String>,

    /// Current working directory (mutable, used by `cd`).
    pub cwd: &'a mut PathBuf,

    /// Virtual filesystem.
    pub fs: Arc<dyn FileSystem>,

    /// Standard input from a pipeline or `<` redirection.
    ///
    /// For `echo hello | mycommand`, stdin is `Some("hello\n")`.
    pub stdin: Option<&'a str>,
}

impl Context<'_> {
    /// Absolute path for an argument.
    pub fn resolve(&self, path: &str) -> PathBuf {
        resolve_path(self.cwd.as_path(), path)
    }

    /// Contents of each file operand, or stdin when there are none (or for `-`).
    ///
    /// Unreadable files become `<cmd>: <path>: <reason>` lines in the returned
    /// error text.
    pub async fn read_inputs(&self, cmd: &str, files: &[&String]) -> (Vec<(String, String)>, String) {
        let mut inputs = Vec::new();
        let mut errors = String::new();

        if files.is_empty() {
            inputs.push(("-".to_string(), self.stdin.unwrap_or("").to_string()));
            return (inputs, errors);
        }

        for file in files {
            if file.as_str() == "-" {
                inputs.push(("-".to_string(), self.stdin.unwrap_or("").to_string()));
                continue;
            }
            match self.fs.read_file(&self.resolve(file)).await {
                Ok(bytes) => inputs.push((
                    file.to_string(),
                    String::from_utf8_lossy(&bytes).into_owned(),
                )),
                Err(e) => errors.push_str(&format!("{}: {}: {}\n", cmd, file, e.message())),
            }
        }
        (inputs, errors)
    }
}

/// Trait for implementing commands.
///
/// # Return Values
///
/// Return [`ExecResult::ok`](crate::ExecResult::ok) for success with output,
/// or [`ExecResult::err`](crate::ExecResult::err) for a failure the command
/// reports itself. Returning `Err` reports `<name>: <message>` with exit
/// code 1; fatal error kinds (limits, internal) abort the run instead.
#[async_trait]
pub trait Builtin: Send + Sync {
    /// Execute the command.
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod testing {
    //! Helpers for running a builtin outside the interpreter.

    use super::*;
    use crate::fs::InMemoryFs;

    pub(crate) async fn run_with(
        builtin: &dyn Builtin,
        args: &[&str],
        stdin: Option<&str>,
        fs: Arc<dyn FileSystem>,
    ) -> ExecResult {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let mut env = HashMap::new();
        let mut cwd = PathBuf::from("/home/user");
        let ctx = Context {
            args: &args,
            env: &mut env,
            cwd: &mut cwd,
            fs,
            stdin,
        };
        builtin.execute(ctx).await.unwrap()
    }

    pub(crate) async fn run(builtin: &dyn Builtin, args: &[&str], stdin: Option<&str>) -> ExecResult {
        run_with(builtin, args, stdin, Arc::new(InMemoryFs::new())).await
    }
}
