//! Per-run execution context

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::redirect::FdTable;
use crate::limits::ExecutionCounters;

/// Cancellation flag for one run.
///
/// Cloning the handle shares the flag. The interpreter checks it between
/// statements and before every command dispatch. A flag stays set once
/// aborted; start each run with a fresh handle.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Create a handle that is not aborted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the run.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Shell options toggled by `set`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellOptions {
    /// `set -e`: stop at the first failing command
    pub errexit: bool,
}

/// Mutable state of one script run.
///
/// Owned by whoever drives the interpreter and passed down as `&mut` to
/// every executor function. Never shared between concurrent runs.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Current working directory
    pub cwd: PathBuf,
    /// Shell variables (script-global)
    pub env: HashMap<String, String>,
    /// `$0` is the script path, `$1..` the arguments
    pub positional: Vec<String>,
    /// Status of the last statement, `$?`
    pub last_exit_code: i32,
    /// Base descriptor bindings; redirections overlay a copy per command
    pub fd_table: FdTable,
    pub options: ShellOptions,
    /// Resource usage for limit checks
    pub counters: ExecutionCounters,
    pub abort: AbortHandle,
    /// Input piped into a nested script; read by its commands that have no other stdin
    pub(crate) stdin: Option<String>,
    /// Depth of `if`/`while` conditions and `&&`/`||` heads; errexit is off while > 0
    pub(crate) errexit_suppressed: usize,
    /// Enclosing loops; `break`/`continue` are no-ops at 0
    pub(crate) loop_depth: usize,
}

impl ExecutionContext {
    /// Create a context for a script at `script_path` with the given arguments.
    pub fn new(
        cwd: PathBuf,
        env: HashMap<String, String>,
        script_path: impl Into<String>,
        args: &[String],
    ) -> Self {
        let mut positional = Vec::with_capacity(args.len() + 1);
        positional.push(script_path.into());
        positional.extend(args.iter().cloned());

        Self {
            cwd,
            env,
            positional,
            last_exit_code: 0,
            fd_table: FdTable::default(),
            options: ShellOptions::default(),
            counters: ExecutionCounters::new(),
            abort: AbortHandle::new(),
            stdin: None,
            errexit_suppressed: 0,
            loop_depth: 0,
        }
    }

    /// Context for a nested `sh <script>` call.
    ///
    /// Inherits variables, cwd, options, counters and the abort handle; gets its
    /// own positional parameters. Changes made by the child stay in the child.
    pub fn child(&self, script_path: &str, args: &[String]) -> Self {
        let mut child = Self::new(self.cwd.clone(), self.env.clone(), script_path, args);
        child.options = self.options;
        child.counters = self.counters.clone();
        child.abort = self.abort.clone();
        child
    }

    /// Number of positional arguments, `$#`.
    pub fn arg_count(&self) -> usize {
        self.positional.len().saturating_sub(1)
    }

    /// Positional arguments without `$0`.
    pub fn args(&self) -> &[String] {
        self.positional.get(1..).unwrap_or(&[])
    }

    /// Whether a failing command should stop the script right now.
    pub(crate) fn errexit_active(&self) -> bool {
        self.options.errexit && self.errexit_suppressed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_layout() {
        let args = vec!["a".to_string(), "b".to_string()];
        let ctx = ExecutionContext::new(PathBuf::from("/"), HashMap::new(), "/s.sh", &args);
        assert_eq!(ctx.positional, vec!["/s.sh", "a", "b"]);
        assert_eq!(ctx.arg_count(), 2);
        assert_eq!(ctx.args(), &args[..]);
    }

    #[test]
    fn test_child_keeps_env_and_abort() {
        let mut parent = ExecutionContext::new(PathBuf::from("/tmp"), HashMap::new(), "sh", &[]);
        parent.env.insert("X".into(), "1".into());
        parent.options.errexit = true;
        parent.positional.push("outer".into());

        let child = parent.child("/inner.sh", &["x".to_string()]);
        assert_eq!(child.env.get("X").map(String::as_str), Some("1"));
        assert_eq!(child.positional, vec!["/inner.sh", "x"]);
        assert!(child.options.errexit);
        assert_eq!(child.cwd, PathBuf::from("/tmp"));

        parent.abort.abort();
        assert!(child.abort.is_aborted());
    }

    #[test]
    fn test_abort_handles_are_independent() {
        let handle = AbortHandle::new();
        let other = AbortHandle::new();
        handle.clone().abort();
        assert!(handle.is_aborted());
        assert!(!other.is_aborted());
    }
}
