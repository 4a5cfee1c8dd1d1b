//! Interpreter state types

/// Control-flow signal carried out of a statement.
///
/// Loops consume `Break`/`Continue`; `Exit` and `Abort` unwind to the top
/// of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlFlow {
    #[default]
    None,
    /// `break N`: levels still to unwind
    Break(usize),
    /// `continue N`: levels still to unwind
    Continue(usize),
    /// `exit N`, or a failing command under `set -e`
    Exit(i32),
    /// The run was cancelled through its abort handle
    Abort,
}

impl ControlFlow {
    /// Whether this signal stops the enclosing list.
    pub fn is_set(&self) -> bool {
        !matches!(self, ControlFlow::None)
    }
}

/// Result of executing a command or statement.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code
    pub exit_code: i32,
    /// Pending loop-control / exit signal
    pub control_flow: ControlFlow,
}

impl ExecResult {
    /// Create a successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    /// Create an error result with the given stderr and exit code.
    pub fn err(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code,
            ..Default::default()
        }
    }

    /// Create a result with an explicit exit code and no output.
    pub fn status(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Default::default()
        }
    }

    /// Result of a cancelled run.
    pub fn aborted() -> Self {
        Self {
            exit_code: 130,
            control_flow: ControlFlow::Abort,
            ..Default::default()
        }
    }

    /// Check if the result indicates success.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Append another result's output; its exit code and signal replace ours.
    pub fn absorb(&mut self, other: ExecResult) {
        self.stdout.push_str(&other.stdout);
        self.stderr.push_str(&other.stderr);
        self.exit_code = other.exit_code;
        self.control_flow = other.control_flow;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorb_keeps_output_order() {
        let mut result = ExecResult::ok("a\n");
        result.absorb(ExecResult::err("oops\n", 2));
        result.absorb(ExecResult::ok("b\n"));
        assert_eq!(result.stdout, "a\nb\n");
        assert_eq!(result.stderr, "oops\n");
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn test_aborted() {
        let result = ExecResult::aborted();
        assert_eq!(result.exit_code, 130);
        assert!(result.control_flow.is_set());
    }
}
