//! Resource limits for script execution
//!
//! Scripts come from workspace users, so runaway loops and deep recursion
//! through `$(...)` or nested `sh` calls must terminate.

use std::time::{Duration, Instant};

/// Resource limits for script execution
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    /// Maximum number of commands dispatched in one run
    /// Default: 10,000
    pub max_commands: usize,

    /// Maximum iterations for a single loop
    /// Default: 10,000
    pub max_loop_iterations: usize,

    /// Maximum nesting of command substitutions and nested `sh` scripts
    /// Default: 64
    pub max_nesting_depth: usize,

    /// Wall-clock budget for one run
    /// Default: 30 seconds
    pub timeout: Duration,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_commands: 10_000,
            max_loop_iterations: 10_000,
            max_nesting_depth: 64,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ExecutionLimits {
    /// Create new limits with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum command count
    pub fn max_commands(mut self, count: usize) -> Self {
        self.max_commands = count;
        self
    }

    /// Set maximum loop iterations
    pub fn max_loop_iterations(mut self, count: usize) -> Self {
        self.max_loop_iterations = count;
        self
    }

    /// Set maximum substitution / nested script depth
    pub fn max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// Set execution timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check a loop's iteration number (1-based) against the limit.
    pub fn check_loop(&self, iteration: usize) -> Result<(), LimitExceeded> {
        if iteration > self.max_loop_iterations {
            return Err(LimitExceeded::MaxLoopIterations(self.max_loop_iterations));
        }
        Ok(())
    }
}

/// Per-run counters for tracking resource usage
#[derive(Debug, Clone)]
pub struct ExecutionCounters {
    /// Number of commands dispatched
    pub commands: usize,

    /// Current substitution / nested script depth
    pub nesting_depth: usize,

    /// When the run started
    pub started: Instant,
}

impl Default for ExecutionCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionCounters {
    /// Create new counters starting the clock now
    pub fn new() -> Self {
        Self {
            commands: 0,
            nesting_depth: 0,
            started: Instant::now(),
        }
    }

    /// Increment command counter, returns error if limit exceeded
    pub fn tick_command(&mut self, limits: &ExecutionLimits) -> Result<(), LimitExceeded> {
        self.commands += 1;
        if self.commands > limits.max_commands {
            return Err(LimitExceeded::MaxCommands(limits.max_commands));
        }
        Ok(())
    }

    /// Enter a command substitution or nested script
    pub fn push_nesting(&mut self, limits: &ExecutionLimits) -> Result<(), LimitExceeded> {
        // Check before incrementing so a failure leaves the depth untouched
        if self.nesting_depth >= limits.max_nesting_depth {
            return Err(LimitExceeded::MaxNestingDepth(limits.max_nesting_depth));
        }
        self.nesting_depth += 1;
        Ok(())
    }

    /// Leave a command substitution or nested script
    pub fn pop_nesting(&mut self) {
        self.nesting_depth = self.nesting_depth.saturating_sub(1);
    }

    /// Fail once the run has used up its wall-clock budget
    pub fn check_deadline(&self, limits: &ExecutionLimits) -> Result<(), LimitExceeded> {
        if self.started.elapsed() > limits.timeout {
            return Err(LimitExceeded::Timeout(limits.timeout));
        }
        Ok(())
    }
}

/// Error returned when a resource limit is exceeded
#[derive(Debug, Clone, thiserror::Error)]
pub enum LimitExceeded {
    #[error("maximum command count exceeded ({0})")]
    MaxCommands(usize),

    #[error("maximum loop iterations exceeded ({0})")]
    MaxLoopIterations(usize),

    #[error("maximum nesting depth exceeded ({0})")]
    MaxNestingDepth(usize),

    #[error("execution timeout ({0:?})")]
    Timeout(Duration),
}
