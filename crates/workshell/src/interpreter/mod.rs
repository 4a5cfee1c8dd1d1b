//! Interpreter for executing parsed scripts
//!
//! A depth-first async walk over the statement tree. All mutable state lives
//! in the [`ExecutionContext`] passed to every method; the interpreter itself
//! only holds configuration (filesystem, registry, limits).

mod arithmetic;
mod context;
mod expand;
mod redirect;
mod state;

pub use context::{AbortHandle, ExecutionContext, ShellOptions};
pub use redirect::{FdTable, Sink};
pub use state::{ControlFlow, ExecResult};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::path::Path;
use std::sync::Arc;

use crate::builtins::{self, Registry, resolve_path};
use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::limits::ExecutionLimits;
use crate::logging_impl::LogConfig;
use crate::parser::{
    ForLoop, IfStatement, Joiner, Pipeline, Sequence, SimpleCommand, Statement, WhileLoop,
    parse_script,
};
use expand::ExpansionEffects;

/// What a loop does after one pass of its body.
enum LoopStep {
    Next,
    Stop,
}

/// Consume the signal a loop body left behind, one loop level at a time.
fn consume_loop_signal(result: &mut ExecResult) -> LoopStep {
    match result.control_flow {
        ControlFlow::None => LoopStep::Next,
        ControlFlow::Continue(n) if n <= 1 => {
            result.control_flow = ControlFlow::None;
            LoopStep::Next
        }
        ControlFlow::Continue(n) => {
            result.control_flow = ControlFlow::Continue(n - 1);
            LoopStep::Stop
        }
        ControlFlow::Break(n) => {
            result.control_flow = if n > 1 {
                ControlFlow::Break(n - 1)
            } else {
                ControlFlow::None
            };
            LoopStep::Stop
        }
        ControlFlow::Exit(_) | ControlFlow::Abort => LoopStep::Stop,
    }
}

/// Per-command failure (`sh: <message>`, exit 1), or the error itself if fatal.
fn command_failure(err: Error, stderr: String) -> Result<ExecResult> {
    if err.is_fatal() {
        return Err(err);
    }
    Ok(ExecResult::err(format!("{}sh: {}\n", stderr, err.message()), 1))
}

/// Interpreter configuration shared by every run of a [`Shell`](crate::Shell).
pub struct Interpreter {
    fs: Arc<dyn FileSystem>,
    builtins: Registry,
    limits: ExecutionLimits,
    log_config: LogConfig,
}

impl Interpreter {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        builtins: Registry,
        limits: ExecutionLimits,
        log_config: LogConfig,
    ) -> Self {
        Self {
            fs,
            builtins,
            limits,
            log_config,
        }
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn log_config(&self) -> &LogConfig {
        &self.log_config
    }

    /// Execute a parsed script to completion.
    ///
    /// `exit` and errexit end the run here with their status. A cancelled run
    /// keeps [`ControlFlow::Abort`] so the caller can tell it apart.
    pub async fn execute(
        &self,
        statements: &[Statement],
        ctx: &mut ExecutionContext,
    ) -> Result<ExecResult> {
        let mut result = self.execute_block(statements, ctx).await?;
        match result.control_flow {
            ControlFlow::Exit(code) => {
                result.exit_code = code;
                result.control_flow = ControlFlow::None;
            }
            ControlFlow::Break(_) | ControlFlow::Continue(_) => {
                result.control_flow = ControlFlow::None;
            }
            ControlFlow::Abort => result.exit_code = 130,
            ControlFlow::None => {}
        }
        ctx.last_exit_code = result.exit_code;
        Ok(result)
    }

    /// Read and parse a script file.
    ///
    /// Failures come back as the diagnostic a shell would print:
    /// 127 for a missing file, 126 for an unreadable one, 2 for a syntax error.
    pub async fn load_script(
        &self,
        cwd: &Path,
        path: &str,
    ) -> std::result::Result<Vec<Statement>, ExecResult> {
        let resolved = resolve_path(cwd, path);
        let bytes = match self.fs.read_file(&resolved).await {
            Ok(bytes) => bytes,
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExecResult::err(
                    format!("sh: {}: No such file or directory\n", path),
                    127,
                ));
            }
            Err(e) => {
                return Err(ExecResult::err(format!("sh: {}: {}\n", path, e.message()), 126));
            }
        };

        let source = String::from_utf8_lossy(&bytes);
        tracing::debug!(
            script = %path,
            content = %crate::logging_impl::format_script_for_log(&source, &self.log_config),
            "loaded script"
        );

        parse_script(&source).map_err(|e| {
            let location = e.line().map(|l| format!("line {}: ", l)).unwrap_or_default();
            ExecResult::err(format!("sh: {}: {}{}\n", path, location, e.message()), 2)
        })
    }

    /// Run statements in order until one leaves a control-flow signal.
    pub(crate) async fn execute_block(
        &self,
        statements: &[Statement],
        ctx: &mut ExecutionContext,
    ) -> Result<ExecResult> {
        let mut result = ExecResult::default();
        for statement in statements {
            let outcome = self.execute_statement(statement, ctx).await?;
            result.absorb(outcome);
            if result.control_flow.is_set() {
                break;
            }
        }
        Ok(result)
    }

    fn execute_statement<'a>(
        &'a self,
        statement: &'a Statement,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<ExecResult>> {
        async move {
            if ctx.abort.is_aborted() {
                tracing::warn!("run aborted");
                return Ok(ExecResult::aborted());
            }
            if let Err(e) = ctx.counters.check_deadline(&self.limits) {
                tracing::warn!(error = %e, "limit exceeded");
                return Err(e.into());
            }

            let mut result = match statement {
                Statement::Simple(command) => {
                    let result = self.execute_simple(command, None, ctx).await?;
                    self.apply_errexit(result, ctx)
                }
                Statement::Pipeline(pipeline) => {
                    let result = self.execute_pipeline(pipeline, ctx).await?;
                    if pipeline.negated {
                        result
                    } else {
                        self.apply_errexit(result, ctx)
                    }
                }
                Statement::Sequence(sequence) => self.execute_sequence(sequence, ctx).await?,
                Statement::If(if_stmt) => self.execute_if(if_stmt, ctx).await?,
                Statement::For(for_loop) => {
                    ctx.loop_depth += 1;
                    let result = self.execute_for(for_loop, ctx).await;
                    ctx.loop_depth -= 1;
                    result?
                }
                Statement::While(while_loop) => {
                    ctx.loop_depth += 1;
                    let result = self.execute_while(while_loop, ctx).await;
                    ctx.loop_depth -= 1;
                    result?
                }
            };

            if result.control_flow == ControlFlow::Abort {
                result.exit_code = 130;
            }
            ctx.last_exit_code = result.exit_code;
            Ok(result)
        }
        .boxed()
    }

    /// Turn a failure into an exit when `set -e` is active.
    fn apply_errexit(&self, mut result: ExecResult, ctx: &ExecutionContext) -> ExecResult {
        if result.exit_code != 0 && !result.control_flow.is_set() && ctx.errexit_active() {
            tracing::debug!(exit_code = result.exit_code, "errexit");
            result.control_flow = ControlFlow::Exit(result.exit_code);
        }
        result
    }

    async fn execute_sequence(
        &self,
        sequence: &Sequence,
        ctx: &mut ExecutionContext,
    ) -> Result<ExecResult> {
        let items = std::iter::once((Joiner::Semicolon, sequence.first.as_ref()))
            .chain(sequence.rest.iter().map(|(joiner, stmt)| (*joiner, stmt)));

        let mut result = ExecResult::default();
        let mut last_code = 0;

        for (index, (joiner, statement)) in items.enumerate() {
            let run = match joiner {
                Joiner::Semicolon => true,
                Joiner::And => last_code == 0,
                Joiner::Or => last_code != 0,
            };
            if !run {
                continue;
            }

            let heads_and_or = matches!(
                sequence.rest.get(index),
                Some((Joiner::And | Joiner::Or, _))
            );
            if heads_and_or {
                ctx.errexit_suppressed += 1;
            }
            let outcome = self.execute_statement(statement, ctx).await;
            if heads_and_or {
                ctx.errexit_suppressed -= 1;
            }

            let outcome = outcome?;
            last_code = outcome.exit_code;
            result.absorb(outcome);
            if result.control_flow.is_set() {
                break;
            }
        }

        result.exit_code = last_code;
        Ok(result)
    }

    /// Run a condition with errexit off.
    async fn execute_condition(
        &self,
        condition: &Statement,
        ctx: &mut ExecutionContext,
    ) -> Result<ExecResult> {
        ctx.errexit_suppressed += 1;
        let result = self.execute_statement(condition, ctx).await;
        ctx.errexit_suppressed -= 1;
        result
    }

    async fn execute_if(&self, if_stmt: &IfStatement, ctx: &mut ExecutionContext) -> Result<ExecResult> {
        let mut result = ExecResult::default();

        for (condition, body) in &if_stmt.branches {
            let cond = self.execute_condition(condition, ctx).await?;
            let taken = cond.exit_code == 0;
            result.absorb(cond);
            if result.control_flow.is_set() {
                return Ok(result);
            }
            if taken {
                let body = self.execute_block(body, ctx).await?;
                result.absorb(body);
                return Ok(result);
            }
        }

        match &if_stmt.else_body {
            Some(body) => {
                let body = self.execute_block(body, ctx).await?;
                result.absorb(body);
            }
            None => result.exit_code = 0,
        }
        Ok(result)
    }

    async fn execute_for(&self, for_loop: &ForLoop, ctx: &mut ExecutionContext) -> Result<ExecResult> {
        let mut effects = ExpansionEffects::default();
        let values = match &for_loop.words {
            Some(words) => match self.expand_fields(words, ctx, &mut effects).await {
                Ok(values) => values,
                Err(e) => return command_failure(e, effects.stderr),
            },
            None => ctx.args().to_vec(),
        };

        let mut result = ExecResult {
            stderr: effects.stderr,
            ..Default::default()
        };

        for (index, value) in values.into_iter().enumerate() {
            if let Err(e) = self.limits.check_loop(index + 1) {
                tracing::warn!(error = %e, "limit exceeded");
                return Err(e.into());
            }
            ctx.env.insert(for_loop.var.clone(), value);

            let mut body = self.execute_block(&for_loop.body, ctx).await?;
            let step = consume_loop_signal(&mut body);
            result.absorb(body);
            if let LoopStep::Stop = step {
                break;
            }
        }

        Ok(result)
    }

    async fn execute_while(
        &self,
        while_loop: &WhileLoop,
        ctx: &mut ExecutionContext,
    ) -> Result<ExecResult> {
        let mut result = ExecResult::default();
        let mut body_status = 0;
        let mut iteration = 0;

        loop {
            let mut cond = self.execute_condition(&while_loop.condition, ctx).await?;
            let proceed = (cond.exit_code == 0) != while_loop.until;
            let step = consume_loop_signal(&mut cond);
            result.stdout.push_str(&cond.stdout);
            result.stderr.push_str(&cond.stderr);
            if cond.control_flow.is_set() {
                result.exit_code = cond.exit_code;
                result.control_flow = cond.control_flow;
                return Ok(result);
            }
            if let LoopStep::Stop = step {
                break;
            }
            if !proceed {
                break;
            }

            iteration += 1;
            if let Err(e) = self.limits.check_loop(iteration) {
                tracing::warn!(error = %e, "limit exceeded");
                return Err(e.into());
            }

            let mut body = self.execute_block(&while_loop.body, ctx).await?;
            let step = consume_loop_signal(&mut body);
            body_status = body.exit_code;
            result.absorb(body);
            if let LoopStep::Stop = step {
                break;
            }
        }

        result.exit_code = body_status;
        Ok(result)
    }

    /// Stages run one after another; each stage's stdout is the next one's
    /// stdin. The status is the last stage's, inverted by `!`.
    async fn execute_pipeline(
        &self,
        pipeline: &Pipeline,
        ctx: &mut ExecutionContext,
    ) -> Result<ExecResult> {
        let mut result = ExecResult::default();
        let mut stdin: Option<String> = None;
        let last = pipeline.stages.len().saturating_sub(1);

        for (index, stage) in pipeline.stages.iter().enumerate() {
            let outcome = self.execute_simple(stage, stdin.take(), ctx).await?;
            result.stderr.push_str(&outcome.stderr);

            if outcome.control_flow == ControlFlow::Abort {
                result.exit_code = outcome.exit_code;
                result.control_flow = ControlFlow::Abort;
                return Ok(result);
            }

            if index == last {
                result.stdout = outcome.stdout;
                result.exit_code = outcome.exit_code;
                // A lone stage keeps its signal (`! exit 1` still exits)
                if pipeline.stages.len() == 1 {
                    result.control_flow = outcome.control_flow;
                }
            } else {
                stdin = Some(outcome.stdout);
            }
        }

        if pipeline.negated {
            result.exit_code = if result.exit_code == 0 { 1 } else { 0 };
        }
        Ok(result)
    }

    /// Expand, redirect and dispatch one command.
    async fn execute_simple(
        &self,
        command: &SimpleCommand,
        stdin: Option<String>,
        ctx: &mut ExecutionContext,
    ) -> Result<ExecResult> {
        let mut effects = ExpansionEffects::default();

        let fields = match self.expand_fields(&command.words, ctx, &mut effects).await {
            Ok(fields) => fields,
            Err(e) => return command_failure(e, effects.stderr),
        };

        let mut assignments = Vec::with_capacity(command.assignments.len());
        for assignment in &command.assignments {
            let value = match self.expand_word(&assignment.value, ctx, &mut effects).await {
                Ok(value) => value,
                Err(e) => return command_failure(e, effects.stderr),
            };
            let value = if assignment.append {
                let mut current = ctx.env.get(&assignment.name).cloned().unwrap_or_default();
                current.push_str(&value);
                current
            } else {
                value
            };
            assignments.push((assignment.name.clone(), value));
        }

        let redirected = match self.apply_redirections(&command.redirects, ctx, &mut effects).await {
            Ok(redirected) => redirected,
            Err(e) => return command_failure(e, effects.stderr),
        };

        let Some((name, args)) = fields.split_first() else {
            for (name, value) in assignments {
                tracing::debug!(
                    name = %name,
                    value = %self.log_config.format_assignment(&name, &value),
                    "assign"
                );
                ctx.env.insert(name, value);
            }
            let (stdout, stderr) = self
                .route_output(&redirected.table, String::new(), effects.stderr)
                .await;
            return Ok(ExecResult {
                stdout,
                stderr,
                exit_code: effects.last_status.unwrap_or(0),
                ..Default::default()
            });
        };

        if ctx.abort.is_aborted() {
            tracing::warn!(command = %name, "run aborted before dispatch");
            return Ok(ExecResult {
                stderr: effects.stderr,
                ..ExecResult::aborted()
            });
        }
        for check in [
            ctx.counters.check_deadline(&self.limits),
            ctx.counters.tick_command(&self.limits),
        ] {
            if let Err(e) = check {
                tracing::warn!(command = %name, error = %e, "limit exceeded");
                return Err(e.into());
            }
        }

        tracing::debug!(command = %name, args = args.len(), line = command.line, "dispatch");

        // Prefix assignments only last for this command
        let saved: Vec<(String, Option<String>)> = assignments
            .into_iter()
            .map(|(name, value)| {
                tracing::debug!(
                    name = %name,
                    value = %self.log_config.format_assignment(&name, &value),
                    "assign for command"
                );
                let previous = ctx.env.insert(name.clone(), value);
                (name, previous)
            })
            .collect();

        // Without a pipe or `<`, commands read the input the script was given
        let stdin = redirected.stdin.or(stdin).or_else(|| ctx.stdin.clone());
        let outcome = self.dispatch(name, args, stdin.as_deref(), ctx).await;

        for (name, previous) in saved.into_iter().rev() {
            match previous {
                Some(value) => ctx.env.insert(name, value),
                None => ctx.env.remove(&name),
            };
        }

        let result = outcome?;
        let mut stderr = effects.stderr;
        stderr.push_str(&result.stderr);
        let (stdout, stderr) = self
            .route_output(&redirected.table, result.stdout, stderr)
            .await;

        Ok(ExecResult {
            stdout,
            stderr,
            exit_code: result.exit_code,
            control_flow: result.control_flow,
        })
    }

    /// Run a special builtin or a registry command.
    async fn dispatch(
        &self,
        name: &str,
        args: &[String],
        stdin: Option<&str>,
        ctx: &mut ExecutionContext,
    ) -> Result<ExecResult> {
        match name {
            "break" | "continue" => return Ok(self.loop_control(name, args, ctx)),
            "exit" => return Ok(exit_builtin(args, ctx)),
            "set" => return Ok(set_builtin(args, ctx)),
            "sh" | "bash" => return self.nested_script(args, stdin, ctx).await,
            _ => {}
        }

        let Some(builtin) = self.builtins.get(name) else {
            tracing::debug!(command = %name, "command not found");
            return Ok(ExecResult::err(format!("{}: command not found\n", name), 127));
        };

        let builtin_ctx = builtins::Context {
            args,
            env: &mut ctx.env,
            cwd: &mut ctx.cwd,
            fs: Arc::clone(&self.fs),
            stdin,
        };

        match builtin.execute(builtin_ctx).await {
            Ok(result) => Ok(result),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => Ok(ExecResult::err(format!("{}: {}\n", name, e.message()), 1)),
        }
    }

    /// `break [n]` / `continue [n]`
    fn loop_control(&self, name: &str, args: &[String], ctx: &ExecutionContext) -> ExecResult {
        let levels = match args.first() {
            None => 1,
            Some(arg) => match arg.parse::<usize>() {
                Ok(n) if n > 0 => n,
                Ok(_) => {
                    return ExecResult::err(
                        format!("{}: {}: loop count out of range\n", name, arg),
                        1,
                    );
                }
                Err(_) => {
                    return ExecResult::err(
                        format!("{}: {}: numeric argument required\n", name, arg),
                        1,
                    );
                }
            },
        };

        if ctx.loop_depth == 0 {
            return ExecResult::status(0);
        }
        let levels = levels.min(ctx.loop_depth);
        tracing::debug!(signal = %name, levels, "loop control");

        let control_flow = if name == "break" {
            ControlFlow::Break(levels)
        } else {
            ControlFlow::Continue(levels)
        };
        ExecResult {
            control_flow,
            ..Default::default()
        }
    }

    /// `sh <script> [args...]`: run another script in a child context.
    async fn nested_script(
        &self,
        args: &[String],
        stdin: Option<&str>,
        ctx: &mut ExecutionContext,
    ) -> Result<ExecResult> {
        let Some((path, script_args)) = args.split_first() else {
            return Ok(ExecResult::err("sh: usage: sh <script> [args...]\n", 2));
        };

        if let Err(e) = ctx.counters.push_nesting(&self.limits) {
            tracing::warn!(script = %path, error = %e, "limit exceeded");
            return Err(e.into());
        }
        let outcome = self.run_child(path, script_args, stdin, ctx).await;
        ctx.counters.pop_nesting();
        outcome
    }

    async fn run_child(
        &self,
        path: &str,
        args: &[String],
        stdin: Option<&str>,
        ctx: &mut ExecutionContext,
    ) -> Result<ExecResult> {
        let statements = match self.load_script(&ctx.cwd, path).await {
            Ok(statements) => statements,
            Err(failure) => return Ok(failure),
        };

        tracing::info!(script = %path, args = args.len(), "nested script");
        let mut child = ctx.child(path, args);
        child.stdin = stdin.map(str::to_string);
        let outcome = self.execute(&statements, &mut child).await;
        ctx.counters.commands = child.counters.commands;

        let mut result = outcome?;
        if result.control_flow != ControlFlow::Abort {
            result.control_flow = ControlFlow::None;
        }
        Ok(result)
    }
}

/// `exit [n]`
fn exit_builtin(args: &[String], ctx: &ExecutionContext) -> ExecResult {
    let (code, stderr) = match args.first() {
        None => (ctx.last_exit_code, String::new()),
        Some(arg) => match arg.parse::<i64>() {
            Ok(n) => (n.rem_euclid(256) as i32, String::new()),
            Err(_) => (2, format!("exit: {}: numeric argument required\n", arg)),
        },
    };
    tracing::debug!(exit_code = code, "exit");
    ExecResult {
        stderr,
        exit_code: code,
        control_flow: ControlFlow::Exit(code),
        ..Default::default()
    }
}

/// `set [-e|+e|-o errexit|+o errexit]`; without arguments lists variables.
fn set_builtin(args: &[String], ctx: &mut ExecutionContext) -> ExecResult {
    if args.is_empty() {
        let mut names: Vec<&String> = ctx.env.keys().collect();
        names.sort();
        let output: String = names
            .into_iter()
            .map(|name| format!("{}={}\n", name, ctx.env[name]))
            .collect();
        return ExecResult::ok(output);
    }

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-e" => ctx.options.errexit = true,
            "+e" => ctx.options.errexit = false,
            "-o" | "+o" => match iter.next().map(String::as_str) {
                Some("errexit") => ctx.options.errexit = arg == "-o",
                Some(other) => {
                    return ExecResult::err(format!("set: {}: invalid option name\n", other), 2);
                }
                None => return ExecResult::err("set: -o: option requires an argument\n", 2),
            },
            other => return ExecResult::err(format!("set: {}: invalid option\n", other), 2),
        }
    }
    ExecResult::status(0)
}
