//! Workshell CLI - run workspace scripts in the virtual shell
//!
//! Usage:
//!   workshell -c 'echo hello'          # Execute a command string
//!   workshell build.sh arg1 arg2       # Execute a host script file
//!   workshell --json build.sh          # Print {stdout, stderr, code} as JSON

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use workshell::{Error, ExecutionLimits, InMemoryFs, ScriptOutput, Shell};

/// Workshell - POSIX-style scripts over a virtual filesystem
#[derive(Parser, Debug)]
#[command(name = "workshell")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Execute the given command string
    #[arg(short = 'c')]
    command: Option<String>,

    /// Script file to execute
    #[arg()]
    script: Option<PathBuf>,

    /// Arguments to pass to the script
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,

    /// Exit on the first failing command (`set -e`)
    #[arg(short = 'e', long)]
    errexit: bool,

    /// Set a shell variable (NAME=VALUE), repeatable
    #[arg(long = "env", value_name = "NAME=VALUE")]
    env: Vec<String>,

    /// Working directory inside the virtual filesystem
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Maximum commands per run
    #[arg(long)]
    max_commands: Option<usize>,

    /// Maximum iterations of a single loop
    #[arg(long)]
    max_loop_iterations: Option<usize>,

    /// Wall-clock budget in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print the result as JSON instead of replaying the streams
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn limits(&self) -> ExecutionLimits {
        let mut limits = ExecutionLimits::new();
        if let Some(count) = self.max_commands {
            limits = limits.max_commands(count);
        }
        if let Some(count) = self.max_loop_iterations {
            limits = limits.max_loop_iterations(count);
        }
        if let Some(secs) = self.timeout_secs {
            limits = limits.timeout(Duration::from_secs(secs));
        }
        limits
    }
}

fn init_tracing(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(format!("workshell={}", level)),
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(())
}

fn build_shell(args: &Args, fs: InMemoryFs) -> Result<Shell> {
    let mut builder = Shell::builder()
        .fs(Arc::new(fs))
        .limits(args.limits())
        .errexit(args.errexit);
    for pair in &args.env {
        let (name, value) = pair
            .split_once('=')
            .with_context(|| format!("--env expects NAME=VALUE, got '{}'", pair))?;
        builder = builder.env(name, value);
    }
    if let Some(cwd) = &args.cwd {
        builder = builder.cwd(cwd.clone());
    }
    Ok(builder.build())
}

/// Run `-c` text in a fresh session. Syntax errors are reported like a
/// script's, with code 2.
async fn run_command(shell: &mut Shell, command: &str) -> Result<ScriptOutput> {
    match shell.exec(command).await {
        Ok(result) => Ok(result.into()),
        Err(e @ (Error::Parse(_) | Error::ParseAt { .. })) => {
            tracing::debug!(error = %e, "command string rejected");
            let location = e.line().map(|l| format!("line {}: ", l)).unwrap_or_default();
            Ok(ScriptOutput {
                stderr: format!("sh: -c: {}{}\n", location, e.message()),
                code: 2,
                ..Default::default()
            })
        }
        Err(e) => Err(e).context("Failed to execute command"),
    }
}

/// Copy a host script into the virtual filesystem at its absolute path and
/// run it there.
async fn run_host_script(args: &Args, script: &PathBuf) -> Result<ScriptOutput> {
    let host_path = std::fs::canonicalize(script)
        .with_context(|| format!("Failed to resolve script: {}", script.display()))?;
    let content = std::fs::read(&host_path)
        .with_context(|| format!("Failed to read script: {}", script.display()))?;
    let virtual_path = host_path.to_string_lossy().into_owned();
    tracing::info!(script = %virtual_path, bytes = content.len(), "loaded host script");

    let fs = InMemoryFs::new().with_file(&host_path, content);
    let shell = build_shell(args, fs)?;
    shell
        .run_script(&virtual_path, &args.args)
        .await
        .context("Failed to execute script")
}

fn emit(output: &ScriptOutput, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(output).context("Failed to encode output")?);
        return Ok(());
    }
    print!("{}", output.stdout);
    if !output.stderr.is_empty() {
        eprint!("{}", output.stderr);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    let outcome = if let Some(command) = &args.command {
        tracing::info!(json = args.json, "running command string");
        let mut shell = build_shell(&args, InMemoryFs::new())?;
        run_command(&mut shell, command).await
    } else if let Some(script) = &args.script {
        tracing::info!(script = %script.display(), args = args.args.len(), "running script");
        run_host_script(&args, script).await
    } else {
        eprintln!("Usage: workshell -c 'command' or workshell script.sh [args...]");
        std::process::exit(2);
    };

    let output = match outcome {
        Ok(output) => output,
        Err(e) => {
            tracing::error!(error = %format_args!("{:#}", e), "run failed");
            return Err(e);
        }
    };
    tracing::info!(exit_code = output.code, "finished");

    emit(&output, args.json)?;
    std::process::exit(output.code);
}
