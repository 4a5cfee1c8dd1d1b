//! Custom Builtins Example
//!
//! Demonstrates how to give workspace scripts extra commands. Custom builtins
//! see their arguments, the shell variables, the virtual filesystem and stdin.
//!
//! Run with: cargo run --example custom_builtins

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use workshell::{Builtin, BuiltinContext, ExecResult, InMemoryFs, Shell};

/// Counts lines of its file operands, or of stdin
struct LineCount;

#[async_trait]
impl Builtin for LineCount {
    async fn execute(&self, ctx: BuiltinContext<'_>) -> workshell::Result<ExecResult> {
        let files: Vec<&String> = ctx.args.iter().collect();
        let (inputs, errors) = ctx.read_inputs("lines", &files).await;
        let total: usize = inputs.iter().map(|(_, text)| text.lines().count()).sum();
        Ok(ExecResult {
            stdout: format!("{}\n", total),
            stderr: errors.clone(),
            exit_code: if errors.is_empty() { 0 } else { 1 },
            ..Default::default()
        })
    }
}

/// Hands out increasing build numbers, shared by every run
struct BuildNumber {
    next: Arc<AtomicU64>,
}

#[async_trait]
impl Builtin for BuildNumber {
    async fn execute(&self, _ctx: BuiltinContext<'_>) -> workshell::Result<ExecResult> {
        let number = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ExecResult::ok(format!("{}\n", number)))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let fs = InMemoryFs::new()
        .with_file("/ws/notes.txt", "one\ntwo\nthree\n")
        .with_file(
            "/ws/report.sh",
            "n=$(build-number)\necho \"build $n: $(lines /ws/notes.txt) lines\"\necho a b | lines\n",
        );

    let shell = Shell::builder()
        .fs(Arc::new(fs))
        .builtin("lines", Box::new(LineCount))
        .builtin(
            "build-number",
            Box::new(BuildNumber {
                next: Arc::new(AtomicU64::new(0)),
            }),
        )
        .build();

    for _ in 0..2 {
        let output = shell.run("sh /ws/report.sh").await?;
        print!("{}", output.stdout);
    }

    Ok(())
}
