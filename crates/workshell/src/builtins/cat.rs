//! cat builtin command

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::interpreter::ExecResult;

/// The cat builtin command.
///
/// Usage: cat [-n] [FILE...]
pub struct Cat;

#[async_trait]
impl Builtin for Cat {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let mut number_lines = false;
        let mut files = Vec::new();

        for arg in ctx.args {
            match arg.as_str() {
                "-n" => number_lines = true,
                _ => files.push(arg),
            }
        }

        let (inputs, errors) = ctx.read_inputs("cat", &files).await;
        let raw: String = inputs.into_iter().map(|(_, text)| text).collect();

        let output = if number_lines {
            raw.split_inclusive('\n')
                .enumerate()
                .map(|(i, line)| format!("{:>6}\t{}", i + 1, line))
                .collect()
        } else {
            raw
        };

        let exit_code = if errors.is_empty() { 0 } else { 1 };
        Ok(ExecResult {
            stdout: output,
            stderr: errors,
            exit_code,
            ..Default::default()
        })
    }
}
