//! File operation builtins - mkdir, touch, rm

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::interpreter::ExecResult;

/// Split `-xyz` flag words from operands. `--` ends the flags.
fn split_flags(args: &[String]) -> (Vec<char>, Vec<&String>) {
    let mut flags = Vec::new();
    let mut operands = Vec::new();
    let mut flags_done = false;

    for arg in args {
        if flags_done || arg.len() < 2 || !arg.starts_with('-') {
            operands.push(arg);
        } else if arg == "--" {
            flags_done = true;
        } else {
            flags.extend(arg[1..].chars());
        }
    }
    (flags, operands)
}

fn finish(stderr: String) -> ExecResult {
    let exit_code = if stderr.is_empty() { 0 } else { 1 };
    ExecResult {
        stderr,
        exit_code,
        ..Default::default()
    }
}

/// The mkdir builtin - create directories.
///
/// Usage: mkdir [-p] DIRECTORY...
pub struct Mkdir;

#[async_trait]
impl Builtin for Mkdir {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let (flags, dirs) = split_flags(ctx.args);
        if let Some(bad) = flags.iter().find(|c| **c != 'p') {
            return Ok(ExecResult::err(format!("mkdir: invalid option -- '{}'\n", bad), 1));
        }
        if dirs.is_empty() {
            return Ok(ExecResult::err("mkdir: missing operand\n", 1));
        }
        let parents = !flags.is_empty();

        let mut stderr = String::new();
        for dir in dirs {
            if let Err(e) = ctx.fs.mkdir(&ctx.resolve(dir), parents).await {
                stderr.push_str(&format!(
                    "mkdir: cannot create directory '{}': {}\n",
                    dir,
                    e.message()
                ));
            }
        }
        Ok(finish(stderr))
    }
}

/// The touch builtin - create empty files or update their timestamps.
///
/// Usage: touch FILE...
pub struct Touch;

#[async_trait]
impl Builtin for Touch {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let (_, files) = split_flags(ctx.args);
        if files.is_empty() {
            return Ok(ExecResult::err("touch: missing file operand\n", 1));
        }

        let mut stderr = String::new();
        for file in files {
            // Appending nothing creates a missing file and bumps the mtime
            if let Err(e) = ctx.fs.append_file(&ctx.resolve(file), b"").await {
                stderr.push_str(&format!("touch: cannot touch '{}': {}\n", file, e.message()));
            }
        }
        Ok(finish(stderr))
    }
}

/// The rm builtin - remove files and directories.
///
/// Usage: rm [-rRf] FILE...
pub struct Rm;

#[async_trait]
impl Builtin for Rm {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let (flags, files) = split_flags(ctx.args);
        let recursive = flags.iter().any(|c| matches!(c, 'r' | 'R'));
        let force = flags.contains(&'f');
        if let Some(bad) = flags.iter().find(|c| !matches!(c, 'r' | 'R' | 'f')) {
            return Ok(ExecResult::err(format!("rm: invalid option -- '{}'\n", bad), 1));
        }
        if files.is_empty() {
            if force {
                return Ok(ExecResult::ok(""));
            }
            return Ok(ExecResult::err("rm: missing operand\n", 1));
        }

        let mut stderr = String::new();
        for file in files {
            let path = ctx.resolve(file);
            let result = match ctx.fs.stat(&path).await {
                Ok(meta) if meta.file_type.is_dir() && !recursive => {
                    stderr.push_str(&format!("rm: cannot remove '{}': Is a directory\n", file));
                    continue;
                }
                Ok(_) => ctx.fs.remove(&path, recursive).await,
                Err(_) if force => continue,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                stderr.push_str(&format!("rm: cannot remove '{}': {}\n", file, e.message()));
            }
        }
        Ok(finish(stderr))
    }
}
