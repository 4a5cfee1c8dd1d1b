//! Navigation builtins (cd, pwd)

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::interpreter::ExecResult;

/// The cd builtin - change directory.
///
/// Usage: cd [DIR | -]
///
/// Without an argument changes to `$HOME` (or `/`). Updates `PWD` and `OLDPWD`.
pub struct Cd;

#[async_trait]
impl Builtin for Cd {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        if ctx.args.len() > 1 {
            return Ok(ExecResult::err("cd: too many arguments\n", 1));
        }

        let target = match ctx.args.first().map(String::as_str) {
            Some("-") => match ctx.env.get("OLDPWD") {
                Some(old) => old.clone(),
                None => return Ok(ExecResult::err("cd: OLDPWD not set\n", 1)),
            },
            Some(dir) => dir.to_string(),
            None => ctx.env.get("HOME").cloned().unwrap_or_else(|| "/".to_string()),
        };

        let path = ctx.resolve(&target);
        match ctx.fs.stat(&path).await {
            Ok(meta) if meta.file_type.is_dir() => {
                let old = ctx.cwd.to_string_lossy().into_owned();
                ctx.env.insert("OLDPWD".to_string(), old);
                ctx.env
                    .insert("PWD".to_string(), path.to_string_lossy().into_owned());
                *ctx.cwd = path;
                Ok(ExecResult::ok(""))
            }
            Ok(_) => Ok(ExecResult::err(format!("cd: {}: Not a directory\n", target), 1)),
            Err(e) => Ok(ExecResult::err(format!("cd: {}: {}\n", target, e.message()), 1)),
        }
    }
}

/// The pwd builtin - print working directory.
pub struct Pwd;

#[async_trait]
impl Builtin for Pwd {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        Ok(ExecResult::ok(format!("{}\n", ctx.cwd.display())))
    }
}
