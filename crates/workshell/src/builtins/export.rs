//! Variable builtins - export, unset

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::interpreter::ExecResult;
use crate::parser::is_name;

/// export builtin - set variables
///
/// All variables are visible to every command in the workspace, so
/// `export NAME=VALUE` is an assignment and `export NAME` is a no-op.
/// Without arguments, lists variables in a form that can be re-read.
pub struct Export;

#[async_trait]
impl Builtin for Export {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        if ctx.args.is_empty() {
            let mut names: Vec<&String> = ctx.env.keys().collect();
            names.sort();
            let output: String = names
                .into_iter()
                .map(|name| format!("export {}=\"{}\"\n", name, ctx.env[name]))
                .collect();
            return Ok(ExecResult::ok(output));
        }

        let mut stderr = String::new();
        for arg in ctx.args {
            let (name, value) = match arg.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (arg.as_str(), None),
            };
            if !is_name(name) {
                stderr.push_str(&format!("export: '{}': not a valid identifier\n", arg));
                continue;
            }
            if let Some(value) = value {
                ctx.env.insert(name.to_string(), value.to_string());
            }
        }

        let exit_code = if stderr.is_empty() { 0 } else { 1 };
        Ok(ExecResult {
            stderr,
            exit_code,
            ..Default::default()
        })
    }
}

/// unset builtin - remove variables
pub struct Unset;

#[async_trait]
impl Builtin for Unset {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let mut stderr = String::new();
        for name in ctx.args.iter().filter(|a| a.as_str() != "-v") {
            if is_name(name) {
                ctx.env.remove(name);
            } else {
                stderr.push_str(&format!("unset: '{}': not a valid identifier\n", name));
            }
        }
        let exit_code = if stderr.is_empty() { 0 } else { 1 };
        Ok(ExecResult {
            stderr,
            exit_code,
            ..Default::default()
        })
    }
}
