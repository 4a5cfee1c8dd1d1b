//! Head and tail builtins - output first/last lines of input

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::{Error, Result};
use crate::interpreter::ExecResult;

/// Default number of lines to output
const DEFAULT_LINES: usize = 10;

/// Which lines `tail` keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Count {
    /// The first/last N lines
    Lines(usize),
    /// `tail -n +N`: everything from line N on
    From(usize),
}

/// The head builtin - output the first N lines of input.
///
/// Usage: head [-n NUM | -NUM] [FILE...]
pub struct Head;

#[async_trait]
impl Builtin for Head {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let (count, files) = parse_head_tail_args("head", ctx.args)?;
        let n = match count {
            Count::Lines(n) | Count::From(n) => n,
        };
        run_per_file(&ctx, "head", &files, |text| {
            text.split_inclusive('\n').take(n).collect()
        })
        .await
    }
}

/// The tail builtin - output the last N lines of input.
///
/// Usage: tail [-n NUM | -n +NUM | -NUM] [FILE...]
pub struct Tail;

#[async_trait]
impl Builtin for Tail {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let (count, files) = parse_head_tail_args("tail", ctx.args)?;
        run_per_file(&ctx, "tail", &files, |text| {
            let lines: Vec<&str> = text.split_inclusive('\n').collect();
            let start = match count {
                Count::Lines(n) => lines.len().saturating_sub(n),
                Count::From(n) => n.saturating_sub(1).min(lines.len()),
            };
            lines[start..].concat()
        })
        .await
    }
}

async fn run_per_file(
    ctx: &Context<'_>,
    cmd: &str,
    files: &[&String],
    select: impl Fn(&str) -> String,
) -> Result<ExecResult> {
    let (inputs, errors) = ctx.read_inputs(cmd, files).await;
    let with_headers = files.len() > 1;
    let mut output = String::new();

    for (i, (name, text)) in inputs.iter().enumerate() {
        if with_headers {
            if i > 0 {
                output.push('\n');
            }
            let label = if name == "-" { "standard input" } else { name };
            output.push_str(&format!("==> {} <==\n", label));
        }
        output.push_str(&select(text));
    }

    let exit_code = if errors.is_empty() { 0 } else { 1 };
    Ok(ExecResult {
        stdout: output,
        stderr: errors,
        exit_code,
        ..Default::default()
    })
}

/// Parse arguments for head/tail
fn parse_head_tail_args<'a>(cmd: &str, args: &'a [String]) -> Result<(Count, Vec<&'a String>)> {
    let mut count = Count::Lines(DEFAULT_LINES);
    let mut files = Vec::new();
    let mut i = 0;

    while i < args.len() {
        let arg = &args[i];
        let value = if arg == "-n" {
            i += 1;
            Some(
                args.get(i)
                    .ok_or_else(|| Error::Execution(format!("{}: option requires an argument -- 'n'", cmd)))?
                    .as_str(),
            )
        } else if let Some(v) = arg.strip_prefix("-n") {
            Some(v)
        } else if arg.len() > 1 && arg.starts_with('-') {
            Some(&arg[1..])
        } else {
            files.push(arg);
            None
        };

        if let Some(value) = value {
            count = parse_count(value)
                .ok_or_else(|| Error::Execution(format!("invalid number of lines: '{}'", value)))?;
        }
        i += 1;
    }

    Ok((count, files))
}

fn parse_count(value: &str) -> Option<Count> {
    match value.strip_prefix('+') {
        Some(from) => from.parse().ok().map(Count::From),
        None => value.parse().ok().map(Count::Lines),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::testing::{run, run_with};
    use crate::fs::InMemoryFs;
    use std::sync::Arc;

    const TWELVE: &str = "1\n2\n3\n4\n5\n6\n7\n8\n9\n10\n11\n12\n";

    #[tokio::test]
    async fn test_head_default() {
        let result = run(&Head, &[], Some(TWELVE)).await;
        assert_eq!(result.stdout, "1\n2\n3\n4\n5\n6\n7\n8\n9\n10\n");
    }

    #[tokio::test]
    async fn test_head_n_forms() {
        assert_eq!(run(&Head, &["-n", "2"], Some(TWELVE)).await.stdout, "1\n2\n");
        assert_eq!(run(&Head, &["-n3"], Some(TWELVE)).await.stdout, "1\n2\n3\n");
        assert_eq!(run(&Head, &["-1"], Some(TWELVE)).await.stdout, "1\n");
    }

    #[tokio::test]
    async fn test_head_keeps_missing_final_newline() {
        assert_eq!(run(&Head, &["-n", "5"], Some("a\nb")).await.stdout, "a\nb");
    }

    #[tokio::test]
    async fn test_tail() {
        assert_eq!(run(&Tail, &["-n", "2"], Some(TWELVE)).await.stdout, "11\n12\n");
        assert_eq!(run(&Tail, &["-n", "+11"], Some(TWELVE)).await.stdout, "11\n12\n");
        assert_eq!(run(&Tail, &["-3"], Some("a\nb\n")).await.stdout, "a\nb\n");
    }

    #[tokio::test]
    async fn test_multiple_files_get_headers() {
        let fs = Arc::new(
            InMemoryFs::new()
                .with_file("/tmp/a", "a1\na2\n")
                .with_file("/tmp/b", "b1\n"),
        );
        let result = run_with(&Head, &["-n", "1", "/tmp/a", "/tmp/b"], None, fs).await;
        assert_eq!(result.stdout, "==> /tmp/a <==\na1\n\n==> /tmp/b <==\nb1\n");
    }

    #[test]
    fn test_invalid_count() {
        let args = vec!["-n".to_string(), "abc".to_string()];
        assert!(parse_head_tail_args("head", &args).is_err());
    }
}
