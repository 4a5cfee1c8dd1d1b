//! grep - Pattern matching builtin
//!
//! Usage:
//!   grep [-ivncloqwFE] [-e PATTERN] PATTERN [FILE...]
//!
//! Patterns use the regex crate syntax; basic and extended syntax are
//! treated the same.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};

use super::{Builtin, Context};
use crate::error::{Error, Result};
use crate::interpreter::ExecResult;

/// grep command - pattern matching
pub struct Grep;

#[derive(Default)]
struct GrepOptions<'a> {
    patterns: Vec<&'a str>,
    files: Vec<&'a String>,
    ignore_case: bool,
    invert_match: bool,
    line_numbers: bool,
    count_only: bool,
    files_with_matches: bool,
    only_matching: bool,
    quiet: bool,
    word_regex: bool,
    fixed_strings: bool,
    no_filename: bool,
}

impl<'a> GrepOptions<'a> {
    fn parse(args: &'a [String]) -> Result<Self> {
        let mut opts = GrepOptions::default();
        let mut positional: Vec<&'a String> = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            if arg == "--" {
                positional.extend(&args[i + 1..]);
                break;
            }
            if arg.len() > 1 && arg.starts_with('-') && !arg.starts_with("--") {
                for c in arg[1..].chars() {
                    match c {
                        'i' => opts.ignore_case = true,
                        'v' => opts.invert_match = true,
                        'n' => opts.line_numbers = true,
                        'c' => opts.count_only = true,
                        'l' => opts.files_with_matches = true,
                        'o' => opts.only_matching = true,
                        'q' => opts.quiet = true,
                        'w' => opts.word_regex = true,
                        'F' => opts.fixed_strings = true,
                        'h' => opts.no_filename = true,
                        'E' | 'G' => {}
                        'e' => {
                            i += 1;
                            let pattern = args.get(i).ok_or_else(|| {
                                Error::Execution("option requires an argument -- 'e'".to_string())
                            })?;
                            opts.patterns.push(pattern.as_str());
                        }
                        other => {
                            return Err(Error::Execution(format!("invalid option -- '{}'", other)));
                        }
                    }
                }
            } else {
                positional.push(arg);
            }
            i += 1;
        }

        if opts.patterns.is_empty() {
            if positional.is_empty() {
                return Err(Error::Execution("missing pattern".to_string()));
            }
            opts.patterns.push(positional.remove(0).as_str());
        }
        opts.files = positional;
        Ok(opts)
    }

    fn build_regex(&self) -> Result<Regex> {
        let alternatives: Vec<String> = self
            .patterns
            .iter()
            .map(|p| {
                let p = if self.fixed_strings {
                    regex::escape(p)
                } else {
                    p.to_string()
                };
                if self.word_regex {
                    format!(r"\b(?:{})\b", p)
                } else {
                    format!("(?:{})", p)
                }
            })
            .collect();

        RegexBuilder::new(&alternatives.join("|"))
            .case_insensitive(self.ignore_case)
            .build()
            .map_err(|e| Error::Execution(format!("invalid pattern: {}", e)))
    }
}

#[async_trait]
impl Builtin for Grep {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let opts = GrepOptions::parse(ctx.args)?;
        let regex = opts.build_regex()?;

        let (inputs, errors) = ctx.read_inputs("grep", &opts.files).await;
        let show_filename = opts.files.len() > 1 && !opts.no_filename;
        let mut output = String::new();
        let mut any_match = false;

        for (name, content) in &inputs {
            let label = if name == "-" { "(standard input)" } else { name };
            let mut match_count = 0usize;

            for (line_num, line) in content.lines().enumerate() {
                if regex.is_match(line) == opts.invert_match {
                    continue;
                }
                match_count += 1;
                any_match = true;

                if opts.quiet || opts.count_only || opts.files_with_matches {
                    continue;
                }

                let prefix = {
                    let mut prefix = String::new();
                    if show_filename {
                        prefix.push_str(label);
                        prefix.push(':');
                    }
                    if opts.line_numbers {
                        prefix.push_str(&format!("{}:", line_num + 1));
                    }
                    prefix
                };

                if opts.only_matching && !opts.invert_match {
                    for m in regex.find_iter(line) {
                        output.push_str(&format!("{}{}\n", prefix, m.as_str()));
                    }
                } else {
                    output.push_str(&format!("{}{}\n", prefix, line));
                }
            }

            if opts.quiet {
                continue;
            }
            if opts.files_with_matches {
                if match_count > 0 {
                    output.push_str(&format!("{}\n", label));
                }
            } else if opts.count_only {
                if show_filename {
                    output.push_str(&format!("{}:{}\n", label, match_count));
                } else {
                    output.push_str(&format!("{}\n", match_count));
                }
            }
        }

        let exit_code = if any_match && (opts.quiet || errors.is_empty()) {
            0
        } else if !errors.is_empty() {
            2
        } else {
            1
        };
        let stderr = if opts.quiet && any_match { String::new() } else { errors };

        Ok(ExecResult {
            stdout: output,
            stderr,
            exit_code,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::testing::{run, run_with};
    use crate::fs::InMemoryFs;
    use std::sync::Arc;

    const TEXT: &str = "apple\nBanana\ncherry pie\napplesauce\n";

    #[tokio::test]
    async fn test_basic_match() {
        let result = run(&Grep, &["apple"], Some(TEXT)).await;
        assert_eq!(result.stdout, "apple\napplesauce\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn test_no_match_exit_code() {
        let result = run(&Grep, &["kiwi"], Some(TEXT)).await;
        assert_eq!(result.stdout, "");
        assert_eq!(result.exit_code, 1);
    }

    #[tokio::test]
    async fn test_flags() {
        assert_eq!(run(&Grep, &["-i", "banana"], Some(TEXT)).await.stdout, "Banana\n");
        assert_eq!(run(&Grep, &["-c", "apple"], Some(TEXT)).await.stdout, "2\n");
        assert_eq!(
            run(&Grep, &["-vn", "apple"], Some(TEXT)).await.stdout,
            "2:Banana\n3:cherry pie\n"
        );
        assert_eq!(run(&Grep, &["-w", "apple"], Some(TEXT)).await.stdout, "apple\n");
        assert_eq!(run(&Grep, &["-o", "p+"], Some("apple\n")).await.stdout, "pp\n");
        assert_eq!(run(&Grep, &["-F", "a.c"], Some("abc\na.c\n")).await.stdout, "a.c\n");
    }

    #[tokio::test]
    async fn test_quiet() {
        let result = run(&Grep, &["-q", "cherry"], Some(TEXT)).await;
        assert_eq!(result.stdout, "");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn test_multiple_patterns() {
        let result = run(&Grep, &["-e", "Ban", "-e", "pie"], Some(TEXT)).await;
        assert_eq!(result.stdout, "Banana\ncherry pie\n");
    }

    #[tokio::test]
    async fn test_files_with_names() {
        let fs = Arc::new(
            InMemoryFs::new()
                .with_file("/tmp/a", "x\ny\n")
                .with_file("/tmp/b", "y\n"),
        );
        let result = run_with(&Grep, &["y", "/tmp/a", "/tmp/b"], None, fs.clone()).await;
        assert_eq!(result.stdout, "/tmp/a:y\n/tmp/b:y\n");

        let result = run_with(&Grep, &["-l", "x", "/tmp/a", "/tmp/b"], None, fs.clone()).await;
        assert_eq!(result.stdout, "/tmp/a\n");

        let result = run_with(&Grep, &["x", "/tmp/missing"], None, fs).await;
        assert_eq!(result.exit_code, 2);
        assert_eq!(result.stderr, "grep: /tmp/missing: No such file or directory\n");
    }

    #[test]
    fn test_missing_pattern() {
        assert!(GrepOptions::parse(&[]).is_err());
    }
}
