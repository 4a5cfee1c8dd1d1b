//! ls builtin - list directory contents

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::fs::{DirEntry, Metadata};
use crate::interpreter::ExecResult;

/// The ls builtin - list directory contents.
///
/// Usage: ls [-a] [-l] [-1] [PATH...]
///
/// Output is always one entry per line; `-1` is accepted for compatibility.
pub struct Ls;

#[derive(Default)]
struct LsOptions {
    all: bool,
    long: bool,
}

impl LsOptions {
    fn format(&self, name: &str, meta: &Metadata) -> String {
        if self.long {
            let kind = if meta.file_type.is_dir() { 'd' } else { '-' };
            format!("{} {:>8} {}\n", kind, meta.size, name)
        } else {
            format!("{}\n", name)
        }
    }
}

#[async_trait]
impl Builtin for Ls {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let mut opts = LsOptions::default();
        let mut paths: Vec<&str> = Vec::new();

        for arg in ctx.args {
            if arg.len() > 1 && arg.starts_with('-') {
                for c in arg[1..].chars() {
                    match c {
                        'a' => opts.all = true,
                        'l' => opts.long = true,
                        '1' => {}
                        _ => return Ok(ExecResult::err(format!("ls: invalid option -- '{}'\n", c), 2)),
                    }
                }
            } else {
                paths.push(arg);
            }
        }
        if paths.is_empty() {
            paths.push(".");
        }

        let mut files_out = String::new();
        let mut dirs: Vec<(&str, Vec<DirEntry>)> = Vec::new();
        let mut stderr = String::new();

        for path_str in paths.iter().copied() {
            let path = ctx.resolve(path_str);
            match ctx.fs.stat(&path).await {
                Ok(meta) if meta.file_type.is_dir() => match ctx.fs.read_dir(&path).await {
                    Ok(entries) => dirs.push((path_str, entries)),
                    Err(e) => stderr.push_str(&format!(
                        "ls: cannot open directory '{}': {}\n",
                        path_str,
                        e.message()
                    )),
                },
                Ok(meta) => files_out.push_str(&opts.format(path_str, &meta)),
                Err(e) => stderr.push_str(&format!(
                    "ls: cannot access '{}': {}\n",
                    path_str,
                    e.message()
                )),
            }
        }

        let with_headers = paths.len() > 1;
        let mut sections = Vec::new();
        if !files_out.is_empty() {
            sections.push(files_out);
        }
        for (name, entries) in dirs {
            let mut section = String::new();
            if with_headers {
                section.push_str(&format!("{}:\n", name));
            }
            for entry in entries {
                if !opts.all && entry.name.starts_with('.') {
                    continue;
                }
                section.push_str(&opts.format(&entry.name, &entry.metadata));
            }
            sections.push(section);
        }

        let exit_code = if stderr.is_empty() { 0 } else { 2 };
        Ok(ExecResult {
            stdout: sections.join("\n"),
            stderr,
            exit_code,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::testing::run_with;
    use crate::fs::InMemoryFs;
    use std::sync::Arc;

    fn fs() -> Arc<InMemoryFs> {
        Arc::new(
            InMemoryFs::new()
                .with_file("/proj/b.txt", "bb")
                .with_file("/proj/a.txt", "a")
                .with_file("/proj/.hidden", "")
                .with_file("/proj/src/main.rs", ""),
        )
    }

    #[tokio::test]
    async fn test_ls_sorted_and_hides_dotfiles() {
        let result = run_with(&Ls, &["/proj"], None, fs()).await;
        assert_eq!(result.stdout, "a.txt\nb.txt\nsrc\n");

        let result = run_with(&Ls, &["-a", "/proj"], None, fs()).await;
        assert_eq!(result.stdout, ".hidden\na.txt\nb.txt\nsrc\n");
    }

    #[tokio::test]
    async fn test_ls_long() {
        let result = run_with(&Ls, &["-l", "/proj/b.txt"], None, fs()).await;
        assert_eq!(result.stdout, "-        2 /proj/b.txt\n");
    }

    #[tokio::test]
    async fn test_ls_multiple_paths() {
        let result = run_with(&Ls, &["/proj/a.txt", "/proj/src"], None, fs()).await;
        assert_eq!(result.stdout, "/proj/a.txt\n\n/proj/src:\nmain.rs\n");
    }

    #[tokio::test]
    async fn test_ls_missing() {
        let result = run_with(&Ls, &["/nope"], None, fs()).await;
        assert_eq!(result.exit_code, 2);
        assert_eq!(result.stderr, "ls: cannot access '/nope': No such file or directory\n");
    }
}
