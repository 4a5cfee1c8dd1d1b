//! File descriptor table and redirections
//!
//! Redirections never change the context's base table. Each command gets a
//! copy of it with its own redirections applied in source order, and its
//! output is routed through that copy once it finishes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::Interpreter;
use super::context::ExecutionContext;
use super::expand::ExpansionEffects;
use crate::builtins::resolve_path;
use crate::error::{Error, Result};
use crate::parser::{RedirectMode, RedirectTarget, Redirection};

const DEV_NULL: &str = "/dev/null";

/// Where a descriptor's output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sink {
    /// The command's captured stdout
    Stdout,
    /// The command's captured stderr
    Stderr,
    /// Appended to a file in the virtual filesystem
    File(PathBuf),
    /// Discarded
    Null,
}

/// Descriptor bindings. Defaults to `1 -> Stdout`, `2 -> Stderr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FdTable {
    bindings: BTreeMap<i32, Sink>,
}

impl Default for FdTable {
    fn default() -> Self {
        let mut bindings = BTreeMap::new();
        bindings.insert(1, Sink::Stdout);
        bindings.insert(2, Sink::Stderr);
        Self { bindings }
    }
}

impl FdTable {
    pub fn get(&self, fd: i32) -> Option<&Sink> {
        self.bindings.get(&fd)
    }

    pub fn bind(&mut self, fd: i32, sink: Sink) {
        self.bindings.insert(fd, sink);
    }
}

/// A command's descriptor overlay plus its `<` input, if any.
#[derive(Debug, Clone)]
pub struct Redirected {
    pub table: FdTable,
    pub stdin: Option<String>,
}

fn redirect_error(target: &str, err: &Error) -> Error {
    Error::Redirect(format!("{}: {}", target, err.message()))
}

impl Interpreter {
    /// Build the overlay for one command.
    ///
    /// Target words are expanded first; a target that resolves to `/dev/null`
    /// never reaches the filesystem. Output files are created (or emptied, for
    /// `>`) here, so a failing redirection stops the command before it runs.
    pub(crate) async fn apply_redirections(
        &self,
        specs: &[Redirection],
        ctx: &mut ExecutionContext,
        effects: &mut ExpansionEffects,
    ) -> Result<Redirected> {
        let mut table = ctx.fd_table.clone();
        let mut stdin = None;

        for spec in specs {
            let target = match &spec.target {
                RedirectTarget::Fd(source) => {
                    let sink = table
                        .get(*source)
                        .cloned()
                        .ok_or_else(|| Error::Redirect(format!("{}: bad file descriptor", source)))?;
                    table.bind(spec.fd, sink);
                    continue;
                }
                RedirectTarget::Path(word) => self.expand_word(word, ctx, effects).await?,
            };

            if target.is_empty() {
                return Err(Error::Redirect(format!("{}: ambiguous redirect", spec.target_text())));
            }

            let path = resolve_path(&ctx.cwd, &target);
            if spec.mode == RedirectMode::Null || path == Path::new(DEV_NULL) {
                match spec.mode {
                    RedirectMode::Input => stdin = Some(String::new()),
                    RedirectMode::CombinedTruncate | RedirectMode::CombinedAppend => {
                        table.bind(1, Sink::Null);
                        table.bind(2, Sink::Null);
                    }
                    _ => table.bind(spec.fd, Sink::Null),
                }
                continue;
            }

            match spec.mode {
                RedirectMode::Truncate | RedirectMode::CombinedTruncate => {
                    self.fs
                        .write_file(&path, b"")
                        .await
                        .map_err(|e| redirect_error(&target, &e))?;
                }
                RedirectMode::Append | RedirectMode::CombinedAppend => {
                    self.fs
                        .append_file(&path, b"")
                        .await
                        .map_err(|e| redirect_error(&target, &e))?;
                }
                RedirectMode::Input => {
                    let content = self
                        .fs
                        .read_file(&path)
                        .await
                        .map_err(|e| redirect_error(&target, &e))?;
                    if spec.fd == 0 {
                        stdin = Some(String::from_utf8_lossy(&content).into_owned());
                    }
                    continue;
                }
                RedirectMode::Null | RedirectMode::Dup => {}
            }

            if spec.mode.is_combined() {
                table.bind(1, Sink::File(path.clone()));
                table.bind(2, Sink::File(path));
            } else {
                table.bind(spec.fd, Sink::File(path));
            }
        }

        Ok(Redirected { table, stdin })
    }

    /// Send a finished command's output through its overlay.
    ///
    /// Returns what ends up on the command's stdout and stderr. A file that
    /// can no longer be written adds an `sh: <path>: <reason>` line to stderr.
    pub(crate) async fn route_output(
        &self,
        table: &FdTable,
        stdout: String,
        stderr: String,
    ) -> (String, String) {
        let mut out = String::new();
        let mut err = String::new();

        for (fd, text) in [(1, stdout), (2, stderr)] {
            if text.is_empty() {
                continue;
            }
            match table.get(fd) {
                Some(Sink::Stdout) => out.push_str(&text),
                Some(Sink::Stderr) => err.push_str(&text),
                Some(Sink::File(path)) => {
                    if let Err(e) = self.fs.append_file(path, text.as_bytes()).await {
                        err.push_str(&format!("sh: {}: {}\n", path.display(), e.message()));
                    }
                }
                Some(Sink::Null) | None => {}
            }
        }

        (out, err)
    }
}

impl Redirection {
    /// Source text of the target, for diagnostics.
    fn target_text(&self) -> String {
        match &self.target {
            RedirectTarget::Path(word) => word.raw.clone(),
            RedirectTarget::Fd(fd) => fd.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = FdTable::default();
        assert_eq!(table.get(1), Some(&Sink::Stdout));
        assert_eq!(table.get(2), Some(&Sink::Stderr));
        assert_eq!(table.get(3), None);
    }

    #[test]
    fn test_bind_overrides() {
        let mut table = FdTable::default();
        table.bind(2, Sink::Stdout);
        table.bind(1, Sink::Null);
        assert_eq!(table.get(2), Some(&Sink::Stdout));
        assert_eq!(table.get(1), Some(&Sink::Null));
    }
}
