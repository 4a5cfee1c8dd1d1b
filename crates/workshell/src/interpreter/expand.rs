//! Word expansion
//!
//! Turns parsed words into argument strings: parameters, command
//! substitution, arithmetic, then field splitting of the unquoted results.

use super::Interpreter;
use super::arithmetic;
use super::context::ExecutionContext;
use crate::error::Result;
use crate::parser::{Param, Statement, Word, WordPart};

/// Side effects of expanding a command's words.
#[derive(Debug, Default)]
pub(crate) struct ExpansionEffects {
    /// stderr written by command substitutions
    pub stderr: String,
    /// Exit status of the last command substitution
    pub last_status: Option<i32>,
}

fn is_field_separator(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n')
}

/// Accumulates fields for one word.
#[derive(Default)]
struct Fields {
    done: Vec<String>,
    current: String,
    /// The current field exists even if empty (e.g. after `""`)
    started: bool,
}

impl Fields {
    fn push_quoted(&mut self, text: &str) {
        self.current.push_str(text);
        self.started = true;
    }

    fn push_split(&mut self, text: &str) {
        for c in text.chars() {
            if is_field_separator(c) {
                self.finish_field();
            } else {
                self.current.push(c);
                self.started = true;
            }
        }
    }

    fn finish_field(&mut self) {
        if self.started {
            self.done.push(std::mem::take(&mut self.current));
            self.started = false;
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.finish_field();
        self.done
    }
}

impl Interpreter {
    /// Expand a word to a single string, without field splitting.
    ///
    /// Used for assignment values and redirection targets.
    pub(crate) async fn expand_word(
        &self,
        word: &Word,
        ctx: &mut ExecutionContext,
        effects: &mut ExpansionEffects,
    ) -> Result<String> {
        let mut result = String::new();
        for part in &word.parts {
            match part {
                WordPart::Literal { text, .. } => result.push_str(text),
                WordPart::Param { param, .. } => result.push_str(&param_value(param, ctx)),
                WordPart::CommandSubst { body, .. } => {
                    result.push_str(&self.command_substitution(body, ctx, effects).await?);
                }
                WordPart::Arithmetic { expr, .. } => {
                    result.push_str(&arithmetic::evaluate(expr, ctx)?.to_string());
                }
            }
        }
        Ok(result)
    }

    /// Expand command words into argument fields.
    ///
    /// Quoted text is never split. `"$@"` gives one field per positional
    /// parameter; an unquoted expansion that is empty gives no field at all.
    pub(crate) async fn expand_fields(
        &self,
        words: &[Word],
        ctx: &mut ExecutionContext,
        effects: &mut ExpansionEffects,
    ) -> Result<Vec<String>> {
        let mut all = Vec::new();

        for word in words {
            if ctx.arg_count() == 0 && is_bare_quoted_at(word) {
                continue;
            }
            let mut fields = Fields::default();
            for part in &word.parts {
                match part {
                    WordPart::Literal { text, .. } => fields.push_quoted(text),
                    WordPart::Param {
                        param: Param::All,
                        quoted: true,
                    } => {
                        let args = ctx.args();
                        for (i, arg) in args.iter().enumerate() {
                            if i > 0 {
                                fields.finish_field();
                                fields.started = true;
                            }
                            fields.push_quoted(arg);
                        }
                    }
                    WordPart::Param { param, quoted } => {
                        let value = param_value(param, ctx);
                        if *quoted {
                            fields.push_quoted(&value);
                        } else {
                            fields.push_split(&value);
                        }
                    }
                    WordPart::CommandSubst { body, quoted } => {
                        let output = self.command_substitution(body, ctx, effects).await?;
                        if *quoted {
                            fields.push_quoted(&output);
                        } else {
                            fields.push_split(&output);
                        }
                    }
                    WordPart::Arithmetic { expr, quoted } => {
                        let value = arithmetic::evaluate(expr, ctx)?.to_string();
                        if *quoted {
                            fields.push_quoted(&value);
                        } else {
                            fields.push_split(&value);
                        }
                    }
                }
            }
            all.extend(fields.finish());
        }

        Ok(all)
    }

    /// Run `$(...)` against the same context and capture its stdout.
    async fn command_substitution(
        &self,
        body: &[Statement],
        ctx: &mut ExecutionContext,
        effects: &mut ExpansionEffects,
    ) -> Result<String> {
        ctx.counters.push_nesting(&self.limits)?;
        let outcome = self.execute_block(body, ctx).await;
        ctx.counters.pop_nesting();
        let result = outcome?;

        ctx.last_exit_code = result.exit_code;
        effects.last_status = Some(result.exit_code);
        effects.stderr.push_str(&result.stderr);

        let mut output = result.stdout;
        let trimmed = output.trim_end_matches('\n').len();
        output.truncate(trimmed);
        Ok(output)
    }
}

/// `"$@"` on its own: no arguments means no field, not an empty one.
fn is_bare_quoted_at(word: &Word) -> bool {
    let mut has_at = false;
    for part in &word.parts {
        match part {
            WordPart::Literal { text, quoted: true } if text.is_empty() => {}
            WordPart::Param {
                param: Param::All,
                quoted: true,
            } => has_at = true,
            _ => return false,
        }
    }
    has_at
}

fn param_value(param: &Param, ctx: &ExecutionContext) -> String {
    match param {
        Param::Named(name) => ctx.env.get(name).cloned().unwrap_or_default(),
        Param::Positional(n) => ctx.positional.get(*n).cloned().unwrap_or_default(),
        Param::All | Param::Star => ctx.args().join(" "),
        Param::Count => ctx.arg_count().to_string(),
        Param::Status => ctx.last_exit_code.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::builtins::default_registry;
    use crate::fs::InMemoryFs;
    use crate::limits::ExecutionLimits;
    use crate::logging_impl::LogConfig;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn interpreter() -> Interpreter {
        Interpreter::new(
            Arc::new(InMemoryFs::new()),
            default_registry(),
            ExecutionLimits::default(),
            LogConfig::default(),
        )
    }

    fn context() -> ExecutionContext {
        let mut env = HashMap::new();
        env.insert("SPACED".to_string(), " a  b ".to_string());
        env.insert("EMPTY".to_string(), String::new());
        let args = vec!["one".to_string(), "two three".to_string()];
        ExecutionContext::new(PathBuf::from("/"), env, "/s.sh", &args)
    }

    async fn fields(source: &str) -> Vec<String> {
        let words: Vec<Word> = source
            .split(' ')
            .map(|raw| Word::parse(raw, 1).unwrap())
            .collect();
        let mut ctx = context();
        let mut effects = ExpansionEffects::default();
        interpreter()
            .expand_fields(&words, &mut ctx, &mut effects)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_unquoted_expansion_splits() {
        assert_eq!(fields("$SPACED").await, vec!["a", "b"]);
        assert_eq!(fields("x$SPACED").await, vec!["x", "a", "b"]);
    }

    #[tokio::test]
    async fn test_quoted_expansion_keeps_spaces() {
        assert_eq!(fields("\"$SPACED\"").await, vec![" a  b "]);
    }

    #[tokio::test]
    async fn test_empty_expansions() {
        assert!(fields("$EMPTY").await.is_empty());
        assert_eq!(fields("\"\"").await, vec![""]);
        assert_eq!(fields("\"$EMPTY\"").await, vec![""]);
    }

    #[tokio::test]
    async fn test_at_and_star() {
        assert_eq!(fields("\"$@\"").await, vec!["one", "two three"]);
        assert_eq!(fields("$@").await, vec!["one", "two", "three"]);
        assert_eq!(fields("\"$*\"").await, vec!["one two three"]);
        assert_eq!(fields("\"<$@>\"").await, vec!["<one", "two three>"]);
        assert_eq!(fields("$# $0 $2").await, vec!["2", "/s.sh", "two", "three"]);
    }

    #[tokio::test]
    async fn test_quoted_at_without_args() {
        let words = vec![Word::parse("\"$@\"", 1).unwrap(), Word::parse("\"\"", 1).unwrap()];
        let mut ctx = ExecutionContext::new(PathBuf::from("/"), HashMap::new(), "/s.sh", &[]);
        let mut effects = ExpansionEffects::default();
        let fields = interpreter()
            .expand_fields(&words, &mut ctx, &mut effects)
            .await
            .unwrap();
        assert_eq!(fields, vec![""]);
    }

    #[tokio::test]
    async fn test_command_substitution_strips_newlines() {
        let word = Word::parse("\"$(echo hi; echo)\"", 1).unwrap();
        let mut ctx = context();
        let mut effects = ExpansionEffects::default();
        let value = interpreter()
            .expand_word(&word, &mut ctx, &mut effects)
            .await
            .unwrap();
        assert_eq!(value, "hi");
        assert_eq!(effects.last_status, Some(0));
    }

    #[tokio::test]
    async fn test_substitution_stderr_is_collected() {
        let word = Word::parse("$(cat /missing)", 1).unwrap();
        let mut ctx = context();
        let mut effects = ExpansionEffects::default();
        let value = interpreter()
            .expand_word(&word, &mut ctx, &mut effects)
            .await
            .unwrap();
        assert_eq!(value, "");
        assert_eq!(effects.stderr, "cat: /missing: No such file or directory\n");
        assert_eq!(effects.last_status, Some(1));
    }

    #[tokio::test]
    async fn test_arithmetic_part() {
        assert_eq!(fields("$((1+2))x").await, vec!["3x"]);
    }
}
