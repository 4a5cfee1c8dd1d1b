//! echo builtin command

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::interpreter::ExecResult;

/// The echo builtin command.
///
/// Usage: echo [-neE] [ARG...]
pub struct Echo;

#[async_trait]
impl Builtin for Echo {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let mut add_newline = true;
        let mut interpret_escapes = false;
        let mut rest = ctx.args;

        // Leading flag words like -n, -e or -ne; anything else starts the text
        while let Some((first, tail)) = rest.split_first() {
            let Some(flags) = first.strip_prefix('-') else {
                break;
            };
            if flags.is_empty() || !flags.chars().all(|c| matches!(c, 'n' | 'e' | 'E')) {
                break;
            }
            for c in flags.chars() {
                match c {
                    'n' => add_newline = false,
                    'e' => interpret_escapes = true,
                    _ => interpret_escapes = false,
                }
            }
            rest = tail;
        }

        let mut output = String::new();
        for (i, arg) in rest.iter().enumerate() {
            if i > 0 {
                output.push(' ');
            }
            if interpret_escapes {
                let (text, stop) = interpret_escape_sequences(arg);
                output.push_str(&text);
                if stop {
                    return Ok(ExecResult::ok(output));
                }
            } else {
                output.push_str(arg);
            }
        }

        if add_newline {
            output.push('\n');
        }
        Ok(ExecResult::ok(output))
    }
}

/// Expand backslash escapes. The flag is set when `\c` cut the output short.
fn interpret_escape_sequences(s: &str) -> (String, bool) {
    let mut result = String::new();
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('\\') => result.push('\\'),
            Some('a') => result.push('\x07'),
            Some('b') => result.push('\x08'),
            Some('f') => result.push('\x0c'),
            Some('v') => result.push('\x0b'),
            Some('0') => {
                let mut value = 0u32;
                for _ in 0..3 {
                    match chars.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                result.push(char::from_u32(value).unwrap_or('\0'));
            }
            Some('c') => return (result, true),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    (result, false)
}
