//! Positional substitution into command text.

use crate::error::{DbError, DbResult};
use std::fmt::{Display, Write as _};

/// Substitute `{0}`, `{1}`, ... in `template` with the matching argument.
///
/// `{{` and `}}` produce literal braces. An index without an argument or an
/// unbalanced brace is a configuration error.
pub fn format_positional(template: &str, args: &[&dyn Display]) -> DbResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if chars.peek().map(|&(_, n)| n) == Some('{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut digits = String::new();
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    digits.push(n);
                }
                if !closed {
                    return Err(DbError::configuration(format!(
                        "Unclosed '{{' at position {pos} in command text"
                    )));
                }
                let index: usize = digits.trim().parse().map_err(|_| {
                    DbError::configuration(format!(
                        "Invalid format item '{{{digits}}}' at position {pos} in command text"
                    ))
                })?;
                let arg = args.get(index).ok_or_else(|| {
                    DbError::configuration(format!(
                        "Format item {{{index}}} has no argument ({} supplied)",
                        args.len()
                    ))
                })?;
                let _ = write!(out, "{arg}");
            }
            '}' if chars.peek().map(|&(_, n)| n) == Some('}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(DbError::configuration(format!(
                    "Unmatched '}}' at position {pos} in command text"
                )));
            }
            other => out.push(other),
        }
    }

    Ok(out)
}
