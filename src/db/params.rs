//! Parameter binding utilities for database commands.
//!
//! Text commands name their parameters `@name`. Before execution the names
//! are rewritten to the backend's positional placeholders and the bound
//! values are produced in placeholder order.

use crate::db::DatabaseType;
use crate::error::{DriverError, DriverResult};
use crate::models::{Parameter, Value};
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite};

/// A text command with its named placeholders replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenSql {
    pub sql: String,
    /// Referenced parameter names, in binding order, without the `@`.
    pub names: Vec<String>,
    /// Whether the text already uses the backend's own positional
    /// placeholders (`?`, or `$n` on Postgres).
    pub positional: bool,
}

/// Replace `@name` placeholders with positional ones.
///
/// Quoted strings, quoted identifiers, comments and `@@` system variables
/// are left untouched. Postgres reuses `$n` for a repeated name; the other
/// backends bind every occurrence.
pub fn rewrite_named_placeholders(sql: &str, db: DatabaseType) -> RewrittenSql {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();
    let mut positional = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => {
                let end = skip_quoted(&chars, i, c);
                out.extend(&chars[i..end]);
                i = end;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                let end = chars[i..]
                    .iter()
                    .position(|&ch| ch == '\n')
                    .map(|p| i + p)
                    .unwrap_or(chars.len());
                out.extend(&chars[i..end]);
                i = end;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let end = find_block_comment_end(&chars, i + 2);
                out.extend(&chars[i..end]);
                i = end;
            }
            '?' if db != DatabaseType::Postgres => {
                positional = true;
                out.push(c);
                i += 1;
            }
            '$' if db == DatabaseType::Postgres
                && chars.get(i + 1).is_some_and(char::is_ascii_digit) =>
            {
                positional = true;
                out.push(c);
                i += 1;
            }
            '@' if chars.get(i + 1) == Some(&'@') => {
                let end = i + 2 + ident_len(&chars[i + 2..]);
                out.extend(&chars[i..end]);
                i = end;
            }
            '@' => {
                let len = ident_len(&chars[i + 1..]);
                if len == 0 {
                    out.push(c);
                    i += 1;
                    continue;
                }
                let name: String = chars[i + 1..i + 1 + len].iter().collect();
                match db {
                    DatabaseType::Postgres => {
                        let position = match names
                            .iter()
                            .position(|n| crate::models::names_equal(n, &name))
                        {
                            Some(p) => p,
                            None => {
                                names.push(name);
                                names.len() - 1
                            }
                        };
                        out.push('$');
                        out.push_str(&(position + 1).to_string());
                    }
                    DatabaseType::MySql | DatabaseType::SQLite => {
                        names.push(name);
                        out.push('?');
                    }
                }
                i += 1 + len;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    RewrittenSql {
        sql: out,
        names,
        positional,
    }
}

fn ident_len(chars: &[char]) -> usize {
    chars
        .iter()
        .take_while(|c| c.is_alphanumeric() || **c == '_' || **c == '$' || **c == '#')
        .count()
}

fn skip_quoted(chars: &[char], start: usize, quote: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            // A doubled quote is an escaped quote.
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

fn find_block_comment_end(chars: &[char], from: usize) -> usize {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return i + 2;
        }
        i += 1;
    }
    chars.len()
}

/// Strip the `@` prefix from a parameter name.
pub fn bare_name(name: &str) -> &str {
    name.strip_prefix('@').unwrap_or(name)
}

/// Produce the values to bind for a text command.
///
/// With named placeholders, each name is looked up among the parameters.
/// Text written with literal `?` or `$n` placeholders gets every input
/// parameter in order. Text with no placeholders binds nothing.
pub fn text_bindings(sql: &RewrittenSql, parameters: &[Parameter]) -> DriverResult<Vec<Value>> {
    if sql.names.is_empty() {
        if !sql.positional {
            return Ok(Vec::new());
        }
        return Ok(parameters
            .iter()
            .filter(|p| p.direction.accepts_input())
            .map(|p| p.value.clone().unwrap_or_default())
            .collect());
    }

    sql.names
        .iter()
        .map(|name| {
            parameters
                .iter()
                .find(|p| crate::models::names_equal(bare_name(&p.name), name))
                .map(|p| p.value.clone().unwrap_or_default())
                .ok_or_else(|| {
                    DriverError::database(
                        format!("Must declare the scalar variable \"@{name}\"."),
                        None,
                    )
                })
        })
        .collect()
}

/// Bind a value to a MySQL query.
pub(crate) fn bind_mysql_value<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    value: Value,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(v),
        Value::Int(v) => query.bind(v),
        Value::Float(v) => query.bind(v),
        Value::Decimal(v) => query.bind(v),
        Value::String(v) => query.bind(v),
        Value::Bytes(v) => query.bind(v),
        Value::DateTime(v) => query.bind(v),
        Value::DateTimeOffset(v) => query.bind(v.naive_utc().and_utc()),
        // MySQL has no native UUID type; bind the canonical text form.
        Value::Guid(v) => query.bind(v.to_string()),
        Value::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a value to a PostgreSQL query.
pub(crate) fn bind_postgres_value<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: Value,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(v),
        Value::Int(v) => query.bind(v),
        Value::Float(v) => query.bind(v),
        Value::Decimal(v) => query.bind(v),
        Value::String(v) => query.bind(v),
        Value::Bytes(v) => query.bind(v),
        Value::DateTime(v) => query.bind(v),
        Value::DateTimeOffset(v) => query.bind(v),
        Value::Guid(v) => query.bind(v),
        Value::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a value to a SQLite query.
pub(crate) fn bind_sqlite_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: Value,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(v),
        Value::Int(v) => query.bind(v),
        Value::Float(v) => query.bind(v),
        Value::String(v) => query.bind(v),
        Value::Bytes(v) => query.bind(v),
        // Text keeps every digit; numeric affinity converts it on insert.
        Value::Decimal(v) => query.bind(v.to_string()),
        // SQLite stores dates as text; keep the format the decoder parses back.
        Value::DateTime(_) | Value::DateTimeOffset(_) | Value::Guid(_) => {
            query.bind(value.to_string())
        }
        // SQLite doesn't have native JSON type, store as string
        Value::Json(v) => query.bind(v.to_string()),
    }
}
