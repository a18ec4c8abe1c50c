//! Dialect adapter
//!
//! Pure functions turning one canonical SQL form into the dialect-specific text sent
//! to the backend. Canonical SQL uses `?` placeholders, `len()`/`concat()` string
//! functions and native boolean/time arguments. Nothing here performs I/O.
//!
//! Quoted literals (`'...'`, `"..."`, `` `...` ``) and comments (`-- ...`, `/* ... */`)
//! are never rewritten.

use std::collections::HashMap;

use crate::dialect::Dialect;
use crate::errors::ValueError;
use crate::value::DbValue;

/// Quote an identifier for the given dialect
pub fn quote_identifier(name: &str, dialect: Dialect) -> String {
    dialect.quote_identifier(name)
}

/// Rewrite `?` to `$1, $2, ...` for dialects using numbered placeholders
pub fn adapt_placeholders(sql: &str, dialect: Dialect) -> String {
    if !dialect.uses_numbered_placeholders() {
        return sql.to_string();
    }

    let chars: Vec<char> = sql.chars().collect();
    let mask = code_mask(&chars);
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0;

    for (i, c) in chars.iter().enumerate() {
        if *c == '?' && mask[i] {
            n += 1;
            out.push('$');
            out.push_str(&n.to_string());
        } else {
            out.push(*c);
        }
    }
    out
}

/// Expand WHERE sugar.
///
/// A clause without any comparison operator is read as a list of fields separated
/// by `,` (AND) or `|` (OR), each compared with ` = ?`. Fields are prefixed with
/// `table.` unless already qualified or parenthesized.
pub fn adapt_where(query: &str, table: Option<&str>) -> String {
    let trimmed = query.trim();
    if trimmed.is_empty() || has_comparison(trimmed) {
        return trimmed.to_string();
    }

    let mut out = String::with_capacity(trimmed.len() * 2);
    for (sep, field) in split_fields(trimmed, &[',', '|']) {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push_str(if sep == '|' { " OR " } else { " AND " });
        }
        out.push_str(&qualify(field, table));
        out.push_str(" = ?");
    }
    out
}

/// Expand SET sugar: `"name,age"` becomes `"name = ?, age = ?"`
pub fn adapt_set(assignment: &str) -> String {
    let trimmed = assignment.trim();
    if trimmed.is_empty() || has_comparison(trimmed) {
        return trimmed.to_string();
    }
    split_fields(trimmed, &[','])
        .into_iter()
        .map(|(_, field)| field.trim().to_string())
        .filter(|field| !field.is_empty())
        .map(|field| format!("{} = ?", field))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rewrite `len(x)` and, on SQLite, `concat(a, b, ...)`
pub fn adapt_concat_len(expr: &str, dialect: Dialect) -> String {
    let chars: Vec<char> = expr.chars().collect();
    let mask = code_mask(&chars);
    let mut out = String::with_capacity(expr.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        if mask[i] && is_word_start(&chars, i) {
            if let Some(open) = call_open_paren(&chars, i, "len") {
                out.push_str(if dialect == Dialect::Sqlite {
                    "length"
                } else {
                    "char_length"
                });
                out.extend(&chars[i + 3..open]);
                i = open;
                continue;
            }
            if dialect == Dialect::Sqlite {
                if let Some(open) = call_open_paren(&chars, i, "concat") {
                    if let Some(close) = matching_paren(&chars, &mask, open) {
                        let inner: String = chars[open + 1..close].iter().collect();
                        let parts: Vec<String> = split_fields(&inner, &[','])
                            .into_iter()
                            .map(|(_, part)| adapt_concat_len(part.trim(), dialect))
                            .collect();
                        out.push_str(&parts.join(" || "));
                        i = close + 1;
                        continue;
                    }
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Convert a single argument into its portable bound form
pub fn adapt_value(value: DbValue) -> DbValue {
    match value {
        DbValue::Bool(b) => DbValue::Int(i64::from(b)),
        DbValue::Time(t) => DbValue::Int(t.timestamp()),
        DbValue::Json(v) => DbValue::Text(v.to_string()),
        other => other,
    }
}

/// Booleans become `1`/`0`, times become Unix seconds, JSON becomes text
pub fn adapt_args(args: &[DbValue]) -> Vec<DbValue> {
    args.iter().cloned().map(adapt_value).collect()
}

/// Replace the `?` of every NULL argument with a literal `NULL`.
///
/// Untyped NULL parameters are rejected by strictly typed backends when they
/// land in a typed column, so they never travel as bound values. Outside of
/// `SET`/`UPDATE` assignments, `= ?` becomes `IS NULL` and `!= ?`/`<> ?`
/// becomes `IS NOT NULL`.
pub fn inline_nulls(sql: &str, args: Vec<DbValue>) -> (String, Vec<DbValue>) {
    if !args.iter().any(DbValue::is_null) {
        return (sql.to_string(), args);
    }

    let chars: Vec<char> = sql.chars().collect();
    let mask = code_mask(&chars);
    let mut out = String::with_capacity(sql.len() + 8);
    let mut kept = Vec::with_capacity(args.len());
    let mut remaining = args.into_iter();
    let mut assigning = false;

    for (i, c) in chars.iter().enumerate() {
        if mask[i] && c.is_ascii_alphabetic() && (i == 0 || !is_ident(chars[i - 1])) {
            let word: String = chars[i..]
                .iter()
                .take_while(|c| is_ident(**c))
                .collect::<String>()
                .to_ascii_uppercase();
            match word.as_str() {
                "SET" | "UPDATE" => assigning = true,
                "WHERE" | "ON" | "HAVING" | "WHEN" => assigning = false,
                _ => {}
            }
        }
        if *c == '?' && mask[i] {
            match remaining.next() {
                Some(DbValue::Null) => push_null(&mut out, assigning),
                Some(value) => {
                    kept.push(value);
                    out.push('?');
                }
                None => out.push('?'),
            }
        } else {
            out.push(*c);
        }
    }
    kept.extend(remaining);
    (out, kept)
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn push_null(out: &mut String, assigning: bool) {
    let head = out.trim_end();
    if !assigning {
        if head.ends_with("!=") || head.ends_with("<>") {
            let keep = head.len() - 2;
            out.truncate(keep);
            out.truncate(out.trim_end().len());
            out.push_str(" IS NOT NULL");
            return;
        }
        if head.ends_with('=') && !(head.ends_with("<=") || head.ends_with(">=")) {
            let keep = head.len() - 1;
            out.truncate(keep);
            out.truncate(out.trim_end().len());
            out.push_str(" IS NULL");
            return;
        }
    }
    out.push_str("NULL");
}

/// Rewrite `:name` parameters into `?` and order the arguments to match.
///
/// `::` (PostgreSQL casts) is left untouched.
pub fn adapt_named(
    sql: &str,
    params: &HashMap<String, DbValue>,
) -> Result<(String, Vec<DbValue>), ValueError> {
    let chars: Vec<char> = sql.chars().collect();
    let mask = code_mask(&chars);
    let mut out = String::with_capacity(sql.len());
    let mut args = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == ':' && mask[i] {
            if chars.get(i + 1) == Some(&':') {
                out.push_str("::");
                i += 2;
                continue;
            }
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                end += 1;
            }
            if end > start && !chars[start].is_ascii_digit() {
                let name: String = chars[start..end].iter().collect();
                let value = params
                    .get(&name)
                    .ok_or_else(|| ValueError::MissingParameter(name.clone()))?;
                args.push(value.clone());
                out.push('?');
                i = end;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    Ok((out, args))
}

fn qualify(field: &str, table: Option<&str>) -> String {
    match table {
        Some(t) if !t.is_empty() && !field.contains('.') && !field.contains('(') => {
            format!("{}.{}", t, field)
        }
        _ => field.to_string(),
    }
}

/// Per character: `true` when it is SQL code, `false` inside literals and comments
fn code_mask(chars: &[char]) -> Vec<bool> {
    let mut mask = vec![true; chars.len()];
    let mut i = 0;

    while i < chars.len() {
        let end = match chars[i] {
            '\'' | '"' | '`' => skip_quoted(chars, i),
            '-' if chars.get(i + 1) == Some(&'-') => skip_line_comment(chars, i),
            '/' if chars.get(i + 1) == Some(&'*') => skip_block_comment(chars, i),
            _ => {
                i += 1;
                continue;
            }
        };
        for slot in mask.iter_mut().take(end).skip(i) {
            *slot = false;
        }
        i = end;
    }
    mask
}

fn skip_quoted(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
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

fn skip_line_comment(chars: &[char], start: usize) -> usize {
    chars[start..]
        .iter()
        .position(|c| *c == '\n')
        .map(|p| start + p + 1)
        .unwrap_or(chars.len())
}

fn skip_block_comment(chars: &[char], start: usize) -> usize {
    let mut i = start + 2;
    while i + 1 < chars.len() {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return i + 2;
        }
        i += 1;
    }
    chars.len()
}

fn has_comparison(clause: &str) -> bool {
    let chars: Vec<char> = clause.chars().collect();
    let mask = code_mask(&chars);
    let code: String = chars
        .iter()
        .zip(mask.iter())
        .map(|(c, is_code)| if *is_code { c.to_ascii_lowercase() } else { ' ' })
        .collect();

    if code.contains(['=', '<', '>', '!', '?']) {
        return true;
    }
    const KEYWORDS: &[&str] = &[
        "like", "in", "is", "between", "exists", "glob", "regexp", "match", "not",
    ];
    code.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|word| KEYWORDS.contains(&word))
}

/// Split on top-level separators, returning each piece with the separator before it
fn split_fields(s: &str, separators: &[char]) -> Vec<(char, String)> {
    let chars: Vec<char> = s.chars().collect();
    let mask = code_mask(&chars);
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut sep = separators.first().copied().unwrap_or(',');
    let mut depth = 0usize;

    for (i, c) in chars.iter().enumerate() {
        if mask[i] {
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                _ if depth == 0 && separators.contains(c) => {
                    parts.push((sep, std::mem::take(&mut current)));
                    sep = *c;
                    continue;
                }
                _ => {}
            }
        }
        current.push(*c);
    }
    parts.push((sep, current));
    parts
}

fn is_word_start(chars: &[char], i: usize) -> bool {
    i == 0 || !(chars[i - 1].is_alphanumeric() || chars[i - 1] == '_' || chars[i - 1] == '.')
}

/// If `name(` (case-insensitive, optional whitespace) starts at `i`, return the paren index
fn call_open_paren(chars: &[char], i: usize, name: &str) -> Option<usize> {
    let len = name.chars().count();
    if i + len > chars.len() {
        return None;
    }
    let candidate: String = chars[i..i + len].iter().collect();
    if !candidate.eq_ignore_ascii_case(name) {
        return None;
    }
    let mut j = i + len;
    while j < chars.len() && chars[j].is_whitespace() {
        j += 1;
    }
    (chars.get(j) == Some(&'(')).then_some(j)
}

fn matching_paren(chars: &[char], mask: &[bool], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in chars.iter().enumerate().skip(open) {
        if !mask[i] {
            continue;
        }
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_where_sugar_with_table_prefix() {
        assert_eq!(
            adapt_where("email,age", Some("u")),
            "u.email = ? AND u.age = ?"
        );
        assert_eq!(
            adapt_where("email|name", Some("u")),
            "u.email = ? OR u.name = ?"
        );
        assert_eq!(adapt_where("u.email, age", None), "u.email = ? AND age = ?");
        assert_eq!(
            adapt_where("lower(email)", Some("u")),
            "lower(email) = ?"
        );
    }

    #[test]
    fn test_where_with_operators_is_untouched() {
        assert_eq!(adapt_where("id = ?", Some("u")), "id = ?");
        assert_eq!(adapt_where("age > 3", Some("u")), "age > 3");
        assert_eq!(adapt_where("name IS NULL", Some("u")), "name IS NULL");
        assert_eq!(adapt_where("id IN (1, 2)", Some("u")), "id IN (1, 2)");
    }

    #[test]
    fn test_placeholders_numbered_outside_literals() {
        let sql = "SELECT '?' AS q, ? -- what?\n FROM t WHERE a = ? /* ? */ AND b = \"?\"";
        assert_eq!(
            adapt_placeholders(sql, Dialect::Postgres),
            "SELECT '?' AS q, $1 -- what?\n FROM t WHERE a = $2 /* ? */ AND b = \"?\""
        );
        assert_eq!(adapt_placeholders(sql, Dialect::Mysql), sql);
        assert_eq!(
            adapt_placeholders("a = ? AND b = ?", Dialect::Sqlite),
            "a = $1 AND b = $2"
        );
    }

    #[test]
    fn test_escaped_quotes_stay_inside_literal() {
        assert_eq!(
            adapt_placeholders("x = 'it''s ?' AND y = ?", Dialect::Cockroach),
            "x = 'it''s ?' AND y = $1"
        );
    }

    #[test]
    fn test_concat_and_len() {
        assert_eq!(
            adapt_concat_len("len(name)", Dialect::Sqlite),
            "length(name)"
        );
        assert_eq!(
            adapt_concat_len("LEN(name) > 3", Dialect::Mysql),
            "char_length(name) > 3"
        );
        assert_eq!(
            adapt_concat_len("concat(first, ' ', last)", Dialect::Sqlite),
            "first || ' ' || last"
        );
        assert_eq!(
            adapt_concat_len("concat(first, last)", Dialect::Postgres),
            "concat(first, last)"
        );
        assert_eq!(
            adapt_concat_len("length(name)", Dialect::Postgres),
            "length(name)"
        );
    }

    #[test]
    fn test_args_are_made_portable() {
        let when = Utc.timestamp_opt(1_000, 0).single().unwrap();
        let args = adapt_args(&[
            DbValue::Bool(true),
            DbValue::Bool(false),
            DbValue::Time(when),
            DbValue::Json(serde_json::json!({"a": 1})),
            DbValue::Text("x".into()),
        ]);
        assert_eq!(
            args,
            vec![
                DbValue::Int(1),
                DbValue::Int(0),
                DbValue::Int(1_000),
                DbValue::Text("{\"a\":1}".into()),
                DbValue::Text("x".into()),
            ]
        );
    }

    #[test]
    fn test_set_sugar() {
        assert_eq!(adapt_set("name,age"), "name = ?, age = ?");
        assert_eq!(adapt_set("name = ?"), "name = ?");
    }

    #[test]
    fn test_named_parameters() {
        let mut params = HashMap::new();
        params.insert("id".to_string(), DbValue::Int(4));
        params.insert("name".to_string(), DbValue::Text("x".into()));

        let (sql, args) = adapt_named(
            "SELECT id::TEXT FROM t WHERE name = :name AND id = :id AND note = ':skip'",
            &params,
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT id::TEXT FROM t WHERE name = ? AND id = ? AND note = ':skip'"
        );
        assert_eq!(args, vec![DbValue::Text("x".into()), DbValue::Int(4)]);

        let missing = adapt_named("SELECT :nope", &params);
        assert!(matches!(missing, Err(ValueError::MissingParameter(_))));
    }

    #[test]
    fn test_inline_nulls() {
        let (sql, args) = inline_nulls(
            "INSERT INTO t (a, b, c) VALUES (?, ?, ?)",
            vec![DbValue::Int(1), DbValue::Null, DbValue::Text("?".into())],
        );
        assert_eq!(sql, "INSERT INTO t (a, b, c) VALUES (?, NULL, ?)");
        assert_eq!(args, vec![DbValue::Int(1), DbValue::Text("?".into())]);

        let (sql, args) = inline_nulls("SELECT '?' FROM t WHERE a = ?", vec![DbValue::Null]);
        assert_eq!(sql, "SELECT '?' FROM t WHERE a IS NULL");
        assert!(args.is_empty());
    }

    #[test]
    fn test_inline_nulls_keeps_assignments() {
        let (sql, args) = inline_nulls(
            "UPDATE t SET a = ?, b = ? WHERE c = ? AND d <> ?",
            vec![DbValue::Null, DbValue::Int(2), DbValue::Null, DbValue::Null],
        );
        assert_eq!(
            sql,
            "UPDATE t SET a = NULL, b = ? WHERE c IS NULL AND d IS NOT NULL"
        );
        assert_eq!(args, vec![DbValue::Int(2)]);

        let (sql, _) = inline_nulls("SELECT * FROM t WHERE a!=? OR b >= ?", vec![
            DbValue::Null,
            DbValue::Null,
        ]);
        assert_eq!(sql, "SELECT * FROM t WHERE a IS NOT NULL OR b >= NULL");

        let (sql, _) = inline_nulls(
            "INSERT INTO t (a) VALUES (?) ON CONFLICT (a) DO UPDATE SET a = ?",
            vec![DbValue::Null, DbValue::Null],
        );
        assert_eq!(
            sql,
            "INSERT INTO t (a) VALUES (NULL) ON CONFLICT (a) DO UPDATE SET a = NULL"
        );
    }
}
