// ABOUTME: Strips source-environment clauses from SHOW CREATE output
// ABOUTME: Removes engine, charset, and collation table options plus view algorithm/definer/security

use crate::catalog::RelationKind;

/// Table options that encode the source server's defaults rather than the schema
const STRIPPED_TABLE_OPTIONS: [&str; 3] = ["ENGINE=", "CHARSET=", "COLLATE="];

/// Normalize a `SHOW CREATE TABLE` / `SHOW CREATE VIEW` statement
///
/// # Examples
///
/// ```
/// # use mysql_clone_migrator::catalog::RelationKind;
/// # use mysql_clone_migrator::schema::normalize::normalize_create_statement;
/// let ddl = "CREATE TABLE `t` (\n  `id` int NOT NULL\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";
/// assert_eq!(
///     normalize_create_statement(ddl, RelationKind::Table),
///     "CREATE TABLE `t` (\n  `id` int NOT NULL\n)"
/// );
/// ```
pub fn normalize_create_statement(sql: &str, kind: RelationKind) -> String {
    match kind {
        RelationKind::Table => normalize_table_ddl(sql),
        RelationKind::View => normalize_view_ddl(sql),
    }
}

/// Drop `ENGINE=`, `[DEFAULT] CHARSET=`, `[DEFAULT] CHARACTER SET=` and
/// `[DEFAULT] COLLATE=` from the table option list.
///
/// Only the options after the column list are touched. Column-level
/// `CHARACTER SET` / `COLLATE` attributes, keys, constraints and any other
/// table option (AUTO_INCREMENT, COMMENT, ROW_FORMAT, partitioning) are kept.
pub fn normalize_table_ddl(sql: &str) -> String {
    let trimmed = sql.trim();

    let Some(open) = find_outside_quotes(trimmed, '(') else {
        return trimmed.to_string();
    };
    let Some(close) = find_matching_paren(trimmed, open) else {
        return trimmed.to_string();
    };

    let head = &trimmed[..=close];
    let tokens = split_option_tokens(&trimmed[close + 1..]);

    let mut kept: Vec<&str> = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let skip = stripped_option_len(&tokens[i..]);
        if skip > 0 {
            i += skip;
            continue;
        }
        kept.push(tokens[i]);
        i += 1;
    }

    if kept.is_empty() {
        head.to_string()
    } else {
        format!("{} {}", head, kept.join(" "))
    }
}

/// Rewrite the view header to a bare `CREATE VIEW`
///
/// `ALGORITHM=...`, `DEFINER=...` and `SQL SECURITY ...` between `CREATE` and
/// `VIEW` are removed; the view name and defining query are kept verbatim.
/// Statements with a header this function does not recognise are returned
/// unchanged.
pub fn normalize_view_ddl(sql: &str) -> String {
    let trimmed = sql.trim();

    let Some(mut rest) = strip_keyword(trimmed, "CREATE") else {
        return trimmed.to_string();
    };

    loop {
        rest = rest.trim_start();
        if let Some(after) = strip_keyword(rest, "VIEW") {
            return format!("CREATE VIEW {}", after.trim_start());
        }
        if let Some(after) = strip_assignment(rest, "ALGORITHM") {
            rest = skip_token(after);
        } else if let Some(after) = strip_assignment(rest, "DEFINER") {
            rest = skip_token(after);
        } else if let Some(after) = strip_keyword(rest, "SQL")
            .and_then(|after| strip_keyword(after.trim_start(), "SECURITY"))
        {
            rest = skip_token(after.trim_start());
        } else {
            return trimmed.to_string();
        }
    }
}

/// Number of tokens at the start of `tokens` forming one stripped option
fn stripped_option_len(tokens: &[&str]) -> usize {
    let upper = |idx: usize| tokens.get(idx).map(|t| t.to_ascii_uppercase());

    let Some(first) = upper(0) else {
        return 0;
    };

    if is_stripped_option(&first) {
        return 1;
    }

    match first.as_str() {
        "DEFAULT" => match upper(1) {
            Some(second) if is_stripped_option(&second) => 2,
            Some(second) if second == "CHARACTER" => match upper(2) {
                Some(third) if third.starts_with("SET=") => 3,
                _ => 0,
            },
            _ => 0,
        },
        "CHARACTER" => match upper(1) {
            Some(second) if second.starts_with("SET=") => 2,
            _ => 0,
        },
        _ => 0,
    }
}

fn is_stripped_option(upper_token: &str) -> bool {
    STRIPPED_TABLE_OPTIONS
        .iter()
        .any(|prefix| upper_token.starts_with(prefix))
}

/// Split a table option trailer on whitespace.
///
/// Quoted strings, parenthesised groups and `/* ... */` comments stay inside a
/// single token.
fn split_option_tokens(trailer: &str) -> Vec<&str> {
    let bytes = trailer.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        if trailer[i..].starts_with("/*") {
            i = trailer[i + 2..]
                .find("*/")
                .map(|end| i + 2 + end + 2)
                .unwrap_or(bytes.len());
            tokens.push(&trailer[start..i]);
            continue;
        }

        let mut depth = 0usize;
        while i < bytes.len() {
            match bytes[i] {
                b'`' | b'\'' | b'"' => {
                    i = skip_quoted(bytes, i);
                    continue;
                }
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                c if c.is_ascii_whitespace() && depth == 0 => break,
                _ => {}
            }
            i += 1;
        }
        tokens.push(&trailer[start..i]);
    }

    tokens
}

/// Index of the first `target` byte that is not inside a quoted section
fn find_outside_quotes(sql: &str, target: char) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'`' | b'\'' | b'"' => {
                i = skip_quoted(bytes, i);
                continue;
            }
            c if c as char == target => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Index of the `)` closing the `(` at `open`
fn find_matching_paren(sql: &str, open: usize) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'`' | b'\'' | b'"' => {
                i = skip_quoted(bytes, i);
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Return the index just past the quoted section starting at `start`.
///
/// A doubled quote character is an escaped quote; inside `'` and `"` strings a
/// backslash escapes the next byte.
fn skip_quoted(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        let c = bytes[i];
        if c == b'\\' && quote != b'`' {
            i += 2;
            continue;
        }
        if c == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Strip a case-insensitive keyword that is not followed by an identifier character
fn strip_keyword<'a>(input: &'a str, keyword: &str) -> Option<&'a str> {
    let head = input.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &input[keyword.len()..];
    match rest.bytes().next() {
        Some(c) if c.is_ascii_alphanumeric() || c == b'_' => None,
        _ => Some(rest),
    }
}

/// Strip `KEYWORD =` (spaces around `=` allowed) and return what follows
fn strip_assignment<'a>(input: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = strip_keyword(input, keyword)?.trim_start();
    rest.strip_prefix('=').map(str::trim_start)
}

/// Skip one whitespace-delimited token, keeping quoted sections intact
fn skip_token(input: &str) -> &str {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'`' | b'\'' | b'"' => {
                i = skip_quoted(bytes, i);
                continue;
            }
            c if c.is_ascii_whitespace() => break,
            _ => {}
        }
        i += 1;
    }
    &input[i..]
}
