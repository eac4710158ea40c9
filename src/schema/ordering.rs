// ABOUTME: Orders view creation statements so referenced views come first
// ABOUTME: Finds view-on-view references among the relations named after FROM and JOIN

use crate::catalog::CreationStatement;
use std::collections::{BTreeMap, BTreeSet};
use std::iter::Peekable;
use std::str::CharIndices;

/// Sort view statements so every view is created after the views it selects from.
///
/// Independent views keep name order; views caught in a reference cycle are
/// appended in name order.
pub fn order_views_by_dependency(views: Vec<CreationStatement>) -> Vec<CreationStatement> {
    if views.len() < 2 {
        return views;
    }

    let view_names: BTreeSet<&str> = views.iter().map(|v| v.name.as_str()).collect();

    // view name -> names of views it references
    let mut pending: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for view in &views {
        let referenced = referenced_relations(&view.sql);
        let deps = view_names
            .iter()
            .copied()
            .filter(|name| *name != view.name.as_str() && referenced.contains(*name))
            .collect();
        pending.insert(view.name.as_str(), deps);
    }

    let mut order: Vec<String> = Vec::with_capacity(views.len());
    loop {
        let ready: Vec<&str> = pending
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(name, _)| *name)
            .collect();
        let Some(next) = ready.first().copied() else {
            break;
        };

        pending.remove(next);
        for deps in pending.values_mut() {
            deps.remove(next);
        }
        order.push(next.to_string());
    }

    if !pending.is_empty() {
        tracing::warn!(
            "Circular references between views {:?}; creating them in name order",
            pending.keys().collect::<Vec<_>>()
        );
        order.extend(pending.keys().map(|name| name.to_string()));
    }

    let mut by_name: BTreeMap<String, CreationStatement> =
        views.into_iter().map(|v| (v.name.clone(), v)).collect();
    order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect()
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Quoted(String),
    Word(&'a str),
    Symbol(char),
}

/// Relations a statement selects from
///
/// A quoted identifier counts when it directly follows `FROM` or a `JOIN`
/// keyword, possibly behind opening parentheses or a schema qualifier.
/// Column names and aliases never do, whatever they are called.
fn referenced_relations(sql: &str) -> BTreeSet<String> {
    let tokens = tokenize(sql);
    let mut found = BTreeSet::new();

    for (idx, token) in tokens.iter().enumerate() {
        let Token::Quoted(name) = token else {
            continue;
        };
        // in `schema`.`relation` only the last part is a relation
        if matches!(tokens.get(idx + 1), Some(Token::Symbol('.'))) {
            continue;
        }

        let mut before = idx;
        if before >= 2
            && tokens[before - 1] == Token::Symbol('.')
            && matches!(tokens[before - 2], Token::Quoted(_))
        {
            before -= 2;
        }

        let keyword = tokens[..before]
            .iter()
            .rev()
            .find(|t| **t != Token::Symbol('('));
        if matches!(keyword, Some(Token::Word(word)) if is_relation_keyword(word)) {
            found.insert(name.clone());
        }
    }

    found
}

fn is_relation_keyword(word: &str) -> bool {
    ["from", "join", "straight_join"]
        .iter()
        .any(|k| word.eq_ignore_ascii_case(k))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Split into quoted identifiers, bare words and symbols; string literals are dropped
fn tokenize(sql: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut chars = sql.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            '`' => {
                let mut name = String::new();
                while let Some((_, c)) = chars.next() {
                    if c != '`' {
                        name.push(c);
                    } else if matches!(chars.peek(), Some((_, '`'))) {
                        chars.next();
                        name.push('`');
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Quoted(name));
            }
            '\'' | '"' => skip_string_literal(&mut chars, c),
            c if is_word_char(c) => {
                let mut end = start + c.len_utf8();
                while let Some(&(idx, next)) = chars.peek() {
                    if !is_word_char(next) {
                        break;
                    }
                    end = idx + next.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Word(&sql[start..end]));
            }
            c if c.is_whitespace() => {}
            c => tokens.push(Token::Symbol(c)),
        }
    }

    tokens
}

fn skip_string_literal(chars: &mut Peekable<CharIndices<'_>>, quote: char) {
    while let Some((_, c)) = chars.next() {
        if c == '\\' {
            chars.next();
        } else if c == quote {
            if matches!(chars.peek(), Some(&(_, next)) if next == quote) {
                chars.next();
            } else {
                return;
            }
        }
    }
}
