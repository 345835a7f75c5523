//! Text form of a string list inside a single CSV cell: `['a', 'b']`.

use anyhow::{Result, anyhow, bail};
use regex::Regex;
use std::sync::OnceLock;

fn item_regex() -> &'static Regex {
    static ITEM: OnceLock<Regex> = OnceLock::new();
    ITEM.get_or_init(|| {
        Regex::new(r#"^\s*(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")\s*(,|$)"#)
            .expect("list item pattern is valid")
    })
}

pub fn format_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let quoted: Vec<String> = items
        .into_iter()
        .map(|item| format!("'{}'", escape(item.as_ref())))
        .collect();
    format!("[{}]", quoted.join(", "))
}

pub fn parse_list(raw: &str) -> Result<Vec<String>> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| anyhow!("not a list literal: {}", raw))?;

    let mut items = Vec::new();
    let mut rest = inner;

    while !rest.trim().is_empty() {
        let captures = item_regex()
            .captures(rest)
            .ok_or_else(|| anyhow!("malformed list item in {}", raw))?;

        let body = captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        items.push(unescape(body));

        let consumed = captures.get(0).map(|m| m.end()).unwrap_or(rest.len());
        let had_comma = captures.get(3).is_some_and(|m| m.as_str() == ",");
        rest = &rest[consumed..];

        if had_comma && rest.trim().is_empty() {
            bail!("trailing comma in {}", raw);
        }
    }

    Ok(items)
}

fn escape(item: &str) -> String {
    item.replace('\\', "\\\\").replace('\'', "\\'")
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
