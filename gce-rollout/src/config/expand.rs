//! Variable table and placeholder expansion
//!
//! Two placeholder families are recognized:
//!
//! - shell: `$NAME`, `${NAME}`, `${NAME:start}`, `${NAME:start:length}`
//!   (the substring suffix needs braces, so `$HOST:6379` keeps its port)
//! - curly: `${{ NAME }}`
//!
//! Configuration fields use the shell family. Script content uses the curly
//! family only, so `$VAR` references inside shell scripts reach the instance
//! untouched. A match preceded by a backslash is left as-is, backslash
//! included. Unknown names expand to the empty string.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static SHELL_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\\?\$(?:",
        r"\{(?P<name>[a-zA-Z](?:[a-zA-Z0-9_-]+[a-zA-Z0-9]|[a-zA-Z0-9]*))(?::(?P<start>\d+)(?::(?P<length>\d+))?)?\}",
        r"|\{?(?P<bare>[a-zA-Z](?:[a-zA-Z0-9_-]+[a-zA-Z0-9]|[a-zA-Z0-9]*))\}?",
        r")",
    ))
    .unwrap()
});

static CURLY_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\?\$\{\{[ \t]*([a-zA-Z0-9_-]+)[ \t]*\}\}").unwrap());

/// Variable lookup table keyed by lower-cased name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableTable {
    vars: HashMap<String, String>,
}

impl VariableTable {
    /// Snapshot of the process environment
    pub fn from_env() -> Self {
        Self::from_pairs(std::env::vars())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let vars = pairs
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_lowercase(), v.into()))
            .collect();
        Self { vars }
    }

    /// New table with `locals` overlaid; locals win on collision
    pub fn with_locals(&self, locals: &BTreeMap<String, String>) -> Self {
        let mut vars = self.vars.clone();
        for (k, v) in locals {
            vars.insert(k.to_lowercase(), v.clone());
        }
        Self { vars }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(&name.to_lowercase()).map(String::as_str)
    }

    fn lookup(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Shell,
    Curly,
}

pub fn expand(text: &str, table: &VariableTable, syntax: Syntax) -> String {
    match syntax {
        Syntax::Shell => expand_shell(text, table),
        Syntax::Curly => expand_curly(text, table),
    }
}

/// Replace `$NAME`, `${NAME}` and `${NAME:start[:length]}`
pub fn expand_shell(text: &str, table: &VariableTable) -> String {
    SHELL_VAR
        .replace_all(text, |caps: &Captures| {
            let matched = &caps[0];
            if matched.starts_with('\\') {
                return matched.to_string();
            }

            if let Some(bare) = caps.name("bare") {
                return table.lookup(bare.as_str()).to_string();
            }

            let value = table.lookup(caps.name("name").map_or("", |m| m.as_str()));
            let Some(start) = caps.name("start") else {
                return value.to_string();
            };
            let Ok(start) = start.as_str().parse::<usize>() else {
                return value.to_string();
            };
            let length = match caps.name("length").map(|m| m.as_str().parse::<usize>()) {
                Some(Ok(length)) => Some(length),
                Some(Err(_)) => return value.to_string(),
                None => None,
            };

            truncate(value, start, length)
        })
        .into_owned()
}

/// Replace `${{ NAME }}`
pub fn expand_curly(text: &str, table: &VariableTable) -> String {
    CURLY_VAR
        .replace_all(text, |caps: &Captures| {
            let matched = &caps[0];
            if matched.starts_with('\\') {
                matched.to_string()
            } else {
                table.lookup(&caps[1]).to_string()
            }
        })
        .into_owned()
}

/// Character-based substring, clamped to the bounds of `value`
fn truncate(value: &str, start: usize, length: Option<usize>) -> String {
    let rest = value.chars().skip(start);
    match length {
        Some(length) => rest.take(length).collect(),
        None => rest.collect(),
    }
}
