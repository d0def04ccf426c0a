use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Key/value declarations read from one configuration file.
///
/// Keys keep the order in which they first appear; a repeated key overrides
/// the earlier value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declarations {
    entries: Vec<(String, String)>,
}

impl Declarations {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recipe names from `RECIPES`, accepting `(a b)` as well as `a b`.
    pub fn recipe_names(&self) -> Vec<String> {
        let raw = self.get("RECIPES").unwrap_or("").trim();
        let raw = raw
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .unwrap_or(raw);
        raw.split_whitespace().map(ToOwned::to_owned).collect()
    }
}

pub fn parse(path: &Path, data: &str) -> Result<Declarations> {
    let mut out = Declarations::default();
    for (idx, raw) in data.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            return Err(Error::config(format!(
                "{}:{}: expected KEY=VALUE, got '{}'",
                path.display(),
                idx + 1,
                line
            )));
        };
        let key = key.trim();
        if key.is_empty() || key.chars().any(char::is_whitespace) {
            return Err(Error::config(format!(
                "{}:{}: invalid key '{}'",
                path.display(),
                idx + 1,
                key
            )));
        }
        out.insert(key, unquote(value.trim()));
    }
    Ok(out)
}

pub fn load(path: &Path) -> Result<Declarations> {
    let data = fs::read_to_string(path)
        .map_err(|e| Error::config(format!("failed to read config {}: {e}", path.display())))?;
    parse(path, &data)
}

fn unquote(value: &str) -> String {
    // A quoted value ends at its closing quote; anything after it is a comment.
    if let Some(q) = value.chars().next().filter(|c| matches!(c, '"' | '\'')) {
        let body = &value[1..];
        if let Some(end) = body.find(q) {
            return body[..end].to_string();
        }
    }
    match value.find(" #") {
        Some(i) => value[..i].trim_end().to_string(),
        None => value.to_string(),
    }
}
