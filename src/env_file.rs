//! Minimal `.env` reader.
//!
//! Accepts `KEY=VALUE` lines with optional `export` prefixes and `#`
//! comments. Values are unquoted with shell rules.
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Load `path` if it exists; a missing file yields no variables.
pub fn load_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.is_file() {
        return Ok(BTreeMap::new());
    }
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(parse_env_file(&text))
}

pub fn parse_env_file(text: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        vars.insert(key.to_string(), unquote(raw.trim()));
    }
    vars
}

fn unquote(raw: &str) -> String {
    match shell_words::split(raw) {
        Ok(words) => words.join(" "),
        Err(_) => raw.to_string(),
    }
}
