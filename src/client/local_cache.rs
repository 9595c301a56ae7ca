//! Durable per-namespace copy of the last fetched configuration.
//!
//! One flat `key=value` file per `(appId, cluster, namespace)`, readable by
//! any `.properties` parser.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use tracing::warn;

use crate::assemble_key;
use crate::constants::LOCAL_CACHE_FILE_HEADER;
use crate::constants::PROPERTIES_SUFFIX;
use crate::file_io::write_atomically;
use crate::ClientError;
use crate::Error;
use crate::Result;

#[derive(Debug, Clone)]
pub struct LocalFileCache {
    dir: PathBuf,
}

impl LocalFileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{dir}/{appId}+{cluster}+{namespace}.properties`
    pub fn file_path(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
    ) -> PathBuf {
        self.dir
            .join(format!("{}{}", assemble_key(app_id, cluster, namespace), PROPERTIES_SUFFIX))
    }

    pub fn load(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
    ) -> Result<BTreeMap<String, String>> {
        let path = self.file_path(app_id, cluster, namespace);
        let text = std::fs::read_to_string(&path).map_err(|e| ClientError::LocalCache {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let properties = parse_properties(&text);
        debug!(?path, keys = properties.len(), "loaded local cache file");
        Ok(properties)
    }

    /// Replaces the cached copy. Failures are logged and returned; callers
    /// normally carry on with the in-memory config.
    pub fn persist(
        &self,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<()> {
        let path = self.file_path(app_id, cluster, namespace);
        write_atomically(&path, format_properties(properties).as_bytes()).map_err(|e| {
            warn!(?path, ?e, "persist local cache file failed");
            Error::from(ClientError::LocalCache {
                path: path.clone(),
                reason: e.to_string(),
            })
        })
    }
}

pub fn format_properties(properties: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(64 + properties.len() * 32);
    out.push_str(LOCAL_CACHE_FILE_HEADER);
    out.push('\n');
    for (key, value) in properties {
        out.push_str(&escape(key, true));
        out.push('=');
        out.push_str(&escape(value, false));
        out.push('\n');
    }
    out
}

/// Parses `key=value` (or `key:value`) lines. Blank lines and lines starting
/// with `#` or `!` are skipped.
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) = split_line(line);
        properties.insert(unescape(trim_key(key)), unescape(value.trim_start()));
    }
    properties
}

fn split_line(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..i], &line[i + 1..]),
            _ => {}
        }
    }
    (line, "")
}

/// Trailing whitespace ends the key unless it is escaped.
fn trim_key(key: &str) -> &str {
    let trimmed = key.trim_end();
    if trimmed.ends_with('\\') && trimmed.len() < key.len() {
        &key[..trimmed.len() + 1]
    } else {
        trimmed
    }
}

fn escape(
    raw: &str,
    is_key: bool,
) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, c) in raw.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('u');
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
