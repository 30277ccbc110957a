//! Nested YAML dialect (`/etc/majestic.yaml`)
//!
//! The tree is parsed with `serde_yaml` to validate the document and to
//! decide which paths are scalar leaves. Values are located and rewritten
//! on the original lines so comments, ordering and number formatting
//! survive a round trip.

use fpvconf_core::Dialect;
use serde_yaml::Value;
use tracing::debug;

use crate::document::{is_ignorable, RawConfigDocument, RawLine, Rewriter, ValueSlot};
use crate::error::{CodecError, CodecResult};
use crate::map::ConfigMap;
use crate::ConfigCodec;

/// Codec for nested mappings addressed by dotted paths (`video0.size`)
#[derive(Debug, Clone, Default)]
pub struct NestedCodec;

impl NestedCodec {
    pub fn new() -> Self {
        Self
    }
}

/// A `key: value` line found while scanning
struct Candidate {
    parts: Vec<String>,
    slot: ValueSlot,
}

/// Split `key: rest` returning the key and the byte index of the colon
fn split_mapping_key(trimmed: &str) -> Option<(String, usize)> {
    if let Some(q) = trimmed.chars().next().filter(|c| *c == '"' || *c == '\'') {
        let close = trimmed[1..].find(q)? + 1;
        let after = &trimmed[close + 1..];
        let colon = close + 1 + (after.len() - after.trim_start().len());
        if !trimmed[colon..].starts_with(':') {
            return None;
        }
        return Some((trimmed[1..close].to_string(), colon));
    }

    let bytes = trimmed.as_bytes();
    for (idx, b) in bytes.iter().enumerate() {
        if *b != b':' {
            continue;
        }
        let next = bytes.get(idx + 1);
        if next.is_none() || next == Some(&b' ') || next == Some(&b'\t') {
            let key = trimmed[..idx].trim_end();
            if key.is_empty() {
                return None;
            }
            return Some((key.to_string(), idx));
        }
    }
    None
}

/// Byte index of the closing quote of a quoted scalar starting at 0
fn closing_quote(value: &str, quote: char) -> Option<usize> {
    let mut chars = value.char_indices().skip(1).peekable();
    while let Some((idx, c)) = chars.next() {
        if quote == '"' && c == '\\' {
            chars.next();
        } else if c == quote {
            if quote == '\'' && chars.peek().is_some_and(|(_, n)| *n == '\'') {
                chars.next();
            } else {
                return Some(idx);
            }
        }
    }
    None
}

/// Length of a plain scalar, stopping at a ` #` comment
fn plain_scalar_len(value: &str) -> usize {
    let end = value.find(" #").or_else(|| value.find("\t#")).unwrap_or(value.len());
    value[..end].trim_end().len()
}

fn scan_lines(lines: &[RawLine]) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    // Indent of a key that owns a `|`/`>` block scalar
    let mut block_owner: Option<usize> = None;

    for (idx, line) in lines.iter().enumerate() {
        let text = line.text.as_str();
        let trimmed = text.trim_start();
        let indent = text.len() - trimmed.len();

        if let Some(owner) = block_owner {
            if trimmed.is_empty() || indent > owner {
                continue;
            }
            block_owner = None;
        }
        if trimmed.is_empty()
            || trimmed.starts_with('#')
            || trimmed.starts_with("---")
            || trimmed.starts_with("...")
            || trimmed == "-"
            || trimmed.starts_with("- ")
        {
            continue;
        }
        let Some((key, colon)) = split_mapping_key(trimmed) else {
            continue;
        };

        while stack.last().is_some_and(|(i, _)| *i >= indent) {
            stack.pop();
        }
        let mut parts: Vec<String> = stack.iter().map(|(_, k)| k.clone()).collect();
        parts.push(key.clone());

        let after = indent + colon + 1;
        let rest = &text[after..];
        let value = rest.trim_start();
        let base = after + (rest.len() - value.len());

        if value.is_empty() || value.starts_with('#') {
            stack.push((indent, key));
            candidates.push(Candidate {
                parts,
                slot: ValueSlot {
                    line: idx,
                    start: after,
                    end: after,
                    quote: None,
                    value: String::new(),
                    pad: true,
                },
            });
            continue;
        }
        if value.starts_with('|') || value.starts_with('>') {
            block_owner = Some(indent);
            continue;
        }
        if value.starts_with(['[', '{', '&', '*', '!']) {
            continue;
        }

        let slot = match value.chars().next().filter(|c| *c == '"' || *c == '\'') {
            Some(q) => {
                let Some(close) = closing_quote(value, q) else {
                    debug!(line = idx + 1, "Multi-line quoted scalar left untouched");
                    continue;
                };
                ValueSlot {
                    line: idx,
                    start: base + 1,
                    end: base + close,
                    quote: Some(q),
                    value: value[1..close].to_string(),
                    pad: false,
                }
            }
            None => {
                let len = plain_scalar_len(value);
                ValueSlot {
                    line: idx,
                    start: base,
                    end: base + len,
                    quote: None,
                    value: value[..len].to_string(),
                    pad: false,
                }
            }
        };
        candidates.push(Candidate { parts, slot });
    }

    candidates
}

fn key_matches(key: &Value, part: &str) -> bool {
    match key {
        Value::String(s) => s == part,
        Value::Number(n) => n.to_string() == part,
        Value::Bool(b) => b.to_string() == part,
        _ => false,
    }
}

fn lookup<'a>(tree: &'a Value, parts: &[String]) -> Option<&'a Value> {
    parts.iter().try_fold(tree, |node, part| match node {
        Value::Mapping(map) => map
            .iter()
            .find(|(k, _)| key_matches(k, part))
            .map(|(_, v)| v),
        _ => None,
    })
}

fn is_scalar(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
    )
}

fn needs_yaml_quotes(value: &str) -> bool {
    value.is_empty()
        || value.starts_with([
            '-', '?', ':', ',', '[', ']', '{', '}', '#', '&', '*', '!', '|', '>', '\'', '"', '%',
            '@', '`',
        ])
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace)
        || value.ends_with(':')
        || value.contains(": ")
        || value.contains(" #")
        || value.contains(['\n', '\r', '\t'])
}

fn escape_double(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

fn render_yaml_value(path: &str, quote: Option<char>, value: &str) -> CodecResult<String> {
    match quote {
        // Single quotes have no escapes; a raw break would fold into a space
        Some('\'') if value.contains(['\n', '\r']) => Err(CodecError::InvalidValue {
            key: path.to_string(),
            reason: "line breaks cannot be stored in a single-quoted value".into(),
        }),
        Some('\'') => Ok(value.replace('\'', "''")),
        Some(_) => Ok(escape_double(value)),
        None if needs_yaml_quotes(value) => Ok(format!("\"{}\"", escape_double(value))),
        None => Ok(value.to_string()),
    }
}

impl ConfigCodec for NestedCodec {
    fn dialect(&self) -> Dialect {
        Dialect::Nested
    }

    fn parse(&self, text: &str) -> CodecResult<(ConfigMap, RawConfigDocument)> {
        let mut doc = RawConfigDocument::new(Dialect::Nested, text);
        let tree: Value = if doc.lines.iter().all(|l| is_ignorable(&l.text)) {
            Value::Null
        } else {
            serde_yaml::from_str(text)?
        };

        for candidate in scan_lines(&doc.lines) {
            let Some(node) = lookup(&tree, &candidate.parts) else {
                debug!(path = %candidate.parts.join("."), "Line not present in parsed tree");
                continue;
            };
            if !is_scalar(node) {
                continue;
            }
            let mut slot = candidate.slot;
            // serde_yaml already unescaped quoted strings
            if let (Some(_), Value::String(s)) = (slot.quote, node) {
                slot.value = s.clone();
            }
            doc.define(candidate.parts.join("."), slot);
        }

        let map = doc
            .slots
            .iter()
            .map(|(k, slot)| (k.clone(), slot.value.clone()))
            .collect();
        Ok((map, doc))
    }

    fn serialize(&self, doc: &RawConfigDocument, updates: &ConfigMap) -> CodecResult<String> {
        let mut rw = Rewriter::new(doc);
        for (path, value) in updates.iter() {
            let slot = doc
                .slots
                .get(path)
                .ok_or_else(|| CodecError::PathNotFound(path.to_string()))?;
            if slot.value != value {
                rw.replace_value(slot, render_yaml_value(path, slot.quote, value)?);
            }
        }
        Ok(rw.render())
    }
}
